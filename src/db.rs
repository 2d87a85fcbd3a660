//! FoldTreeDB main struct and lifecycle operations.
//!
//! The [`FoldTreeDB`] struct is the primary interface for interacting with
//! an index directory. It provides methods for:
//!
//! - Opening and closing the database
//! - Starting write sessions ([`IndexSession`]) and read sessions
//!   ([`ReadSession`]) per collection
//! - Inspecting the column registry
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use foldtree::{BagOfCharsModel, Config, FoldTreeDB};
//!
//! let db = FoldTreeDB::open("./index", Config::default(), BagOfCharsModel::new())?;
//!
//! let session = db.index_session("docs")?;
//! session.put(1, "title", "cats and dogs")?;
//! session.flush()?;
//! drop(session);
//!
//! let reader = db.read_session("docs")?;
//! for term in reader.search("title", "cat")? {
//!     if let Some(hit) = term.hit {
//!         println!("{} -> {:?}", term.token, reader.resolve(&hit)?);
//!     }
//! }
//!
//! db.close()?;
//! ```
//!
//! # Thread Safety
//!
//! `FoldTreeDB` is `Send + Sync` and can be shared across threads using
//! `Arc`. Sessions borrow the handle; any number of read sessions may run
//! next to one index session per collection.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::config::Config;
use crate::error::{FoldTreeError, Result};
use crate::model::SimilarityModel;
use crate::session::{IndexSession, ReadSession};
use crate::storage::{open_catalog, Catalog, CatalogMetadata, ViewCache, CATALOG_FILE};
use crate::types::ColumnId;

/// The main FoldTree database handle.
///
/// Create an instance with [`FoldTreeDB::open()`] and close it with
/// [`FoldTreeDB::close()`].
///
/// # Ownership
///
/// `FoldTreeDB` owns its catalog, its similarity model and the cache of
/// stream views. When you call `close()`, the database is consumed and
/// cannot be used afterward.
pub struct FoldTreeDB {
    /// Directory holding the catalog and every page stream.
    dir: PathBuf,

    /// Column registry and metadata.
    catalog: Box<dyn Catalog>,

    /// Similarity model shared by every session.
    model: Box<dyn SimilarityModel>,

    /// Cached read views of page streams.
    views: ViewCache,

    /// Configuration used to open this database.
    config: Config,
}

impl fmt::Debug for FoldTreeDB {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FoldTreeDB")
            .field("dir", &self.dir)
            .field("config", &self.config)
            .field("vector_width", &self.model.vector_width())
            .finish_non_exhaustive()
    }
}

impl FoldTreeDB {
    /// Opens or creates a database in the directory `path`.
    ///
    /// A new database records the model's vector width in its catalog; an
    /// existing one must be reopened with a model of the same width.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration is invalid (see [`Config::validate`])
    /// - The directory cannot be created
    /// - The catalog is corrupted or held open by another handle
    /// - Schema version doesn't match
    /// - The model's vector width doesn't match the existing database
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use foldtree::{BagOfCharsModel, Config, FoldTreeDB, ReadMode};
    ///
    /// let db = FoldTreeDB::open("./index", Config {
    ///     read_mode: ReadMode::Buffered,
    ///     ..Default::default()
    /// }, BagOfCharsModel::new())?;
    /// ```
    #[instrument(skip(config, model), fields(path = %path.as_ref().display()))]
    pub fn open(
        path: impl AsRef<Path>,
        config: Config,
        model: impl SimilarityModel + 'static,
    ) -> Result<Self> {
        config.validate().map_err(FoldTreeError::from)?;

        info!("Opening FoldTreeDB");

        let dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let catalog = open_catalog(dir.join(CATALOG_FILE), model.vector_width())?;

        info!(
            vector_width = model.vector_width(),
            read_mode = ?config.read_mode,
            page_format = ?config.page_format,
            "FoldTreeDB opened successfully"
        );

        Ok(Self {
            dir,
            catalog,
            model: Box::new(model),
            views: ViewCache::new(config.read_mode),
            config,
        })
    }

    /// Closes the database.
    ///
    /// Sessions borrow the handle, so none can be alive here.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog reports a flush failure.
    #[instrument(skip(self), fields(path = %self.dir.display()))]
    pub fn close(self) -> Result<()> {
        info!("Closing FoldTreeDB");

        self.views.clear();
        self.catalog.close()?;

        info!("FoldTreeDB closed successfully");
        Ok(())
    }

    /// Starts a write session on `collection`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::CollectionLocked` while another session
    /// (in this or another process) writes to the collection, or a
    /// validation error for an invalid collection name.
    pub fn index_session(&self, collection: &str) -> Result<IndexSession<'_>> {
        IndexSession::open(self, collection)
    }

    /// Starts a read session on `collection`.
    ///
    /// Reading a collection that was never written returns no hits.
    pub fn read_session(&self, collection: &str) -> Result<ReadSession<'_>> {
        ReadSession::open(self, collection)
    }

    /// Id of `(collection, field)`, if the field was ever indexed.
    pub fn column_id(&self, collection: &str, field: &str) -> Result<Option<ColumnId>> {
        self.catalog.column_id(collection, field)
    }

    /// Fields indexed in `collection` with their column ids.
    pub fn list_columns(&self, collection: &str) -> Result<Vec<(String, ColumnId)>> {
        self.catalog.list_columns(collection)
    }

    /// Returns a reference to the database configuration.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the catalog metadata.
    #[inline]
    pub fn metadata(&self) -> &CatalogMetadata {
        self.catalog.metadata()
    }

    /// Returns the similarity model.
    #[inline]
    pub fn model(&self) -> &dyn SimilarityModel {
        self.model.as_ref()
    }

    /// Returns the database directory.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Internal Accessors (for use by session modules)
    // =========================================================================

    #[inline]
    pub(crate) fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    #[inline]
    pub(crate) fn views(&self) -> &ViewCache {
        &self.views
    }
}

// FoldTreeDB is auto Send + Sync: Box<dyn Catalog + Send + Sync>,
// Box<dyn SimilarityModel + Send + Sync>, ViewCache and Config are all
// Send + Sync.
