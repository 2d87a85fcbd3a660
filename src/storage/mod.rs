//! Storage layer for FoldTree.
//!
//! Two kinds of storage sit under a database directory:
//!
//! - the **catalog**, a redb database behind the [`Catalog`] trait, holding
//!   metadata and the column registry
//! - the **page streams**, plain append-only files read through cached
//!   [`ByteView`]s
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      FoldTreeDB                              │
//! │               │                       │                      │
//! │               ▼                       ▼                      │
//! │    ┌─────────────────────┐   ┌─────────────────────┐        │
//! │    │   Catalog (trait)   │   │  ViewCache / Append │        │
//! │    └─────────────────────┘   │  Stream (files)     │        │
//! │               ▲              └─────────────────────┘        │
//! │        ┌──────┴──────┐                                       │
//! │        │ RedbCatalog │                                       │
//! │        └─────────────┘                                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod page;
pub mod redb;
pub mod schema;
pub mod stream;

pub use self::redb::RedbCatalog;
pub use page::{read_page_index, PageEntry, PAGE_ENTRY_SIZE};
pub use schema::{CatalogMetadata, CollectionFiles, ColumnFiles, CATALOG_FILE, SCHEMA_VERSION};
pub use stream::{AppendStream, ByteView, OffsetWriter, ViewCache};

use std::path::Path;

use crate::error::Result;
use crate::types::ColumnId;

/// Catalog trait for FoldTree.
///
/// Defines the contract any catalog backend must implement. The primary
/// implementation is [`RedbCatalog`].
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one catalog is shared by every
/// session of a database handle.
pub trait Catalog: Send + Sync {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Returns the catalog metadata.
    fn metadata(&self) -> &CatalogMetadata;

    /// Closes the catalog, flushing any pending writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend supports reporting flush failures.
    fn close(self: Box<Self>) -> Result<()>;

    /// Returns the path to the catalog file, if applicable.
    fn path(&self) -> Option<&Path>;

    // =========================================================================
    // Column Registry
    // =========================================================================

    /// Returns the id of `(collection, field)`, registering it on first use.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid collection or field name,
    /// or an error if the transaction fails.
    fn register_column(&self, collection: &str, field: &str) -> Result<ColumnId>;

    /// Looks up the id of `(collection, field)` without registering it.
    fn column_id(&self, collection: &str, field: &str) -> Result<Option<ColumnId>>;

    /// Lists `(field, id)` pairs of a collection, ordered by id.
    fn list_columns(&self, collection: &str) -> Result<Vec<(String, ColumnId)>>;
}

/// Opens a catalog at the given path.
///
/// Convenience function that creates a [`RedbCatalog`] and returns it as a
/// boxed trait object.
pub fn open_catalog(path: impl AsRef<Path>, vector_width: u32) -> Result<Box<dyn Catalog>> {
    let catalog = RedbCatalog::open(path, vector_width)?;
    Ok(Box::new(catalog))
}
