//! Write sessions.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use fs2::FileExt;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::column::ColumnWriter;
use crate::config::PageFormat;
use crate::db::FoldTreeDB;
use crate::error::{FoldTreeError, Result, StorageError};
use crate::graph::{ColumnTree, Postings};
use crate::storage::schema::validate_collection_name;
use crate::storage::{AppendStream, CollectionFiles, ColumnFiles};
use crate::types::{ColumnId, DocId, SessionId};
use crate::vector::SparseVector;

/// Shape summary of one column tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphInfo {
    /// Field name.
    pub field: String,
    /// Column id of the field.
    pub column: ColumnId,
    /// Number of nodes.
    pub weight: u32,
    /// Longest root-to-leaf path in nodes.
    pub depth: usize,
}

/// Diagnostics of an index session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Session the numbers belong to.
    pub session_id: SessionId,
    /// Tokens folded into an existing node instead of adding one.
    pub merges: u64,
    /// One entry per field touched by the session, ordered by field name.
    pub columns: Vec<GraphInfo>,
}

impl IndexInfo {
    /// Pretty-printed JSON form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| StorageError::serialization(e.to_string()).into())
    }
}

/// One page written by a flush.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageReport {
    /// Field name.
    pub field: String,
    /// Column id of the field.
    pub column: ColumnId,
    /// Layout of the page.
    pub format: PageFormat,
    /// Byte offset in the column's record stream.
    pub offset: u64,
    /// Byte length of the page.
    pub length: u64,
    /// Nodes written.
    pub nodes: usize,
}

/// Result of [`IndexSession::flush`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
    /// Session that was flushed.
    pub session_id: SessionId,
    /// Pages written, ordered by field name. Empty for a repeated flush.
    pub pages: Vec<PageReport>,
}

#[derive(Debug)]
struct ColumnEntry {
    id: ColumnId,
    tree: Arc<ColumnTree>,
}

/// Write session over one collection.
///
/// Builds one in-memory tree per field. [`flush`](Self::flush) writes each
/// tree as a new page exactly once; later calls are no-ops and later puts
/// are rejected. Dropping an unflushed session flushes it. A failed flush
/// is not retried: the trees may already be partly written.
///
/// The session holds the collection's writer lock for its whole life, so
/// at most one session per collection appends at a time.
///
/// # Thread Safety
///
/// `put*` may be called from many threads at once; inserts into the same
/// field synchronize per node.
#[derive(Debug)]
pub struct IndexSession<'db> {
    db: &'db FoldTreeDB,
    collection: String,
    id: SessionId,
    columns: RwLock<BTreeMap<String, ColumnEntry>>,
    merges: AtomicU64,
    /// Set when a flush starts; never cleared.
    flushed: AtomicBool,
    /// Error of a flush that did not complete.
    failure: OnceLock<String>,
    _lock: File,
}

impl<'db> IndexSession<'db> {
    #[instrument(skip(db), fields(dir = %db.path().display()))]
    pub(crate) fn open(db: &'db FoldTreeDB, collection: &str) -> Result<Self> {
        validate_collection_name(collection)?;

        let files = CollectionFiles::new(db.path(), collection);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&files.lock)?;
        lock.try_lock_exclusive().map_err(|err| {
            if err.kind() == fs2::lock_contended_error().kind() {
                FoldTreeError::from(StorageError::CollectionLocked(collection.to_string()))
            } else {
                FoldTreeError::from(err)
            }
        })?;

        let id = SessionId::new();
        info!(session = %id, "Index session opened");

        Ok(Self {
            db,
            collection: collection.to_string(),
            id,
            columns: RwLock::new(BTreeMap::new()),
            merges: AtomicU64::new(0),
            flushed: AtomicBool::new(false),
            failure: OnceLock::new(),
            _lock: lock,
        })
    }

    /// Session id.
    #[inline]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Collection this session writes to.
    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns true once [`flush`](Self::flush) has completed successfully.
    #[inline]
    pub fn is_flushed(&self) -> bool {
        self.flushed.load(Ordering::Acquire) && self.failure.get().is_none()
    }

    /// Tokenizes `text` with the database's model and indexes every token
    /// under `doc_id`.
    ///
    /// Returns the number of tokens indexed.
    ///
    /// # Errors
    ///
    /// Returns `SessionFlushed` after a flush, `FlushFailed` after a failed
    /// flush, a model error if the model
    /// cannot tokenize, or `MergeAfterFlush` (see [`ColumnTree::insert`]).
    pub fn put(&self, doc_id: DocId, field: &str, text: &str) -> Result<usize> {
        self.ensure_open()?;
        let tokens = self.db.model().tokenize(text)?;
        self.put_vectors(doc_id, field, tokens)
    }

    /// Indexes pre-computed token vectors under `doc_id`.
    ///
    /// At most `max_tokens_per_value` vectors are taken; vectors without
    /// components have no direction and are skipped.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` for a vector of the wrong width.
    pub fn put_vectors(
        &self,
        doc_id: DocId,
        field: &str,
        vectors: impl IntoIterator<Item = SparseVector>,
    ) -> Result<usize> {
        self.ensure_open()?;
        let model = self.db.model();
        let tree = self.column_tree(field)?;

        let mut indexed = 0;
        for vector in vectors
            .into_iter()
            .take(self.db.config().max_tokens_per_value)
        {
            model.validate_vector(&vector)?;
            if vector.is_empty() {
                continue;
            }
            if tree.insert(vector, Postings::single(doc_id), model)?.is_merge() {
                self.merges.fetch_add(1, Ordering::Relaxed);
            }
            indexed += 1;
        }
        Ok(indexed)
    }

    /// Indexes many `(doc_id, text)` values of one field in parallel.
    ///
    /// Returns the total number of tokens indexed. Stops at the first
    /// error; documents indexed before it stay in the session.
    #[instrument(skip(self, documents), fields(session = %self.id, docs = documents.len()))]
    pub fn put_batch(&self, field: &str, documents: &[(DocId, &str)]) -> Result<usize> {
        self.ensure_open()?;
        // register once up front so workers only take the read lock
        self.column_tree(field)?;

        let indexed = documents
            .par_iter()
            .map(|(doc_id, text)| self.put(*doc_id, field, text))
            .try_reduce(|| 0, |a, b| Ok(a + b))?;

        debug!(indexed, "Batch indexed");
        Ok(indexed)
    }

    /// The in-memory tree of `field`, if this session has touched it.
    pub fn tree(&self, field: &str) -> Option<Arc<ColumnTree>> {
        let columns = self.columns.read().ok()?;
        columns.get(field).map(|entry| Arc::clone(&entry.tree))
    }

    /// Shape summary of every tree in the session.
    pub fn index_info(&self) -> Result<IndexInfo> {
        let columns = self
            .columns
            .read()
            .map_err(|_| FoldTreeError::LockPoisoned("session columns"))?;

        let mut graphs = Vec::with_capacity(columns.len());
        for (field, entry) in columns.iter() {
            graphs.push(GraphInfo {
                field: field.clone(),
                column: entry.id,
                weight: entry.tree.weight()?,
                depth: entry.tree.depth()?,
            });
        }

        Ok(IndexInfo {
            session_id: self.id,
            merges: self.merges.load(Ordering::Relaxed),
            columns: graphs,
        })
    }

    /// Writes one page per touched field.
    ///
    /// Runs once; repeated calls return an empty report. Columns are
    /// written one after another because they share the collection's
    /// vector and postings streams.
    ///
    /// # Errors
    ///
    /// Returns the I/O or storage error that stopped the flush. The session
    /// is then unusable: later `flush` and `put` calls return
    /// `FlushFailed`.
    #[instrument(skip(self), fields(session = %self.id, collection = %self.collection))]
    pub fn flush(&self) -> Result<FlushReport> {
        if self.flushed.swap(true, Ordering::AcqRel) {
            self.check_failure()?;
            debug!("Session already flushed");
            return Ok(FlushReport {
                session_id: self.id,
                pages: Vec::new(),
            });
        }

        match self.write_pages() {
            Ok(pages) => {
                info!(
                    pages = pages.len(),
                    merges = self.merges.load(Ordering::Relaxed),
                    "Index session flushed"
                );
                Ok(FlushReport {
                    session_id: self.id,
                    pages,
                })
            }
            Err(err) => {
                error!(error = %err, "Index session flush failed");
                let _ = self.failure.set(err.to_string());
                Err(err)
            }
        }
    }

    fn write_pages(&self) -> Result<Vec<PageReport>> {
        let columns = self
            .columns
            .read()
            .map_err(|_| FoldTreeError::LockPoisoned("session columns"))?;
        let mut pages = Vec::new();
        if columns.is_empty() {
            info!("Nothing to flush");
            return Ok(pages);
        }

        let config = self.db.config();
        let model = self.db.model();
        let files = CollectionFiles::new(self.db.path(), &self.collection);
        let mut vectors = AppendStream::open(&files.vectors)?;
        let mut postings = AppendStream::open(&files.postings)?;

        for (field, entry) in columns.iter() {
            let writer = ColumnWriter::new(
                ColumnFiles::new(self.db.path(), &self.collection, entry.id),
                config.sync_mode,
            );
            let written = match config.page_format {
                PageFormat::Tree => writer.create_page(&entry.tree, &mut vectors, &mut postings)?,
                PageFormat::SortedList => {
                    writer.create_sorted_page(&entry.tree, model, &mut vectors, &mut postings)?
                }
            };
            if let Some(page) = written {
                pages.push(PageReport {
                    field: field.clone(),
                    column: entry.id,
                    format: config.page_format,
                    offset: page.offset,
                    length: page.length,
                    nodes: entry.tree.len(),
                });
            }
        }
        Ok(pages)
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure.get() {
            Some(reason) => Err(FoldTreeError::FlushFailed {
                session: self.id.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        self.check_failure()?;
        if self.flushed.load(Ordering::Acquire) {
            return Err(FoldTreeError::SessionFlushed(self.id.to_string()));
        }
        Ok(())
    }

    /// Tree of `field`, registering the column on first use.
    fn column_tree(&self, field: &str) -> Result<Arc<ColumnTree>> {
        if let Some(tree) = self.tree(field) {
            return Ok(tree);
        }

        let mut columns = self
            .columns
            .write()
            .map_err(|_| FoldTreeError::LockPoisoned("session columns"))?;
        if let Some(entry) = columns.get(field) {
            return Ok(Arc::clone(&entry.tree));
        }

        let id = self.db.catalog().register_column(&self.collection, field)?;
        let tree = Arc::new(ColumnTree::new());
        columns.insert(
            field.to_string(),
            ColumnEntry {
                id,
                tree: Arc::clone(&tree),
            },
        );
        debug!(session = %self.id, field, column = %id, "Column opened");
        Ok(tree)
    }
}

impl Drop for IndexSession<'_> {
    fn drop(&mut self) {
        // a failed flush was already reported
        if self.flushed.load(Ordering::Acquire) {
            return;
        }
        if let Err(err) = self.flush() {
            warn!(session = %self.id, error = %err, "Flush on drop failed");
        }
    }
}
