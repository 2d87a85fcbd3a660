//! redb catalog implementation.
//!
//! This module provides the catalog backend for FoldTree using
//! [redb](https://docs.rs/redb), a pure Rust embedded key-value store.
//! Page streams live beside it as plain files; only metadata and the
//! column registry go through redb.
//!
//! # Features
//!
//! - ACID transactions with MVCC
//! - Single-writer, multiple-reader concurrency
//! - Automatic crash recovery

use std::path::{Path, PathBuf};

use ::redb::{Database, ReadableTable};
use tracing::{debug, info, instrument, warn};

use super::schema::{
    validate_collection_name, validate_field_name, CatalogMetadata, COLUMNS_TABLE,
    METADATA_TABLE, NEXT_COLUMN_TABLE, SCHEMA_VERSION,
};
use super::Catalog;
use crate::error::{FoldTreeError, Result, StorageError, ValidationError};
use crate::types::ColumnId;

/// Metadata key in the metadata table.
const METADATA_KEY: &str = "catalog_metadata";

/// redb catalog wrapper.
///
/// Holds the redb database handle and cached metadata.
///
/// # Thread Safety
///
/// `RedbCatalog` is `Send + Sync`. redb handles internal synchronization
/// using MVCC for readers and exclusive locking for writers, so concurrent
/// column registrations are serialized by the write transaction.
#[derive(Debug)]
pub struct RedbCatalog {
    db: Database,
    metadata: CatalogMetadata,
    path: PathBuf,
}

impl RedbCatalog {
    /// Opens or creates a catalog at the given path.
    ///
    /// A new catalog records `vector_width`; an existing one must have been
    /// created with the same width.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The catalog file is corrupted or held open by another handle
    /// - Schema version doesn't match
    /// - Vector width doesn't match (for existing catalogs)
    #[instrument(skip_all, fields(path = %path.as_ref().display(), vector_width = vector_width))]
    pub fn open(path: impl AsRef<Path>, vector_width: u32) -> Result<Self> {
        let path = path.as_ref();
        let exists = path.exists();

        debug!(exists = exists, "Opening catalog");

        let db = Database::builder()
            .create(path)
            .map_err(|e| StorageError::Redb(e.to_string()))?;

        if exists {
            Self::open_existing(db, path.to_path_buf(), vector_width)
        } else {
            Self::initialize_new(db, path.to_path_buf(), vector_width)
        }
    }

    /// Creates the tables and writes fresh metadata.
    #[instrument(skip(db), fields(path = %path.display()))]
    fn initialize_new(db: Database, path: PathBuf, vector_width: u32) -> Result<Self> {
        info!("Initializing new catalog");

        let metadata = CatalogMetadata::new(vector_width);

        let write_txn = db.begin_write().map_err(StorageError::from)?;
        {
            let mut meta_table = write_txn.open_table(METADATA_TABLE)?;
            let metadata_bytes = bincode::serialize(&metadata)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            meta_table.insert(METADATA_KEY, metadata_bytes.as_slice())?;

            let _ = write_txn.open_table(COLUMNS_TABLE)?;
            let _ = write_txn.open_table(NEXT_COLUMN_TABLE)?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        info!(
            schema_version = SCHEMA_VERSION,
            vector_width = vector_width,
            "Catalog initialized"
        );

        Ok(Self { db, metadata, path })
    }

    /// Validates stored metadata and bumps `last_opened_at`.
    #[instrument(skip(db), fields(path = %path.display()))]
    fn open_existing(db: Database, path: PathBuf, vector_width: u32) -> Result<Self> {
        info!("Opening existing catalog");

        let read_txn = db.begin_read().map_err(StorageError::from)?;
        let metadata = {
            let meta_table = read_txn.open_table(METADATA_TABLE).map_err(|e| {
                StorageError::corrupted(format!("Cannot open metadata table: {}", e))
            })?;

            let metadata_bytes = meta_table
                .get(METADATA_KEY)
                .map_err(StorageError::from)?
                .ok_or_else(|| StorageError::corrupted("Missing catalog metadata"))?;

            bincode::deserialize::<CatalogMetadata>(metadata_bytes.value())
                .map_err(|e| StorageError::corrupted(format!("Invalid metadata format: {}", e)))?
        };
        drop(read_txn);

        if metadata.schema_version != SCHEMA_VERSION {
            warn!(
                expected = SCHEMA_VERSION,
                found = metadata.schema_version,
                "Schema version mismatch"
            );
            return Err(FoldTreeError::Storage(StorageError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                found: metadata.schema_version,
            }));
        }

        if metadata.vector_width != vector_width {
            warn!(
                expected = vector_width,
                found = metadata.vector_width,
                "Vector width mismatch"
            );
            return Err(FoldTreeError::Validation(ValidationError::DimensionMismatch {
                expected: vector_width as usize,
                got: metadata.vector_width as usize,
            }));
        }

        let mut metadata = metadata;
        metadata.touch();

        let write_txn = db.begin_write().map_err(StorageError::from)?;
        {
            let mut meta_table = write_txn.open_table(METADATA_TABLE)?;
            let metadata_bytes = bincode::serialize(&metadata)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            meta_table.insert(METADATA_KEY, metadata_bytes.as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        info!(
            schema_version = metadata.schema_version,
            vector_width = metadata.vector_width,
            "Catalog opened successfully"
        );

        Ok(Self { db, metadata, path })
    }
}

impl Catalog for RedbCatalog {
    fn metadata(&self) -> &CatalogMetadata {
        &self.metadata
    }

    #[instrument(skip(self))]
    fn close(self: Box<Self>) -> Result<()> {
        info!("Closing catalog");
        // redb flushes durably on drop
        drop(self.db);
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn register_column(&self, collection: &str, field: &str) -> Result<ColumnId> {
        validate_collection_name(collection)?;
        validate_field_name(field)?;

        if let Some(id) = self.column_id(collection, field)? {
            return Ok(id);
        }

        let write_txn = self.db.begin_write().map_err(StorageError::from)?;
        let id;
        {
            let mut columns = write_txn.open_table(COLUMNS_TABLE)?;
            // re-check inside the write transaction; another handle thread
            // may have registered it since the read above
            let existing = columns.get((collection, field))?.map(|v| v.value());
            match existing {
                Some(found) => id = found,
                None => {
                    let mut counters = write_txn.open_table(NEXT_COLUMN_TABLE)?;
                    let next = counters.get(collection)?.map_or(0, |v| v.value());
                    counters.insert(collection, next + 1)?;
                    columns.insert((collection, field), next)?;
                    id = next;
                    debug!(collection, field, column = id, "Column registered");
                }
            }
        }
        write_txn.commit().map_err(StorageError::from)?;

        Ok(ColumnId(id))
    }

    fn column_id(&self, collection: &str, field: &str) -> Result<Option<ColumnId>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(COLUMNS_TABLE)?;
        let id = table.get((collection, field))?.map(|v| ColumnId(v.value()));
        Ok(id)
    }

    fn list_columns(&self, collection: &str) -> Result<Vec<(String, ColumnId)>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(COLUMNS_TABLE)?;

        let mut columns = Vec::new();
        for result in table.iter()? {
            let (key, value) = result.map_err(StorageError::from)?;
            let (owner, field) = key.value();
            if owner == collection {
                columns.push((field.to_string(), ColumnId(value.value())));
            }
        }
        columns.sort_by_key(|(_, id)| *id);
        Ok(columns)
    }
}

// RedbCatalog is auto Send + Sync: Database, CatalogMetadata, and PathBuf
// are all Send + Sync.

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_new_catalog() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.redb");
        assert!(!path.exists());

        let catalog = RedbCatalog::open(&path, 256).unwrap();

        assert!(path.exists());
        assert_eq!(catalog.metadata().schema_version, SCHEMA_VERSION);
        assert_eq!(catalog.metadata().vector_width, 256);

        Box::new(catalog).close().unwrap();
    }

    #[test]
    fn test_open_existing_catalog() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.redb");

        let catalog = RedbCatalog::open(&path, 256).unwrap();
        let created_at = catalog.metadata().created_at;
        Box::new(catalog).close().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        let catalog = RedbCatalog::open(&path, 256).unwrap();

        assert_eq!(catalog.metadata().created_at, created_at);
        assert!(catalog.metadata().last_opened_at > created_at);

        Box::new(catalog).close().unwrap();
    }

    #[test]
    fn test_width_mismatch_returns_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.redb");

        Box::new(RedbCatalog::open(&path, 256).unwrap())
            .close()
            .unwrap();

        let err = RedbCatalog::open(&path, 512).unwrap_err();
        assert!(matches!(
            err,
            FoldTreeError::Validation(ValidationError::DimensionMismatch {
                expected: 512,
                got: 256
            })
        ));
    }

    #[test]
    fn test_register_column_is_idempotent() {
        let dir = tempdir().unwrap();
        let catalog = RedbCatalog::open(dir.path().join("catalog.redb"), 256).unwrap();

        let title = catalog.register_column("docs", "title").unwrap();
        let body = catalog.register_column("docs", "body").unwrap();
        let again = catalog.register_column("docs", "title").unwrap();

        assert_eq!(title, ColumnId(0));
        assert_eq!(body, ColumnId(1));
        assert_eq!(again, title);
    }

    #[test]
    fn test_column_ids_are_per_collection() {
        let dir = tempdir().unwrap();
        let catalog = RedbCatalog::open(dir.path().join("catalog.redb"), 256).unwrap();

        catalog.register_column("docs", "title").unwrap();
        let other = catalog.register_column("mail", "subject").unwrap();
        assert_eq!(other, ColumnId(0));

        assert_eq!(
            catalog.list_columns("docs").unwrap(),
            vec![("title".to_string(), ColumnId(0))]
        );
        assert!(catalog.column_id("docs", "subject").unwrap().is_none());
    }

    #[test]
    fn test_columns_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.redb");

        let catalog = RedbCatalog::open(&path, 256).unwrap();
        catalog.register_column("docs", "title").unwrap();
        catalog.register_column("docs", "body").unwrap();
        Box::new(catalog).close().unwrap();

        let catalog = RedbCatalog::open(&path, 256).unwrap();
        assert_eq!(
            catalog.column_id("docs", "body").unwrap(),
            Some(ColumnId(1))
        );
        assert_eq!(
            catalog.register_column("docs", "summary").unwrap(),
            ColumnId(2)
        );
    }

    #[test]
    fn test_register_rejects_bad_names() {
        let dir = tempdir().unwrap();
        let catalog = RedbCatalog::open(dir.path().join("catalog.redb"), 256).unwrap();

        assert!(catalog
            .register_column("no/slashes", "title")
            .unwrap_err()
            .is_validation());
        assert!(catalog.register_column("docs", "").unwrap_err().is_validation());
    }
}
