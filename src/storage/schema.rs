//! Catalog schema definitions, versioning and the on-disk file layout.
//!
//! The catalog is a small redb database next to the page streams. It holds
//! database-wide metadata and the registry that maps `(collection, field)`
//! to the numeric column id used in stream file names.
//!
//! # Schema Versioning
//!
//! The schema version is stored in the metadata table. When opening an
//! existing catalog, we check the version and fail if it doesn't match.
//!
//! # Table Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ METADATA_TABLE                                               │
//! │   Key: &str                                                  │
//! │   Value: &[u8] (bincode)                                     │
//! │   Entries: "catalog_metadata" -> CatalogMetadata             │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ COLUMNS_TABLE                                                │
//! │   Key: (&str, &str) (collection, field)                      │
//! │   Value: u64 (ColumnId)                                      │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ NEXT_COLUMN_TABLE                                            │
//! │   Key: &str (collection)                                     │
//! │   Value: u64 (next ColumnId to hand out)                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # File Layout
//!
//! For a collection `c` in the database directory:
//!
//! ```text
//! catalog.redb        catalog
//! c.vec  c.pos        shared vector and postings streams
//! c.<id>.ix  .ixp     tree pages and their page index
//! c.<id>.sl  .slp     sorted-list pages and their page index
//! c.lock              writer lock
//! ```

use std::path::{Path, PathBuf};

use redb::TableDefinition;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::{ColumnId, Timestamp};

/// Current schema version.
///
/// Increment this when making breaking changes to the catalog or the page
/// formats. The database will refuse to open if versions don't match.
pub const SCHEMA_VERSION: u32 = 1;

/// Maximum length of collection and field names in bytes.
pub const MAX_NAME_LENGTH: usize = 128;

/// File name of the catalog inside the database directory.
pub const CATALOG_FILE: &str = "catalog.redb";

// ============================================================================
// Table Definitions
// ============================================================================

/// Metadata table for database-level information.
pub const METADATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

/// Column registry.
///
/// Key: (collection, field)
/// Value: ColumnId
pub const COLUMNS_TABLE: TableDefinition<(&str, &str), u64> = TableDefinition::new("columns");

/// Per-collection column id counter.
pub const NEXT_COLUMN_TABLE: TableDefinition<&str, u64> = TableDefinition::new("next_column");

// ============================================================================
// Catalog Metadata
// ============================================================================

/// Catalog metadata stored in the metadata table.
///
/// This is serialized with bincode and stored under the key
/// "catalog_metadata".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogMetadata {
    /// Schema version for compatibility checking.
    pub schema_version: u32,

    /// Vector width of the model the database was created with.
    ///
    /// Once set, this cannot be changed without recreating the database.
    pub vector_width: u32,

    /// Timestamp when the database was created.
    pub created_at: Timestamp,

    /// Last time the database was opened (updated on each open).
    pub last_opened_at: Timestamp,
}

impl CatalogMetadata {
    /// Creates new metadata for a fresh database.
    pub fn new(vector_width: u32) -> Self {
        let now = Timestamp::now();
        Self {
            schema_version: SCHEMA_VERSION,
            vector_width,
            created_at: now,
            last_opened_at: now,
        }
    }

    /// Updates the last_opened_at timestamp.
    pub fn touch(&mut self) {
        self.last_opened_at = Timestamp::now();
    }

    /// Checks if this metadata is compatible with the current schema.
    pub fn is_compatible(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }
}

// ============================================================================
// Name Validation
// ============================================================================

fn validate_name(field: &str, name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::required_field(field));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::invalid_field(
            field,
            format!("must not exceed {} bytes", MAX_NAME_LENGTH),
        ));
    }
    Ok(())
}

/// Validates a collection name.
///
/// Collection names become file name prefixes, so only ASCII letters,
/// digits, `_` and `-` are allowed.
pub fn validate_collection_name(name: &str) -> Result<(), ValidationError> {
    validate_name("collection", name)?;
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(ValidationError::invalid_field(
            "collection",
            "only [A-Za-z0-9_-] are allowed",
        ));
    }
    Ok(())
}

/// Validates a field name.
pub fn validate_field_name(name: &str) -> Result<(), ValidationError> {
    validate_name("field", name)
}

// ============================================================================
// File Layout
// ============================================================================

/// Stream files shared by every column of a collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionFiles {
    /// Vector byte stream.
    pub vectors: PathBuf,
    /// Postings byte stream.
    pub postings: PathBuf,
    /// Writer lock file.
    pub lock: PathBuf,
}

impl CollectionFiles {
    /// Paths for `collection` inside `dir`.
    pub fn new(dir: &Path, collection: &str) -> Self {
        Self {
            vectors: dir.join(format!("{}.vec", collection)),
            postings: dir.join(format!("{}.pos", collection)),
            lock: dir.join(format!("{}.lock", collection)),
        }
    }
}

/// Page files of one column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnFiles {
    /// Tree-page node records.
    pub tree_pages: PathBuf,
    /// Tree page index.
    pub tree_index: PathBuf,
    /// Sorted-list page records and keys.
    pub sorted_pages: PathBuf,
    /// Sorted-list page index.
    pub sorted_index: PathBuf,
}

impl ColumnFiles {
    /// Paths for `column` of `collection` inside `dir`.
    pub fn new(dir: &Path, collection: &str, column: ColumnId) -> Self {
        let base = format!("{}.{}", collection, column);
        Self {
            tree_pages: dir.join(format!("{}.ix", base)),
            tree_index: dir.join(format!("{}.ixp", base)),
            sorted_pages: dir.join(format!("{}.sl", base)),
            sorted_index: dir.join(format!("{}.slp", base)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_version() {
        assert_eq!(SCHEMA_VERSION, 1);
    }

    #[test]
    fn test_catalog_metadata_new() {
        let meta = CatalogMetadata::new(256);
        assert_eq!(meta.schema_version, SCHEMA_VERSION);
        assert_eq!(meta.vector_width, 256);
        assert!(meta.is_compatible());
    }

    #[test]
    fn test_catalog_metadata_touch() {
        let mut meta = CatalogMetadata::new(256);
        let original = meta.last_opened_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        meta.touch();
        assert!(meta.last_opened_at > original);
    }

    #[test]
    fn test_catalog_metadata_serialization() {
        let meta = CatalogMetadata::new(512);
        let bytes = bincode::serialize(&meta).unwrap();
        let restored: CatalogMetadata = bincode::deserialize(&bytes).unwrap();
        assert_eq!(meta.schema_version, restored.schema_version);
        assert_eq!(meta.vector_width, restored.vector_width);
    }

    #[test]
    fn test_collection_name_validation() {
        assert!(validate_collection_name("docs_v2-en").is_ok());
        assert!(matches!(
            validate_collection_name(""),
            Err(ValidationError::RequiredField { .. })
        ));
        assert!(validate_collection_name("../etc").is_err());
        assert!(validate_collection_name("a b").is_err());
        assert!(validate_collection_name(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_field_name_validation() {
        assert!(validate_field_name("title").is_ok());
        assert!(validate_field_name("body text / ü").is_ok());
        assert!(validate_field_name("").is_err());
        assert!(validate_field_name(&"x".repeat(200)).is_err());
    }

    #[test]
    fn test_file_layout() {
        let dir = Path::new("/data");
        let files = CollectionFiles::new(dir, "docs");
        assert_eq!(files.vectors, Path::new("/data/docs.vec"));
        assert_eq!(files.postings, Path::new("/data/docs.pos"));
        assert_eq!(files.lock, Path::new("/data/docs.lock"));

        let column = ColumnFiles::new(dir, "docs", ColumnId(3));
        assert_eq!(column.tree_pages, Path::new("/data/docs.3.ix"));
        assert_eq!(column.tree_index, Path::new("/data/docs.3.ixp"));
        assert_eq!(column.sorted_pages, Path::new("/data/docs.3.sl"));
        assert_eq!(column.sorted_index, Path::new("/data/docs.3.slp"));
    }
}
