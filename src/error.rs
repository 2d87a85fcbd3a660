//! Error types for FoldTree.
//!
//! FoldTree uses a hierarchical error system:
//! - `FoldTreeError` is the top-level error returned by all public APIs
//! - Specific error types (`StorageError`, `ValidationError`) provide detail
//!
//! # Error Handling Pattern
//! ```rust,ignore
//! use foldtree::{FoldTreeDB, BagOfCharsModel, Config, Result};
//!
//! fn example() -> Result<()> {
//!     let db = FoldTreeDB::open("./index", Config::default(), BagOfCharsModel::new())?;
//!     // ... operations that may fail ...
//!     db.close()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Result type alias for FoldTree operations.
pub type Result<T> = std::result::Result<T, FoldTreeError>;

/// Top-level error enum for all FoldTree operations.
///
/// This is the only error type returned by public APIs.
/// Use pattern matching to handle specific error cases.
#[derive(Debug, Error)]
pub enum FoldTreeError {
    /// Storage layer error (I/O, corruption, catalog transactions).
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Input validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration error.
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of what's wrong with the configuration.
        reason: String,
    },

    /// Requested entity not found.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document ids were merged into a node whose postings were already
    /// written to disk. The pending set no longer exists, so the ids would
    /// be lost.
    #[error("Cannot merge document ids into flushed node {node}")]
    MergeAfterFlush {
        /// Arena index of the flushed node.
        node: usize,
    },

    /// The write session has already been flushed and accepts no more input.
    #[error("Index session {0} is already flushed")]
    SessionFlushed(String),

    /// An earlier flush of this session failed part way. Its pages may be
    /// incomplete and the in-memory trees cannot be written again.
    #[error("Index session {session} failed to flush: {reason}")]
    FlushFailed {
        /// Session id.
        session: String,
        /// Error reported by the failed flush.
        reason: String,
    },

    /// Similarity model contract violation.
    #[error("Model error: {0}")]
    Model(String),

    /// A thread panicked while holding a lock.
    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl FoldTreeError {
    /// Creates a configuration error with the given reason.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Creates a model error with the given message.
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Returns true if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this error reports on-disk format corruption.
    pub fn is_corrupted(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Corrupted(_)))
    }

    /// Returns true if this is a merge into an already flushed node.
    pub fn is_merge_after_flush(&self) -> bool {
        matches!(self, Self::MergeAfterFlush { .. })
    }
}

/// Storage-related errors.
///
/// These errors indicate problems with page streams or the catalog.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Page data is inconsistent with its stream. The stack-based decoder
    /// cannot resynchronize, so the whole read is aborted.
    #[error("Index corrupted: {0}")]
    Corrupted(String),

    /// Another writer holds the collection's lock file.
    #[error("Collection '{0}' is locked by another writer")]
    CollectionLocked(String),

    /// Catalog transaction failed (commit, rollback, etc.).
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error from the redb storage engine.
    #[error("Storage engine error: {0}")]
    Redb(String),

    /// Catalog schema version doesn't match expected version.
    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version.
        expected: u32,
        /// Actual schema version found in the catalog.
        found: u32,
    },

    /// Table not found in the catalog.
    #[error("Table not found: {0}")]
    TableNotFound(String),
}

impl StorageError {
    /// Creates a corruption error with the given message.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Creates a transaction error with the given message.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// Creates a serialization error with the given message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates a redb error with the given message.
    pub fn redb(msg: impl Into<String>) -> Self {
        Self::Redb(msg.into())
    }
}

// Conversions from redb error types
impl From<redb::Error> for StorageError {
    fn from(err: redb::Error) -> Self {
        StorageError::Redb(err.to_string())
    }
}

impl From<redb::DatabaseError> for StorageError {
    fn from(err: redb::DatabaseError) -> Self {
        StorageError::Redb(err.to_string())
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::Transaction(err.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::Transaction(format!("Commit failed: {}", err))
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        StorageError::Redb(format!("Table error: {}", err))
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::Redb(format!("Storage error: {}", err))
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<redb::Error> for FoldTreeError {
    fn from(err: redb::Error) -> Self {
        FoldTreeError::Storage(StorageError::from(err))
    }
}

impl From<redb::DatabaseError> for FoldTreeError {
    fn from(err: redb::DatabaseError) -> Self {
        FoldTreeError::Storage(StorageError::from(err))
    }
}

impl From<redb::TransactionError> for FoldTreeError {
    fn from(err: redb::TransactionError) -> Self {
        FoldTreeError::Storage(StorageError::from(err))
    }
}

impl From<redb::CommitError> for FoldTreeError {
    fn from(err: redb::CommitError) -> Self {
        FoldTreeError::Storage(StorageError::from(err))
    }
}

impl From<redb::TableError> for FoldTreeError {
    fn from(err: redb::TableError) -> Self {
        FoldTreeError::Storage(StorageError::from(err))
    }
}

impl From<redb::StorageError> for FoldTreeError {
    fn from(err: redb::StorageError) -> Self {
        FoldTreeError::Storage(StorageError::from(err))
    }
}

impl From<bincode::Error> for FoldTreeError {
    fn from(err: bincode::Error) -> Self {
        FoldTreeError::Storage(StorageError::from(err))
    }
}

/// Validation errors for input data.
///
/// These errors indicate problems with data provided by the caller.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Vector width doesn't match the model's or the catalog's width.
    #[error("Vector width mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected width.
        expected: usize,
        /// Actual width provided.
        got: usize,
    },

    /// A field has an invalid value.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the invalid field.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// A vector component index lies outside `[0, width)`.
    #[error("Component index {index} out of range for width {width}")]
    ComponentOutOfRange {
        /// Offending component index.
        index: u32,
        /// Declared vector width.
        width: u32,
    },

    /// The same component index appeared twice in one vector.
    #[error("Duplicate component index {0}")]
    DuplicateComponent(u32),

    /// A required field is missing or empty.
    #[error("Required field missing: {field}")]
    RequiredField {
        /// Name of the missing field.
        field: String,
    },
}

impl ValidationError {
    /// Creates a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        Self::DimensionMismatch { expected, got }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a required field error.
    pub fn required_field(field: impl Into<String>) -> Self {
        Self::RequiredField {
            field: field.into(),
        }
    }
}

/// Not found errors for specific entity types.
#[derive(Debug, Error)]
pub enum NotFoundError {
    /// Column with given name not registered in the collection.
    #[error("Column not found: {0}")]
    Column(String),

    /// Node id outside the tree's arena.
    #[error("Node not found: {0}")]
    Node(usize),
}

impl NotFoundError {
    /// Creates a column not found error.
    pub fn column(name: impl ToString) -> Self {
        Self::Column(name.to_string())
    }

    /// Creates a node not found error.
    pub fn node(id: usize) -> Self {
        Self::Node(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FoldTreeError::config("Invalid read mode");
        assert_eq!(err.to_string(), "Configuration error: Invalid read mode");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::SchemaVersionMismatch {
            expected: 2,
            found: 1,
        };
        assert_eq!(
            err.to_string(),
            "Schema version mismatch: expected 2, found 1"
        );
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::dimension_mismatch(256, 512);
        assert_eq!(err.to_string(), "Vector width mismatch: expected 256, got 512");

        let err = ValidationError::ComponentOutOfRange {
            index: 300,
            width: 256,
        };
        assert_eq!(
            err.to_string(),
            "Component index 300 out of range for width 256"
        );
    }

    #[test]
    fn test_not_found_error_display() {
        let err = NotFoundError::column("title");
        assert_eq!(err.to_string(), "Column not found: title");
    }

    #[test]
    fn test_is_not_found() {
        let err: FoldTreeError = NotFoundError::column("body").into();
        assert!(err.is_not_found());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_is_corrupted() {
        let err: FoldTreeError = StorageError::corrupted("truncated record").into();
        assert!(err.is_corrupted());
        assert!(err.is_storage());
        assert!(!err.is_merge_after_flush());
    }

    #[test]
    fn test_merge_after_flush_display() {
        let err = FoldTreeError::MergeAfterFlush { node: 7 };
        assert_eq!(
            err.to_string(),
            "Cannot merge document ids into flushed node 7"
        );
        assert!(err.is_merge_after_flush());
    }

    #[test]
    fn test_error_conversion_chain() {
        fn inner() -> Result<()> {
            Err(StorageError::corrupted("test corruption"))?
        }

        let result = inner();
        assert!(result.is_err());
        assert!(result.unwrap_err().is_storage());
    }
}
