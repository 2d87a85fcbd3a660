//! # FoldTree
//!
//! Embedded similarity index: tokens become sparse vectors, vectors are
//! folded into binary trees by cosine angle, and trees are persisted as
//! append-only pages.
//!
//! FoldTree answers "which stored token is closest to this one, and which
//! documents contain it?" without an exact-match dictionary. Near-identical
//! tokens share one node and one posting list.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use foldtree::{BagOfCharsModel, Config, FoldTreeDB};
//!
//! // Open or create an index directory
//! let db = FoldTreeDB::open("./index", Config::default(), BagOfCharsModel::new())?;
//!
//! // Index some documents
//! let session = db.index_session("pets")?;
//! session.put(1, "name", "cat")?;
//! session.put(2, "name", "cats")?;
//! session.put(3, "name", "dog")?;
//! session.flush()?;
//! drop(session);
//!
//! // Look up a token
//! let reader = db.read_session("pets")?;
//! for term in reader.search("name", "cat")? {
//!     if let Some(hit) = term.hit {
//!         println!("{}: {:?}", term.token, reader.resolve(&hit)?);
//!     }
//! }
//!
//! db.close()?;
//! ```
//!
//! ## Key Concepts
//!
//! ### Collection and column
//!
//! A **collection** groups documents; every field of a collection is a
//! **column** with its own tree pages. Vectors and posting lists are
//! shared by all columns of a collection.
//!
//! ### Page
//!
//! Each [`IndexSession`] flush appends one **page** per touched column.
//! Pages are immutable; a [`ReadSession`] searches all of them and merges
//! their best hits.
//!
//! ### Similarity model
//!
//! A [`SimilarityModel`] turns text into vectors and decides when two
//! vectors are the same token (`identical_angle`) and which way to branch
//! (`fold_angle`).
//!
//! ## Thread Safety
//!
//! `FoldTreeDB` is `Send + Sync`. Index sessions accept concurrent puts;
//! one index session per collection may exist at a time, enforced with an
//! advisory file lock.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============================================================================
// Module declarations
// ============================================================================

mod config;
mod db;
mod error;
mod postings;
mod session;
mod types;

pub mod column;
pub mod graph;
pub mod model;
pub mod storage;

/// Sparse vectors and their on-disk encoding.
pub mod vector;

// ============================================================================
// Public API re-exports
// ============================================================================

// Main database interface
pub use db::FoldTreeDB;

// Configuration
pub use config::{Config, PageFormat, ReadMode, SyncMode};

// Error handling
pub use error::{FoldTreeError, NotFoundError, Result, StorageError, ValidationError};

// Core types
pub use types::{ColumnId, DocId, SessionId, Timestamp};

// Vectors and models
pub use model::{BagOfCharsModel, ExternalModel, SimilarityModel};
pub use vector::SparseVector;

// Trees
pub use graph::{ColumnTree, InsertOutcome, NodeId, Postings, Side, TreeHit};

// Sessions
pub use session::{FlushReport, GraphInfo, IndexInfo, IndexSession, PageReport, ReadSession, TermHit};

// Reading
pub use column::{Hit, NodeReader};
pub use postings::PostingsReader;

// Storage (for advanced users)
pub use storage::CatalogMetadata;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common FoldTree usage.
///
/// ```rust
/// use foldtree::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{Config, PageFormat, ReadMode};
    pub use crate::db::FoldTreeDB;
    pub use crate::error::{FoldTreeError, Result};
    pub use crate::model::{BagOfCharsModel, SimilarityModel};
    pub use crate::session::{IndexSession, ReadSession};
    pub use crate::types::{ColumnId, DocId};
    pub use crate::vector::SparseVector;
}
