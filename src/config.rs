//! Configuration types for FoldTree.
//!
//! The [`Config`] struct controls how a database handle reads and writes
//! its page streams:
//! - Read mode (memory-mapped or buffered)
//! - Durability of flushed pages
//! - Page format (tree pages or sorted-list pages)
//!
//! Vector width and similarity thresholds are not configured here; they
//! come from the [`SimilarityModel`](crate::model::SimilarityModel).
//!
//! # Example
//! ```rust
//! use foldtree::{Config, ReadMode, SyncMode};
//!
//! // Use defaults (mapped reads, tree pages)
//! let config = Config::default();
//!
//! // Customize for a write-heavy batch job
//! let config = Config {
//!     read_mode: ReadMode::Buffered,
//!     sync_mode: SyncMode::Paranoid,
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Database configuration options.
///
/// All fields have sensible defaults. Use struct update syntax to override
/// specific settings:
///
/// ```rust
/// use foldtree::Config;
///
/// let config = Config {
///     max_tokens_per_value: 512,
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// How page streams are loaded for reading.
    pub read_mode: ReadMode,

    /// Durability mode for flushed pages.
    pub sync_mode: SyncMode,

    /// Layout used for pages written by index sessions.
    pub page_format: PageFormat,

    /// Maximum number of tokens taken from a single value.
    ///
    /// Tokens past the limit are ignored.
    /// Default: 4096
    pub max_tokens_per_value: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_mode: ReadMode::Mapped,
            sync_mode: SyncMode::Normal,
            page_format: PageFormat::Tree,
            max_tokens_per_value: 4096,
        }
    }
}

impl Config {
    /// Creates a new Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a Config that writes sorted-list pages.
    ///
    /// # Example
    /// ```rust
    /// use foldtree::{Config, PageFormat};
    ///
    /// let config = Config::with_sorted_pages();
    /// assert_eq!(config.page_format, PageFormat::SortedList);
    /// ```
    pub fn with_sorted_pages() -> Self {
        Self {
            page_format: PageFormat::SortedList,
            ..Default::default()
        }
    }

    /// Validates the configuration.
    ///
    /// Called automatically by `FoldTreeDB::open()`.
    ///
    /// # Errors
    /// Returns `ValidationError` if `max_tokens_per_value` is 0.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_tokens_per_value == 0 {
            return Err(ValidationError::invalid_field(
                "max_tokens_per_value",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// How page streams are loaded for reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadMode {
    /// Memory-map each stream read-only. Views are cached by the database
    /// handle and remapped when a file grows.
    #[default]
    Mapped,

    /// Read each stream into an owned buffer.
    ///
    /// Use on filesystems where mapping is unavailable.
    Buffered,
}

impl ReadMode {
    /// Returns true if streams are memory-mapped.
    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped)
    }
}

/// Durability mode for flushed pages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Flush userspace buffers to the OS at the end of each page.
    #[default]
    Normal,

    /// Also fsync every stream after each page (slowest, maximum durability).
    Paranoid,
}

impl SyncMode {
    /// Returns true if this mode fsyncs after every page.
    pub fn is_paranoid(&self) -> bool {
        matches!(self, Self::Paranoid)
    }
}

/// Layout of the pages written by an index session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageFormat {
    /// Preorder node records, searchable by greedy descent.
    #[default]
    Tree,

    /// Node records sorted by their projection on the model's sorting
    /// vector, searchable by binary search.
    SortedList,
}
