//! Page bookkeeping for one column.
//!
//! A column accumulates one page per flushed session. Writers append a
//! page and its page-index entry; readers search every page
//! independently and reduce the per-page hits into one answer.
//!
//! # Reduction
//!
//! ```text
//! page 0 ──► hit(score 0.80)  ┐
//! page 1 ──► hit(score 1.00)  ├─► sort by score ─► best = 1.00
//! page 2 ──► hit(score 0.995) ┘                    + offsets of 0.995
//!                                                    (>= identical angle)
//! ```
//!
//! The same token flushed by several sessions lives in several pages;
//! reduction folds their posting lists together without re-encoding.

mod sorted;
mod tree_reader;
mod writer;

pub use sorted::{SortedPageReader, SORTED_ENTRY_SIZE};
pub use tree_reader::TreePageReader;
pub use writer::ColumnWriter;

use std::cmp::Ordering;

use tracing::debug;

use crate::error::Result;
use crate::model::SimilarityModel;
use crate::vector::SparseVector;

/// Best match for a query within one or more pages.
#[derive(Clone, Debug, PartialEq)]
pub struct Hit {
    /// Cosine angle between the query and the matched vector.
    pub score: f64,
    /// Posting lists to union. Several offsets mean identical tokens from
    /// different pages.
    pub postings_offsets: Vec<u64>,
    /// The matched vector.
    pub vector: SparseVector,
}

/// Searches pages of one column without building trees.
pub trait NodeReader: Send + Sync {
    /// Best hit of every page, in page order. Pages without a hit are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` if any page is malformed.
    fn page_hits(&self, query: &SparseVector, model: &dyn SimilarityModel) -> Result<Vec<Hit>>;

    /// Number of pages.
    fn page_count(&self) -> usize;

    /// Reduced best hit across all pages.
    fn closest_match(
        &self,
        query: &SparseVector,
        model: &dyn SimilarityModel,
    ) -> Result<Option<Hit>> {
        Ok(reduce(self.page_hits(query, model)?, model.identical_angle()))
    }
}

/// Folds per-page hits into one.
///
/// The highest score wins; every other hit scoring at least
/// `identical_angle` contributes its postings offsets.
pub fn reduce(mut hits: Vec<Hit>, identical_angle: f64) -> Option<Hit> {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    let mut hits = hits.into_iter();
    let mut best = hits.next()?;

    for hit in hits {
        if hit.score < identical_angle {
            break;
        }
        for offset in hit.postings_offsets {
            if !best.postings_offsets.contains(&offset) {
                best.postings_offsets.push(offset);
            }
        }
    }

    debug!(
        score = best.score,
        postings = best.postings_offsets.len(),
        "Reduced page hits"
    );
    Some(best)
}
