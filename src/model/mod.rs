//! Similarity model abstractions for FoldTree.
//!
//! The index never interprets vector components. Everything it needs to
//! place and find a token comes from a [`SimilarityModel`]:
//!
//! - `cos_angle` scores two vectors
//! - `identical_angle` is the score at or above which two vectors are the
//!   same token (their postings merge)
//! - `fold_angle` decides left (above) versus right (at or below) descent
//! - `sorting_vector` projects a vector to a scalar for sorted-list pages
//!
//! # Providers
//!
//! - [`ExternalModel`] - thresholds only; callers supply their own vectors
//! - [`BagOfCharsModel`] - reference tokenizer over lowercase letters
//!
//! # Example
//!
//! ```rust
//! use foldtree::model::{ExternalModel, SimilarityModel};
//!
//! let model = ExternalModel::new(3, 0.99, 0.5);
//! assert_eq!(model.vector_width(), 3);
//! assert!(model.tokenize("hello").is_err());
//! ```

mod boc;

pub use boc::BagOfCharsModel;

use crate::error::{FoldTreeError, Result, ValidationError};
use crate::vector::SparseVector;

/// Similarity model contract consumed by the index.
///
/// Implementations must be thread-safe (`Send + Sync`); one model instance
/// is shared by every session of a database handle.
pub trait SimilarityModel: Send + Sync {
    /// Width every vector of this model is declared with.
    fn vector_width(&self) -> u32;

    /// Score at or above which two vectors are considered the same token.
    fn identical_angle(&self) -> f64;

    /// Score above which descent goes left; at or below, right.
    fn fold_angle(&self) -> f64;

    /// Fixed reference vector used for scalar projection.
    fn sorting_vector(&self) -> &SparseVector;

    /// Splits text into one vector per token.
    ///
    /// # Errors
    ///
    /// Returns `FoldTreeError::Model` if the model cannot tokenize.
    fn tokenize(&self, text: &str) -> Result<Vec<SparseVector>>;

    /// Cosine angle between two vectors.
    fn cos_angle(&self, a: &SparseVector, b: &SparseVector) -> f64 {
        a.cos_angle(b)
    }

    /// Validates that a vector was built for this model's width.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DimensionMismatch` if widths differ.
    fn validate_vector(&self, vector: &SparseVector) -> Result<()> {
        let expected = self.vector_width();
        if vector.width() != expected {
            return Err(FoldTreeError::Validation(
                ValidationError::dimension_mismatch(expected as usize, vector.width() as usize),
            ));
        }
        Ok(())
    }
}

/// Model for vectors produced outside the index.
///
/// Holds the width and calibration thresholds of an external embedding
/// service. It validates widths but cannot tokenize: use
/// [`IndexSession::put_vectors`](crate::IndexSession::put_vectors) with it.
#[derive(Clone, Debug)]
pub struct ExternalModel {
    width: u32,
    identical_angle: f64,
    fold_angle: f64,
    sorting_vector: SparseVector,
}

impl ExternalModel {
    /// Creates an external model.
    ///
    /// The default sorting vector weights component `i` by `i + 1`, which
    /// spreads projections of vectors with disjoint supports.
    pub fn new(width: u32, identical_angle: f64, fold_angle: f64) -> Self {
        let indices: Vec<u32> = (0..width).collect();
        let values: Vec<f32> = (1..=width).map(|i| i as f32).collect();
        Self {
            width,
            identical_angle,
            fold_angle,
            sorting_vector: SparseVector::from_sorted_parts(width, indices, values),
        }
    }

    /// Replaces the sorting vector.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the vector's width differs.
    pub fn with_sorting_vector(mut self, sorting_vector: SparseVector) -> Result<Self> {
        self.validate_vector(&sorting_vector)?;
        self.sorting_vector = sorting_vector;
        Ok(self)
    }
}

impl SimilarityModel for ExternalModel {
    fn vector_width(&self) -> u32 {
        self.width
    }

    fn identical_angle(&self) -> f64 {
        self.identical_angle
    }

    fn fold_angle(&self) -> f64 {
        self.fold_angle
    }

    fn sorting_vector(&self) -> &SparseVector {
        &self.sorting_vector
    }

    fn tokenize(&self, _text: &str) -> Result<Vec<SparseVector>> {
        Err(FoldTreeError::model(
            "External model: vectors must be provided by the caller",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_model_thresholds() {
        let model = ExternalModel::new(8, 0.95, 0.4);
        assert_eq!(model.vector_width(), 8);
        assert_eq!(model.identical_angle(), 0.95);
        assert_eq!(model.fold_angle(), 0.4);
        assert_eq!(model.sorting_vector().component_count(), 8);
    }

    #[test]
    fn test_external_model_tokenize_returns_error() {
        let model = ExternalModel::new(8, 0.95, 0.4);
        let err = model.tokenize("hello world").unwrap_err();
        assert!(matches!(err, FoldTreeError::Model(_)));
    }

    #[test]
    fn test_validate_vector_wrong_width() {
        let model = ExternalModel::new(8, 0.95, 0.4);
        let v = SparseVector::new(16, [(1, 1.0)]).unwrap();
        assert!(model.validate_vector(&v).unwrap_err().is_validation());

        let v = SparseVector::new(8, [(1, 1.0)]).unwrap();
        assert!(model.validate_vector(&v).is_ok());
    }

    #[test]
    fn test_with_sorting_vector() {
        let sorting = SparseVector::new(4, [(0, 1.0)]).unwrap();
        let model = ExternalModel::new(4, 0.99, 0.5)
            .with_sorting_vector(sorting.clone())
            .unwrap();
        assert_eq!(model.sorting_vector(), &sorting);

        let wrong = SparseVector::new(5, [(0, 1.0)]).unwrap();
        assert!(ExternalModel::new(4, 0.99, 0.5)
            .with_sorting_vector(wrong)
            .is_err());
    }
}
