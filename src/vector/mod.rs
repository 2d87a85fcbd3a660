//! Sparse embedding vectors.
//!
//! A [`SparseVector`] is an ordered list of `(component_index, weight)`
//! pairs with a declared width. Tokenizers emit one vector per token, the
//! index compares them by cosine angle and never looks at components
//! directly.
//!
//! # On-disk form
//!
//! ```text
//! ┌────────────────────────────┬────────────────────────────┐
//! │ indices: u32 LE × count    │ weights: f32 LE × count    │
//! └────────────────────────────┴────────────────────────────┘
//! ```
//!
//! The count is not part of the vector bytes; node records carry it
//! alongside the vector offset. See [`codec`].

pub mod codec;

use std::fmt;

use crate::error::ValidationError;

/// Sparse vector with a fixed declared width.
///
/// Component indices are strictly increasing and lie in `[0, width)`.
/// The optional label holds the token text the vector was built from and
/// is used only for diagnostics.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseVector {
    width: u32,
    indices: Vec<u32>,
    values: Vec<f32>,
    label: Option<String>,
}

impl SparseVector {
    /// Builds a vector from `(index, weight)` pairs in any order.
    ///
    /// # Errors
    ///
    /// Returns `ComponentOutOfRange` for an index `>= width` and
    /// `DuplicateComponent` when an index appears twice.
    pub fn new(
        width: u32,
        components: impl IntoIterator<Item = (u32, f32)>,
    ) -> Result<Self, ValidationError> {
        let mut pairs: Vec<(u32, f32)> = components.into_iter().collect();
        pairs.sort_by_key(|(index, _)| *index);

        let mut indices = Vec::with_capacity(pairs.len());
        let mut values = Vec::with_capacity(pairs.len());

        for (index, value) in pairs {
            if index >= width {
                return Err(ValidationError::ComponentOutOfRange { index, width });
            }
            if indices.last() == Some(&index) {
                return Err(ValidationError::DuplicateComponent(index));
            }
            indices.push(index);
            values.push(value);
        }

        Ok(Self {
            width,
            indices,
            values,
            label: None,
        })
    }

    /// Builds a vector from a dense slice, dropping zero components.
    ///
    /// The width is the slice length.
    pub fn from_dense(values: &[f32]) -> Self {
        let mut indices = Vec::new();
        let mut kept = Vec::new();
        for (i, &v) in values.iter().enumerate() {
            if v != 0.0 {
                indices.push(i as u32);
                kept.push(v);
            }
        }
        Self {
            width: values.len() as u32,
            indices,
            values: kept,
            label: None,
        }
    }

    /// Builds a vector from parts already known to be sorted and in range.
    pub(crate) fn from_sorted_parts(width: u32, indices: Vec<u32>, values: Vec<f32>) -> Self {
        debug_assert_eq!(indices.len(), values.len());
        Self {
            width,
            indices,
            values,
            label: None,
        }
    }

    /// Attaches the source text this vector was built from.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Declared width (dimensionality).
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Number of stored (non-zero) components.
    #[inline]
    pub fn component_count(&self) -> usize {
        self.indices.len()
    }

    /// Returns true if the vector has no stored components.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Component indices in ascending order.
    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Component weights, parallel to [`indices`](Self::indices).
    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// The source text, if one was attached.
    #[inline]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Iterates `(index, weight)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Dot product via a merge walk over both index lists.
    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0f64;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] as f64 * other.values[j] as f64;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    /// Euclidean (L2) norm.
    pub fn norm(&self) -> f64 {
        self.values
            .iter()
            .map(|&v| v as f64 * v as f64)
            .sum::<f64>()
            .sqrt()
    }

    /// Cosine of the angle between two vectors.
    ///
    /// Returns 0.0 when either vector has zero norm, so an empty vector is
    /// never "identical" to anything.
    pub fn cos_angle(&self, other: &SparseVector) -> f64 {
        let denom = self.norm() * other.norm();
        if denom == 0.0 {
            return 0.0;
        }
        self.dot(other) / denom
    }

    /// Adds `weight` to component `index`, inserting it if absent.
    ///
    /// Used by tokenizers while accumulating a token.
    pub fn add_to_component(&mut self, index: u32, weight: f32) -> Result<(), ValidationError> {
        if index >= self.width {
            return Err(ValidationError::ComponentOutOfRange {
                index,
                width: self.width,
            });
        }
        match self.indices.binary_search(&index) {
            Ok(pos) => self.values[pos] += weight,
            Err(pos) => {
                self.indices.insert(pos, index);
                self.values.insert(pos, weight);
            }
        }
        Ok(())
    }
}

impl fmt::Display for SparseVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{}", label),
            None => write!(f, "<{} components>", self.indices.len()),
        }
    }
}
