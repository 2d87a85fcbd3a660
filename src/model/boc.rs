//! Bag-of-characters reference model.
//!
//! Each token is a run of letters; its vector counts how often each
//! (lowercased) character occurs. Cheap, deterministic, and good enough to
//! fold spelling variants ("index", "indexes") close to each other.

use crate::error::Result;
use crate::vector::SparseVector;

use super::SimilarityModel;

/// Tokens this long or longer are dropped (hashes, base64 blobs, ...).
const MAX_TOKEN_CHARS: usize = 20;

/// Reference tokenizer and thresholds.
///
/// - width 256 (one component per Latin-1 code point)
/// - identical angle 0.99
/// - fold angle 0.49
#[derive(Clone, Debug)]
pub struct BagOfCharsModel {
    sorting_vector: SparseVector,
}

impl BagOfCharsModel {
    /// Vector width of this model.
    pub const WIDTH: u32 = 256;

    /// Identical-token threshold.
    pub const IDENTICAL_ANGLE: f64 = 0.99;

    /// Left/right threshold.
    pub const FOLD_ANGLE: f64 = 0.49;

    /// Creates the model.
    pub fn new() -> Self {
        let indices: Vec<u32> = (0..Self::WIDTH).collect();
        let values: Vec<f32> = (0..Self::WIDTH)
            .map(|i| (i + 1) as f32 / Self::WIDTH as f32)
            .collect();
        Self {
            sorting_vector: SparseVector::from_sorted_parts(Self::WIDTH, indices, values),
        }
    }

    fn finish_token(
        text: &str,
        start: usize,
        end: usize,
        acc: &mut Option<SparseVector>,
        out: &mut Vec<SparseVector>,
    ) {
        if let Some(vector) = acc.take() {
            let token = &text[start..end];
            if !vector.is_empty() && token.chars().count() < MAX_TOKEN_CHARS {
                out.push(vector.with_label(token));
            }
        }
    }
}

impl Default for BagOfCharsModel {
    fn default() -> Self {
        Self::new()
    }
}

impl SimilarityModel for BagOfCharsModel {
    fn vector_width(&self) -> u32 {
        Self::WIDTH
    }

    fn identical_angle(&self) -> f64 {
        Self::IDENTICAL_ANGLE
    }

    fn fold_angle(&self) -> f64 {
        Self::FOLD_ANGLE
    }

    fn sorting_vector(&self) -> &SparseVector {
        &self.sorting_vector
    }

    fn tokenize(&self, text: &str) -> Result<Vec<SparseVector>> {
        let mut tokens = Vec::new();
        let mut acc: Option<SparseVector> = None;
        let mut start = 0;

        for (pos, ch) in text.char_indices() {
            let lower = ch.to_lowercase().next().unwrap_or(ch);
            let code = lower as u32;

            if lower.is_alphabetic() && code < Self::WIDTH {
                let vector = acc.get_or_insert_with(|| {
                    SparseVector::from_sorted_parts(Self::WIDTH, Vec::new(), Vec::new())
                });
                vector.add_to_component(code, 1.0)?;
            } else {
                Self::finish_token(text, start, pos, &mut acc, &mut tokens);
                start = pos + ch.len_utf8();
            }
        }
        Self::finish_token(text, start, text.len(), &mut acc, &mut tokens);

        Ok(tokens)
    }
}
