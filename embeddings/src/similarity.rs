//! Cosine similarity and the duplicate rule built on it.

use crate::error::{EmbeddingError, Result};

/// Default threshold at or above which two texts count as duplicates.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.8;

/// Cosine of the angle between `a` and `b`, in `-1.0..=1.0`.
///
/// A zero vector has no direction and scores 0 against anything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });
    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        Ok(0.0)
    } else {
        Ok(dot / denominator)
    }
}

/// Classifies pairs of embeddings as "different" or "duplicate".
///
/// Two embeddings are different iff their cosine similarity is strictly
/// below the threshold; a similarity equal to the threshold is a duplicate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityChecker {
    threshold: f32,
}

impl SimilarityChecker {
    /// Create a checker with the given threshold in `0.0..=1.0`.
    pub fn new(threshold: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(EmbeddingError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Whether `a` and `b` are different enough to both be kept.
    pub fn are_different(&self, a: &[f32], b: &[f32]) -> Result<bool> {
        Ok(cosine_similarity(a, b)? < self.threshold)
    }

    /// Whether `candidate` is different from every embedding in `others`.
    ///
    /// Vacuously true for an empty list.
    pub fn is_different_from_all<E>(&self, candidate: &[f32], others: &[E]) -> Result<bool>
    where
        E: AsRef<[f32]>,
    {
        for other in others {
            if !self.are_different(candidate, other.as_ref())? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Default for SimilarityChecker {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}
