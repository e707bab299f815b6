//! Embedding and similarity engine
//!
//! Produces fixed-length vectors for semantic-tier content and scores
//! candidate similarity. The engine is embedding-model-agnostic behind the
//! [`TextEmbedder`] trait; the bundled [`HashEmbedder`] derives vectors
//! from a content hash so results are reproducible without an ML runtime.

use crate::error::{EngramError, Result};
use crate::ranking::fnv1a64;

/// Fixed vector length for semantic-tier embeddings.
pub const EMBEDDING_DIM: usize = 768;

/// Pluggable text-to-vector seam.
///
/// Implementations must be deterministic (identical text yields an
/// identical vector) and all-or-nothing: either the full vector of
/// `dimension()` length is returned or the call fails.
pub trait TextEmbedder: Send + Sync {
    /// Produce an embedding for `text`.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// The fixed vector length this embedder produces.
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Deterministic hash-derived embedder.
///
/// Seeds a splitmix-style generator from an FNV-1a hash of the input and
/// expands it to `dimension` values in `[-1, 1]`. Stands in for a real
/// embedding model; nothing downstream depends on its geometry beyond
/// determinism and dimensionality.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: EMBEDDING_DIM,
        }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl TextEmbedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.dimension == 0 {
            return Err(EngramError::Embedding(
                "embedder configured with zero dimension".to_string(),
            ));
        }

        let seed = fnv1a64(text.as_bytes());
        let vector: Vec<f32> = (0..self.dimension)
            .map(|i| {
                let mixed = splitmix64(seed.wrapping_add((i as u64).wrapping_mul(GOLDEN_GAMMA)));
                // Map the top 24 bits onto [-1, 1]
                let unit = (mixed >> 40) as f32 / (1u64 << 24) as f32;
                unit * 2.0 - 1.0
            })
            .collect();

        if vector.len() != self.dimension {
            return Err(EngramError::Embedding(format!(
                "partial embedding: expected {} values, got {}",
                self.dimension,
                vector.len()
            )));
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(GOLDEN_GAMMA);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// Validate that a caller-supplied vector has the expected length.
/// Runs before any persistence or search call.
pub fn validate_embedding(vector: &[f32], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(EngramError::Validation(format!(
            "embedding must have length {dimension}, got {}",
            vector.len()
        )));
    }
    Ok(())
}

/// Standard cosine similarity in `[-1, 1]`.
///
/// Returns `0.0` when either vector has zero magnitude or the lengths do
/// not match; never divides by zero, never raises.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}
