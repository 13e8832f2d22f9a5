pub mod cache;
pub mod hash;

use crate::error::{AimemError, Result};

/// Number of dimensions in the embedding vectors.
pub const EMBEDDING_DIM: usize = 384;

/// Trait for embedding text into unit-length vectors.
///
/// Implementations produce L2-normalized vectors of exactly
/// [`EMBEDDING_DIM`] dimensions. All methods are synchronous — callers in
/// async contexts should use `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string. Empty input is an `Embedding` error.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings, preserving input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }

    /// Cache hit/miss counters, if this provider caches.
    fn cache_stats(&self) -> Option<cache::CacheStats> {
        None
    }
}

/// Create an embedding provider from config.
///
/// `"hash-384"` selects the built-in deterministic fallback. An externally
/// supplied model plugs in behind [`EmbeddingProvider`]; nothing else in the
/// engine cares which variant is active.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Box<dyn EmbeddingProvider>> {
    match config.model.as_str() {
        "hash-384" => Ok(Box::new(cache::CachedProvider::new(
            hash::HashEmbeddingProvider::new(EMBEDDING_DIM),
            config.cache_size,
        ))),
        other => Err(AimemError::Embedding(format!(
            "unknown embedding model: {other}. Supported: hash-384"
        ))),
    }
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 on length mismatch or when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// L2-normalize a vector in place. A zero vector is left unchanged.
pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
