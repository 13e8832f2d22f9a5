//! Deterministic hash-based fallback embedding model.
//!
//! Used when no external model is configured. Identical inputs produce
//! identical vectors and unrelated inputs land near-orthogonal, which is
//! enough for exact/near-duplicate retrieval and deterministic tests. It does
//! not cluster semantically.

use sha2::{Digest, Sha256};

use super::{l2_normalize, EmbeddingProvider};
use crate::error::{AimemError, Result};

pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let hash = Sha256::digest(text.as_bytes());
        let bytes = text.as_bytes();

        let mut embedding = vec![0.0f32; self.dimensions];
        for (i, slot) in embedding.iter_mut().enumerate() {
            let mut feature = f32::from(hash[i % 32]) / 255.0;
            if !bytes.is_empty() {
                let ch = f32::from(bytes[i % bytes.len()]) / 255.0;
                feature = (feature + ch) / 2.0;
            }
            // Recenter [0,1] to [-1,1]
            *slot = (feature - 0.5) * 2.0;
        }

        l2_normalize(&mut embedding);
        embedding
    }
}

impl EmbeddingProvider for HashEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(AimemError::Embedding("content cannot be empty".into()));
        }
        Ok(self.encode(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
