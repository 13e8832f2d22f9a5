//! Core memory engine — store, retrieval pipeline, budget engine, cleanup.
//!
//! The write path lives in [`store`], ranking and auto-expansion in
//! [`retrieve`], response packing in [`budget`], and eviction sweeps in
//! [`cleanup`]. Shared type definitions live in [`types`].

pub mod budget;
pub mod cleanup;
pub mod retrieve;
pub mod store;
pub mod types;

/// Serialize an f32 embedding as little-endian bytes for BLOB storage.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Deserialize a little-endian BLOB back into an f32 embedding.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().expect("4-byte chunk")))
        .collect()
}
