#![allow(dead_code)]

use aimem::db;
use aimem::embedding::hash::HashEmbeddingProvider;
use aimem::embedding::{EmbeddingProvider, EMBEDDING_DIM};
use aimem::memory::store::{self, now_rfc3339};
use aimem::memory::types::{ContextChunk, Importance};
use rusqlite::Connection;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// The deterministic fallback embedding provider used across tests.
pub fn test_provider() -> HashEmbeddingProvider {
    HashEmbeddingProvider::new(EMBEDDING_DIM)
}

/// A unit vector with a spike at `dim` — distinct dims are orthogonal.
pub fn spike(dim: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[dim % EMBEDDING_DIM] = 1.0;
    v
}

/// Insert a chunk with explicit fields; embeds the content when no embedding
/// is supplied.
pub fn insert_chunk(
    conn: &Connection,
    session_id: &str,
    id: &str,
    content: &str,
    importance: Importance,
    embedding: Option<Vec<f32>>,
    ttl_secs: u64,
) -> ContextChunk {
    let embedding = embedding.or_else(|| test_provider().embed(content).ok());
    let now = now_rfc3339();
    let chunk = ContextChunk {
        id: id.to_string(),
        session_id: session_id.to_string(),
        content: content.to_string(),
        summary: String::new(),
        embedding,
        relevance: importance.initial_relevance(),
        importance,
        created_at: now.clone(),
        updated_at: now,
        ttl_deadline: None,
    };
    store::put_chunk(conn, &chunk, ttl_secs).unwrap();
    chunk
}
