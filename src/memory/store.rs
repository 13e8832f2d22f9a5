//! Chunk persistence — the write/read path over SQLite.
//!
//! Chunks are partitioned by session. Every mutation is a single statement or
//! transaction, so readers never observe torn writes; `put_chunk` upserts by
//! id (last writer wins). TTL-expired chunks are invisible to [`get_chunk`]
//! and [`scan_session`] even before any eviction runs.

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::types::{ContextChunk, Importance, SessionSummary};
use super::{bytes_to_embedding, embedding_to_bytes};
use crate::error::{AimemError, Result};

/// Fixed-width RFC 3339 timestamp (microseconds, `Z` suffix) so stored
/// timestamps compare correctly as strings.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Upsert a chunk by id. `ttl_secs > 0` sets `ttl_deadline = now + ttl`.
pub fn put_chunk(conn: &Connection, chunk: &ContextChunk, ttl_secs: u64) -> Result<()> {
    let now = now_rfc3339();
    let ttl_deadline = if ttl_secs > 0 {
        Some(
            (Utc::now() + chrono::Duration::seconds(ttl_secs as i64))
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        )
    } else {
        chunk.ttl_deadline.clone()
    };

    let embedding_blob = chunk.embedding.as_ref().map(|e| embedding_to_bytes(e));

    conn.execute(
        "INSERT OR REPLACE INTO context_chunks \
         (id, session_id, content, summary, embedding, relevance, importance, \
          created_at, updated_at, ttl_deadline) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            chunk.id,
            chunk.session_id,
            chunk.content,
            chunk.summary,
            embedding_blob,
            chunk.relevance,
            chunk.importance.as_str(),
            chunk.created_at,
            now,
            ttl_deadline,
        ],
    )?;

    Ok(())
}

/// Fetch a chunk by id. Expired chunks return `NotFound` even before
/// eviction runs.
pub fn get_chunk(conn: &Connection, chunk_id: &str) -> Result<ContextChunk> {
    let row = conn
        .query_row(
            "SELECT id, session_id, content, summary, embedding, relevance, importance, \
             created_at, updated_at, ttl_deadline \
             FROM context_chunks \
             WHERE id = ?1 AND (ttl_deadline IS NULL OR ttl_deadline > ?2)",
            params![chunk_id, now_rfc3339()],
            row_to_chunk,
        )
        .optional()?;

    row.ok_or_else(|| AimemError::not_found("chunk", chunk_id))
}

/// All non-expired chunks for a session, highest relevance first.
///
/// The scan order is the tie-break for retrieval ranking, so it must be
/// stable: relevance, then recency, then id.
pub fn scan_session(conn: &Connection, session_id: &str) -> Result<Vec<ContextChunk>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, content, summary, embedding, relevance, importance, \
         created_at, updated_at, ttl_deadline \
         FROM context_chunks \
         WHERE session_id = ?1 AND (ttl_deadline IS NULL OR ttl_deadline > ?2) \
         ORDER BY relevance DESC, created_at DESC, id",
    )?;

    let chunks = stmt
        .query_map(params![session_id, now_rfc3339()], row_to_chunk)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(chunks)
}

/// Idempotent removal by id.
pub fn delete_chunk(conn: &Connection, chunk_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM context_chunks WHERE id = ?1",
        params![chunk_id],
    )?;
    Ok(())
}

/// Persist an updated relevance score after retrieval.
pub fn update_relevance(conn: &Connection, chunk_id: &str, relevance: f64) -> Result<()> {
    conn.execute(
        "UPDATE context_chunks SET relevance = ?1, updated_at = ?2 WHERE id = ?3",
        params![relevance.clamp(0.0, 1.0), now_rfc3339(), chunk_id],
    )?;
    Ok(())
}

/// Aggregate statistics for a session.
///
/// A session with no stats row yields a zero-filled summary rather than
/// `NotFound` — external callers render that as an empty session.
pub fn session_summary(conn: &Connection, session_id: &str) -> Result<SessionSummary> {
    let row = conn
        .query_row(
            "SELECT chunk_count, memory_usage, average_relevance, created_at, last_activity \
             FROM session_stats WHERE session_id = ?1",
            params![session_id],
            |row| {
                Ok(SessionSummary {
                    session_id: session_id.to_string(),
                    chunk_count: row.get(0)?,
                    total_content_bytes: row.get(1)?,
                    average_relevance: row.get(2)?,
                    created_at: row.get(3)?,
                    last_activity: row.get(4)?,
                })
            },
        )
        .optional()?;

    Ok(row.unwrap_or_else(|| SessionSummary {
        session_id: session_id.to_string(),
        ..Default::default()
    }))
}

/// Delete chunks whose TTL deadline has passed. Returns the deletion count.
pub fn evict_ttl(conn: &Connection, session_id: &str) -> Result<usize> {
    let affected = conn.execute(
        "DELETE FROM context_chunks \
         WHERE session_id = ?1 AND ttl_deadline IS NOT NULL AND ttl_deadline <= ?2",
        params![session_id, now_rfc3339()],
    )?;
    Ok(affected)
}

/// Retain the `keep_count` most recently updated chunks; delete the rest.
pub fn evict_lru(conn: &Connection, session_id: &str, keep_count: usize) -> Result<usize> {
    let affected = conn.execute(
        "DELETE FROM context_chunks \
         WHERE session_id = ?1 AND id NOT IN ( \
             SELECT id FROM context_chunks \
             WHERE session_id = ?1 \
             ORDER BY updated_at DESC \
             LIMIT ?2 \
         )",
        params![session_id, keep_count as i64],
    )?;
    Ok(affected)
}

/// Delete chunks with relevance below `min_relevance`.
pub fn evict_relevance(
    conn: &Connection,
    session_id: &str,
    min_relevance: f64,
) -> Result<usize> {
    let affected = conn.execute(
        "DELETE FROM context_chunks WHERE session_id = ?1 AND relevance < ?2",
        params![session_id, min_relevance],
    )?;
    Ok(affected)
}

/// Delete every chunk in the session. Returns the deletion count.
pub fn purge_session(conn: &Connection, session_id: &str) -> Result<usize> {
    let affected = conn.execute(
        "DELETE FROM context_chunks WHERE session_id = ?1",
        params![session_id],
    )?;
    Ok(affected)
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContextChunk> {
    let embedding_blob: Option<Vec<u8>> = row.get(4)?;
    let importance_str: String = row.get(6)?;

    Ok(ContextChunk {
        id: row.get(0)?,
        session_id: row.get(1)?,
        content: row.get(2)?,
        summary: row.get(3)?,
        embedding: embedding_blob.map(|b| bytes_to_embedding(&b)),
        relevance: row.get(5)?,
        importance: importance_str.parse().unwrap_or(Importance::Medium),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        ttl_deadline: row.get(9)?,
    })
}
