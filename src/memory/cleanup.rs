//! Eviction sweeps — TTL/LRU/relevance cleanup and the phase-aware smart
//! memory manager.
//!
//! A sweep over live chunks never removes more than half of the session in
//! one call. Expired chunks are already invisible to readers, so the TTL
//! strategy deletes all of them without counting against that bound.
//! Per-chunk delete failures are logged and skipped; the sweep continues and
//! reports the true count removed.

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;

use super::store;
use super::types::{
    CleanupStrategy, ContextChunk, Importance, MemoryStrategy, SessionPhase,
};
use crate::error::Result;

/// Outcome of a `cleanup_session` sweep.
#[derive(Debug, Serialize)]
pub struct CleanupResult {
    pub success: bool,
    pub chunks_removed: usize,
    pub bytes_freed: u64,
    pub strategy: CleanupStrategy,
    pub remaining_chunks: usize,
}

/// Outcome of a smart-memory-manager sweep.
#[derive(Debug, Serialize)]
pub struct SmartMemoryResult {
    pub chunks_cleaned: usize,
    pub memory_freed: u64,
    pub chunks_remaining: usize,
    pub average_relevance: f64,
    pub description: String,
}

/// Run one cleanup sweep with the selected strategy.
pub fn cleanup_session(
    conn: &Connection,
    session_id: &str,
    strategy: CleanupStrategy,
) -> Result<CleanupResult> {
    if strategy == CleanupStrategy::Ttl {
        // Expired chunks are invisible to readers already; delete them all.
        let expired_bytes: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(content)), 0) FROM context_chunks \
                 WHERE session_id = ?1 AND ttl_deadline IS NOT NULL AND ttl_deadline <= ?2",
                rusqlite::params![session_id, store::now_rfc3339()],
                |row| row.get(0),
            )
            .unwrap_or(0);

        let removed = store::evict_ttl(conn, session_id)?;
        let remaining = store::scan_session(conn, session_id)?.len();

        tracing::info!(session_id, removed, remaining, "ttl cleanup completed");
        return Ok(CleanupResult {
            success: true,
            chunks_removed: removed,
            bytes_freed: expired_bytes as u64,
            strategy,
            remaining_chunks: remaining,
        });
    }

    let chunks = store::scan_session(conn, session_id)?;
    if chunks.is_empty() {
        return Ok(CleanupResult {
            success: true,
            chunks_removed: 0,
            bytes_freed: 0,
            strategy,
            remaining_chunks: 0,
        });
    }

    let total = chunks.len();
    let max_remove = total / 2;

    let to_remove: Vec<ContextChunk> = match strategy {
        CleanupStrategy::Lru => select_lru(chunks, max_remove),
        CleanupStrategy::Relevance => select_low_relevance(chunks, max_remove),
        CleanupStrategy::Ttl => unreachable!("handled above"),
    };

    let (removed, bytes_freed) = delete_chunks(conn, &to_remove);
    let remaining = total - removed;

    tracing::info!(
        session_id,
        strategy = strategy.as_str(),
        removed,
        remaining,
        bytes_freed,
        "cleanup completed"
    );

    Ok(CleanupResult {
        success: true,
        chunks_removed: removed,
        bytes_freed,
        strategy,
        remaining_chunks: remaining,
    })
}

/// Oldest-updated chunks first, up to `max_remove`.
fn select_lru(mut chunks: Vec<ContextChunk>, max_remove: usize) -> Vec<ContextChunk> {
    chunks.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
    chunks.truncate(max_remove);
    chunks
}

/// Lowest-relevance chunks first, up to `max_remove`.
fn select_low_relevance(mut chunks: Vec<ContextChunk>, max_remove: usize) -> Vec<ContextChunk> {
    chunks.sort_by(|a, b| {
        a.relevance
            .partial_cmp(&b.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    chunks.truncate(max_remove);
    chunks
}

// ── Smart memory manager ─────────────────────────────────────────────────────

/// Fraction of the session eligible per sweep for a phase × strategy pair.
pub fn cleanup_ratio(strategy: MemoryStrategy, phase: SessionPhase) -> f64 {
    match (strategy, phase) {
        (MemoryStrategy::Aggressive, SessionPhase::Analysis) => 0.30,
        (MemoryStrategy::Aggressive, SessionPhase::Development) => 0.20,
        (MemoryStrategy::Aggressive, SessionPhase::Testing) => 0.40,
        (MemoryStrategy::Aggressive, SessionPhase::Deployment) => 0.10,
        (MemoryStrategy::Balanced, SessionPhase::Analysis) => 0.20,
        (MemoryStrategy::Balanced, SessionPhase::Development) => 0.10,
        (MemoryStrategy::Balanced, SessionPhase::Testing) => 0.25,
        (MemoryStrategy::Balanced, SessionPhase::Deployment) => 0.05,
        (MemoryStrategy::Conservative, SessionPhase::Analysis) => 0.10,
        (MemoryStrategy::Conservative, SessionPhase::Development) => 0.05,
        (MemoryStrategy::Conservative, SessionPhase::Testing) => 0.15,
        (MemoryStrategy::Conservative, SessionPhase::Deployment) => 0.00,
    }
}

/// Apply a phase-aware cleanup sweep.
pub fn smart_memory_sweep(
    conn: &Connection,
    session_id: &str,
    phase: SessionPhase,
    strategy: MemoryStrategy,
    preserve_important: bool,
) -> Result<SmartMemoryResult> {
    let chunks = store::scan_session(conn, session_id)?;
    let total = chunks.len();

    let ratio = cleanup_ratio(strategy, phase);
    let mut max_remove = (total as f64 * ratio) as usize;
    if max_remove == 0 && total > 10 && ratio > 0.0 {
        max_remove = 1;
    }
    // Never more than half the session in one call
    max_remove = max_remove.min(total / 2);

    let to_remove = match strategy {
        MemoryStrategy::Aggressive => {
            select_aggressive(chunks.clone(), max_remove, preserve_important)
        }
        MemoryStrategy::Balanced => select_balanced(chunks.clone(), max_remove, preserve_important),
        MemoryStrategy::Conservative => {
            select_conservative(chunks.clone(), max_remove, preserve_important)
        }
    };

    let (removed, memory_freed) = delete_chunks(conn, &to_remove);
    let remaining = total - removed;

    let removed_ids: Vec<&str> = to_remove.iter().map(|c| c.id.as_str()).collect();
    let kept_relevance: Vec<f64> = chunks
        .iter()
        .filter(|c| !removed_ids.contains(&c.id.as_str()))
        .map(|c| c.relevance)
        .collect();
    let average_relevance = if kept_relevance.is_empty() {
        0.0
    } else {
        kept_relevance.iter().sum::<f64>() / kept_relevance.len() as f64
    };

    let description = format!(
        "Applied {} strategy for {} phase, {} important chunks",
        strategy.as_str(),
        phase.as_str(),
        if preserve_important {
            "preserving"
        } else {
            "not preserving"
        },
    );

    tracing::info!(
        session_id,
        phase = phase.as_str(),
        strategy = strategy.as_str(),
        removed,
        remaining,
        "smart memory sweep completed"
    );

    Ok(SmartMemoryResult {
        chunks_cleaned: removed,
        memory_freed,
        chunks_remaining: remaining,
        average_relevance,
        description,
    })
}

/// Aggressive: ascending by (relevance, timestamp); high importance is
/// exempt when preservation is on.
fn select_aggressive(
    chunks: Vec<ContextChunk>,
    max_remove: usize,
    preserve_important: bool,
) -> Vec<ContextChunk> {
    let mut candidates: Vec<ContextChunk> = chunks
        .into_iter()
        .filter(|c| !(preserve_important && c.importance == Importance::High))
        .collect();

    candidates.sort_by(|a, b| {
        a.relevance
            .partial_cmp(&b.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    candidates.truncate(max_remove);
    candidates
}

/// Balanced: high importance always survives; recent medium (age < 1h)
/// survives when preservation is on; the rest sort ascending by the
/// composite `0.4·(1−relevance) + 0.3·age_norm + 0.3·importance_rank`.
fn select_balanced(
    chunks: Vec<ContextChunk>,
    max_remove: usize,
    preserve_important: bool,
) -> Vec<ContextChunk> {
    let now = Utc::now();

    let mut candidates: Vec<ContextChunk> = chunks
        .into_iter()
        .filter(|c| {
            if c.importance == Importance::High {
                return false;
            }
            if preserve_important
                && c.importance == Importance::Medium
                && c.age_hours(now) < 1.0
            {
                return false;
            }
            true
        })
        .collect();

    candidates.sort_by(|a, b| {
        let score_a = balanced_composite(a, now);
        let score_b = balanced_composite(b, now);
        score_a
            .partial_cmp(&score_b)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(max_remove);
    candidates
}

fn balanced_composite(chunk: &ContextChunk, now: chrono::DateTime<Utc>) -> f64 {
    let age_norm = (chunk.age_hours(now) / 24.0).min(1.0);
    let importance_rank = match chunk.importance {
        Importance::High => 0.0,
        Importance::Medium => 0.5,
        Importance::Low => 1.0,
    };
    0.4 * (1.0 - chunk.relevance) + 0.3 * age_norm + 0.3 * importance_rank
}

/// Conservative: only stale low-value chunks qualify (relevance < 0.3,
/// importance low, age > 24h), sorted by age ascending.
fn select_conservative(
    chunks: Vec<ContextChunk>,
    max_remove: usize,
    preserve_important: bool,
) -> Vec<ContextChunk> {
    let now = Utc::now();

    let mut candidates: Vec<ContextChunk> = chunks
        .into_iter()
        .filter(|c| {
            if preserve_important && c.importance != Importance::Low {
                return false;
            }
            c.relevance < 0.3 && c.importance == Importance::Low && c.age_hours(now) > 24.0
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.age_hours(now)
            .partial_cmp(&b.age_hours(now))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(max_remove);
    candidates
}

/// Delete each selected chunk, skipping individual failures. Returns the
/// actual count removed and bytes freed.
fn delete_chunks(conn: &Connection, chunks: &[ContextChunk]) -> (usize, u64) {
    let mut removed = 0usize;
    let mut bytes_freed = 0u64;

    for chunk in chunks {
        match store::delete_chunk(conn, &chunk.id) {
            Ok(()) => {
                removed += 1;
                bytes_freed += chunk.content.len() as u64;
            }
            Err(err) => {
                tracing::warn!(chunk_id = %chunk.id, error = %err, "failed to remove chunk");
            }
        }
    }

    (removed, bytes_freed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::store::{now_rfc3339, put_chunk};
    use chrono::SecondsFormat;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    #[test]
    fn ttl_cleanup_removes_all_expired() {
        let conn = test_db();
        for i in 0..3 {
            let mut chunk = base_chunk(&format!("c{i}"));
            chunk.ttl_deadline = Some(
                (Utc::now() - chrono::Duration::seconds(2))
                    .to_rfc3339_opts(SecondsFormat::Micros, true),
            );
            put_chunk(&conn, &chunk, 0).unwrap();
        }

        let result = cleanup_session(&conn, "s1", CleanupStrategy::Ttl).unwrap();
        assert_eq!(result.chunks_removed, 3);
        assert_eq!(result.remaining_chunks, 0);
        assert!(result.bytes_freed > 0);
    }

    #[test]
    fn ttl_cleanup_without_expired_is_noop() {
        let conn = test_db();
        put_chunk(&conn, &base_chunk("live"), 3600).unwrap();

        let result = cleanup_session(&conn, "s1", CleanupStrategy::Ttl).unwrap();
        assert_eq!(result.chunks_removed, 0);
        assert_eq!(result.remaining_chunks, 1);
        assert_eq!(result.bytes_freed, 0);
    }

    #[test]
    fn lru_cleanup_caps_at_half_the_session() {
        let conn = test_db();
        for i in 0..5 {
            let mut chunk = base_chunk(&format!("c{i}"));
            chunk.updated_at = format!("2026-01-01T00:00:0{i}.000000Z");
            put_chunk(&conn, &chunk, 0).unwrap();
            conn.execute(
                "UPDATE context_chunks SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![format!("2026-01-01T00:00:0{i}.000000Z"), format!("c{i}")],
            )
            .unwrap();
        }

        let result = cleanup_session(&conn, "s1", CleanupStrategy::Lru).unwrap();
        assert_eq!(result.chunks_removed, 2); // floor(5 / 2)
        assert_eq!(result.remaining_chunks, 3);

        // The oldest-updated chunks went first
        assert!(store::get_chunk(&conn, "c0").is_err());
        assert!(store::get_chunk(&conn, "c1").is_err());
        assert!(store::get_chunk(&conn, "c4").is_ok());
    }

    #[test]
    fn single_chunk_session_is_never_emptied_by_lru() {
        let conn = test_db();
        put_chunk(&conn, &base_chunk("only"), 0).unwrap();

        let result = cleanup_session(&conn, "s1", CleanupStrategy::Lru).unwrap();
        assert_eq!(result.chunks_removed, 0);
        assert_eq!(result.remaining_chunks, 1);
    }

    #[test]
    fn relevance_cleanup_drops_lowest_scores_first() {
        let conn = test_db();
        for (id, rel) in [("low", 0.1), ("mid", 0.5), ("high", 0.9), ("top", 0.95)] {
            let mut chunk = base_chunk(id);
            chunk.relevance = rel;
            put_chunk(&conn, &chunk, 0).unwrap();
        }

        let result = cleanup_session(&conn, "s1", CleanupStrategy::Relevance).unwrap();
        assert_eq!(result.chunks_removed, 2);
        assert!(store::get_chunk(&conn, "low").is_err());
        assert!(store::get_chunk(&conn, "mid").is_err());
        assert!(store::get_chunk(&conn, "high").is_ok());
    }

    #[test]
    fn cleanup_of_empty_session_succeeds() {
        let conn = test_db();
        let result = cleanup_session(&conn, "empty", CleanupStrategy::Lru).unwrap();
        assert!(result.success);
        assert_eq!(result.chunks_removed, 0);
    }

    #[test]
    fn ratio_table_values() {
        assert_eq!(
            cleanup_ratio(MemoryStrategy::Aggressive, SessionPhase::Testing),
            0.40
        );
        assert_eq!(
            cleanup_ratio(MemoryStrategy::Balanced, SessionPhase::Deployment),
            0.05
        );
        assert_eq!(
            cleanup_ratio(MemoryStrategy::Conservative, SessionPhase::Deployment),
            0.00
        );
        assert_eq!(
            cleanup_ratio(MemoryStrategy::Conservative, SessionPhase::Development),
            0.05
        );
    }

    #[test]
    fn aggressive_sweep_preserves_high_importance() {
        let conn = test_db();
        for i in 0..10 {
            let mut chunk = base_chunk(&format!("low{i}"));
            chunk.relevance = 0.1;
            chunk.importance = Importance::Low;
            put_chunk(&conn, &chunk, 0).unwrap();
        }
        let mut important = base_chunk("keep");
        important.relevance = 0.05;
        important.importance = Importance::High;
        put_chunk(&conn, &important, 0).unwrap();

        let result = smart_memory_sweep(
            &conn,
            "s1",
            SessionPhase::Testing,
            MemoryStrategy::Aggressive,
            true,
        )
        .unwrap();

        assert!(result.chunks_cleaned > 0);
        assert!(store::get_chunk(&conn, "keep").is_ok());
    }

    #[test]
    fn aggressive_sweep_respects_ratio() {
        let conn = test_db();
        for i in 0..20 {
            let mut chunk = base_chunk(&format!("c{i}"));
            chunk.importance = Importance::Low;
            put_chunk(&conn, &chunk, 0).unwrap();
        }

        // aggressive × development = 0.20 → 4 of 20
        let result = smart_memory_sweep(
            &conn,
            "s1",
            SessionPhase::Development,
            MemoryStrategy::Aggressive,
            false,
        )
        .unwrap();
        assert_eq!(result.chunks_cleaned, 4);
        assert_eq!(result.chunks_remaining, 16);
    }

    #[test]
    fn balanced_sweep_always_skips_high_importance() {
        let conn = test_db();
        for i in 0..12 {
            let mut chunk = base_chunk(&format!("h{i}"));
            chunk.importance = Importance::High;
            chunk.relevance = 0.01;
            put_chunk(&conn, &chunk, 0).unwrap();
        }

        let result = smart_memory_sweep(
            &conn,
            "s1",
            SessionPhase::Testing,
            MemoryStrategy::Balanced,
            false,
        )
        .unwrap();
        assert_eq!(result.chunks_cleaned, 0);
        assert_eq!(result.chunks_remaining, 12);
    }

    #[test]
    fn conservative_sweep_only_touches_stale_low_value_chunks() {
        let conn = test_db();

        // Fresh low-relevance chunk: too young to qualify
        let mut fresh = base_chunk("fresh");
        fresh.relevance = 0.1;
        fresh.importance = Importance::Low;
        put_chunk(&conn, &fresh, 0).unwrap();

        // Old low-relevance low-importance chunk: qualifies
        let old_created = (Utc::now() - chrono::Duration::hours(48))
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        let mut stale = base_chunk("stale");
        stale.relevance = 0.1;
        stale.importance = Importance::Low;
        stale.created_at = old_created;
        put_chunk(&conn, &stale, 0).unwrap();

        for i in 0..8 {
            put_chunk(&conn, &base_chunk(&format!("fill{i}")), 0).unwrap();
        }

        let result = smart_memory_sweep(
            &conn,
            "s1",
            SessionPhase::Analysis,
            MemoryStrategy::Conservative,
            true,
        )
        .unwrap();

        assert_eq!(result.chunks_cleaned, 1);
        assert!(store::get_chunk(&conn, "stale").is_err());
        assert!(store::get_chunk(&conn, "fresh").is_ok());
    }

    #[test]
    fn conservative_deployment_removes_nothing() {
        let conn = test_db();
        for i in 0..10 {
            put_chunk(&conn, &base_chunk(&format!("c{i}")), 0).unwrap();
        }

        let result = smart_memory_sweep(
            &conn,
            "s1",
            SessionPhase::Deployment,
            MemoryStrategy::Conservative,
            true,
        )
        .unwrap();
        assert_eq!(result.chunks_cleaned, 0);
    }

    #[test]
    fn sweep_never_exceeds_half_the_session() {
        let conn = test_db();
        for i in 0..4 {
            let mut chunk = base_chunk(&format!("c{i}"));
            chunk.importance = Importance::Low;
            put_chunk(&conn, &chunk, 0).unwrap();
        }

        // aggressive × testing = 0.40 → 1 of 4, well under the 50% cap
        let result = smart_memory_sweep(
            &conn,
            "s1",
            SessionPhase::Testing,
            MemoryStrategy::Aggressive,
            false,
        )
        .unwrap();
        assert!(result.chunks_cleaned <= 2);
    }

    fn base_chunk(id: &str) -> ContextChunk {
        let now = now_rfc3339();
        ContextChunk {
            id: id.to_string(),
            session_id: "s1".into(),
            content: format!("content for chunk {id} with some padding text"),
            summary: String::new(),
            embedding: None,
            relevance: 0.7,
            importance: Importance::Medium,
            created_at: now.clone(),
            updated_at: now,
            ttl_deadline: None,
        }
    }
}
