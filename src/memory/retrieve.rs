//! Ranking and retrieval pipeline.
//!
//! Candidates come from a linear scan of the session's chunks. Each is scored
//! by a weighted combination of query similarity, importance, recency, and
//! prior relevance, then boosted by task-type keyword tables. Auto-expansion
//! pulls in keyword-linked neighbors of the top results.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

use super::store;
use super::types::{ContextChunk, ContextRelationship, TaskType};
use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::error::Result;
use crate::summarizer::is_stop_word;

// ── Public types ─────────────────────────────────────────────────────────────

/// A chunk paired with its combined retrieval score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    #[serde(flatten)]
    pub chunk: ContextChunk,
    pub score: f64,
}

/// Result of a plain retrieval.
#[derive(Debug, Serialize)]
pub struct RetrievalResult {
    pub chunks: Vec<ScoredChunk>,
    pub total_score: f64,
    pub query_time_ms: u64,
}

// ── Query enhancement & boosts ───────────────────────────────────────────────

/// Append the task's fixed enhancement string to a query before embedding.
pub fn enhance_query(query: &str, task_type: Option<TaskType>) -> String {
    let enhancement = match task_type {
        Some(TaskType::Analysis) => "architecture structure design patterns code organization",
        Some(TaskType::Development) => "implementation code examples functions methods API",
        Some(TaskType::Debugging) => "error handling exceptions logging debugging troubleshooting",
        Some(TaskType::Refactoring) => "code quality structure patterns refactor improve optimize",
        Some(TaskType::Testing) => "tests testing unit integration end-to-end validation",
        Some(TaskType::Deployment) => "deployment configuration infrastructure setup production",
        None => return query.to_string(),
    };
    format!("{query} {enhancement}")
}

/// Keyword boost table for a task type. Only the first matching keyword
/// applies, so the order here is authoritative.
fn boost_table(task_type: TaskType) -> &'static [(&'static str, f64)] {
    match task_type {
        TaskType::Analysis => &[
            ("architecture", 1.2),
            ("structure", 1.1),
            ("design", 1.1),
            ("pattern", 1.1),
        ],
        TaskType::Development => &[
            ("function", 1.2),
            ("method", 1.2),
            ("implementation", 1.3),
            ("api", 1.1),
            ("code", 1.1),
        ],
        TaskType::Debugging => &[
            ("error", 1.3),
            ("bug", 1.3),
            ("issue", 1.2),
            ("problem", 1.2),
            ("fix", 1.1),
        ],
        _ => &[],
    }
}

// ── Scoring ──────────────────────────────────────────────────────────────────

/// Combined base score:
/// `0.6·similarity + 0.2·importance + 0.1·recency + 0.1·prior relevance`
/// where recency decays linearly to zero over a week.
fn combined_score(similarity: f64, chunk: &ContextChunk, now: DateTime<Utc>) -> f64 {
    let recency = (1.0 - chunk.age_hours(now) / 168.0).max(0.0);
    let score = similarity * 0.6
        + chunk.importance.score_weight() * 0.2
        + recency * 0.1
        + chunk.relevance * 0.1;
    score.min(1.0)
}

/// Multiplicative task boost: the first keyword from the task's table found
/// in the lowercased content applies, and the result is clamped to `[0, 1]`.
fn apply_task_boost(score: f64, content: &str, task_type: Option<TaskType>) -> f64 {
    let Some(task_type) = task_type else {
        return score.clamp(0.0, 1.0);
    };

    let lower = content.to_lowercase();
    for (keyword, boost) in boost_table(task_type) {
        if lower.contains(keyword) {
            return (score * boost).clamp(0.0, 1.0);
        }
    }
    score.clamp(0.0, 1.0)
}

/// Rank candidates against a query embedding and keep the top `max_chunks`.
///
/// Chunks without an embedding are skipped. Each returned chunk's relevance
/// is updated in place to its new combined score; persisting that update is
/// the caller's choice. The sort is stable, so ties keep scan order.
pub fn rank_chunks(
    query_embedding: &[f32],
    candidates: Vec<ContextChunk>,
    max_chunks: usize,
    task_type: Option<TaskType>,
) -> Vec<ScoredChunk> {
    let now = Utc::now();

    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .filter_map(|chunk| {
            let embedding = chunk.embedding.as_ref()?;
            let similarity = cosine_similarity(query_embedding, embedding);
            let base = combined_score(similarity, &chunk, now);
            let score = apply_task_boost(base, &chunk.content, task_type);
            Some(ScoredChunk { chunk, score })
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(max_chunks);

    for entry in &mut scored {
        entry.chunk.relevance = entry.score.clamp(0.0, 1.0);
    }

    scored
}

/// Full retrieval: embed the (optionally enhanced) query, scan the session,
/// rank, truncate.
pub fn retrieve(
    conn: &Connection,
    embedder: &dyn EmbeddingProvider,
    session_id: &str,
    query: &str,
    max_chunks: usize,
    task_type: Option<TaskType>,
) -> Result<RetrievalResult> {
    if query.is_empty() {
        return Ok(RetrievalResult {
            chunks: Vec::new(),
            total_score: 0.0,
            query_time_ms: 0,
        });
    }

    let start = std::time::Instant::now();

    let enhanced = enhance_query(query, task_type);
    let query_embedding = embedder.embed(&enhanced)?;

    let candidates = store::scan_session(conn, session_id)?;
    let analyzed = candidates.len();
    let chunks = rank_chunks(&query_embedding, candidates, max_chunks, task_type);
    let total_score: f64 = chunks.iter().map(|c| c.score).sum();

    let query_time_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        session_id,
        analyzed,
        returned = chunks.len(),
        total_score,
        query_time_ms,
        "retrieval completed"
    );

    Ok(RetrievalResult {
        chunks,
        total_score,
        query_time_ms,
    })
}

// ── Auto-expansion ───────────────────────────────────────────────────────────

/// Frequency keywords from content: length > 3, non-stopword, most frequent
/// first with alphabetical tie-break for determinism.
pub fn content_keywords(content: &str, max_keywords: usize) -> Vec<String> {
    let mut freq: HashMap<String, usize> = HashMap::new();
    for word in content.to_lowercase().split_whitespace() {
        let cleaned: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if cleaned.len() > 3 && !is_stop_word(&cleaned) {
            *freq.entry(cleaned).or_insert(0) += 1;
        }
    }

    let mut sorted: Vec<(String, usize)> = freq.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted
        .into_iter()
        .take(max_keywords)
        .map(|(word, _)| word)
        .collect()
}

/// Expand the primary result set with keyword-linked neighbors.
///
/// For each primary chunk, up to 3 frequency keywords are embedded and run
/// through a size-2 similarity scan on the same session; the top hit joins
/// the related set if it is new. Expansion stops once the related count
/// reaches `max_chunks / 2`.
pub fn expand_related(
    conn: &Connection,
    embedder: &dyn EmbeddingProvider,
    session_id: &str,
    primary: &[ScoredChunk],
    max_chunks: usize,
) -> Result<(Vec<ContextChunk>, Vec<ContextRelationship>)> {
    let mut related: Vec<ContextChunk> = Vec::new();
    let mut relationships: Vec<ContextRelationship> = Vec::new();
    let limit = (max_chunks / 2).max(1);

    'outer: for primary_chunk in primary {
        for keyword in content_keywords(&primary_chunk.chunk.content, 3) {
            if related.len() >= limit {
                break 'outer;
            }

            let keyword_embedding = match embedder.embed(&keyword) {
                Ok(e) => e,
                // Per-keyword failures skip the keyword, never the request
                Err(err) => {
                    tracing::warn!(keyword, error = %err, "keyword embedding failed");
                    continue;
                }
            };

            let candidates = store::scan_session(conn, session_id)?;
            let hits = rank_chunks(&keyword_embedding, candidates, 2, None);

            for hit in hits {
                let id = hit.chunk.id.clone();
                if id == primary_chunk.chunk.id
                    || primary.iter().any(|p| p.chunk.id == id)
                    || related.iter().any(|r| r.id == id)
                {
                    continue;
                }

                relationships.push(ContextRelationship {
                    chunk_id: primary_chunk.chunk.id.clone(),
                    related_chunk_id: id,
                    strength: hit.score * 0.8,
                    reason: format!("Keyword similarity: {keyword}"),
                });
                related.push(hit.chunk);
                break;
            }
        }
    }

    Ok((related, relationships))
}
