//! Response-budget engine.
//!
//! Packs a retrieval result into a response whose serialized form stays
//! under an estimated token limit. Primary chunks get 60% of the available
//! budget, related chunks 30%, relationships 10%; oversized first chunks are
//! truncated at a word boundary, and large primary sets paginate.

use serde::Serialize;

use super::types::{ContextChunk, ContextRelationship};

/// Approximate characters per token.
const CHARS_PER_TOKEN: f64 = 4.0;

/// Indicators that mark text as code-like (denser tokenization).
const CODE_INDICATORS: &[&str] = &["{", "}", "(", ")", "function", "class", "import", "const"];

/// Fixed token overhead per chunk for id and metadata fields.
const CHUNK_OVERHEAD_TOKENS: usize = 50;

/// Marker appended to truncated content.
const TRUNCATION_MARKER: &str = "... [truncated]";

// ── Token estimation ─────────────────────────────────────────────────────────

/// Estimate the token count of a text.
///
/// `ceil(len / 4 * factor)` where the factor is 1.3 for text with at least
/// three distinct code indicators, 1.1 for at least one, 1.0 otherwise.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let lower = text.to_lowercase();
    let indicator_count = CODE_INDICATORS
        .iter()
        .filter(|ind| lower.contains(*ind))
        .count();

    let factor = if indicator_count >= 3 {
        1.3
    } else if indicator_count >= 1 {
        1.1
    } else {
        1.0
    };

    ((text.len() as f64 / CHARS_PER_TOKEN) * factor).ceil() as usize
}

/// Estimate tokens for a whole serialized structure, with 20% JSON overhead.
pub fn estimate_response_tokens<T: Serialize>(value: &T) -> usize {
    let json = serde_json::to_string(value).unwrap_or_default();
    (estimate_tokens(&json) as f64 * 1.2).ceil() as usize
}

fn estimate_chunk_tokens(chunk: &ContextChunk) -> usize {
    estimate_tokens(&chunk.content) + estimate_tokens(&chunk.summary) + CHUNK_OVERHEAD_TOKENS
}

fn estimate_chunks_tokens(chunks: &[ContextChunk]) -> usize {
    chunks.iter().map(estimate_chunk_tokens).sum()
}

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ResponsePaging {
    pub page_size: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TokenLimits {
    pub max_response_tokens: usize,
    pub estimated_tokens: usize,
    pub truncated_content: bool,
}

/// Budget-packed retrieval result.
#[derive(Debug, Serialize)]
pub struct PackedRetrieval {
    pub primary_chunks: Vec<ContextChunk>,
    pub related_chunks: Vec<ContextChunk>,
    pub relationships: Vec<ContextRelationship>,
    pub retrieval_reason: String,
    pub total_relevance: f64,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paging: Option<ResponsePaging>,
    pub token_limits: TokenLimits,
}

/// Packing knobs; defaults keep responses well under the protocol's limit.
#[derive(Debug, Clone)]
pub struct BudgetConfig {
    pub max_tokens: usize,
    pub enable_paging: bool,
    pub page_size: usize,
    pub truncate_content: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens: 20_000,
            enable_paging: true,
            page_size: 10,
            truncate_content: true,
        }
    }
}

impl BudgetConfig {
    pub fn from_config(config: &crate::config::ResponseConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            enable_paging: config.enable_paging,
            page_size: config.page_size,
            truncate_content: config.truncate_content,
        }
    }
}

// ── Packing ──────────────────────────────────────────────────────────────────

pub struct ResponseLimiter {
    config: BudgetConfig,
}

impl ResponseLimiter {
    pub fn new(config: BudgetConfig) -> Self {
        Self { config }
    }

    /// Fit the retrieval pieces into the token budget.
    #[allow(clippy::too_many_arguments)]
    pub fn pack(
        &self,
        primary: Vec<ContextChunk>,
        related: Vec<ContextChunk>,
        relationships: Vec<ContextRelationship>,
        retrieval_reason: String,
        total_relevance: f64,
        processing_time_ms: u64,
        page: usize,
    ) -> PackedRetrieval {
        let primary_in = primary.len();
        let related_in = related.len();
        let relationships_in = relationships.len();

        let (primary_out, related_out, relationships_out, paging) =
            self.fit_within_budget(primary, related, relationships, page);

        let any_truncated = primary_out.len() < primary_in
            || related_out.len() < related_in
            || relationships_out.len() < relationships_in
            || primary_out.iter().any(|c| c.content.ends_with(TRUNCATION_MARKER));

        let mut result = PackedRetrieval {
            primary_chunks: primary_out,
            related_chunks: related_out,
            relationships: relationships_out,
            retrieval_reason,
            total_relevance,
            processing_time_ms,
            paging,
            token_limits: TokenLimits {
                max_response_tokens: self.config.max_tokens,
                estimated_tokens: 0,
                truncated_content: any_truncated,
            },
        };
        result.token_limits.estimated_tokens = estimate_response_tokens(&result);
        result
    }

    fn fit_within_budget(
        &self,
        primary: Vec<ContextChunk>,
        related: Vec<ContextChunk>,
        relationships: Vec<ContextRelationship>,
        page: usize,
    ) -> (
        Vec<ContextChunk>,
        Vec<ContextChunk>,
        Vec<ContextRelationship>,
        Option<ResponsePaging>,
    ) {
        // Base overhead from an empty scaffold, plus a fixed safety reserve
        let scaffold = PackedRetrieval {
            primary_chunks: Vec::new(),
            related_chunks: Vec::new(),
            relationships: Vec::new(),
            retrieval_reason: "Base structure overhead calculation".into(),
            total_relevance: 0.0,
            processing_time_ms: 0,
            paging: None,
            token_limits: TokenLimits {
                max_response_tokens: self.config.max_tokens,
                ..Default::default()
            },
        };
        let base_overhead = estimate_response_tokens(&scaffold);
        let available = self
            .config
            .max_tokens
            .saturating_sub(base_overhead)
            .saturating_sub(200);

        if available <= 500 {
            return (Vec::new(), Vec::new(), Vec::new(), None);
        }

        // Phase 1: primary chunks, 60% of the budget
        let primary_budget = (available as f64 * 0.6) as usize;
        let (result_primary, paging) = if self.config.enable_paging {
            self.paginate_chunks(primary, page, "primary", primary_budget)
        } else {
            (self.limit_chunks(primary, primary_budget), None)
        };

        let mut used = estimate_chunks_tokens(&result_primary);
        let mut remaining = available.saturating_sub(used);

        // Phase 2: related chunks, up to 30%
        let mut result_related = Vec::new();
        if remaining > 200 {
            let related_budget = (remaining / 2).min((available as f64 * 0.3) as usize);
            if !related.is_empty() {
                result_related = if self.config.enable_paging {
                    self.paginate_chunks(related, 1, "related", related_budget).0
                } else {
                    self.limit_chunks(related, related_budget)
                };
                used += estimate_chunks_tokens(&result_related);
                remaining = available.saturating_sub(used);
            }
        }

        // Phase 3: relationships, up to 10%
        let mut result_relationships = Vec::new();
        if remaining > 100 && !relationships.is_empty() {
            let relationship_budget = remaining.min((available as f64 * 0.1) as usize);
            result_relationships = limit_relationships(relationships, relationship_budget);
        }

        (result_primary, result_related, result_relationships, paging)
    }

    fn paginate_chunks(
        &self,
        chunks: Vec<ContextChunk>,
        page: usize,
        kind: &str,
        token_budget: usize,
    ) -> (Vec<ContextChunk>, Option<ResponsePaging>) {
        if chunks.is_empty() {
            return (Vec::new(), None);
        }

        let total_in = chunks.len();
        let fitting = self.limit_chunks(chunks, token_budget);

        if fitting.len() == total_in && fitting.len() <= self.config.page_size {
            return (fitting, None);
        }

        let page_size = self.config.page_size.max(1);
        let total_items = fitting.len();
        let total_pages = total_items.div_ceil(page_size).max(1);
        let current_page = page.clamp(1, total_pages);

        let start = (current_page - 1) * page_size;
        let end = (start + page_size).min(total_items);
        let page_chunks = fitting[start..end].to_vec();

        let has_more = current_page < total_pages;
        let paging = ResponsePaging {
            page_size,
            current_page,
            total_pages,
            total_items,
            has_more,
            next_page_token: has_more.then(|| format!("{kind}_page_{}", current_page + 1)),
        };

        (page_chunks, Some(paging))
    }

    /// Keep as many chunks as fit; if even the first does not fit and
    /// truncation is enabled, truncate it rather than returning nothing.
    fn limit_chunks(&self, chunks: Vec<ContextChunk>, token_budget: usize) -> Vec<ContextChunk> {
        if chunks.is_empty() || token_budget == 0 {
            return Vec::new();
        }

        let mut result = Vec::new();
        let mut used = 0usize;

        for chunk in chunks {
            let chunk_tokens = estimate_chunk_tokens(&chunk);
            if used + chunk_tokens > token_budget {
                if self.config.truncate_content && result.is_empty() {
                    if let Some(truncated) =
                        truncate_chunk(chunk, token_budget.saturating_sub(CHUNK_OVERHEAD_TOKENS))
                    {
                        result.push(truncated);
                    }
                }
                break;
            }
            used += chunk_tokens;
            result.push(chunk);
        }

        result
    }
}

fn limit_relationships(
    relationships: Vec<ContextRelationship>,
    token_budget: usize,
) -> Vec<ContextRelationship> {
    let mut result = Vec::new();
    let mut used = 0usize;

    for rel in relationships {
        let text = format!("{} {} {:.3}", rel.chunk_id, rel.reason, rel.strength);
        let tokens = estimate_tokens(&text);
        if used + tokens > token_budget {
            break;
        }
        used += tokens;
        result.push(rel);
    }

    result
}

/// Truncate a chunk's content to fit `token_budget`, cutting at the last
/// space past the midpoint and appending the truncation marker.
fn truncate_chunk(mut chunk: ContextChunk, token_budget: usize) -> Option<ContextChunk> {
    if token_budget <= 100 {
        return None;
    }

    let summary_tokens = estimate_tokens(&chunk.summary);
    let available = token_budget.saturating_sub(summary_tokens + CHUNK_OVERHEAD_TOKENS);
    if available <= 50 {
        return None;
    }

    // 80% safety margin under the byte budget
    let max_bytes = (available as f64 * CHARS_PER_TOKEN * 0.8) as usize;
    if chunk.content.len() <= max_bytes {
        return Some(chunk);
    }

    let mut cut = max_bytes;
    while cut > 0 && !chunk.content.is_char_boundary(cut) {
        cut -= 1;
    }

    let mut truncated = chunk.content[..cut].to_string();
    if let Some(last_space) = truncated.rfind(' ') {
        if last_space > max_bytes / 2 {
            truncated.truncate(last_space);
        }
    }
    truncated.push_str(TRUNCATION_MARKER);

    chunk.content = truncated;
    Some(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::store::now_rfc3339;
    use crate::memory::types::Importance;

    fn chunk_of(id: &str, content: String) -> ContextChunk {
        let now = now_rfc3339();
        ContextChunk {
            id: id.to_string(),
            session_id: "s1".into(),
            content,
            summary: String::new(),
            embedding: None,
            relevance: 0.5,
            importance: Importance::Medium,
            created_at: now.clone(),
            updated_at: now,
            ttl_deadline: None,
        }
    }

    fn limiter(max_tokens: usize) -> ResponseLimiter {
        ResponseLimiter::new(BudgetConfig {
            max_tokens,
            ..Default::default()
        })
    }

    #[test]
    fn plain_text_estimates_quarter_length() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens(&"a".repeat(400)), 100);
    }

    #[test]
    fn code_text_estimates_higher() {
        let plain = "word ".repeat(100);
        let code = "function handler(input) { const value = input; class Thing {} } ".repeat(8);

        let plain_ratio = estimate_tokens(&plain) as f64 / plain.len() as f64;
        let code_ratio = estimate_tokens(&code) as f64 / code.len() as f64;
        assert!(code_ratio > plain_ratio);
    }

    #[test]
    fn response_estimate_includes_structure_overhead() {
        let value = serde_json::json!({"key": "value", "list": [1, 2, 3]});
        let raw = estimate_tokens(&serde_json::to_string(&value).unwrap());
        let full = estimate_response_tokens(&value);
        assert!(full > raw);
    }

    #[test]
    fn everything_fits_under_generous_budget() {
        let primary = vec![chunk_of("a", "alpha content".into())];
        let related = vec![chunk_of("b", "related content".into())];
        let rels = vec![ContextRelationship {
            chunk_id: "a".into(),
            related_chunk_id: "b".into(),
            strength: 0.6,
            reason: "Keyword similarity: alpha".into(),
        }];

        let packed = limiter(20_000).pack(primary, related, rels, "reason".into(), 0.8, 3, 1);

        assert_eq!(packed.primary_chunks.len(), 1);
        assert_eq!(packed.related_chunks.len(), 1);
        assert_eq!(packed.relationships.len(), 1);
        assert!(!packed.token_limits.truncated_content);
        assert!(packed.token_limits.estimated_tokens <= 20_000);
        assert!(packed.paging.is_none());
    }

    #[test]
    fn estimated_tokens_never_exceed_max() {
        let primary: Vec<ContextChunk> = (0..30)
            .map(|i| chunk_of(&format!("c{i}"), "x".repeat(2000)))
            .collect();

        for max_tokens in [3000, 5000, 20_000] {
            let packed = limiter(max_tokens).pack(
                primary.clone(),
                Vec::new(),
                Vec::new(),
                "budget check".into(),
                0.0,
                0,
                1,
            );
            assert!(
                packed.token_limits.estimated_tokens <= max_tokens,
                "estimate {} exceeded max {max_tokens}",
                packed.token_limits.estimated_tokens
            );
        }
    }

    #[test]
    fn oversized_first_chunk_is_truncated_at_word_boundary() {
        let big = "word ".repeat(6000); // 30,000 bytes
        let packed = limiter(3000).pack(
            vec![chunk_of("big", big)],
            Vec::new(),
            Vec::new(),
            "truncation".into(),
            0.0,
            0,
            1,
        );

        assert_eq!(packed.primary_chunks.len(), 1);
        let content = &packed.primary_chunks[0].content;
        assert!(content.ends_with(TRUNCATION_MARKER));
        assert!(content.len() <= 3000 * 4 * 8 / 10 + TRUNCATION_MARKER.len());
        assert!(packed.token_limits.truncated_content);
    }

    #[test]
    fn tiny_budget_returns_empty_response() {
        let packed = limiter(600).pack(
            vec![chunk_of("a", "content".into())],
            Vec::new(),
            Vec::new(),
            "too small".into(),
            0.0,
            0,
            1,
        );

        assert!(packed.primary_chunks.is_empty());
        assert!(packed.token_limits.truncated_content);
    }

    #[test]
    fn pagination_slices_requested_page() {
        let primary: Vec<ContextChunk> = (0..25)
            .map(|i| chunk_of(&format!("c{i:02}"), "x".repeat(500)))
            .collect();

        let packed = limiter(20_000).pack(
            primary,
            Vec::new(),
            Vec::new(),
            "paging".into(),
            0.0,
            0,
            2,
        );

        assert_eq!(packed.primary_chunks.len(), 10);
        let paging = packed.paging.expect("paging block");
        assert_eq!(paging.current_page, 2);
        assert_eq!(paging.total_pages, 3);
        assert_eq!(paging.total_items, 25);
        assert!(paging.has_more);
        assert_eq!(paging.next_page_token.as_deref(), Some("primary_page_3"));
        // Page 2 starts at item 10
        assert_eq!(packed.primary_chunks[0].id, "c10");
    }

    #[test]
    fn page_out_of_range_clamps() {
        let primary: Vec<ContextChunk> = (0..25)
            .map(|i| chunk_of(&format!("c{i:02}"), "x".repeat(500)))
            .collect();

        let packed = limiter(20_000).pack(
            primary,
            Vec::new(),
            Vec::new(),
            "clamp".into(),
            0.0,
            0,
            99,
        );

        let paging = packed.paging.expect("paging block");
        assert_eq!(paging.current_page, paging.total_pages);
        assert!(!paging.has_more);
        assert!(paging.next_page_token.is_none());
    }

    #[test]
    fn related_budget_capped_at_thirty_percent() {
        let primary = vec![chunk_of("p", "small primary".into())];
        let related: Vec<ContextChunk> = (0..40)
            .map(|i| chunk_of(&format!("r{i}"), "y".repeat(2000)))
            .collect();

        let packed = limiter(10_000).pack(
            primary,
            related,
            Vec::new(),
            "related cap".into(),
            0.0,
            0,
            1,
        );

        let related_tokens = estimate_chunks_tokens(&packed.related_chunks);
        assert!(related_tokens <= 3000, "related used {related_tokens} tokens");
    }

    #[test]
    fn relationships_trimmed_to_their_slice() {
        let primary = vec![chunk_of("p", "primary".into())];
        let rels: Vec<ContextRelationship> = (0..500)
            .map(|i| ContextRelationship {
                chunk_id: format!("p{i}"),
                related_chunk_id: format!("r{i}"),
                strength: 0.5,
                reason: "Keyword similarity: something fairly long here".into(),
            })
            .collect();

        let packed = limiter(4000).pack(
            primary,
            Vec::new(),
            rels,
            "relationship cap".into(),
            0.0,
            0,
            1,
        );

        assert!(packed.relationships.len() < 500);
        assert!(packed.token_limits.truncated_content);
    }

    #[test]
    fn truncate_chunk_rejects_hopeless_budgets() {
        assert!(truncate_chunk(chunk_of("a", "text".into()), 50).is_none());
    }

    #[test]
    fn truncate_chunk_keeps_fitting_content() {
        let chunk = chunk_of("a", "short enough".into());
        let out = truncate_chunk(chunk, 1000).unwrap();
        assert_eq!(out.content, "short enough");
    }
}
