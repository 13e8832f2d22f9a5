//! Budget-packing scenarios: truncation and pagination end to end.

mod helpers;

use aimem::memory::budget::{BudgetConfig, ResponseLimiter};
use aimem::memory::retrieve;
use aimem::memory::types::Importance;
use helpers::{insert_chunk, spike, test_db, test_provider};

fn limiter(max_tokens: usize) -> ResponseLimiter {
    ResponseLimiter::new(BudgetConfig {
        max_tokens,
        ..Default::default()
    })
}

/// A 30,000-byte chunk packed into a 3,000-token budget comes back truncated
/// at a word boundary with the marker appended.
#[test]
fn oversized_chunk_is_truncated_within_budget() {
    let conn = test_db();
    let provider = test_provider();

    let big_content = "word ".repeat(6000);
    insert_chunk(&conn, "s1", "big", &big_content, Importance::High, None, 0);

    let retrieval = retrieve::retrieve(&conn, &provider, "s1", "word", 5, None).unwrap();
    let primary: Vec<_> = retrieval.chunks.into_iter().map(|c| c.chunk).collect();

    let packed = limiter(3000).pack(
        primary,
        Vec::new(),
        Vec::new(),
        "truncation scenario".into(),
        0.0,
        0,
        1,
    );

    assert_eq!(packed.primary_chunks.len(), 1);
    let content = &packed.primary_chunks[0].content;
    assert!(content.ends_with("... [truncated]"));
    assert!(content.len() <= 3000 * 4 * 8 / 10 + "... [truncated]".len());
    assert!(packed.token_limits.truncated_content);
    assert!(packed.token_limits.estimated_tokens <= 3000);
}

/// 25 stored chunks, page 2 of 10 → exactly the second slice with a full
/// paging block.
#[test]
fn pagination_returns_requested_page() {
    let conn = test_db();
    let provider = test_provider();

    for i in 0..25 {
        let content = format!("{:<500}", format!("chunk number {i} payload"));
        insert_chunk(
            &conn,
            "s1",
            &format!("c{i:02}"),
            &content,
            Importance::Medium,
            Some(spike(i)),
            0,
        );
    }

    let retrieval = retrieve::retrieve(&conn, &provider, "s1", "payload", 25, None).unwrap();
    assert_eq!(retrieval.chunks.len(), 25);
    let primary: Vec<_> = retrieval.chunks.into_iter().map(|c| c.chunk).collect();

    let packed = limiter(20_000).pack(
        primary,
        Vec::new(),
        Vec::new(),
        "pagination scenario".into(),
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
}

/// The estimate reported in token_limits never exceeds the requested budget.
#[test]
fn estimate_stays_under_budget_across_sizes() {
    let conn = test_db();
    let provider = test_provider();

    for i in 0..12 {
        insert_chunk(
            &conn,
            "s1",
            &format!("c{i}"),
            &"content body ".repeat(200),
            Importance::Medium,
            Some(spike(i)),
            0,
        );
    }

    let retrieval = retrieve::retrieve(&conn, &provider, "s1", "content", 12, None).unwrap();
    let primary: Vec<_> = retrieval.chunks.into_iter().map(|c| c.chunk).collect();

    for budget in [2000, 4000, 8000, 20_000] {
        let packed = limiter(budget).pack(
            primary.clone(),
            Vec::new(),
            Vec::new(),
            "budget invariant".into(),
            0.0,
            0,
            1,
        );
        assert!(
            packed.token_limits.estimated_tokens <= budget,
            "estimate {} exceeded {budget}",
            packed.token_limits.estimated_tokens
        );
    }
}

/// Related chunks and relationships survive packing under a generous budget.
#[test]
fn expansion_output_packs_all_sections() {
    let conn = test_db();
    let provider = test_provider();

    let primary_text = "caching layer caching layer eviction";
    insert_chunk(&conn, "s1", "prim", primary_text, Importance::High, None, 0);
    insert_chunk(&conn, "s1", "rel", "caching", Importance::Medium, None, 0);

    let retrieval =
        retrieve::retrieve(&conn, &provider, "s1", primary_text, 1, None).unwrap();
    let (related, relationships) =
        retrieve::expand_related(&conn, &provider, "s1", &retrieval.chunks, 4).unwrap();
    assert_eq!(related.len(), 1);
    let primary: Vec<_> = retrieval.chunks.into_iter().map(|c| c.chunk).collect();

    let packed = limiter(20_000).pack(
        primary,
        related,
        relationships,
        "expansion scenario".into(),
        1.0,
        1,
        1,
    );

    assert_eq!(packed.primary_chunks.len(), 1);
    assert_eq!(packed.related_chunks.len(), 1);
    assert_eq!(packed.relationships.len(), 1);
    assert!(!packed.token_limits.truncated_content);
}
