//! End-to-end store and retrieve flows through the library pipeline.

mod helpers;

use aimem::chunker::Chunker;
use aimem::embedding::EmbeddingProvider;
use aimem::memory::retrieve;
use aimem::memory::store::{self, now_rfc3339};
use aimem::memory::types::{ContextChunk, Importance, TaskType};
use aimem::summarizer::Summarizer;
use helpers::{insert_chunk, spike, test_db, test_provider};

/// The full write pipeline: chunk → summarize → embed → store, then a
/// retrieval that matches on the stored content.
#[test]
fn store_and_retrieve_happy_path() {
    let conn = test_db();
    let provider = test_provider();
    let chunker = Chunker::default();
    let summarizer = Summarizer::default();

    let content = "JWT auth uses 24h tokens; refresh via httpOnly cookie";
    let pieces = chunker.chunk(content, 1024).unwrap();
    assert_eq!(pieces.len(), 1);

    for (i, piece) in pieces.iter().enumerate() {
        let now = now_rfc3339();
        let chunk = ContextChunk {
            id: format!("chunk-{i}"),
            session_id: "proj-a-main".into(),
            content: piece.content.clone(),
            summary: summarizer.summarize(&piece.content, 341).unwrap(),
            embedding: Some(provider.embed(&piece.content).unwrap()),
            relevance: Importance::High.initial_relevance(),
            importance: Importance::High,
            created_at: now.clone(),
            updated_at: now,
            ttl_deadline: None,
        };
        store::put_chunk(&conn, &chunk, 0).unwrap();
    }

    // A query matching the stored content exactly scores high
    let result = retrieve::retrieve(&conn, &provider, "proj-a-main", content, 3, None).unwrap();
    assert_eq!(result.chunks.len(), 1);
    assert_eq!(result.chunks[0].chunk.content, content);
    assert!(result.chunks[0].chunk.relevance >= 0.5);

    // A paraphrased query still returns the only chunk in the session
    let result = retrieve::retrieve(
        &conn,
        &provider,
        "proj-a-main",
        "authentication token expiry",
        3,
        None,
    )
    .unwrap();
    assert_eq!(result.chunks.len(), 1);
}

/// Task-aware boosting: with identical similarity and importance, the chunk
/// carrying debugging vocabulary must rank strictly above the other.
#[test]
fn task_aware_boosting_orders_results() {
    let conn = test_db();
    let provider = test_provider();

    // Identical embeddings so only the keyword boost separates them
    insert_chunk(
        &conn,
        "s1",
        "a",
        "Error handling: bug in login when email null",
        Importance::Medium,
        Some(spike(7)),
        0,
    );
    insert_chunk(
        &conn,
        "s1",
        "b",
        "UI style guide: buttons are blue",
        Importance::Medium,
        Some(spike(7)),
        0,
    );

    let result = retrieve::retrieve(
        &conn,
        &provider,
        "s1",
        "login returns 500",
        2,
        Some(TaskType::Debugging),
    )
    .unwrap();

    assert_eq!(result.chunks.len(), 2);
    assert_eq!(result.chunks[0].chunk.id, "a");
    assert!(result.chunks[0].score > result.chunks[1].score);
}

#[test]
fn retrieval_from_unknown_session_is_empty() {
    let conn = test_db();
    let provider = test_provider();

    let result =
        retrieve::retrieve(&conn, &provider, "never-seen", "any query", 5, None).unwrap();
    assert!(result.chunks.is_empty());
}

#[test]
fn reinsertion_with_same_id_replaces_atomically() {
    let conn = test_db();

    insert_chunk(&conn, "s1", "same-id", "first version", Importance::Low, None, 0);
    insert_chunk(&conn, "s1", "same-id", "second version", Importance::Low, None, 0);

    let fetched = store::get_chunk(&conn, "same-id").unwrap();
    assert_eq!(fetched.content, "second version");
    assert_eq!(store::scan_session(&conn, "s1").unwrap().len(), 1);
}

#[test]
fn auto_expansion_links_keyword_neighbors() {
    let conn = test_db();
    let provider = test_provider();

    let primary_text = "deployment pipeline deployment pipeline rollout";
    insert_chunk(&conn, "s1", "prim", primary_text, Importance::High, None, 0);
    // Stored under the exact keyword so the keyword scan hits it
    insert_chunk(&conn, "s1", "neigh", "deployment", Importance::Medium, None, 0);

    let retrieval =
        retrieve::retrieve(&conn, &provider, "s1", primary_text, 1, None).unwrap();
    assert_eq!(retrieval.chunks[0].chunk.id, "prim");

    let (related, relationships) =
        retrieve::expand_related(&conn, &provider, "s1", &retrieval.chunks, 4).unwrap();

    assert_eq!(related.len(), 1);
    assert_eq!(related[0].id, "neigh");
    assert_eq!(relationships.len(), 1);
    assert!(relationships[0]
        .reason
        .starts_with("Keyword similarity:"));
}
