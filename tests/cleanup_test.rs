//! Cleanup sweep scenarios: TTL expiry, sweep bounds, smart manager.

mod helpers;

use aimem::memory::cleanup::{self, cleanup_ratio};
use aimem::memory::store;
use aimem::memory::types::{CleanupStrategy, Importance, MemoryStrategy, SessionPhase};
use helpers::{insert_chunk, test_db};
use std::time::Duration;

/// Three chunks with a 1-second TTL are all gone after expiry — the TTL
/// sweep is exempt from the live-chunk 50% bound.
#[test]
fn ttl_cleanup_removes_expired_chunks() {
    let conn = test_db();
    for i in 0..3 {
        insert_chunk(
            &conn,
            "s1",
            &format!("c{i}"),
            "short-lived context",
            Importance::Medium,
            None,
            1,
        );
    }

    std::thread::sleep(Duration::from_secs(2));

    let result = cleanup::cleanup_session(&conn, "s1", CleanupStrategy::Ttl).unwrap();
    assert_eq!(result.chunks_removed, 3);
    assert_eq!(result.remaining_chunks, 0);
}

#[test]
fn ttl_cleanup_is_noop_without_expired_chunks() {
    let conn = test_db();
    insert_chunk(&conn, "s1", "live", "long-lived", Importance::Medium, None, 3600);

    let result = cleanup::cleanup_session(&conn, "s1", CleanupStrategy::Ttl).unwrap();
    assert_eq!(result.chunks_removed, 0);
    assert_eq!(result.remaining_chunks, 1);
}

/// Expired chunks are invisible to reads even before the sweep runs.
#[test]
fn expired_chunks_invisible_before_eviction() {
    let conn = test_db();
    insert_chunk(&conn, "s1", "gone", "expiring", Importance::Low, None, 1);

    std::thread::sleep(Duration::from_secs(2));

    assert!(store::get_chunk(&conn, "gone").is_err());
    assert!(store::scan_session(&conn, "s1").unwrap().is_empty());
}

/// Every live-chunk strategy removes at most half the session per call.
#[test]
fn sweeps_never_remove_more_than_half() {
    for strategy in [CleanupStrategy::Lru, CleanupStrategy::Relevance] {
        let conn = test_db();
        for i in 0..7 {
            insert_chunk(
                &conn,
                "s1",
                &format!("c{i}"),
                "sweep candidate",
                Importance::Low,
                None,
                0,
            );
        }

        let result = cleanup::cleanup_session(&conn, "s1", strategy).unwrap();
        assert!(
            result.chunks_removed <= 3,
            "{:?} removed {} of 7",
            strategy,
            result.chunks_removed
        );
        assert_eq!(result.remaining_chunks, 7 - result.chunks_removed);
    }
}

#[test]
fn cleanup_reports_bytes_freed() {
    let conn = test_db();
    for i in 0..4 {
        insert_chunk(
            &conn,
            "s1",
            &format!("c{i}"),
            &"x".repeat(100),
            Importance::Low,
            None,
            0,
        );
    }

    let result = cleanup::cleanup_session(&conn, "s1", CleanupStrategy::Relevance).unwrap();
    assert_eq!(result.chunks_removed, 2);
    assert_eq!(result.bytes_freed, 200);
}

/// The phase × strategy ratio table drives how much the smart manager sweeps.
#[test]
fn smart_manager_follows_ratio_table() {
    let conn = test_db();
    for i in 0..20 {
        insert_chunk(
            &conn,
            "s1",
            &format!("c{i}"),
            "smart sweep candidate",
            Importance::Low,
            None,
            0,
        );
    }

    // aggressive × testing = 0.40 → 8 of 20
    let result = cleanup::smart_memory_sweep(
        &conn,
        "s1",
        SessionPhase::Testing,
        MemoryStrategy::Aggressive,
        false,
    )
    .unwrap();
    assert_eq!(result.chunks_cleaned, 8);
    assert_eq!(result.chunks_remaining, 12);
}

#[test]
fn smart_manager_preserves_high_importance() {
    let conn = test_db();
    for i in 0..10 {
        insert_chunk(
            &conn,
            "s1",
            &format!("low{i}"),
            "disposable",
            Importance::Low,
            None,
            0,
        );
    }
    insert_chunk(&conn, "s1", "vital", "critical decision", Importance::High, None, 0);

    cleanup::smart_memory_sweep(
        &conn,
        "s1",
        SessionPhase::Analysis,
        MemoryStrategy::Aggressive,
        true,
    )
    .unwrap();

    assert!(store::get_chunk(&conn, "vital").is_ok());
}

#[test]
fn conservative_deployment_is_a_no_op() {
    assert_eq!(
        cleanup_ratio(MemoryStrategy::Conservative, SessionPhase::Deployment),
        0.0
    );

    let conn = test_db();
    for i in 0..10 {
        insert_chunk(
            &conn,
            "s1",
            &format!("c{i}"),
            "untouched",
            Importance::Low,
            None,
            0,
        );
    }

    let result = cleanup::smart_memory_sweep(
        &conn,
        "s1",
        SessionPhase::Deployment,
        MemoryStrategy::Conservative,
        true,
    )
    .unwrap();
    assert_eq!(result.chunks_cleaned, 0);
    assert_eq!(result.chunks_remaining, 10);
}
