//! Bucket Registry Tests
//!
//! Tests verify:
//! - Name validation
//! - Create / find / list semantics and reference accounting
//! - Exactly one winner among concurrent creates
//! - A name stays taken until its bucket is fully torn down

#[path = "../common/mod.rs"]
mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use bucketkv::bucket::{is_valid_bucket_name, BucketRegistry, BucketState};
use bucketkv::BucketError;

use common::{admin_session, probe_engine, probe_loader, wait_for, PROBE_ENGINE, TIMEOUT};

fn registry() -> (Arc<BucketRegistry>, Arc<common::Probe>) {
    let (loader, probe) = probe_loader();
    (BucketRegistry::new(loader), probe)
}

// =============================================================================
// Name Validation Tests
// =============================================================================

#[test]
fn test_valid_bucket_names() {
    assert!(is_valid_bucket_name("a"));
    assert!(is_valid_bucket_name("Bucket_1.prod-%20"));
}

#[test]
fn test_invalid_bucket_names() {
    assert!(!is_valid_bucket_name(""));
    assert!(!is_valid_bucket_name("has space"));
    assert!(!is_valid_bucket_name("slash/name"));
    assert!(!is_valid_bucket_name("semi;colon"));
}

#[test]
fn test_create_rejects_invalid_name() {
    let (registry, probe) = registry();

    let result = registry.create("bad name", PROBE_ENGINE, "");

    assert!(matches!(result, Err(BucketError::InvalidName(_))));
    assert_eq!(probe.created.load(std::sync::atomic::Ordering::SeqCst), 0);
}

// =============================================================================
// Create / Find Tests
// =============================================================================

#[test]
fn test_create_registers_running_bucket() {
    let (registry, _probe) = registry();

    let created = registry.create("alpha", PROBE_ENGINE, "").unwrap();

    assert_eq!(created.name(), "alpha");
    assert_eq!(created.state(), BucketState::Running);
    // Main reference + the one we hold
    assert_eq!(created.refcount(), 2);
    assert!(registry.contains("alpha"));
    assert_eq!(registry.len(), 1);

    drop(created);
    let found = registry.find("alpha").unwrap();
    assert_eq!(found.refcount(), 2);
}

#[test]
fn test_find_missing() {
    let (registry, _probe) = registry();
    assert!(registry.find("ghost").is_none());
    assert!(registry.is_empty());
}

#[test]
fn test_create_with_unknown_engine() {
    let (registry, _probe) = registry();

    let result = registry.create("alpha", "nope", "");

    assert!(matches!(result, Err(BucketError::LoadFailed(_))));
    assert!(!registry.contains("alpha"));
}

#[test]
fn test_create_with_failing_init() {
    let (registry, probe) = registry();

    let result = registry.create("alpha", PROBE_ENGINE, "fail_init=true");

    assert!(matches!(result, Err(BucketError::InitFailed(_))));
    assert!(!registry.contains("alpha"));
    assert_eq!(probe.destroys(), 1);
}

#[test]
fn test_duplicate_create() {
    let (registry, probe) = registry();
    let _first = registry.create("alpha", PROBE_ENGINE, "").unwrap();

    let result = registry.create("alpha", PROBE_ENGINE, "");

    match result {
        Err(BucketError::AlreadyExists { name, state }) => {
            assert_eq!(name, "alpha");
            assert_eq!(state, "running");
        }
        other => panic!("expected AlreadyExists, got {:?}", other.map(|b| b.name().to_string())),
    }
    // The loser's engine was destroyed with force
    assert_eq!(probe.destroys(), 1);
    assert_eq!(probe.forced_destroys.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_create_has_one_winner() {
    let (registry, probe) = registry();
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                registry.create("race", PROBE_ENGINE, "").map(drop)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    let losers = results
        .iter()
        .filter(|r| matches!(r, Err(BucketError::AlreadyExists { .. })))
        .count();

    assert_eq!(winners, 1);
    assert_eq!(losers, threads - 1);
    assert_eq!(registry.len(), 1);
    assert_eq!(probe.destroys(), threads - 1);
    assert_eq!(registry.find("race").unwrap().refcount(), 2);
}

// =============================================================================
// Listing Tests
// =============================================================================

#[test]
fn test_list_snapshot_sorted() {
    let (registry, _probe) = registry();
    for name in ["gamma", "alpha", "beta"] {
        drop(registry.create(name, PROBE_ENGINE, "").unwrap());
    }

    let names: Vec<String> = registry
        .list_snapshot()
        .iter()
        .map(|b| b.name().to_string())
        .collect();

    assert_eq!(names, vec!["alpha", "beta", "gamma"]);
}

#[test]
fn test_list_snapshot_restores_refcounts() {
    let (registry, _probe) = registry();
    drop(registry.create("a", PROBE_ENGINE, "").unwrap());
    drop(registry.create("b", PROBE_ENGINE, "").unwrap());

    let before: Vec<usize> = ["a", "b"]
        .iter()
        .map(|n| registry.find(n).unwrap().refcount())
        .collect();

    let snapshot = registry.list_snapshot();
    for bucket in &snapshot {
        assert_eq!(bucket.refcount(), 2);
    }
    drop(snapshot);

    let after: Vec<usize> = ["a", "b"]
        .iter()
        .map(|n| registry.find(n).unwrap().refcount())
        .collect();
    assert_eq!(before, after);
}

// =============================================================================
// Teardown Visibility Tests
// =============================================================================

#[test]
fn test_name_taken_until_teardown_completes() {
    let (engine, probe) = probe_engine();
    let admin = admin_session(&engine);
    engine.create_bucket(&admin, "doomed", PROBE_ENGINE, "").unwrap();

    // Keep a reference so the bucket cannot finish tearing down
    let held = engine.registry().find("doomed").unwrap();

    let pending = engine.delete_bucket(&admin, "doomed", false).unwrap();
    pending.wait_timeout(TIMEOUT).unwrap();
    assert_eq!(held.state(), BucketState::Stopped);
    assert_eq!(probe.destroys(), 1);

    // Not findable, but the name is still taken
    assert!(engine.registry().find("doomed").is_none());
    match engine.create_bucket(&admin, "doomed", PROBE_ENGINE, "") {
        Err(BucketError::AlreadyExists { state, .. }) => assert_eq!(state, "stopped"),
        other => panic!("expected AlreadyExists, got {:?}", other),
    }

    drop(held);
    assert!(wait_for(|| !engine.registry().contains("doomed")));

    engine.create_bucket(&admin, "doomed", PROBE_ENGINE, "").unwrap();
    assert_eq!(engine.registry().find("doomed").unwrap().state(), BucketState::Running);
}

#[test]
fn test_wait_until_empty() {
    let (engine, _probe) = probe_engine();
    let admin = admin_session(&engine);
    engine.create_bucket(&admin, "one", PROBE_ENGINE, "").unwrap();
    engine.create_bucket(&admin, "two", PROBE_ENGINE, "").unwrap();

    engine.on_disconnect(&admin);
    engine.shutdown(false);

    assert!(engine.registry().is_empty());
}
