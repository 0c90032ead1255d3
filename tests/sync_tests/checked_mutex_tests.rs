//! Checked Lock Tests
//!
//! Tests verify:
//! - Self-deadlock and lock nesting panic instead of hanging
//! - Sequential acquisition of different locks is fine
//! - Condition variable waits release and reacquire ownership

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bucketkv::sync::{CheckedCondvar, CheckedMutex};

#[test]
fn test_lock_and_mutate() {
    let mutex = CheckedMutex::new("test", 1);
    {
        let mut guard = mutex.lock();
        *guard += 1;
        assert!(mutex.is_held_by_current_thread());
    }
    assert!(!mutex.is_held_by_current_thread());
    assert_eq!(*mutex.lock(), 2);
    assert_eq!(mutex.name(), "test");
}

#[test]
#[should_panic(expected = "self-deadlock")]
fn test_relock_panics() {
    let mutex = CheckedMutex::new("test", ());
    let _first = mutex.lock();
    let _second = mutex.lock();
}

#[test]
#[should_panic(expected = "lock nesting")]
fn test_nested_locks_panic() {
    let registry = CheckedMutex::new("registry", ());
    let bucket = CheckedMutex::new("bucket", ());
    let _outer = registry.lock();
    let _inner = bucket.lock();
}

#[test]
fn test_sequential_locks_allowed() {
    let registry = CheckedMutex::new("registry", 0);
    let bucket = CheckedMutex::new("bucket", 0);

    *registry.lock() += 1;
    *bucket.lock() += 1;
    *registry.lock() += 1;

    assert_eq!(*registry.lock(), 2);
    assert_eq!(*bucket.lock(), 1);
}

#[test]
fn test_other_threads_are_independent() {
    let mutex = Arc::new(CheckedMutex::new("shared", 0));
    let other = Arc::new(CheckedMutex::new("other", 0));

    let _held = other.lock();
    let handle = {
        let mutex = Arc::clone(&mutex);
        thread::spawn(move || {
            *mutex.lock() += 1;
        })
    };
    handle.join().unwrap();

    assert!(!mutex.is_held_by_current_thread());
}

#[test]
fn test_condvar_wait_releases_lock() {
    let state = Arc::new((CheckedMutex::new("state", false), CheckedCondvar::new()));

    let waiter = {
        let state = Arc::clone(&state);
        thread::spawn(move || {
            let (mutex, cond) = &*state;
            let mut ready = mutex.lock();
            cond.wait_while(&mut ready, |ready| !*ready);
            // Ownership is restored after the wait
            assert!(mutex.is_held_by_current_thread());
        })
    };

    thread::sleep(Duration::from_millis(20));
    {
        let (mutex, cond) = &*state;
        *mutex.lock() = true;
        cond.notify_all();
    }

    waiter.join().unwrap();
}
