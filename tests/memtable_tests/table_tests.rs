//! MemTable Tests
//!
//! Tests verify:
//! - Basic put/get/remove
//! - Size tracking
//! - Read-modify-write through `update`
//! - Sorted iteration
//! - Concurrent access patterns

use std::sync::Arc;
use std::thread;

use bucketkv::backend::Item;
use bucketkv::memtable::MemTable;

fn item(key: &str, value: &str) -> Item {
    Item::new(key.as_bytes().to_vec(), value.as_bytes().to_vec())
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let memtable = MemTable::new();
    assert_eq!(memtable.entry_count(), 0);
    assert_eq!(memtable.size(), 0);
    assert!(memtable.is_empty());
}

#[test]
fn test_put_and_get() {
    let memtable = MemTable::new();

    memtable.put(item("key1", "value1"));

    let result = memtable.get(b"key1").unwrap();
    assert_eq!(result.value, b"value1".to_vec());
}

#[test]
fn test_get_nonexistent_key() {
    let memtable = MemTable::new();
    assert_eq!(memtable.get(b"nonexistent"), None);
}

#[test]
fn test_put_overwrites() {
    let memtable = MemTable::new();

    memtable.put(item("key", "old"));
    memtable.put(item("key", "new"));

    assert_eq!(memtable.entry_count(), 1);
    assert_eq!(memtable.get(b"key").unwrap().value, b"new".to_vec());
}

#[test]
fn test_remove() {
    let memtable = MemTable::new();
    memtable.put(item("key", "value"));

    let removed = memtable.remove(b"key").unwrap();

    assert_eq!(removed.value, b"value".to_vec());
    assert_eq!(memtable.get(b"key"), None);
    assert_eq!(memtable.size(), 0);
    assert_eq!(memtable.remove(b"key"), None);
}

// =============================================================================
// Size Tracking Tests
// =============================================================================

#[test]
fn test_size_tracks_footprint() {
    let memtable = MemTable::new();
    let first = item("a", "1234");
    let footprint = MemTable::item_footprint(&first);

    let size = memtable.put(first);

    assert_eq!(size, footprint);
    assert_eq!(memtable.size(), footprint);
}

#[test]
fn test_size_after_overwrite() {
    let memtable = MemTable::new();
    memtable.put(item("a", "long value here"));
    memtable.put(item("a", "x"));

    assert_eq!(memtable.size(), MemTable::item_footprint(&item("a", "x")));
}

// =============================================================================
// Update Tests
// =============================================================================

#[test]
fn test_update_inserts_when_absent() {
    let memtable = MemTable::new();

    let was_absent = memtable.update(b"k", |slot| {
        let absent = slot.is_none();
        *slot = Some(item("k", "v"));
        absent
    });

    assert!(was_absent);
    assert_eq!(memtable.get(b"k").unwrap().value, b"v".to_vec());
    assert_eq!(memtable.size(), MemTable::item_footprint(&item("k", "v")));
}

#[test]
fn test_update_can_clear() {
    let memtable = MemTable::new();
    memtable.put(item("k", "v"));

    memtable.update(b"k", |slot| *slot = None);

    assert!(memtable.is_empty());
    assert_eq!(memtable.size(), 0);
}

#[test]
fn test_update_leaves_entry_untouched() {
    let memtable = MemTable::new();
    memtable.put(item("k", "v"));
    let before = memtable.size();

    let value = memtable.update(b"k", |slot| slot.as_ref().map(|i| i.value.clone()));

    assert_eq!(value, Some(b"v".to_vec()));
    assert_eq!(memtable.size(), before);
    assert_eq!(memtable.entry_count(), 1);
}

// =============================================================================
// Iteration and Clear Tests
// =============================================================================

#[test]
fn test_iter_is_sorted() {
    let memtable = MemTable::new();
    memtable.put(item("c", "3"));
    memtable.put(item("a", "1"));
    memtable.put(item("b", "2"));

    let keys: Vec<Vec<u8>> = memtable.iter().map(|i| i.key).collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn test_clear() {
    let memtable = MemTable::new();
    memtable.put(item("a", "1"));
    memtable.put(item("b", "2"));

    memtable.clear();

    assert!(memtable.is_empty());
    assert_eq!(memtable.size(), 0);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_updates_are_serialized() {
    let memtable = Arc::new(MemTable::new());
    memtable.put(item("counter", "0"));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let memtable = Arc::clone(&memtable);
            thread::spawn(move || {
                for _ in 0..100 {
                    memtable.update(b"counter", |slot| {
                        let current = slot.as_mut().unwrap();
                        let n: u64 = String::from_utf8_lossy(&current.value).parse().unwrap();
                        current.value = (n + 1).to_string().into_bytes();
                    });
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(memtable.get(b"counter").unwrap().value, b"800".to_vec());
}
