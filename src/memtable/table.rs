//! MemTable implementation
//!
//! BTreeMap-based item table with RwLock for concurrency.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::backend::Item;

/// Per-entry bookkeeping overhead counted towards `size()`
const ENTRY_OVERHEAD: usize = 48;

/// In-memory table of items
pub struct MemTable {
    data: RwLock<BTreeMap<Vec<u8>, Item>>,

    /// Approximate size in bytes (keys + values + overhead)
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Footprint of an item as counted by `size()`
    pub fn item_footprint(item: &Item) -> usize {
        item.key.len() + item.value.len() + ENTRY_OVERHEAD
    }

    /// Get a copy of the item stored under `key` (read lock)
    pub fn get(&self, key: &[u8]) -> Option<Item> {
        self.data.read().get(key).cloned()
    }

    /// Insert or replace an item (write lock). Returns the new table size.
    pub fn put(&self, item: Item) -> usize {
        let mut data = self.data.write();
        let added = Self::item_footprint(&item);
        if let Some(old) = data.insert(item.key.clone(), item) {
            self.size.fetch_sub(Self::item_footprint(&old), Ordering::SeqCst);
        }
        self.size.fetch_add(added, Ordering::SeqCst) + added
    }

    /// Remove an item (write lock)
    pub fn remove(&self, key: &[u8]) -> Option<Item> {
        let removed = self.data.write().remove(key);
        if let Some(old) = &removed {
            self.size.fetch_sub(Self::item_footprint(old), Ordering::SeqCst);
        }
        removed
    }

    /// Read-modify-write one key under the write lock
    ///
    /// `f` sees the current entry (or `None`) and may replace, update or
    /// clear it. Whatever is left in the slot is written back.
    pub fn update<R>(&self, key: &[u8], f: impl FnOnce(&mut Option<Item>) -> R) -> R {
        let mut data = self.data.write();

        let mut slot = data.remove(key);
        let before = slot.as_ref().map(Self::item_footprint).unwrap_or(0);

        let result = f(&mut slot);

        let after = slot.as_ref().map(Self::item_footprint).unwrap_or(0);
        if let Some(item) = slot {
            data.insert(item.key.clone(), item);
        }

        // Apply the delta while still holding the write lock
        if after >= before {
            self.size.fetch_add(after - before, Ordering::SeqCst);
        } else {
            self.size.fetch_sub(before - after, Ordering::SeqCst);
        }

        result
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Snapshot of all items in sorted key order
    pub fn iter(&self) -> std::vec::IntoIter<Item> {
        self.data.read().values().cloned().collect::<Vec<_>>().into_iter()
    }

    /// Clear all entries
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::SeqCst);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
