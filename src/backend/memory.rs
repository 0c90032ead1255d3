//! Built-in in-memory engine
//!
//! Registered as `memory` in the default [`BackendLoader`](super::BackendLoader).
//!
//! ## Config keys
//! - `cache_size` (size): total byte budget, 0 for unlimited
//! - `item_size_max` (size): largest single value accepted
//! - `notify_disconnect` (bool): count disconnects of bound connections
//!
//! Expiry times are stored and reported but not enforced.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ConfigMap;
use crate::error::{EngineError, EngineResult};
use crate::memtable::MemTable;
use crate::session::Session;

use super::{
    AddStat, Arithmetic, ArithmeticResult, EngineCallbacks, Item, RawRequest, StorageEngine,
    StoreOperation, TapEvent, TapIterator, TapNotify, TapRequest,
};

/// Opcode answered by `unknown_command` with the request body
pub const ECHO_OPCODE: u8 = 0xe0;

const DEFAULT_ITEM_SIZE_MAX: u64 = 1024 * 1024;

/// Engine-level counters
#[derive(Default)]
struct Counters {
    cmd_get: AtomicU64,
    get_hits: AtomicU64,
    get_misses: AtomicU64,
    cmd_set: AtomicU64,
    delete_hits: AtomicU64,
    delete_misses: AtomicU64,
    incr_hits: AtomicU64,
    decr_hits: AtomicU64,
    cmd_flush: AtomicU64,
    disconnects: Arc<AtomicU64>,
}

/// In-memory storage engine
pub struct MemoryEngine {
    table: MemTable,
    next_cas: AtomicU64,

    /// Byte budget (0 = unlimited)
    cache_size: AtomicU64,
    item_size_max: AtomicU64,

    counters: Counters,
    destroyed: AtomicBool,

    /// Last error text, reported through `errinfo`
    last_error: Mutex<Option<String>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            table: MemTable::new(),
            next_cas: AtomicU64::new(1),
            cache_size: AtomicU64::new(0),
            item_size_max: AtomicU64::new(DEFAULT_ITEM_SIZE_MAX),
            counters: Counters::default(),
            destroyed: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    /// True once `destroy` has run
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn item_count(&self) -> usize {
        self.table.entry_count()
    }

    fn next_cas(&self) -> u64 {
        self.next_cas.fetch_add(1, Ordering::SeqCst)
    }

    fn fail<T>(&self, err: EngineError) -> EngineResult<T> {
        *self.last_error.lock() = Some(err.to_string());
        Err(err)
    }

    /// Reject values that can never fit
    fn check_item_size(&self, value_len: usize) -> EngineResult<()> {
        if value_len as u64 > self.item_size_max.load(Ordering::Relaxed) {
            return self.fail(EngineError::TooBig);
        }
        Ok(())
    }

    /// Reject writes that would push the table past `cache_size`
    fn check_budget(&self, incoming: &Item, replaced: Option<&Item>) -> EngineResult<()> {
        let limit = self.cache_size.load(Ordering::Relaxed) as usize;
        if limit == 0 {
            return Ok(());
        }
        let freed = replaced.map(MemTable::item_footprint).unwrap_or(0);
        let projected = (self.table.size() + MemTable::item_footprint(incoming)).saturating_sub(freed);
        if projected > limit {
            return self.fail(EngineError::OutOfMemory);
        }
        Ok(())
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for MemoryEngine {
    fn description(&self) -> &str {
        "Memory engine v1"
    }

    fn initialize(&self, config: &str, callbacks: &mut EngineCallbacks) -> EngineResult<()> {
        let map = ConfigMap::parse_with_files(config)
            .map_err(|e| EngineError::InvalidArguments(e.to_string()))?;
        let invalid = |e: crate::error::BucketError| EngineError::InvalidArguments(e.to_string());

        if let Some(size) = map.size("cache_size").map_err(invalid)? {
            self.cache_size.store(size, Ordering::Relaxed);
        }
        if let Some(size) = map.size("item_size_max").map_err(invalid)? {
            self.item_size_max.store(size, Ordering::Relaxed);
        }
        if map.bool("notify_disconnect").map_err(invalid)?.unwrap_or(false) {
            let disconnects = Arc::clone(&self.counters.disconnects);
            callbacks.register_disconnect(Arc::new(move |_session: &Session| {
                disconnects.fetch_add(1, Ordering::Relaxed);
            }));
        }

        tracing::debug!(
            "Memory engine initialized (cache_size={}, item_size_max={})",
            self.cache_size.load(Ordering::Relaxed),
            self.item_size_max.load(Ordering::Relaxed)
        );
        Ok(())
    }

    fn destroy(&self, force: bool) {
        tracing::debug!(
            "Memory engine destroyed (force={}, items={})",
            force,
            self.table.entry_count()
        );
        self.table.clear();
        self.destroyed.store(true, Ordering::SeqCst);
    }

    fn allocate(
        &self,
        _session: &Session,
        key: &[u8],
        nbytes: usize,
        flags: u32,
        exptime: u32,
    ) -> EngineResult<Item> {
        self.check_item_size(nbytes)?;
        Ok(Item {
            key: key.to_vec(),
            value: vec![0; nbytes],
            flags,
            exptime,
            cas: 0,
        })
    }

    fn get(&self, _session: &Session, key: &[u8]) -> EngineResult<Item> {
        self.counters.cmd_get.fetch_add(1, Ordering::Relaxed);
        match self.table.get(key) {
            Some(item) => {
                self.counters.get_hits.fetch_add(1, Ordering::Relaxed);
                Ok(item)
            }
            None => {
                self.counters.get_misses.fetch_add(1, Ordering::Relaxed);
                self.fail(EngineError::KeyNotFound)
            }
        }
    }

    fn store(&self, _session: &Session, item: &Item, operation: StoreOperation) -> EngineResult<u64> {
        self.counters.cmd_set.fetch_add(1, Ordering::Relaxed);
        self.check_item_size(item.value.len())?;

        let result = self.table.update(&item.key, |slot| {
            let mut next = match (operation, slot.as_ref()) {
                (StoreOperation::Add, Some(_)) => return Err(EngineError::NotStored),
                (StoreOperation::Replace, None)
                | (StoreOperation::Append, None)
                | (StoreOperation::Prepend, None) => return Err(EngineError::NotStored),
                (StoreOperation::Cas, None) => return Err(EngineError::KeyNotFound),
                (StoreOperation::Cas, Some(current)) if current.cas != item.cas => {
                    return Err(EngineError::KeyExists)
                }
                (StoreOperation::Append, Some(current)) => {
                    let mut merged = current.clone();
                    merged.value.extend_from_slice(&item.value);
                    merged
                }
                (StoreOperation::Prepend, Some(current)) => {
                    let mut merged = current.clone();
                    let mut value = item.value.clone();
                    value.extend_from_slice(&current.value);
                    merged.value = value;
                    merged
                }
                _ => item.clone(),
            };

            self.check_item_size(next.value.len())?;
            self.check_budget(&next, slot.as_ref())?;

            next.cas = self.next_cas();
            let cas = next.cas;
            *slot = Some(next);
            Ok(cas)
        });

        match result {
            Ok(cas) => Ok(cas),
            Err(e) => self.fail(e),
        }
    }

    fn remove(&self, _session: &Session, key: &[u8], cas: u64) -> EngineResult<()> {
        let result = self.table.update(key, |slot| match slot.as_ref() {
            None => Err(EngineError::KeyNotFound),
            Some(current) if cas != 0 && current.cas != cas => Err(EngineError::KeyExists),
            Some(_) => {
                *slot = None;
                Ok(())
            }
        });

        match result {
            Ok(()) => {
                self.counters.delete_hits.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.counters.delete_misses.fetch_add(1, Ordering::Relaxed);
                self.fail(e)
            }
        }
    }

    fn arithmetic(&self, _session: &Session, request: &Arithmetic) -> EngineResult<ArithmeticResult> {
        let result = self.table.update(&request.key, |slot| {
            let value = match slot.as_ref() {
                None if !request.create => return Err(EngineError::KeyNotFound),
                None => request.initial,
                Some(current) => {
                    let text = std::str::from_utf8(&current.value)
                        .map_err(|_| EngineError::DeltaBadValue)?;
                    let current_value: u64 =
                        text.trim().parse().map_err(|_| EngineError::DeltaBadValue)?;
                    if request.increment {
                        current_value.wrapping_add(request.delta)
                    } else {
                        current_value.saturating_sub(request.delta)
                    }
                }
            };

            let mut next = slot.clone().unwrap_or_else(|| Item {
                key: request.key.clone(),
                exptime: request.exptime,
                ..Default::default()
            });
            next.value = value.to_string().into_bytes();
            next.cas = self.next_cas();

            let outcome = ArithmeticResult {
                value,
                cas: next.cas,
            };
            *slot = Some(next);
            Ok(outcome)
        });

        match result {
            Ok(outcome) => {
                let counter = if request.increment {
                    &self.counters.incr_hits
                } else {
                    &self.counters.decr_hits
                };
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(outcome)
            }
            Err(e) => self.fail(e),
        }
    }

    fn flush(&self, _session: &Session, _when: u64) -> EngineResult<()> {
        self.counters.cmd_flush.fetch_add(1, Ordering::Relaxed);
        self.table.clear();
        Ok(())
    }

    fn get_stats(&self, _session: &Session, key: &str, add_stat: AddStat<'_>) -> EngineResult<()> {
        match key {
            "" => {
                let c = &self.counters;
                add_stat("curr_items", &self.table.entry_count().to_string());
                add_stat("bytes", &self.table.size().to_string());
                add_stat("limit_maxbytes", &self.cache_size.load(Ordering::Relaxed).to_string());
                add_stat("cmd_get", &c.cmd_get.load(Ordering::Relaxed).to_string());
                add_stat("get_hits", &c.get_hits.load(Ordering::Relaxed).to_string());
                add_stat("get_misses", &c.get_misses.load(Ordering::Relaxed).to_string());
                add_stat("cmd_set", &c.cmd_set.load(Ordering::Relaxed).to_string());
                add_stat("delete_hits", &c.delete_hits.load(Ordering::Relaxed).to_string());
                add_stat("delete_misses", &c.delete_misses.load(Ordering::Relaxed).to_string());
                add_stat("incr_hits", &c.incr_hits.load(Ordering::Relaxed).to_string());
                add_stat("decr_hits", &c.decr_hits.load(Ordering::Relaxed).to_string());
                add_stat("cmd_flush", &c.cmd_flush.load(Ordering::Relaxed).to_string());
                add_stat("disconnects", &c.disconnects.load(Ordering::Relaxed).to_string());
                Ok(())
            }
            "items" => {
                add_stat("items:count", &self.table.entry_count().to_string());
                Ok(())
            }
            _ => Err(EngineError::KeyNotFound),
        }
    }

    fn reset_stats(&self, _session: &Session) {
        let c = &self.counters;
        for counter in [
            &c.cmd_get,
            &c.get_hits,
            &c.get_misses,
            &c.cmd_set,
            &c.delete_hits,
            &c.delete_misses,
            &c.incr_hits,
            &c.decr_hits,
            &c.cmd_flush,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn unknown_command(&self, _session: &Session, request: &RawRequest) -> EngineResult<Vec<u8>> {
        if request.opcode == ECHO_OPCODE {
            return Ok(request.body.clone());
        }
        self.fail(EngineError::NotSupported)
    }

    fn tap_notify(&self, _session: &Session, notify: &TapNotify) -> EngineResult<()> {
        match &notify.event {
            TapEvent::Mutation(item) => {
                let mut item = item.clone();
                item.cas = self.next_cas();
                self.table.put(item);
            }
            TapEvent::Deletion(key) => {
                self.table.remove(key);
            }
            TapEvent::Flush => self.table.clear(),
            TapEvent::Opaque(_) | TapEvent::Noop | TapEvent::Pause => {}
            TapEvent::Disconnect => return self.fail(EngineError::InvalidArguments(
                "cannot push a disconnect event".to_string(),
            )),
        }
        Ok(())
    }

    fn get_tap_iterator(
        &self,
        _session: &Session,
        _request: &TapRequest,
    ) -> Option<Arc<dyn TapIterator>> {
        Some(Arc::new(DumpIterator {
            items: Mutex::new(self.table.iter()),
        }))
    }

    fn errinfo(&self, _session: &Session) -> Option<String> {
        self.last_error.lock().clone()
    }
}

/// Tap cursor that streams a snapshot of the table, then disconnects
struct DumpIterator {
    items: Mutex<std::vec::IntoIter<Item>>,
}

impl TapIterator for DumpIterator {
    fn next_event(&self, _session: &Session) -> TapEvent {
        match self.items.lock().next() {
            Some(item) => TapEvent::Mutation(item),
            None => TapEvent::Disconnect,
        }
    }
}
