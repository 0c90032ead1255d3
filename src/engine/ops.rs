//! Forwarded operations
//!
//! Every call here goes through the dispatcher envelope and returns the
//! engine's result verbatim. A session with no usable bucket gets
//! `BucketError::Disconnected`.

use std::sync::Arc;

use crate::backend::{
    AddStat, Arithmetic, ArithmeticResult, Item, ItemInfo, RawRequest, StoreOperation, TapEvent,
    TapNotify, TapRequest,
};
use crate::error::{BucketError, Result};
use crate::session::Session;
use crate::stats::{BucketStats, OpKind, StatsSnapshot};

use super::BucketEngine;

/// Stats group that lists bucket states instead of forwarding
pub const BUCKET_STATS_KEY: &str = "bucket";

impl BucketEngine {
    pub fn allocate(
        &self,
        session: &Session,
        key: &[u8],
        nbytes: usize,
        flags: u32,
        exptime: u32,
    ) -> Result<Item> {
        self.dispatcher.forward(session, OpKind::Allocate, |engine| {
            engine.allocate(session, key, nbytes, flags, exptime)
        })
    }

    pub fn get(&self, session: &Session, key: &[u8]) -> Result<Item> {
        self.dispatcher
            .forward(session, OpKind::Get, |engine| engine.get(session, key))
    }

    /// Store an item, returning its new CAS
    pub fn store(&self, session: &Session, item: &Item, operation: StoreOperation) -> Result<u64> {
        self.dispatcher.forward(session, OpKind::Store, |engine| {
            engine.store(session, item, operation)
        })
    }

    pub fn remove(&self, session: &Session, key: &[u8], cas: u64) -> Result<()> {
        self.dispatcher
            .forward(session, OpKind::Remove, |engine| engine.remove(session, key, cas))
    }

    /// Hand an item back to the engine. Dropped silently when disconnected.
    pub fn release_item(&self, session: &Session, item: Item) {
        self.dispatcher
            .forward_infallible(session, OpKind::Other, |engine| engine.release(session, item));
    }

    pub fn arithmetic(&self, session: &Session, request: &Arithmetic) -> Result<ArithmeticResult> {
        self.dispatcher.forward(session, OpKind::Arithmetic, |engine| {
            engine.arithmetic(session, request)
        })
    }

    pub fn flush(&self, session: &Session, when: u64) -> Result<()> {
        self.dispatcher
            .forward(session, OpKind::Flush, |engine| engine.flush(session, when))
    }

    /// Collect stats for `key`
    ///
    /// - `"bucket"`: admin only, `name -> state` for every bucket
    /// - `""`: engine stats plus `bucket_conns` and `bucket_active_conns`
    /// - anything else: forwarded
    pub fn get_stats(&self, session: &Session, key: &str, add_stat: AddStat<'_>) -> Result<()> {
        if key == BUCKET_STATS_KEY {
            for (name, state) in self.bucket_state_stats(session)? {
                add_stat(&name, &state);
            }
            return Ok(());
        }

        let guard = self
            .dispatcher
            .acquire(session, false)
            .ok_or(BucketError::Disconnected)?;
        guard.bucket().stats().record(OpKind::Stats);
        let result = guard.engine().get_stats(session, key, &mut *add_stat);

        if key.is_empty() {
            let (refcount, clients) = guard.bucket().counts();
            // Minus the main reference and this call's own reference
            add_stat("bucket_conns", &refcount.saturating_sub(2).to_string());
            add_stat("bucket_active_conns", &clients.to_string());
        }
        drop(guard);
        result.map_err(BucketError::from)
    }

    pub fn reset_stats(&self, session: &Session) {
        self.dispatcher
            .forward_infallible(session, OpKind::Stats, |engine| engine.reset_stats(session));
    }

    /// The stats handle of the session's bucket
    pub fn stats_struct(&self, session: &Session) -> Option<Arc<BucketStats>> {
        let guard = self.dispatcher.acquire(session, false)?;
        Some(Arc::clone(guard.bucket().stats()))
    }

    /// Visit the stats handle of every listed bucket and return the totals
    pub fn aggregate_stats(&self, mut visit: impl FnMut(&str, &StatsSnapshot)) -> StatsSnapshot {
        let mut total = StatsSnapshot::default();
        for bucket in self.registry.list_snapshot() {
            let snapshot = bucket.stats().snapshot();
            visit(bucket.name(), &snapshot);
            total.merge(&snapshot);
        }
        total
    }

    /// Forward a command the supervisor does not interpret
    pub fn unknown_command(&self, session: &Session, request: &RawRequest) -> Result<Vec<u8>> {
        self.dispatcher.forward(session, OpKind::Other, |engine| {
            engine.unknown_command(session, request)
        })
    }

    pub fn tap_notify(&self, session: &Session, notify: &TapNotify) -> Result<()> {
        self.dispatcher
            .forward(session, OpKind::Tap, |engine| engine.tap_notify(session, notify))
    }

    /// Open a tap stream on the session's bucket
    ///
    /// The cursor is kept on the bucket; pull events with
    /// [`tap_next`](Self::tap_next). Returns false if the engine has no
    /// stream to offer.
    pub fn get_tap_iterator(&self, session: &Session, request: &TapRequest) -> Result<bool> {
        let guard = self
            .dispatcher
            .acquire(session, false)
            .ok_or(BucketError::Disconnected)?;
        guard.bucket().stats().record(OpKind::Tap);
        let iterator = guard.engine().get_tap_iterator(session, request);
        let opened = iterator.is_some();
        guard.bucket().set_tap_iterator(iterator);
        Ok(opened)
    }

    /// Next event from the bucket's tap cursor
    pub fn tap_next(&self, session: &Session) -> TapEvent {
        let Some(guard) = self.dispatcher.acquire(session, false) else {
            return TapEvent::Disconnect;
        };
        match guard.bucket().tap_iterator() {
            Some(iterator) => iterator.next_event(session),
            None => TapEvent::Disconnect,
        }
    }

    /// Extended error text from the engine (`None` when disconnected)
    pub fn errinfo(&self, session: &Session) -> Option<String> {
        self.dispatcher
            .forward_infallible(session, OpKind::Other, |engine| engine.errinfo(session))
            .flatten()
    }

    pub fn get_item_info(&self, session: &Session, item: &Item) -> Option<ItemInfo> {
        self.dispatcher
            .forward_infallible(session, OpKind::Other, |engine| engine.get_item_info(session, item))
            .flatten()
    }

    pub fn item_set_cas(&self, session: &Session, item: &mut Item, cas: u64) {
        self.dispatcher
            .forward_infallible(session, OpKind::Other, |engine| engine.item_set_cas(session, item, cas));
    }
}
