//! Bucket handle
//!
//! One [`Bucket`] per tenant. It owns the engine instance and tracks two
//! counts under its own lock:
//!
//! - `refcount`: retained references (registry main ref, bindings, listings,
//!   in-flight calls, the shutdown worker)
//! - `clients`: calls currently executing inside the engine
//!
//! ## Reference accounting
//! An [`EngineGuard`] counts as one client *and* one reference, so a bucket
//! with calls in flight is always referenced. The shutdown worker takes its
//! own reference when it is spawned and drops it after `Stopped`, so
//! `refcount` can only reach zero once the bucket is `Stopped`.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use crate::backend::{DisconnectCallback, StorageEngine, TapIterator};
use crate::stats::BucketStats;
use crate::sync::{CheckedCondvar, CheckedGuard, CheckedMutex};

use super::registry::BucketRegistry;
use super::shutdown::{self, PendingCaller};

/// Lifecycle state of a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BucketState {
    /// Unlinked from the registry; no longer findable
    Null,
    Running,
    StopRequested,
    Stopping,
    Stopped,
}

impl BucketState {
    pub fn name(&self) -> &'static str {
        match self {
            BucketState::Null => "NULL",
            BucketState::Running => "running",
            BucketState::StopRequested => "stop requested",
            BucketState::Stopping => "stopping",
            BucketState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for BucketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State guarded by the bucket lock
pub(crate) struct BucketInner {
    pub(crate) state: BucketState,
    pub(crate) refcount: usize,
    pub(crate) clients: usize,
    pub(crate) engine: Option<Arc<dyn StorageEngine>>,
    pub(crate) tap_iterator: Option<Arc<dyn TapIterator>>,
    pub(crate) on_disconnect: Option<DisconnectCallback>,
    pub(crate) pending: Option<PendingCaller>,
    pub(crate) force_shutdown: bool,
}

/// A named tenant and its engine instance
pub struct Bucket {
    name: String,
    stats: Arc<BucketStats>,
    inner: CheckedMutex<BucketInner>,

    /// Signalled when `refcount` drops to zero after `Stopped`
    cond: CheckedCondvar,

    /// Registry to unlink from once torn down (none for the unnamed default)
    registry: Option<Weak<BucketRegistry>>,
}

impl Bucket {
    /// Build a running bucket holding `initial_refs` references
    pub(crate) fn new(
        name: impl Into<String>,
        engine: Arc<dyn StorageEngine>,
        on_disconnect: Option<DisconnectCallback>,
        registry: Option<Weak<BucketRegistry>>,
        initial_refs: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            stats: Arc::new(BucketStats::new()),
            inner: CheckedMutex::new(
                "bucket",
                BucketInner {
                    state: BucketState::Running,
                    refcount: initial_refs,
                    clients: 0,
                    engine: Some(engine),
                    tap_iterator: None,
                    on_disconnect,
                    pending: None,
                    force_shutdown: false,
                },
            ),
            cond: CheckedCondvar::new(),
            registry,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BucketState {
        self.inner.lock().state
    }

    pub fn refcount(&self) -> usize {
        self.inner.lock().refcount
    }

    pub fn clients(&self) -> usize {
        self.inner.lock().clients
    }

    /// `(refcount, clients)` read under one lock acquisition
    pub fn counts(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.refcount, inner.clients)
    }

    pub fn stats(&self) -> &Arc<BucketStats> {
        &self.stats
    }

    pub fn force_shutdown(&self) -> bool {
        self.inner.lock().force_shutdown
    }

    pub(crate) fn disconnect_callback(&self) -> Option<DisconnectCallback> {
        self.inner.lock().on_disconnect.clone()
    }

    pub(crate) fn tap_iterator(&self) -> Option<Arc<dyn TapIterator>> {
        self.inner.lock().tap_iterator.clone()
    }

    pub(crate) fn set_tap_iterator(&self, iterator: Option<Arc<dyn TapIterator>>) {
        self.inner.lock().tap_iterator = iterator;
    }

    pub(crate) fn registry(&self) -> Option<Arc<BucketRegistry>> {
        self.registry.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn lock_inner(&self) -> CheckedGuard<'_, BucketInner> {
        self.inner.lock()
    }

    pub(crate) fn cond(&self) -> &CheckedCondvar {
        &self.cond
    }

    // =========================================================================
    // Reference counting
    // =========================================================================

    /// Take a reference if the bucket is running
    pub fn retain(self: &Arc<Self>) -> Option<BucketRef> {
        let mut inner = self.inner.lock();
        if inner.state != BucketState::Running {
            return None;
        }
        inner.refcount += 1;
        Some(BucketRef::adopt(Arc::clone(self)))
    }

    /// Take a reference for a listing: any state still linked and referenced
    pub(crate) fn retain_for_listing(self: &Arc<Self>) -> Option<BucketRef> {
        let mut inner = self.inner.lock();
        if inner.state == BucketState::Null || inner.refcount == 0 {
            return None;
        }
        inner.refcount += 1;
        Some(BucketRef::adopt(Arc::clone(self)))
    }

    /// Take a reference while another reference is known to be held
    pub(crate) fn retain_held(self: &Arc<Self>) -> BucketRef {
        let mut inner = self.inner.lock();
        assert!(inner.refcount > 0, "retain_held on unreferenced bucket \"{}\"", self.name);
        inner.refcount += 1;
        drop(inner);
        BucketRef::adopt(Arc::clone(self))
    }

    fn release_ref(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        self.release_ref_locked(&mut inner);
    }

    pub(crate) fn release_ref_locked(self: &Arc<Self>, inner: &mut BucketInner) {
        assert!(inner.refcount > 0, "refcount underflow on bucket \"{}\"", self.name);
        self.maybe_start_shutdown_locked(inner);
        inner.refcount -= 1;

        if inner.refcount == 0 && inner.state == BucketState::Stopped {
            // The shutdown worker is waiting for exactly this
            self.cond.notify_all();
        }
    }

    // =========================================================================
    // In-flight calls
    // =========================================================================

    /// Start a call into the engine
    ///
    /// Succeeds while `Running`; with `allow_stale` also while
    /// `StopRequested` (the engine is still alive and teardown waits for us).
    pub(crate) fn enter(self: &Arc<Self>, allow_stale: bool) -> Option<EngineGuard> {
        let mut inner = self.inner.lock();
        let usable = match inner.state {
            BucketState::Running => true,
            BucketState::StopRequested => allow_stale,
            _ => false,
        };
        if !usable {
            return None;
        }
        let engine = inner.engine.clone()?;
        inner.clients += 1;
        inner.refcount += 1;
        drop(inner);

        Some(EngineGuard {
            bucket: Arc::clone(self),
            engine,
        })
    }

    fn leave(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        assert!(inner.clients > 0, "clients underflow on bucket \"{}\"", self.name);
        inner.clients -= 1;
        // Also runs the StopRequested -> Stopping check
        self.release_ref_locked(&mut inner);
    }

    // =========================================================================
    // State transitions
    // =========================================================================

    /// Running -> StopRequested, dropping the main reference
    ///
    /// Returns false if the bucket was not running.
    pub(crate) fn request_stop(self: &Arc<Self>, force: bool, pending: Option<PendingCaller>) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != BucketState::Running {
            return false;
        }
        inner.state = BucketState::StopRequested;
        inner.force_shutdown = force;
        inner.pending = pending;

        tracing::info!(
            "Stop requested for bucket \"{}\" (force={}, clients={}, refcount={})",
            self.name,
            force,
            inner.clients,
            inner.refcount
        );

        // Drop the main reference
        self.release_ref_locked(&mut inner);
        true
    }

    /// StopRequested -> Stopping once the last client has left
    fn maybe_start_shutdown_locked(self: &Arc<Self>, inner: &mut BucketInner) {
        if inner.clients != 0 || inner.state != BucketState::StopRequested {
            return;
        }
        inner.state = BucketState::Stopping;
        // The worker's own reference, dropped once Stopped
        inner.refcount += 1;

        if let Err(e) = shutdown::spawn_worker(Arc::clone(self)) {
            tracing::error!("Failed to start shutdown of \"{}\": {}", self.name, e);
            std::process::abort();
        }
    }
}

impl fmt::Debug for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket").field("name", &self.name).finish()
    }
}

/// A retained reference to a bucket. Dropping it releases the reference.
pub struct BucketRef {
    bucket: Arc<Bucket>,
}

impl BucketRef {
    /// Wrap a reference that has already been counted
    pub(crate) fn adopt(bucket: Arc<Bucket>) -> Self {
        Self { bucket }
    }

    pub fn arc(&self) -> &Arc<Bucket> {
        &self.bucket
    }

    /// Start an engine call on this bucket
    pub(crate) fn enter(&self) -> Option<EngineGuard> {
        self.bucket.enter(false)
    }
}

impl Deref for BucketRef {
    type Target = Bucket;

    fn deref(&self) -> &Bucket {
        &self.bucket
    }
}

impl Drop for BucketRef {
    fn drop(&mut self) {
        self.bucket.release_ref();
    }
}

impl fmt::Debug for BucketRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BucketRef").field(&self.bucket.name).finish()
    }
}

/// An in-flight engine call. Dropping it ends the call.
pub struct EngineGuard {
    bucket: Arc<Bucket>,
    engine: Arc<dyn StorageEngine>,
}

impl EngineGuard {
    pub fn bucket(&self) -> &Arc<Bucket> {
        &self.bucket
    }

    pub fn engine(&self) -> &dyn StorageEngine {
        self.engine.as_ref()
    }
}

impl Drop for EngineGuard {
    fn drop(&mut self) {
        self.bucket.leave();
    }
}
