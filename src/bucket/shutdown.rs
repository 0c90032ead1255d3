//! Shutdown coordinator
//!
//! One worker thread per bucket being torn down. Spawned by the
//! `StopRequested -> Stopping` transition, so it starts with no clients
//! inside the engine and holds one reference of its own.
//!
//! ## Worker steps
//! 1. Check `Stopping` and `clients == 0`
//! 2. Destroy the engine (outside the lock)
//! 3. Mark `Stopped`, clear the engine and its callbacks, notify the pending
//!    caller
//! 4. Drop the worker reference and wait for `refcount == 0`
//! 5. Unlink from the registry
//! 6. Take the bucket lock once more as a barrier, mark `Null`
//! 7. Drop the handle

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{BucketError, Result};
use crate::session::SessionId;

use super::handle::{Bucket, BucketState};

/// The connection waiting for a deletion to finish
#[derive(Debug)]
pub struct PendingCaller {
    session: SessionId,
    notify: Sender<()>,
}

impl PendingCaller {
    /// Create a caller record plus the handle the caller waits on
    pub fn new(session: SessionId, bucket: impl Into<String>) -> (Self, PendingDeletion) {
        let (notify, done) = channel::bounded(1);
        (
            Self { session, notify },
            PendingDeletion {
                bucket: bucket.into(),
                done,
            },
        )
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    fn complete(self) {
        // Receiver may already be gone; nothing to tell then
        let _ = self.notify.try_send(());
    }
}

/// Completion handle for an accepted deletion
#[derive(Debug)]
pub struct PendingDeletion {
    bucket: String,
    done: Receiver<()>,
}

impl PendingDeletion {
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// `Ok` once the engine is destroyed, `Err(Pending)` before that
    pub fn poll(&self) -> Result<()> {
        match self.done.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => Ok(()),
            Err(TryRecvError::Empty) => Err(BucketError::Pending),
        }
    }

    /// Block until the engine is destroyed
    pub fn wait(&self) {
        // Err means the sender is gone, which only happens after completion
        let _ = self.done.recv();
    }

    /// Block up to `timeout`; `Err(Pending)` if it is still running
    pub fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(BucketError::Pending),
        }
    }
}

/// Start the shutdown worker for `bucket`
pub(crate) fn spawn_worker(bucket: Arc<Bucket>) -> io::Result<()> {
    thread::Builder::new()
        .name(format!("bucket-shutdown:{}", bucket.name()))
        .spawn(move || run_worker(bucket))
        .map(|_| ())
}

fn run_worker(bucket: Arc<Bucket>) {
    let name = bucket.name().to_string();
    tracing::info!("Started thread to shut down \"{}\"", name);

    let (engine, force) = {
        let inner = bucket.lock_inner();
        assert_eq!(inner.state, BucketState::Stopping, "shutdown of \"{}\" in wrong state", name);
        assert_eq!(inner.clients, 0, "shutdown of \"{}\" with clients inside", name);
        (inner.engine.clone(), inner.force_shutdown)
    };

    if let Some(engine) = &engine {
        tracing::info!("Destroy engine \"{}\"", name);
        engine.destroy(force);
        tracing::info!("Engine \"{}\" destroyed", name);
    }

    let released_engine = {
        let mut inner = bucket.lock_inner();
        inner.state = BucketState::Stopped;
        inner.tap_iterator = None;
        inner.on_disconnect = None;
        let released = inner.engine.take();

        if let Some(pending) = inner.pending.take() {
            tracing::debug!("Notifying session {} that \"{}\" is stopped", pending.session(), name);
            pending.complete();
        }

        // Drop the worker reference
        bucket.release_ref_locked(&mut inner);

        while inner.refcount > 0 {
            tracing::info!("There are {} references to \"{}\".. wait", inner.refcount, name);
            bucket.cond().wait(&mut inner);
        }
        released
    };
    drop(engine);
    drop(released_engine);

    tracing::info!("Unlink \"{}\" from engine table", name);
    if let Some(registry) = bucket.registry() {
        registry.remove_final(&bucket);
    }

    // Barrier: nobody can be mid-acquisition past this point
    bucket.lock_inner().state = BucketState::Null;

    tracing::info!("Release all resources for engine \"{}\"", name);
    drop(bucket);
}
