//! Dispatcher
//!
//! The acquire / invoke / release envelope every forwarded call goes through.
//!
//! ```text
//!  session ──► binding ──► bucket.enter() ──► engine call ──► guard dropped
//!                 │                                          (clients--, maybe
//!                 └─ unbound: default bucket                  start shutdown)
//! ```

use std::sync::Arc;

use crate::backend::StorageEngine;
use crate::bucket::{Bucket, EngineGuard};
use crate::error::{BucketError, EngineResult, Result};
use crate::session::Session;
use crate::stats::OpKind;

/// Resolves a session to an engine for the duration of one call
pub struct Dispatcher {
    /// Unnamed default bucket used by unbound sessions
    default_bucket: Option<Arc<Bucket>>,
}

impl Dispatcher {
    pub fn new(default_bucket: Option<Arc<Bucket>>) -> Self {
        Self { default_bucket }
    }

    pub fn default_bucket(&self) -> Option<&Arc<Bucket>> {
        self.default_bucket.as_ref()
    }

    /// Resolve the session's bucket and count one client against it
    ///
    /// A binding to a bucket that is no longer running is dropped (unless
    /// `allow_stale`), and `None` is returned: the caller must treat the
    /// connection as disconnected.
    pub fn acquire(&self, session: &Session, allow_stale: bool) -> Option<EngineGuard> {
        let mut binding = session.binding();

        let Some(bound) = binding.bucket().map(|b| Arc::clone(b.arc())) else {
            drop(binding);
            return self.default_bucket.as_ref().and_then(|b| b.enter(false));
        };

        if let Some(guard) = bound.enter(allow_stale) {
            return Some(guard);
        }

        if !allow_stale {
            let stale = binding.take_bucket();
            drop(binding);
            tracing::debug!(
                "Session {} lost bucket \"{}\" ({}), unbinding",
                session.id(),
                bound.name(),
                bound.state()
            );
            drop(stale);
        }
        None
    }

    /// acquire -> `call` -> release, mapping a failed acquire to `Disconnected`
    pub fn forward<T>(
        &self,
        session: &Session,
        op: OpKind,
        call: impl FnOnce(&dyn StorageEngine) -> EngineResult<T>,
    ) -> Result<T> {
        let guard = self.acquire(session, false).ok_or(BucketError::Disconnected)?;
        guard.bucket().stats().record(op);
        let result = call(guard.engine());
        drop(guard);
        result.map_err(BucketError::from)
    }

    /// Like [`forward`](Self::forward) for calls that cannot fail
    pub fn forward_infallible<T>(
        &self,
        session: &Session,
        op: OpKind,
        call: impl FnOnce(&dyn StorageEngine) -> T,
    ) -> Option<T> {
        let guard = self.acquire(session, false)?;
        guard.bucket().stats().record(op);
        Some(call(guard.engine()))
    }
}
