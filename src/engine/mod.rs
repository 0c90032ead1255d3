//! Engine Module
//!
//! [`BucketEngine`] is the supervisor context object. It is constructed once
//! at startup, passed to every connection, and torn down explicitly with
//! [`BucketEngine::shutdown`].
//!
//! ## Responsibilities
//! - Session binding policy (connect, auth, select, disconnect, reservations)
//! - Admin operations (create, delete, list, select, expand) in `admin.rs`
//! - Forwarded engine operations in `ops.rs`

mod admin;
mod ops;

pub use admin::BucketListing;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::BackendLoader;
use crate::bucket::{Bucket, BucketRef, BucketRegistry, PendingCaller};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::{BucketError, Result};
use crate::session::{Identity, Session};

/// The multi-tenant supervisor
pub struct BucketEngine {
    config: Config,
    registry: Arc<BucketRegistry>,
    dispatcher: Dispatcher,
    next_session_id: AtomicU64,
}

impl BucketEngine {
    /// Open a supervisor with the built-in engines
    pub fn open(config: Config) -> Result<Self> {
        Self::with_loader(config, Arc::new(BackendLoader::new()))
    }

    /// Open a supervisor resolving engine paths through `loader`
    ///
    /// If `config.default_bucket` is set, the unnamed default bucket is
    /// loaded and initialized here.
    pub fn with_loader(config: Config, loader: Arc<BackendLoader>) -> Result<Self> {
        let default_bucket = if config.default_bucket {
            let (engine, on_disconnect) =
                loader.load_initialized(&config.engine_path, &config.default_bucket_config)?;
            tracing::info!("Loaded default bucket with engine \"{}\"", config.engine_path);
            Some(Bucket::new("", engine, on_disconnect, None, 1))
        } else {
            None
        };

        Ok(Self {
            config,
            registry: BucketRegistry::new(loader),
            dispatcher: Dispatcher::new(default_bucket),
            next_session_id: AtomicU64::new(1),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<BucketRegistry> {
        &self.registry
    }

    pub fn loader(&self) -> &Arc<BackendLoader> {
        self.registry.loader()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Allocate a session for a new connection (not yet bound)
    pub fn new_session(&self, peer: impl Into<String>) -> Session {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        Session::new(id, peer)
    }

    // =========================================================================
    // Session Binding Policy
    // =========================================================================

    /// Bind a freshly accepted connection
    ///
    /// - named default bucket: find it, auto-creating it if allowed
    /// - unnamed default bucket: bind to it
    /// - otherwise leave the connection unbound
    pub fn on_connect(&self, session: &Session) {
        let found = match &self.config.default_bucket_name {
            Some(name) => self.find_or_create(name, &self.config.default_bucket_config),
            None => self
                .dispatcher
                .default_bucket()
                // Extra reference; the release below balances it
                .and_then(|default| default.retain()),
        };

        self.bind(session, found.as_ref());
        drop(found);
        tracing::debug!(
            "Session {} connected from {}, bound to {:?}",
            session.id(),
            session.peer(),
            session.bound_bucket()
        );
    }

    /// Credential exchange: bind to the bucket named after the identity
    pub fn on_auth(&self, session: &Session, identity: Identity) {
        let config = identity.config.clone().unwrap_or_default();
        let found = self.find_or_create(&identity.username, &config);
        session.set_identity(identity);

        self.bind(session, found.as_ref());
        drop(found);
    }

    /// Connection closed
    ///
    /// Runs the bound engine's disconnect callback, then releases the binding
    /// unless a reservation is outstanding, in which case the reservation
    /// holder cleans up when it finishes.
    pub fn on_disconnect(&self, session: &Session) {
        // The callback is an engine call: it needs the engine alive, which a
        // stale acquire guarantees up to StopRequested
        let bound = session.binding().bucket().is_some();
        if let Some(guard) = bound.then(|| self.dispatcher.acquire(session, true)).flatten() {
            if let Some(callback) = guard.bucket().disconnect_callback() {
                callback(session);
            }
            drop(guard);
        }

        let released = {
            let mut binding = session.binding();
            if binding.is_reserved() {
                binding.set_notified();
                None
            } else {
                binding.reset()
            }
        };
        match &released {
            Some(bucket) => tracing::debug!("Session {} released \"{}\"", session.id(), bucket.name()),
            None => tracing::debug!("Session {} disconnected", session.id()),
        }
        drop(released);
    }

    /// Mark the session as having an operation that outlives the current call
    ///
    /// Holds an extra reference on the bound bucket until
    /// [`release_reservation`](Self::release_reservation).
    pub fn reserve(&self, session: &Session) -> Result<()> {
        let guard = self
            .dispatcher
            .acquire(session, false)
            .ok_or(BucketError::Disconnected)?;
        let reservation = guard.bucket().retain_held();
        let previous = session.binding().reserve(reservation);
        drop(guard);
        drop(previous);
        Ok(())
    }

    /// End a reservation, performing any cleanup deferred by a disconnect
    pub fn release_reservation(&self, session: &Session) {
        let (reservation, deferred) = {
            let mut binding = session.binding();
            let reservation = binding.unreserve();
            let deferred = if binding.is_notified() {
                binding.reset()
            } else {
                None
            };
            (reservation, deferred)
        };
        drop(reservation);
        drop(deferred);
    }

    /// Replace the session's binding with a new reference to `bucket`
    ///
    /// The old reference is released before the new one is kept, so a
    /// session never holds more than one binding reference.
    fn bind(&self, session: &Session, bucket: Option<&BucketRef>) -> bool {
        let mut binding = session.binding();
        drop(binding.replace_bucket(None));
        let next = bucket.and_then(|b| b.arc().retain());
        let bound = next.is_some();
        binding.replace_bucket(next);
        bound
    }

    fn find_or_create(&self, name: &str, config: &str) -> Option<BucketRef> {
        if let Some(found) = self.registry.find(name) {
            return Some(found);
        }
        if !self.config.auto_create {
            return None;
        }
        match self.registry.create(name, &self.config.engine_path, config) {
            Ok(created) => Some(created),
            // Another connection won the race
            Err(BucketError::AlreadyExists { .. }) => self.registry.find(name),
            Err(e) => {
                tracing::warn!("Auto-create of bucket \"{}\" failed: {}", name, e);
                None
            }
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Stop every bucket and wait until all of them are gone
    ///
    /// Blocks while any connection still holds a reference; disconnect
    /// sessions first.
    pub fn shutdown(&self, force: bool) {
        tracing::info!("Shutting down bucket engine (force={})", force);

        for bucket in self.registry.list_snapshot() {
            let arc = Arc::clone(bucket.arc());
            drop(bucket);
            arc.request_stop(force, None);
        }
        self.registry.wait_until_empty();

        if let Some(default) = self.dispatcher.default_bucket() {
            let (caller, pending) = PendingCaller::new(0, default.name());
            if default.request_stop(force, Some(caller)) {
                pending.wait();
            }
        }
        tracing::info!("Bucket engine shut down");
    }
}
