//! Bucket Registry
//!
//! Concurrent name -> bucket directory.
//!
//! ## Concurrency
//! - `buckets` is guarded by the registry lock
//! - Each critical section touches either the registry lock or one bucket
//!   lock, never both: lookups clone the `Arc` under the registry lock and
//!   retain it afterwards under the bucket lock
//! - The map holds the "main" reference of every live bucket

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{initialize_engine, BackendLoader};
use crate::error::{BucketError, Result};
use crate::sync::{CheckedCondvar, CheckedMutex};

use super::handle::{Bucket, BucketRef};

/// Check a bucket name: non-empty, letters, digits, `.`, `%`, `_`, `-`
pub fn is_valid_bucket_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '%' | '_' | '-'))
}

/// Directory of live buckets
pub struct BucketRegistry {
    buckets: CheckedMutex<HashMap<String, Arc<Bucket>>>,

    /// Signalled whenever an entry is unlinked
    removed: CheckedCondvar,

    loader: Arc<BackendLoader>,
}

impl BucketRegistry {
    pub fn new(loader: Arc<BackendLoader>) -> Arc<Self> {
        Arc::new(Self {
            buckets: CheckedMutex::new("registry", HashMap::new()),
            removed: CheckedCondvar::new(),
            loader,
        })
    }

    pub fn loader(&self) -> &Arc<BackendLoader> {
        &self.loader
    }

    /// Create, initialize and register a bucket
    ///
    /// The engine is loaded before the registry lock is taken. The existence
    /// check, engine initialization and insertion happen under one registry
    /// critical section, so of several concurrent creates for one name exactly
    /// one wins. Losers destroy the engine they loaded.
    pub fn create(self: &Arc<Self>, name: &str, path: &str, config: &str) -> Result<BucketRef> {
        if !is_valid_bucket_name(name) {
            return Err(BucketError::InvalidName(name.to_string()));
        }

        let engine = self.loader.load(path)?;

        let existing = {
            let mut buckets = self.buckets.lock();
            match buckets.get(name) {
                Some(existing) => Some(Arc::clone(existing)),
                None => {
                    let on_disconnect = initialize_engine(engine.as_ref(), config)?;
                    // Main reference + the one handed to the caller
                    let bucket = Bucket::new(
                        name,
                        Arc::clone(&engine),
                        on_disconnect,
                        Some(Arc::downgrade(self)),
                        2,
                    );
                    buckets.insert(name.to_string(), Arc::clone(&bucket));
                    tracing::info!("Created bucket \"{}\" with engine \"{}\"", name, path);
                    return Ok(BucketRef::adopt(bucket));
                }
            }
        };

        // Lost the race (or the name is still being torn down)
        engine.destroy(true);
        let state = existing.map(|b| b.state().to_string()).unwrap_or_default();
        tracing::debug!("Bucket \"{}\" already exists ({})", name, state);
        Err(BucketError::AlreadyExists {
            name: name.to_string(),
            state,
        })
    }

    /// Find a running bucket and retain it
    pub fn find(&self, name: &str) -> Option<BucketRef> {
        let candidate = self.buckets.lock().get(name).cloned();
        candidate.and_then(|bucket| bucket.retain())
    }

    /// Retain every bucket that is still linked and referenced
    ///
    /// Sorted by name. Dropping the returned refs releases them.
    pub fn list_snapshot(&self) -> Vec<BucketRef> {
        let mut candidates: Vec<Arc<Bucket>> = self.buckets.lock().values().cloned().collect();
        candidates.sort_by(|a, b| a.name().cmp(b.name()));
        candidates
            .iter()
            .filter_map(|bucket| bucket.retain_for_listing())
            .collect()
    }

    /// True if an entry exists under `name`, in any state
    pub fn contains(&self, name: &str) -> bool {
        self.buckets.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.lock().is_empty()
    }

    /// Unlink a fully stopped bucket. Called only by the shutdown worker.
    pub(crate) fn remove_final(&self, bucket: &Arc<Bucket>) {
        let removed = {
            let mut buckets = self.buckets.lock();
            let removed = buckets.remove(bucket.name());
            assert!(
                removed.as_ref().is_some_and(|r| Arc::ptr_eq(r, bucket)),
                "registry entry for \"{}\" is not the bucket being removed",
                bucket.name()
            );
            assert!(!buckets.contains_key(bucket.name()));
            self.removed.notify_all();
            removed
        };
        drop(removed);
    }

    /// Block until every entry has been unlinked
    pub fn wait_until_empty(&self) {
        let mut buckets = self.buckets.lock();
        self.removed.wait_while(&mut buckets, |b| !b.is_empty());
    }
}
