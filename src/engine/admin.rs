//! Admin operations
//!
//! Create, delete, list, select and expand. All of them require the caller's
//! identity to match the configured admin user.

use serde::{Deserialize, Serialize};

use crate::backend::RawRequest;
use crate::bucket::{BucketState, PendingCaller, PendingDeletion};
use crate::error::{BucketError, Result};
use crate::session::Session;

use super::BucketEngine;

/// One row of a bucket listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketListing {
    pub name: String,
    pub state: BucketState,
}

impl BucketEngine {
    /// True if the session authenticated as the admin user
    pub fn is_admin(&self, session: &Session) -> bool {
        match (&self.config.admin_user, session.username()) {
            (Some(admin), Some(user)) => *admin == user,
            _ => false,
        }
    }

    fn require_admin(&self, session: &Session) -> Result<()> {
        if self.is_admin(session) {
            Ok(())
        } else {
            tracing::debug!("Session {} is not authorized for admin commands", session.id());
            Err(BucketError::NotAuthorized)
        }
    }

    /// Create a bucket from engine `path` and `config`
    pub fn create_bucket(&self, session: &Session, name: &str, path: &str, config: &str) -> Result<()> {
        self.require_admin(session)?;
        let created = self.registry.create(name, path, config)?;
        drop(created);
        Ok(())
    }

    /// Request deletion of a running bucket
    ///
    /// Returns immediately. The returned handle completes once the engine
    /// has been destroyed; the name stays taken until every reference is gone.
    pub fn delete_bucket(&self, session: &Session, name: &str, force: bool) -> Result<PendingDeletion> {
        self.require_admin(session)?;

        let found = self
            .registry
            .find(name)
            .ok_or_else(|| BucketError::NotFound(name.to_string()))?;

        let (caller, pending) = PendingCaller::new(session.id(), name);
        let accepted = found.arc().request_stop(force, Some(caller));
        drop(found);

        if accepted {
            Ok(pending)
        } else {
            Err(BucketError::NotFound(name.to_string()))
        }
    }

    /// Snapshot of all buckets and their states
    pub fn list_buckets(&self, session: &Session) -> Result<Vec<BucketListing>> {
        self.require_admin(session)?;
        let snapshot = self.registry.list_snapshot();
        Ok(snapshot
            .iter()
            .map(|bucket| BucketListing {
                name: bucket.name().to_string(),
                state: bucket.state(),
            })
            .collect())
    }

    /// Bind the calling session to `name`
    ///
    /// On failure the session ends up unbound.
    pub fn select_bucket(&self, session: &Session, name: &str) -> Result<()> {
        self.require_admin(session)?;
        let found = self.registry.find(name);
        let bound = self.bind(session, found.as_ref());
        drop(found);

        if bound {
            Ok(())
        } else {
            Err(BucketError::NotFound(name.to_string()))
        }
    }

    /// Forward a raw command to the engine of bucket `name`, whatever the
    /// session is bound to
    pub fn expand_bucket(&self, session: &Session, name: &str, request: &RawRequest) -> Result<Vec<u8>> {
        self.require_admin(session)?;
        let found = self
            .registry
            .find(name)
            .ok_or_else(|| BucketError::NotFound(name.to_string()))?;
        let guard = found.enter().ok_or(BucketError::Disconnected)?;
        let result = guard.engine().unknown_command(session, request);
        drop(guard);
        drop(found);
        result.map_err(BucketError::from)
    }

    /// `name -> state` for every listed bucket (the `bucket` stats group)
    pub(crate) fn bucket_state_stats(&self, session: &Session) -> Result<Vec<(String, String)>> {
        Ok(self
            .list_buckets(session)?
            .into_iter()
            .map(|row| (row.name, row.state.name().to_string()))
            .collect())
    }
}
