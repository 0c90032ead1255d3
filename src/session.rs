//! Session Module
//!
//! Per-connection context handed to every supervisor and engine call.
//!
//! A [`Session`] carries:
//! - the credential identity established by the last auth exchange
//! - a [`ConnectionBinding`]: the bucket the connection is attached to,
//!   the reservation flags, and engine-owned opaque data

use std::any::Any;
use std::fmt;

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::bucket::BucketRef;

/// Connection identifier, unique per supervisor
pub type SessionId = u64;

/// Credentials established by an auth exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    /// Engine config supplied with the credentials, used on auto-create
    pub config: Option<String>,
}

impl Identity {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            config: None,
        }
    }

    pub fn with_config(mut self, config: impl Into<String>) -> Self {
        self.config = Some(config.into());
        self
    }
}

/// Engine-owned per-connection data
pub type EngineData = Box<dyn Any + Send>;

/// Which bucket a connection is attached to
///
/// ## Reference accounting
/// - `bucket` holds one retained reference while bound
/// - `reservation` holds one extra reference while an async operation is
///   in flight (`reserved == true`)
/// - `notified` is set when a disconnect arrived during a reservation; the
///   reservation holder then performs the deferred cleanup
#[derive(Default)]
pub struct ConnectionBinding {
    bucket: Option<BucketRef>,
    reservation: Option<BucketRef>,
    reserved: bool,
    notified: bool,
    engine_data: Option<EngineData>,
}

impl ConnectionBinding {
    pub fn bucket(&self) -> Option<&BucketRef> {
        self.bucket.as_ref()
    }

    pub fn is_reserved(&self) -> bool {
        self.reserved
    }

    pub fn is_notified(&self) -> bool {
        self.notified
    }

    /// Adopt `next`, returning the previous reference for the caller to release
    pub(crate) fn replace_bucket(&mut self, next: Option<BucketRef>) -> Option<BucketRef> {
        std::mem::replace(&mut self.bucket, next)
    }

    pub(crate) fn take_bucket(&mut self) -> Option<BucketRef> {
        self.bucket.take()
    }

    pub(crate) fn reserve(&mut self, reservation: BucketRef) -> Option<BucketRef> {
        self.reserved = true;
        self.reservation.replace(reservation)
    }

    pub(crate) fn unreserve(&mut self) -> Option<BucketRef> {
        self.reserved = false;
        self.reservation.take()
    }

    pub(crate) fn set_notified(&mut self) {
        self.notified = true;
    }

    /// Drop everything; returns the bucket reference for the caller to release
    pub(crate) fn reset(&mut self) -> Option<BucketRef> {
        self.notified = false;
        self.engine_data = None;
        self.bucket.take()
    }
}

impl fmt::Debug for ConnectionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBinding")
            .field("bucket", &self.bucket.as_ref().map(|b| b.name().to_string()))
            .field("reserved", &self.reserved)
            .field("notified", &self.notified)
            .field("engine_data", &self.engine_data.is_some())
            .finish()
    }
}

/// A client connection as seen by the supervisor
pub struct Session {
    id: SessionId,
    peer: String,
    identity: RwLock<Option<Identity>>,
    binding: Mutex<ConnectionBinding>,
}

impl Session {
    pub fn new(id: SessionId, peer: impl Into<String>) -> Self {
        Self {
            id,
            peer: peer.into(),
            identity: RwLock::new(None),
            binding: Mutex::new(ConnectionBinding::default()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Credential lookup
    pub fn identity(&self) -> Option<Identity> {
        self.identity.read().clone()
    }

    pub fn username(&self) -> Option<String> {
        self.identity.read().as_ref().map(|i| i.username.clone())
    }

    pub(crate) fn set_identity(&self, identity: Identity) {
        *self.identity.write() = Some(identity);
    }

    /// Name of the bucket this connection is bound to, if any
    pub fn bound_bucket(&self) -> Option<String> {
        self.binding.lock().bucket().map(|b| b.name().to_string())
    }

    pub fn is_reserved(&self) -> bool {
        self.binding.lock().is_reserved()
    }

    pub fn is_notified(&self) -> bool {
        self.binding.lock().is_notified()
    }

    /// Store engine-owned data for this connection
    pub fn store_engine_data(&self, data: EngineData) {
        self.binding.lock().engine_data = Some(data);
    }

    /// Run `f` against the engine-owned data
    pub fn with_engine_data<R>(&self, f: impl FnOnce(Option<&mut EngineData>) -> R) -> R {
        let mut binding = self.binding.lock();
        f(binding.engine_data.as_mut())
    }

    pub fn take_engine_data(&self) -> Option<EngineData> {
        self.binding.lock().engine_data.take()
    }

    pub(crate) fn binding(&self) -> MutexGuard<'_, ConnectionBinding> {
        self.binding.lock()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}
