//! Backend Module
//!
//! The storage-engine capability interface every bucket forwards to, plus the
//! loader that turns an engine path into a live instance.
//!
//! ## Responsibilities
//! - Define the [`StorageEngine`] trait (the capability set)
//! - Define the item / arithmetic / tap value types exchanged with engines
//! - Let engines register callbacks during `initialize`
//! - Resolve engine paths to constructors ([`BackendLoader`])

mod loader;
mod memory;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::session::Session;

pub use loader::{initialize_engine, BackendLoader, EngineFactory};
pub use memory::{MemoryEngine, ECHO_OPCODE};

/// Sink for `key -> value` statistics
pub type AddStat<'a> = &'a mut dyn FnMut(&str, &str);

/// Callback invoked when a connection bound to the engine's bucket disconnects
pub type DisconnectCallback = Arc<dyn Fn(&Session) + Send + Sync>;

/// A stored item
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Item {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub flags: u32,
    pub exptime: u32,
    pub cas: u64,
}

impl Item {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..Default::default()
        }
    }
}

/// Metadata about an item, as reported by `get_item_info`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemInfo {
    pub cas: u64,
    pub exptime: u32,
    pub flags: u32,
    pub key_len: usize,
    pub value_len: usize,
}

impl From<&Item> for ItemInfo {
    fn from(item: &Item) -> Self {
        Self {
            cas: item.cas,
            exptime: item.exptime,
            flags: item.flags,
            key_len: item.key.len(),
            value_len: item.value.len(),
        }
    }
}

/// Store semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StoreOperation {
    Add = 1,
    Set = 2,
    Replace = 3,
    Append = 4,
    Prepend = 5,
    Cas = 6,
}

impl StoreOperation {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Add),
            2 => Some(Self::Set),
            3 => Some(Self::Replace),
            4 => Some(Self::Append),
            5 => Some(Self::Prepend),
            6 => Some(Self::Cas),
            _ => None,
        }
    }
}

/// Arguments for incr/decr
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arithmetic {
    pub key: Vec<u8>,
    pub increment: bool,
    pub create: bool,
    pub delta: u64,
    pub initial: u64,
    pub exptime: u32,
}

/// Result of incr/decr
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArithmeticResult {
    pub value: u64,
    pub cas: u64,
}

/// An arbitrary command the supervisor does not interpret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    pub opcode: u8,
    pub key: Vec<u8>,
    pub body: Vec<u8>,
}

/// Events on a streaming-notify (tap) channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapEvent {
    Mutation(Item),
    Deletion(Vec<u8>),
    Flush,
    Opaque(Vec<u8>),
    Noop,
    Pause,
    Disconnect,
}

/// A tap event pushed into an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapNotify {
    pub event: TapEvent,
    pub ttl: u8,
    pub flags: u16,
    pub seqno: u32,
    pub engine_specific: Vec<u8>,
}

/// Parameters for opening a tap stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TapRequest {
    pub client: Vec<u8>,
    pub flags: u32,
    pub userdata: Vec<u8>,
}

/// Engine-side tap cursor
pub trait TapIterator: Send + Sync {
    fn next_event(&self, session: &Session) -> TapEvent;
}

/// Registration surface handed to an engine during `initialize`
#[derive(Default)]
pub struct EngineCallbacks {
    on_disconnect: Option<DisconnectCallback>,
}

impl EngineCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask to be told when a connection bound to this engine goes away
    pub fn register_disconnect(&mut self, callback: DisconnectCallback) {
        self.on_disconnect = Some(callback);
    }

    pub fn into_disconnect(self) -> Option<DisconnectCallback> {
        self.on_disconnect
    }
}

impl fmt::Debug for EngineCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineCallbacks")
            .field("on_disconnect", &self.on_disconnect.is_some())
            .finish()
    }
}

/// The storage-engine capability set
///
/// Engines are shared across request threads, so every method takes `&self`.
/// The supervisor guarantees that no call other than `destroy` is made after
/// `destroy` starts, and that `destroy` is called exactly once.
pub trait StorageEngine: Send + Sync {
    /// Human-readable engine description
    fn description(&self) -> &str {
        "storage engine"
    }

    fn initialize(&self, config: &str, callbacks: &mut EngineCallbacks) -> EngineResult<()>;

    fn destroy(&self, force: bool);

    fn allocate(
        &self,
        session: &Session,
        key: &[u8],
        nbytes: usize,
        flags: u32,
        exptime: u32,
    ) -> EngineResult<Item>;

    fn get(&self, session: &Session, key: &[u8]) -> EngineResult<Item>;

    /// Store an item, returning its new CAS
    fn store(&self, session: &Session, item: &Item, operation: StoreOperation)
        -> EngineResult<u64>;

    fn remove(&self, session: &Session, key: &[u8], cas: u64) -> EngineResult<()>;

    /// Hand an item back to the engine
    fn release(&self, _session: &Session, _item: Item) {}

    fn arithmetic(&self, session: &Session, request: &Arithmetic) -> EngineResult<ArithmeticResult>;

    fn flush(&self, session: &Session, when: u64) -> EngineResult<()>;

    fn get_stats(&self, session: &Session, key: &str, add_stat: AddStat<'_>) -> EngineResult<()>;

    fn reset_stats(&self, _session: &Session) {}

    fn unknown_command(&self, _session: &Session, _request: &RawRequest) -> EngineResult<Vec<u8>> {
        Err(crate::error::EngineError::NotSupported)
    }

    fn tap_notify(&self, _session: &Session, _notify: &TapNotify) -> EngineResult<()> {
        Err(crate::error::EngineError::NotSupported)
    }

    fn get_tap_iterator(
        &self,
        _session: &Session,
        _request: &TapRequest,
    ) -> Option<Arc<dyn TapIterator>> {
        None
    }

    /// Extended error text for the last failure on this connection
    fn errinfo(&self, _session: &Session) -> Option<String> {
        None
    }

    fn get_item_info(&self, _session: &Session, item: &Item) -> Option<ItemInfo> {
        Some(ItemInfo::from(item))
    }

    fn item_set_cas(&self, _session: &Session, item: &mut Item, cas: u64) {
        item.cas = cas;
    }
}
