//! Command definitions
//!
//! Represents commands from clients.

use crate::backend::StoreOperation;

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Get = 0x01,
    Store = 0x02,
    Delete = 0x03,
    Ping = 0x04,
    Arithmetic = 0x05,
    Flush = 0x06,
    Stats = 0x07,
    Auth = 0x10,
    CreateBucket = 0x20,
    DeleteBucket = 0x21,
    ListBuckets = 0x22,
    SelectBucket = 0x23,
    ExpandBucket = 0x24,
    Raw = 0x30,
}

impl CommandType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x01 => Self::Get,
            0x02 => Self::Store,
            0x03 => Self::Delete,
            0x04 => Self::Ping,
            0x05 => Self::Arithmetic,
            0x06 => Self::Flush,
            0x07 => Self::Stats,
            0x10 => Self::Auth,
            0x20 => Self::CreateBucket,
            0x21 => Self::DeleteBucket,
            0x22 => Self::ListBuckets,
            0x23 => Self::SelectBucket,
            0x24 => Self::ExpandBucket,
            0x30 => Self::Raw,
            _ => return None,
        })
    }

    /// Commands that require the admin identity
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Self::CreateBucket
                | Self::DeleteBucket
                | Self::ListBuckets
                | Self::SelectBucket
                | Self::ExpandBucket
        )
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Get an item by key
    Get { key: Vec<u8> },

    /// Store an item
    Store {
        operation: StoreOperation,
        key: Vec<u8>,
        value: Vec<u8>,
        flags: u32,
        exptime: u32,
        cas: u64,
    },

    /// Delete a key (cas 0 matches any)
    Delete { key: Vec<u8>, cas: u64 },

    /// Ping (health check)
    Ping,

    /// Increment or decrement a counter
    Arithmetic {
        key: Vec<u8>,
        increment: bool,
        create: bool,
        delta: u64,
        initial: u64,
        exptime: u32,
    },

    /// Drop every item in the bound bucket
    Flush { when: u64 },

    /// Stats group (empty for the default group)
    Stats { key: String },

    /// Credential exchange
    Auth { username: String, config: String },

    /// Admin: create a bucket from an engine path
    CreateBucket { name: String, path: String, config: String },

    /// Admin: delete a bucket (`config` may carry `force=true`)
    DeleteBucket { name: String, config: String },

    /// Admin: list buckets
    ListBuckets,

    /// Admin: bind this connection to a bucket
    SelectBucket { name: String },

    /// Admin: forward a raw command to a named bucket
    ExpandBucket {
        name: String,
        opcode: u8,
        key: Vec<u8>,
        body: Vec<u8>,
    },

    /// Anything else, passed to the bound engine
    Raw { opcode: u8, key: Vec<u8>, body: Vec<u8> },
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Get { .. } => CommandType::Get,
            Command::Store { .. } => CommandType::Store,
            Command::Delete { .. } => CommandType::Delete,
            Command::Ping => CommandType::Ping,
            Command::Arithmetic { .. } => CommandType::Arithmetic,
            Command::Flush { .. } => CommandType::Flush,
            Command::Stats { .. } => CommandType::Stats,
            Command::Auth { .. } => CommandType::Auth,
            Command::CreateBucket { .. } => CommandType::CreateBucket,
            Command::DeleteBucket { .. } => CommandType::DeleteBucket,
            Command::ListBuckets => CommandType::ListBuckets,
            Command::SelectBucket { .. } => CommandType::SelectBucket,
            Command::ExpandBucket { .. } => CommandType::ExpandBucket,
            Command::Raw { .. } => CommandType::Raw,
        }
    }
}
