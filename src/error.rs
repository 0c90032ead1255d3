//! Error types for bucketkv
//!
//! Two layers:
//! - [`EngineError`]: what a storage engine reports. Passed through verbatim.
//! - [`BucketError`]: everything the supervisor itself can report.

use thiserror::Error;

/// Result type alias using BucketError
pub type Result<T> = std::result::Result<T, BucketError>;

/// Result type returned by storage engine calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors reported by a storage engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Key not found")]
    KeyNotFound,

    #[error("Key exists")]
    KeyExists,

    #[error("Not stored")]
    NotStored,

    #[error("Value too large")]
    TooBig,

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Out of memory")]
    OutOfMemory,

    #[error("Not supported")]
    NotSupported,

    #[error("Non-numeric value for arithmetic")]
    DeltaBadValue,

    #[error("Operation would block")]
    WouldBlock,

    #[error("Engine failure: {0}")]
    Failed(String),
}

/// Unified error type for bucketkv operations
#[derive(Debug, Error)]
pub enum BucketError {
    // -------------------------------------------------------------------------
    // Bucket Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Invalid bucket name: {0:?}")]
    InvalidName(String),

    #[error("Bucket exists: {state}")]
    AlreadyExists { name: String, state: String },

    #[error("Failed to load engine: {0}")]
    LoadFailed(String),

    #[error("Failed to initialize instance: {0}")]
    InitFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authorized")]
    NotAuthorized,

    #[error("Out of memory")]
    OutOfMemory,

    /// The connection has no usable bucket and must rebind
    #[error("Disconnected")]
    Disconnected,

    /// Deletion accepted, completion not yet delivered
    #[error("Operation pending")]
    Pending,

    // -------------------------------------------------------------------------
    // Engine Errors (passed through unchanged)
    // -------------------------------------------------------------------------
    #[error(transparent)]
    Engine(#[from] EngineError),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for BucketError {
    fn from(err: bincode::Error) -> Self {
        BucketError::Serialization(err.to_string())
    }
}
