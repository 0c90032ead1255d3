//! Response definitions
//!
//! Represents responses to clients.

use crate::error::{BucketError, EngineError};

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    NotFound = 0x01,
    Error = 0x02,
    Exists = 0x03,
    NotStored = 0x04,
    Invalid = 0x05,
    NotAuthorized = 0x06,
    Disconnected = 0x07,
    TooBig = 0x08,
    OutOfMemory = 0x09,
    NotSupported = 0x0a,
    DeltaBadValue = 0x0b,
}

impl Status {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Self::Ok,
            0x01 => Self::NotFound,
            0x02 => Self::Error,
            0x03 => Self::Exists,
            0x04 => Self::NotStored,
            0x05 => Self::Invalid,
            0x06 => Self::NotAuthorized,
            0x07 => Self::Disconnected,
            0x08 => Self::TooBig,
            0x09 => Self::OutOfMemory,
            0x0a => Self::NotSupported,
            0x0b => Self::DeltaBadValue,
            _ => return None,
        })
    }
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Optional payload (value, listing, or error message)
    pub payload: Option<Vec<u8>>,
}

impl Response {
    /// Create an OK response with optional payload
    pub fn ok(payload: Option<Vec<u8>>) -> Self {
        Self {
            status: Status::Ok,
            payload,
        }
    }

    /// Create a NOT_FOUND response
    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            payload: None,
        }
    }

    /// Create an ERROR response
    pub fn error(message: &str) -> Self {
        Self::with_message(Status::Error, message)
    }

    /// Create a response with a status and a text payload
    pub fn with_message(status: Status, message: &str) -> Self {
        Self {
            status,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    /// Map a supervisor error to a response
    pub fn from_error(err: &BucketError) -> Self {
        let status = match err {
            BucketError::InvalidName(_) | BucketError::Config(_) | BucketError::Protocol(_) => {
                Status::Invalid
            }
            BucketError::AlreadyExists { .. } => Status::Exists,
            BucketError::LoadFailed(_) | BucketError::InitFailed(_) => Status::NotStored,
            BucketError::NotFound(_) => Status::NotFound,
            BucketError::NotAuthorized => Status::NotAuthorized,
            BucketError::OutOfMemory => Status::OutOfMemory,
            BucketError::Disconnected => Status::Disconnected,
            BucketError::Engine(engine) => return Self::from_engine_error(engine),
            BucketError::Pending
            | BucketError::Io(_)
            | BucketError::Serialization(_)
            | BucketError::Network(_) => Status::Error,
        };
        Self::with_message(status, &err.to_string())
    }

    fn from_engine_error(err: &EngineError) -> Self {
        let status = match err {
            EngineError::KeyNotFound => Status::NotFound,
            EngineError::KeyExists => Status::Exists,
            EngineError::NotStored => Status::NotStored,
            EngineError::TooBig => Status::TooBig,
            EngineError::InvalidArguments(_) => Status::Invalid,
            EngineError::OutOfMemory => Status::OutOfMemory,
            EngineError::NotSupported => Status::NotSupported,
            EngineError::DeltaBadValue => Status::DeltaBadValue,
            EngineError::WouldBlock | EngineError::Failed(_) => Status::Error,
        };
        Self::with_message(status, &err.to_string())
    }

    /// Payload as UTF-8 text (lossy)
    pub fn message(&self) -> String {
        self.payload
            .as_deref()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default()
    }
}
