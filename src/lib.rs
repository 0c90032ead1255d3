//! # bucketkv
//!
//! A multi-tenant supervisor that sits between a serving frontend and a set
//! of independently loaded storage engines ("buckets"):
//! - Every client operation is routed to the bucket bound to its connection
//! - Buckets can be created, selected and deleted while traffic is live
//! - Deletion never blocks the request path and never calls into a
//!   destroyed engine
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │                  (thread per connection)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Session
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   BucketEngine                               │
//! │    binding policy · admin commands · forwarded operations    │
//! └──────────┬───────────────────────────────┬──────────────────┘
//!            │                               │
//!            ▼                               ▼
//!   ┌─────────────────┐             ┌─────────────────┐
//!   │   Dispatcher    │             │ BucketRegistry  │
//!   │ acquire/release │             │  name → Bucket  │
//!   └────────┬────────┘             └────────┬────────┘
//!            │                               │
//!            ▼                               ▼
//!   ┌─────────────────┐  delete     ┌─────────────────┐
//!   │     Bucket      ├────────────►│ shutdown worker │
//!   │ state · counts  │             │ (one per bucket)│
//!   └────────┬────────┘             └─────────────────┘
//!            │
//!            ▼
//!   ┌─────────────────┐
//!   │  StorageEngine  │
//!   │ (BackendLoader) │
//!   └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod sync;

pub mod backend;
pub mod memtable;
pub mod bucket;
pub mod session;
pub mod stats;
pub mod dispatch;
pub mod engine;
pub mod protocol;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BucketError, EngineError, Result};
pub use config::Config;
pub use engine::BucketEngine;
pub use session::{Identity, Session};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of bucketkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
