//! MemTable Module
//!
//! In-memory item table backing the built-in `memory` engine.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Atomic read-modify-write of a single key (store ops, arithmetic)
//! - Track approximate byte size for the engine's cache limit
//! - Ordered iteration for stats dumps and tap streams
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in a parking_lot RwLock:
//! - Ordered keys (tap dumps come out sorted)
//! - Many concurrent readers, one writer

mod table;

pub use table::MemTable;
