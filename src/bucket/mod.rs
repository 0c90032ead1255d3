//! Bucket Module
//!
//! Bucket lifecycle: handles, the registry, and teardown.
//!
//! ## State Machine
//! ```text
//!   create()
//!      │
//!      ▼
//!  ┌─────────┐ delete  ┌───────────────┐ clients == 0 ┌──────────┐
//!  │ Running ├────────►│ StopRequested ├─────────────►│ Stopping │
//!  └─────────┘         └───────────────┘              └────┬─────┘
//!                                                          │ engine destroyed
//!                                                          ▼
//!                        ┌──────┐  refcount == 0      ┌─────────┐
//!                        │ Null │◄────────────────────┤ Stopped │
//!                        └──────┘  unlinked           └─────────┘
//! ```

mod handle;
mod registry;
mod shutdown;

pub use handle::{Bucket, BucketRef, BucketState, EngineGuard};
pub use registry::{is_valid_bucket_name, BucketRegistry};
pub use shutdown::{PendingCaller, PendingDeletion};
