//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread polling a non-blocking listener
//! - One thread per connection, each owning a session
//! - Commands routed through [`BucketEngine`](crate::engine::BucketEngine)

mod server;
mod connection;

pub use server::Server;
pub use connection::Connection;
