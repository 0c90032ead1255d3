//! TCP Server
//!
//! Accepts connections and hands each one to its own thread.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::engine::BucketEngine;
use crate::error::{BucketError, Result};
use crate::protocol::{write_response, Response, Status};

use super::Connection;

/// How often the accept loop checks the shutdown flag
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// TCP server for bucketkv
pub struct Server {
    config: Config,
    engine: Arc<BucketEngine>,
    listener: Option<TcpListener>,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Create a new server with the given config and engine
    pub fn new(config: Config, engine: Arc<BucketEngine>) -> Self {
        Self {
            config,
            engine,
            listener: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bind the listen address, returning the bound address
    pub fn bind(&mut self) -> Result<SocketAddr> {
        let listener = TcpListener::bind(&self.config.listen_addr).map_err(|e| {
            BucketError::Network(format!("cannot bind {}: {}", self.config.listen_addr, e))
        })?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        self.listener = Some(listener);
        tracing::info!("Listening on {}", addr);
        Ok(addr)
    }

    /// Start the server (blocking until [`shutdown`](Self::shutdown))
    pub fn run(&mut self) -> Result<()> {
        if self.listener.is_none() {
            self.bind()?;
        }
        let listener = self
            .listener
            .take()
            .ok_or_else(|| BucketError::Network("listener not bound".to_string()))?;

        while !self.shutdown.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, peer)) => self.dispatch(stream, peer),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        tracing::info!(
            "Server stopped accepting ({} connections still open)",
            self.active.load(Ordering::Relaxed)
        );
        Ok(())
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Cannot configure stream from {}: {}", peer, e);
            return;
        }

        let active = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        if active > self.config.max_connections {
            self.active.fetch_sub(1, Ordering::AcqRel);
            tracing::warn!("Rejecting {}: {} connections open", peer, active - 1);
            let mut stream = stream;
            let _ = write_response(
                &mut stream,
                &Response::with_message(Status::Error, "too many connections"),
            );
            return;
        }

        let engine = Arc::clone(&self.engine);
        let counter = Arc::clone(&self.active);
        let (read_ms, write_ms) = (self.config.read_timeout_ms, self.config.write_timeout_ms);

        let spawned = thread::Builder::new()
            .name(format!("conn:{}", peer))
            .spawn(move || {
                match Connection::new(stream, engine) {
                    Ok(mut conn) => {
                        let result = conn
                            .set_timeouts(read_ms, write_ms)
                            .and_then(|_| conn.handle());
                        if let Err(e) = result {
                            tracing::debug!("Connection {} ended with error: {}", peer, e);
                        }
                    }
                    Err(e) => tracing::warn!("Cannot set up connection from {}: {}", peer, e),
                }
                counter.fetch_sub(1, Ordering::AcqRel);
            });

        if let Err(e) = spawned {
            self.active.fetch_sub(1, Ordering::AcqRel);
            tracing::error!("Cannot spawn connection thread for {}: {}", peer, e);
        }
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Flag that stops the accept loop when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}
