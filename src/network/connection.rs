//! Connection Handler
//!
//! Handles individual client connections.
//!
//! Each connection owns one [`Session`]. The session is bound when the
//! connection is accepted and released when it closes, whatever the reason.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Arithmetic, Item, RawRequest};
use crate::config::ConfigMap;
use crate::engine::BucketEngine;
use crate::error::{BucketError, Result};
use crate::protocol::{read_command, write_response, Command, Response, Status};
use crate::session::{Identity, Session};

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// The supervisor every command is routed through
    engine: Arc<BucketEngine>,

    /// Binding state for this connection
    session: Session,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O and allocates the session
    pub fn new(stream: TcpStream, engine: Arc<BucketEngine>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;
        let session = engine.new_session(peer_addr);

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            engine,
            session,
        })
    }

    /// Configure connection timeouts
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Binds the session, serves commands until the client goes away, then
    /// runs the disconnect path.
    pub fn handle(&mut self) -> Result<()> {
        self.engine.on_connect(&self.session);
        let result = self.serve();
        self.engine.on_disconnect(&self.session);
        result
    }

    fn serve(&mut self) -> Result<()> {
        loop {
            let command = match read_command(&mut self.reader) {
                Ok(cmd) => cmd,
                Err(BucketError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Client {} disconnected ({:?})", self.peer_addr(), e.kind());
                    return Ok(());
                }
                Err(BucketError::Io(ref e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    tracing::debug!("Read timeout for client {}", self.peer_addr());
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr(), e);
                    let _ = self.send_response(Response::from_error(&e));
                    return Err(e);
                }
            };

            tracing::trace!("Received command from {}: {:?}", self.peer_addr(), command);

            let response = self.execute_command(command);

            if let Err(e) = self.send_response(response) {
                if let BucketError::Io(ref io_err) = e {
                    if is_disconnect(io_err.kind()) {
                        tracing::debug!(
                            "Client {} disconnected before response could be sent: {}",
                            self.peer_addr(),
                            e
                        );
                        return Ok(());
                    }
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr(), e);
                return Err(BucketError::Network(e.to_string()));
            }
        }
    }

    /// Execute a command and return a response
    fn execute_command(&self, command: Command) -> Response {
        match self.dispatch(command) {
            Ok(payload) => Response::ok(payload),
            Err(e) => {
                tracing::debug!("Session {} command failed: {}", self.session.id(), e);
                Response::from_error(&e)
            }
        }
    }

    fn dispatch(&self, command: Command) -> Result<Option<Vec<u8>>> {
        let engine = &self.engine;
        let session = &self.session;

        match command {
            Command::Ping => Ok(Some(b"PONG".to_vec())),

            Command::Get { key } => {
                let item = engine.get(session, &key)?;
                let encoded = bincode::serialize(&item);
                engine.release_item(session, item);
                Ok(Some(encoded?))
            }

            Command::Store {
                operation,
                key,
                value,
                flags,
                exptime,
                cas,
            } => {
                let item = Item {
                    key,
                    value,
                    flags,
                    exptime,
                    cas,
                };
                let cas = engine.store(session, &item, operation)?;
                Ok(Some(cas.to_be_bytes().to_vec()))
            }

            Command::Delete { key, cas } => {
                engine.remove(session, &key, cas)?;
                Ok(None)
            }

            Command::Arithmetic {
                key,
                increment,
                create,
                delta,
                initial,
                exptime,
            } => {
                let request = Arithmetic {
                    key,
                    increment,
                    create,
                    delta,
                    initial,
                    exptime,
                };
                let result = engine.arithmetic(session, &request)?;
                let mut payload = Vec::with_capacity(16);
                payload.extend_from_slice(&result.value.to_be_bytes());
                payload.extend_from_slice(&result.cas.to_be_bytes());
                Ok(Some(payload))
            }

            Command::Flush { when } => {
                engine.flush(session, when)?;
                Ok(None)
            }

            Command::Stats { key } => {
                let mut stats: Vec<(String, String)> = Vec::new();
                engine.get_stats(session, &key, &mut |k, v| {
                    stats.push((k.to_string(), v.to_string()))
                })?;
                Ok(Some(bincode::serialize(&stats)?))
            }

            Command::Auth { username, config } => {
                let mut identity = Identity::new(username);
                if !config.is_empty() {
                    identity = identity.with_config(config);
                }
                engine.on_auth(session, identity);
                Ok(None)
            }

            Command::CreateBucket { name, path, config } => {
                engine.create_bucket(session, &name, &path, &config)?;
                Ok(None)
            }

            Command::DeleteBucket { name, config } => {
                let force = ConfigMap::parse(&config)?.bool("force")?.unwrap_or(false);
                let pending = engine.delete_bucket(session, &name, force)?;
                // Park until the engine has been destroyed
                pending.wait();
                Ok(None)
            }

            Command::ListBuckets => {
                let listing = engine.list_buckets(session)?;
                Ok(Some(bincode::serialize(&listing)?))
            }

            Command::SelectBucket { name } => {
                engine.select_bucket(session, &name)?;
                Ok(None)
            }

            Command::ExpandBucket {
                name,
                opcode,
                key,
                body,
            } => {
                let request = RawRequest { opcode, key, body };
                let reply = engine.expand_bucket(session, &name, &request)?;
                Ok(Some(reply))
            }

            Command::Raw { opcode, key, body } => {
                let request = RawRequest { opcode, key, body };
                let reply = engine.unknown_command(session, &request)?;
                Ok(Some(reply))
            }
        }
    }

    /// Send a response to the client
    fn send_response(&mut self, response: Response) -> Result<()> {
        if response.status == Status::Disconnected {
            tracing::debug!("Session {} has no usable bucket", self.session.id());
        }
        write_response(&mut self.writer, &response)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        self.session.peer()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}
