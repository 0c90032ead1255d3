//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! Every frame is a one byte command (or status), a big-endian `u32` payload
//! length, and the payload. Variable-length payload fields carry their own
//! `u32` length prefix; fixed-width integers are big-endian.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, BytesMut};

use crate::backend::StoreOperation;
use crate::error::{BucketError, Result};
use super::{Command, CommandType, Response, Status};

/// Header size: 1 byte command/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Field helpers
// =============================================================================

fn put_bytes(buf: &mut BytesMut, field: &[u8]) {
    buf.put_u32(field.len() as u32);
    buf.put_slice(field);
}

/// Cursor over a command payload with bounds-checked field reads
struct FieldReader<'a> {
    buf: &'a [u8],
    command: &'static str,
}

impl<'a> FieldReader<'a> {
    fn new(buf: &'a [u8], command: &'static str) -> Self {
        Self { buf, command }
    }

    fn need(&self, len: usize, field: &str) -> Result<()> {
        if self.buf.remaining() < len {
            return Err(BucketError::Protocol(format!(
                "{} command: incomplete {} (expected {}, got {})",
                self.command,
                field,
                len,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn u8(&mut self, field: &str) -> Result<u8> {
        self.need(1, field)?;
        Ok(self.buf.get_u8())
    }

    fn u32(&mut self, field: &str) -> Result<u32> {
        self.need(4, field)?;
        Ok(self.buf.get_u32())
    }

    fn u64(&mut self, field: &str) -> Result<u64> {
        self.need(8, field)?;
        Ok(self.buf.get_u64())
    }

    fn bytes(&mut self, field: &str) -> Result<Vec<u8>> {
        let len = self.u32(field)? as usize;
        self.need(len, field)?;
        let value = self.buf[..len].to_vec();
        self.buf.advance(len);
        Ok(value)
    }

    fn string(&mut self, field: &str) -> Result<String> {
        let raw = self.bytes(field)?;
        String::from_utf8(raw).map_err(|_| {
            BucketError::Protocol(format!("{} command: {} is not UTF-8", self.command, field))
        })
    }

    fn finish(self) -> Result<()> {
        if self.buf.has_remaining() {
            return Err(BucketError::Protocol(format!(
                "{} command: {} trailing bytes",
                self.command,
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Format: cmd_type (1) + payload_len (4) + payload
pub fn encode_command(command: &Command) -> Vec<u8> {
    let mut payload = BytesMut::new();

    match command {
        Command::Get { key } => put_bytes(&mut payload, key),
        Command::Store {
            operation,
            key,
            value,
            flags,
            exptime,
            cas,
        } => {
            payload.put_u8(*operation as u8);
            payload.put_u32(*flags);
            payload.put_u32(*exptime);
            payload.put_u64(*cas);
            put_bytes(&mut payload, key);
            put_bytes(&mut payload, value);
        }
        Command::Delete { key, cas } => {
            payload.put_u64(*cas);
            put_bytes(&mut payload, key);
        }
        Command::Ping | Command::ListBuckets => {}
        Command::Arithmetic {
            key,
            increment,
            create,
            delta,
            initial,
            exptime,
        } => {
            payload.put_u8(*increment as u8);
            payload.put_u8(*create as u8);
            payload.put_u64(*delta);
            payload.put_u64(*initial);
            payload.put_u32(*exptime);
            put_bytes(&mut payload, key);
        }
        Command::Flush { when } => payload.put_u64(*when),
        Command::Stats { key } => put_bytes(&mut payload, key.as_bytes()),
        Command::Auth { username, config } => {
            put_bytes(&mut payload, username.as_bytes());
            put_bytes(&mut payload, config.as_bytes());
        }
        Command::CreateBucket { name, path, config } => {
            put_bytes(&mut payload, name.as_bytes());
            put_bytes(&mut payload, path.as_bytes());
            put_bytes(&mut payload, config.as_bytes());
        }
        Command::DeleteBucket { name, config } => {
            put_bytes(&mut payload, name.as_bytes());
            put_bytes(&mut payload, config.as_bytes());
        }
        Command::SelectBucket { name } => put_bytes(&mut payload, name.as_bytes()),
        Command::ExpandBucket {
            name,
            opcode,
            key,
            body,
        } => {
            put_bytes(&mut payload, name.as_bytes());
            payload.put_u8(*opcode);
            put_bytes(&mut payload, key);
            put_bytes(&mut payload, body);
        }
        Command::Raw { opcode, key, body } => {
            payload.put_u8(*opcode);
            put_bytes(&mut payload, key);
            put_bytes(&mut payload, body);
        }
    }

    frame(command.command_type() as u8, &payload)
}

fn frame(kind: u8, payload: &[u8]) -> Vec<u8> {
    let mut message = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    message.put_u8(kind);
    message.put_u32(payload.len() as u32);
    message.put_slice(payload);
    message.to_vec()
}

/// Split a frame into kind byte and payload, validating lengths
fn split_frame<'a>(bytes: &'a [u8], what: &str) -> Result<(u8, &'a [u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(BucketError::Protocol(format!(
            "Incomplete {} header: expected {} bytes, got {}",
            what,
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let mut header = &bytes[..HEADER_SIZE];
    let kind = header.get_u8();
    let payload_len = header.get_u32() as usize;

    if payload_len > MAX_PAYLOAD_SIZE as usize {
        return Err(BucketError::Protocol(format!(
            "{} payload too large: {} bytes (max {})",
            what, payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(BucketError::Protocol(format!(
            "Incomplete {} payload: expected {} bytes, got {}",
            what,
            total_len,
            bytes.len()
        )));
    }

    Ok((kind, &bytes[HEADER_SIZE..total_len]))
}

/// Decode a command from bytes
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let (cmd_byte, payload) = split_frame(bytes, "command")?;

    let cmd_type = CommandType::from_u8(cmd_byte).ok_or_else(|| {
        BucketError::Protocol(format!("Unknown command type: 0x{:02x}", cmd_byte))
    })?;

    match cmd_type {
        CommandType::Get => {
            let mut r = FieldReader::new(payload, "GET");
            let key = r.bytes("key")?;
            r.finish()?;
            Ok(Command::Get { key })
        }
        CommandType::Store => {
            let mut r = FieldReader::new(payload, "STORE");
            let op = r.u8("operation")?;
            let operation = StoreOperation::from_u8(op).ok_or_else(|| {
                BucketError::Protocol(format!("STORE command: unknown operation {}", op))
            })?;
            let flags = r.u32("flags")?;
            let exptime = r.u32("exptime")?;
            let cas = r.u64("cas")?;
            let key = r.bytes("key")?;
            let value = r.bytes("value")?;
            r.finish()?;
            Ok(Command::Store {
                operation,
                key,
                value,
                flags,
                exptime,
                cas,
            })
        }
        CommandType::Delete => {
            let mut r = FieldReader::new(payload, "DELETE");
            let cas = r.u64("cas")?;
            let key = r.bytes("key")?;
            r.finish()?;
            Ok(Command::Delete { key, cas })
        }
        CommandType::Ping => {
            FieldReader::new(payload, "PING").finish()?;
            Ok(Command::Ping)
        }
        CommandType::Arithmetic => {
            let mut r = FieldReader::new(payload, "ARITH");
            let increment = r.u8("direction")? != 0;
            let create = r.u8("create")? != 0;
            let delta = r.u64("delta")?;
            let initial = r.u64("initial")?;
            let exptime = r.u32("exptime")?;
            let key = r.bytes("key")?;
            r.finish()?;
            Ok(Command::Arithmetic {
                key,
                increment,
                create,
                delta,
                initial,
                exptime,
            })
        }
        CommandType::Flush => {
            let mut r = FieldReader::new(payload, "FLUSH");
            let when = r.u64("when")?;
            r.finish()?;
            Ok(Command::Flush { when })
        }
        CommandType::Stats => {
            let mut r = FieldReader::new(payload, "STATS");
            let key = r.string("key")?;
            r.finish()?;
            Ok(Command::Stats { key })
        }
        CommandType::Auth => {
            let mut r = FieldReader::new(payload, "AUTH");
            let username = r.string("username")?;
            let config = r.string("config")?;
            r.finish()?;
            Ok(Command::Auth { username, config })
        }
        CommandType::CreateBucket => {
            let mut r = FieldReader::new(payload, "CREATE_BUCKET");
            let name = r.string("name")?;
            let path = r.string("path")?;
            let config = r.string("config")?;
            r.finish()?;
            Ok(Command::CreateBucket { name, path, config })
        }
        CommandType::DeleteBucket => {
            let mut r = FieldReader::new(payload, "DELETE_BUCKET");
            let name = r.string("name")?;
            let config = r.string("config")?;
            r.finish()?;
            Ok(Command::DeleteBucket { name, config })
        }
        CommandType::ListBuckets => {
            FieldReader::new(payload, "LIST_BUCKETS").finish()?;
            Ok(Command::ListBuckets)
        }
        CommandType::SelectBucket => {
            let mut r = FieldReader::new(payload, "SELECT_BUCKET");
            let name = r.string("name")?;
            r.finish()?;
            Ok(Command::SelectBucket { name })
        }
        CommandType::ExpandBucket => {
            let mut r = FieldReader::new(payload, "EXPAND_BUCKET");
            let name = r.string("name")?;
            let opcode = r.u8("opcode")?;
            let key = r.bytes("key")?;
            let body = r.bytes("body")?;
            r.finish()?;
            Ok(Command::ExpandBucket {
                name,
                opcode,
                key,
                body,
            })
        }
        CommandType::Raw => {
            let mut r = FieldReader::new(payload, "RAW");
            let opcode = r.u8("opcode")?;
            let key = r.bytes("key")?;
            let body = r.bytes("body")?;
            r.finish()?;
            Ok(Command::Raw { opcode, key, body })
        }
    }
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: status (1) + payload_len (4) + payload
pub fn encode_response(response: &Response) -> Vec<u8> {
    let payload = response.payload.as_deref().unwrap_or(&[]);
    frame(response.status as u8, payload)
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let (status_byte, payload) = split_frame(bytes, "response")?;

    let status = Status::from_u8(status_byte).ok_or_else(|| {
        BucketError::Protocol(format!("Unknown response status: 0x{:02x}", status_byte))
    })?;

    let payload = if payload.is_empty() {
        None
    } else {
        Some(payload.to_vec())
    };

    Ok(Response { status, payload })
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one whole frame (header + payload) from a stream
fn read_frame<R: Read>(reader: &mut R, what: &str) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let payload_len = (&header[1..]).get_u32() as usize;
    if payload_len > MAX_PAYLOAD_SIZE as usize {
        return Err(BucketError::Protocol(format!(
            "{} payload too large: {} bytes (max {})",
            what, payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let mut message = vec![0u8; HEADER_SIZE + payload_len];
    message[..HEADER_SIZE].copy_from_slice(&header);
    if payload_len > 0 {
        reader.read_exact(&mut message[HEADER_SIZE..])?;
    }
    Ok(message)
}

/// Read a complete command from a stream
///
/// Blocks until a complete command is received or an error occurs
pub fn read_command<R: Read>(reader: &mut R) -> Result<Command> {
    let message = read_frame(reader, "command")?;
    decode_command(&message)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    let bytes = encode_command(command);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let message = read_frame(reader, "response")?;
    decode_response(&message)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    let bytes = encode_response(response);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
