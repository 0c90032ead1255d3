//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! Payloads are a sequence of fields: fixed-width big-endian integers and
//! length-prefixed (`u32`) byte strings, in the order listed per command.
//!
//! ### Data Commands
//! - 0x01 GET     - key
//! - 0x02 STORE   - op (1) + flags (4) + exptime (4) + cas (8) + key + value
//! - 0x03 DELETE  - cas (8) + key
//! - 0x04 PING    - empty
//! - 0x05 ARITH   - incr (1) + create (1) + delta (8) + initial (8) + exptime (4) + key
//! - 0x06 FLUSH   - when (8)
//! - 0x07 STATS   - key
//! - 0x10 AUTH    - username + config
//!
//! ### Admin Commands
//! - 0x20 CREATE_BUCKET - name + path + config
//! - 0x21 DELETE_BUCKET - name + config (`force=true`)
//! - 0x22 LIST_BUCKETS  - empty
//! - 0x23 SELECT_BUCKET - name
//! - 0x24 EXPAND_BUCKET - name + opcode (1) + key + body
//! - 0x30 RAW           - opcode (1) + key + body
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! GET answers with a bincode-encoded `Item`; LIST_BUCKETS and STATS answer
//! with bincode-encoded lists. STORE answers with the new CAS (8), ARITH with
//! value (8) + cas (8).

mod command;
mod response;
mod codec;

pub use command::{Command, CommandType};
pub use response::{Response, Status};
pub use codec::{
    decode_command, decode_response, encode_command, encode_response, read_command,
    read_response, write_command, write_response, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
