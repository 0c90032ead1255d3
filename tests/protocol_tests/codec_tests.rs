//! Codec Tests
//!
//! Tests for command and response encoding/decoding.

use std::io::Cursor;

use bucketkv::backend::StoreOperation;
use bucketkv::protocol::{
    decode_command, decode_response, encode_command, encode_response, read_command,
    read_response, write_command, write_response, Command, CommandType, Response, Status,
    HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
use bucketkv::{BucketError, EngineError};

// =============================================================================
// Command Encoding/Decoding Tests
// =============================================================================

#[test]
fn test_encode_decode_store() {
    let cmd = Command::Store {
        operation: StoreOperation::Cas,
        key: b"mykey".to_vec(),
        value: vec![0, 159, 146, 150, 255],
        flags: 0xdead_beef,
        exptime: 60,
        cas: 42,
    };

    let decoded = decode_command(&encode_command(&cmd)).unwrap();

    assert_eq!(decoded, cmd);
}

#[test]
fn test_encode_decode_admin_commands() {
    let commands = [
        Command::CreateBucket {
            name: "tenant".to_string(),
            path: "memory".to_string(),
            config: "cache_size=1m".to_string(),
        },
        Command::DeleteBucket {
            name: "tenant".to_string(),
            config: "force=true".to_string(),
        },
        Command::ExpandBucket {
            name: "tenant".to_string(),
            opcode: 0xe0,
            key: Vec::new(),
            body: b"hi".to_vec(),
        },
    ];

    for cmd in commands {
        assert_eq!(decode_command(&encode_command(&cmd)).unwrap(), cmd);
    }
}

#[test]
fn test_encode_decode_arithmetic() {
    let cmd = Command::Arithmetic {
        key: b"counter".to_vec(),
        increment: false,
        create: true,
        delta: 3,
        initial: 100,
        exptime: 0,
    };

    assert_eq!(decode_command(&encode_command(&cmd)).unwrap(), cmd);
}

#[test]
fn test_admin_command_types() {
    assert!(CommandType::CreateBucket.is_admin());
    assert!(CommandType::ListBuckets.is_admin());
    assert!(!CommandType::Get.is_admin());
    assert!(!CommandType::Auth.is_admin());
}

// =============================================================================
// Response Tests
// =============================================================================

#[test]
fn test_encode_decode_response_ok() {
    let resp = Response::ok(Some(b"payload".to_vec()));
    let decoded = decode_response(&encode_response(&resp)).unwrap();

    assert_eq!(decoded.status, Status::Ok);
    assert_eq!(decoded.payload, Some(b"payload".to_vec()));
}

#[test]
fn test_empty_payload_decodes_as_none() {
    let decoded = decode_response(&encode_response(&Response::ok(Some(Vec::new())))).unwrap();
    assert_eq!(decoded.payload, None);
}

#[test]
fn test_error_to_status_mapping() {
    let cases = [
        (BucketError::NotAuthorized, Status::NotAuthorized),
        (BucketError::Disconnected, Status::Disconnected),
        (BucketError::NotFound("x".to_string()), Status::NotFound),
        (BucketError::InvalidName("x y".to_string()), Status::Invalid),
        (
            BucketError::AlreadyExists {
                name: "x".to_string(),
                state: "stopping".to_string(),
            },
            Status::Exists,
        ),
        (BucketError::Engine(EngineError::KeyNotFound), Status::NotFound),
        (BucketError::Engine(EngineError::NotStored), Status::NotStored),
        (BucketError::Engine(EngineError::TooBig), Status::TooBig),
    ];

    for (err, status) in cases {
        assert_eq!(Response::from_error(&err).status, status, "{}", err);
    }
}

#[test]
fn test_already_exists_message_carries_state() {
    let err = BucketError::AlreadyExists {
        name: "x".to_string(),
        state: "stopping".to_string(),
    };
    assert_eq!(Response::from_error(&err).message(), "Bucket exists: stopping");
}

// =============================================================================
// Error Handling Tests
// =============================================================================

#[test]
fn test_incomplete_header() {
    let result = decode_command(&[0x01, 0x00]);
    assert!(matches!(result, Err(BucketError::Protocol(_))));
}

#[test]
fn test_incomplete_payload() {
    let mut bytes = encode_command(&Command::Get {
        key: b"hello".to_vec(),
    });
    bytes.truncate(bytes.len() - 2);

    assert!(decode_command(&bytes).is_err());
}

#[test]
fn test_unknown_command_type() {
    let result = decode_command(&[0x7f, 0, 0, 0, 0]);
    assert!(matches!(result, Err(BucketError::Protocol(_))));
}

#[test]
fn test_unknown_response_status() {
    assert!(decode_response(&[0x7f, 0, 0, 0, 0]).is_err());
}

#[test]
fn test_unknown_store_operation() {
    let mut bytes = encode_command(&Command::Store {
        operation: StoreOperation::Set,
        key: b"k".to_vec(),
        value: b"v".to_vec(),
        flags: 0,
        exptime: 0,
        cas: 0,
    });
    bytes[HEADER_SIZE] = 0x42;

    assert!(decode_command(&bytes).is_err());
}

#[test]
fn test_field_length_past_payload() {
    // GET with a key length of 100 but only 3 key bytes
    let bytes = [0x01, 0, 0, 0, 7, 0, 0, 0, 100, b'a', b'b', b'c'];
    assert!(matches!(decode_command(&bytes), Err(BucketError::Protocol(_))));
}

#[test]
fn test_trailing_bytes_rejected() {
    let bytes = [0x04, 0, 0, 0, 1, 0xff];
    assert!(decode_command(&bytes).is_err());
}

#[test]
fn test_oversized_frame_rejected() {
    let len = (MAX_PAYLOAD_SIZE + 1).to_be_bytes();
    let bytes = [0x01, len[0], len[1], len[2], len[3]];

    assert!(decode_command(&bytes).is_err());
    assert!(read_command(&mut Cursor::new(bytes.to_vec())).is_err());
}

#[test]
fn test_non_utf8_bucket_name() {
    let bytes = [0x23, 0, 0, 0, 6, 0, 0, 0, 2, 0xff, 0xfe];
    assert!(decode_command(&bytes).is_err());
}

// =============================================================================
// Stream Tests
// =============================================================================

#[test]
fn test_stream_multiple_commands() {
    let commands = vec![
        Command::Auth {
            username: "tenant".to_string(),
            config: String::new(),
        },
        Command::Ping,
        Command::ListBuckets,
        Command::SelectBucket {
            name: "other".to_string(),
        },
    ];

    let mut buffer = Vec::new();
    for cmd in &commands {
        write_command(&mut buffer, cmd).unwrap();
    }

    let mut cursor = Cursor::new(buffer);
    for expected in &commands {
        assert_eq!(&read_command(&mut cursor).unwrap(), expected);
    }
    assert!(matches!(read_command(&mut cursor), Err(BucketError::Io(_))));
}

#[test]
fn test_stream_write_read_response() {
    let mut buffer = Vec::new();
    write_response(&mut buffer, &Response::with_message(Status::Disconnected, "gone")).unwrap();
    write_response(&mut buffer, &Response::ok(None)).unwrap();

    let mut cursor = Cursor::new(buffer);
    let first = read_response(&mut cursor).unwrap();
    assert_eq!(first.status, Status::Disconnected);
    assert_eq!(first.message(), "gone");
    assert_eq!(read_response(&mut cursor).unwrap(), Response::ok(None));
}

// =============================================================================
// Wire Format Tests
// =============================================================================

#[test]
fn test_wire_format_delete() {
    let encoded = encode_command(&Command::Delete {
        key: b"ab".to_vec(),
        cas: 1,
    });

    assert_eq!(
        encoded,
        vec![
            0x03, 0, 0, 0, 14, // header
            0, 0, 0, 0, 0, 0, 0, 1, // cas
            0, 0, 0, 2, b'a', b'b', // key
        ]
    );
}

#[test]
fn test_wire_format_response_not_authorized() {
    let encoded = encode_response(&Response::with_message(Status::NotAuthorized, "no"));
    assert_eq!(encoded, vec![0x06, 0, 0, 0, 2, b'n', b'o']);
}
