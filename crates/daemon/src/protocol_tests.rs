// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol unit tests

use super::*;
use yare::parameterized;

fn write_request() -> WireRecord {
    let mut record = WireRecord::new(RequestKind::WriteSame);
    record.side = 1;
    record.identity = b"SERIAL-0042".to_vec();
    record.handle = (3u64 << 32) | 17;
    record.lba = 0x1234_5678;
    record.byte_length = 520;
    record.repeat_count = 64;
    record.context = 99;
    record.block_size = 520;
    record.flags = flags::UNMAPPED;
    record.key = Some(vec![0xA5; 24]);
    record.location = DriveLocation::new(0, 1, 14);
    record
}

#[test]
fn encode_decode_roundtrip_request() {
    let request = write_request();
    let encoded = request.encode().expect("encode failed");
    let decoded = WireRecord::decode(&encoded).expect("decode failed");
    assert_eq!(request, decoded);
}

#[test]
fn encode_places_fields_at_fixed_offsets() {
    let encoded = write_request().encode().unwrap();

    assert_eq!(&encoded[0..4], &9u32.to_le_bytes());
    assert_eq!(&encoded[8..19], b"SERIAL-0042");
    assert_eq!(&encoded[48..56], &0x1234_5678u64.to_le_bytes());
    assert_eq!(&encoded[104..112], &99u64.to_le_bytes());
    // KEY_VALID is derived from the key
    assert_eq!(
        &encoded[120..124],
        &(flags::UNMAPPED | flags::KEY_VALID).to_le_bytes()
    );
    assert_eq!(&encoded[124..128], &24u32.to_le_bytes());
    assert_eq!(&encoded[164..166], &14u16.to_le_bytes());
}

#[test]
fn reply_to_protocol_error_is_marked_suspect() {
    let request = write_request();
    let response = request.reply(Status::InvalidHandle);
    assert_eq!(response.return_value, -3);
    assert_eq!(response.collision_count, 1);
    assert_eq!(response.context, request.context);

    let ok = request.reply(Status::Ok);
    assert_eq!(ok.collision_count, 0);
}

#[test]
fn oversize_identity_is_rejected() {
    let mut record = WireRecord::new(RequestKind::Open);
    record.identity = vec![b'x'; IDENTITY_LEN + 1];
    assert!(matches!(
        record.encode(),
        Err(ProtocolError::IdentityTooLong(33))
    ));
}

#[test]
fn unknown_kind_survives_decode() {
    let mut encoded = WireRecord::new(RequestKind::Init).encode().unwrap();
    encoded[0..4].copy_from_slice(&77u32.to_le_bytes());
    let decoded = WireRecord::decode(&encoded).unwrap();
    assert_eq!(decoded.kind, RequestKind::Unknown(77));
}

#[parameterized(
    ok = { 0, Status::Ok },
    positive_is_ok = { 12, Status::Ok },
    not_found = { -2, Status::NotFound },
    integrity = { -6, Status::Integrity },
    bad_length = { -9, Status::BadLength },
    unknown_negative = { -100, Status::Failed },
)]
fn status_codes(code: i64, status: Status) {
    assert_eq!(Status::from_code(code), status);
}

#[tokio::test]
async fn read_write_record_roundtrip() {
    let original = write_request();

    let mut buffer = Vec::new();
    write_record(&mut buffer, &original)
        .await
        .expect("write failed");
    assert_eq!(buffer.len(), RECORD_SIZE);

    let mut cursor = std::io::Cursor::new(buffer);
    let read_back = read_record(&mut cursor).await.expect("read failed");
    assert_eq!(read_back, original);
}

#[tokio::test]
async fn short_record_is_connection_closed() {
    let mut cursor = std::io::Cursor::new(vec![0u8; RECORD_SIZE - 1]);
    assert!(matches!(
        read_record(&mut cursor).await,
        Err(ProtocolError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn payload_is_chunked_and_reassembled() {
    let data: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();

    let mut buffer = Vec::new();
    write_payload(&mut buffer, &data, 4096).await.unwrap();
    assert_eq!(buffer, data);

    let mut cursor = std::io::Cursor::new(buffer);
    let read_back = read_payload(&mut cursor, data.len() as u64, 4096)
        .await
        .unwrap();
    assert_eq!(read_back, data);
}

#[tokio::test]
async fn oversize_payload_is_refused_before_reading() {
    let mut cursor = std::io::Cursor::new(Vec::new());
    assert!(matches!(
        read_payload(&mut cursor, MAX_PAYLOAD + 1, 4096).await,
        Err(ProtocolError::PayloadTooLarge { .. })
    ));
}

#[test]
fn long_key_decodes_as_malformed_without_key() {
    let mut original = WireRecord::new(RequestKind::WriteSame);
    original.context = 42;
    original.key = Some(vec![0x11; KEY_LEN]);
    let mut buf = original.encode().unwrap();
    buf[124..128].copy_from_slice(&((KEY_LEN as u32) + 1).to_le_bytes());

    match WireRecord::decode(&buf) {
        Err(ProtocolError::Malformed { record, .. }) => {
            assert_eq!(record.kind, RequestKind::WriteSame);
            assert_eq!(record.context, 42);
            assert_eq!(record.key, None);
        }
        other => panic!("expected malformed record, got {:?}", other),
    }
}
