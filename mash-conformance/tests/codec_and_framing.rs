//! Scenarios 1-4 from the protocol's testable-properties list: codec
//! round-trips, peek/decode agreement, strict-decode rejection, and frame
//! size bounds, exercised at the level an integrator would actually hit
//! them (full messages over a real framer) rather than as unit-level
//! round-trip grids.

use mash_codec::{decode_request, encode, peek_kind, PeekKind};
use mash_framer::{FrameError, Framer};
use mash_wire::{Message, Operation, Request, RequestPayload};

#[test]
fn read_round_trip_is_compact_and_lossless() {
    let req = Request {
        message_id: 1,
        operation: Operation::Read,
        endpoint_id: 1,
        feature_id: 2,
        payload: RequestPayload::Read { attribute_ids: vec![1, 2, 3] },
    };
    let bytes = encode(&Message::Request(req.clone())).unwrap();
    assert!(bytes.len() <= 30, "encoded length was {} bytes", bytes.len());
    assert_eq!(decode_request(&bytes).unwrap(), req);
}

#[test]
fn peek_prefers_request_over_control_when_endpoint_is_set() {
    // message_id == 1 would satisfy CONTROL's k1-in-{1,2,3} predicate on its
    // own; endpoint_id > 0 must override that reading.
    let req = Request {
        message_id: 1,
        operation: Operation::Read,
        endpoint_id: 1,
        feature_id: 2,
        payload: RequestPayload::Read { attribute_ids: vec![] },
    };
    let bytes = encode(&Message::Request(req)).unwrap();
    assert_eq!(peek_kind(&bytes), PeekKind::Request);
}

#[test]
fn strict_decode_rejects_malformed_inputs_without_panicking() {
    // Duplicate top-level key 1.
    let duplicate_key = [0xa2, 0x01, 0x01, 0x01, 0x02];
    assert!(mash_codec::decode_control(&duplicate_key).is_err());

    // Top-level string key instead of an integer.
    let mut string_key = Vec::new();
    let top = ciborium::Value::Map(vec![(ciborium::Value::Text("type".into()), ciborium::Value::Integer(1u8.into()))]);
    ciborium::ser::into_writer(&top, &mut string_key).unwrap();
    assert!(mash_codec::decode_control(&string_key).is_err());

    // Half-precision NaN and +Infinity as a CONTROL sequence number's sibling
    // value — decode_control only reads integer fields, so round the NaN
    // case through a raw map with an extra half-float key to confirm the
    // reader itself rejects it rather than silently normalizing to a u64.
    for bits in [0x7e00u16, 0x7c00u16] {
        // 0x7e00 = half-precision NaN, 0x7c00 = +Infinity
        let mut half_float_payload = vec![0xa2, 0x01, 0x01, 0x02];
        half_float_payload.push(0xf9);
        half_float_payload.extend_from_slice(&bits.to_be_bytes());
        assert!(mash_codec::decode_control(&half_float_payload).is_err());
    }
}

#[tokio::test]
async fn frame_bounds_reject_oversized_payloads_before_and_after_the_wire() {
    let (a, b) = tokio::io::duplex(200_000);
    let writer = Framer::with_options(a, uuid::Uuid::new_v4(), 65_536, None);
    let reader = Framer::with_options(b, uuid::Uuid::new_v4(), 65_536, None);

    let max_payload = vec![0u8; 65_536];
    writer.write_frame(&max_payload).await.unwrap();
    assert_eq!(reader.read_frame().await.unwrap(), max_payload);

    let over = vec![0u8; 65_537];
    assert!(matches!(
        writer.write_frame(&over).await,
        Err(FrameError::MessageTooLarge { len: 65_537, max: 65_536 })
    ));
}

#[tokio::test]
async fn a_declared_length_over_the_bound_is_rejected_before_reading_the_payload() {
    use tokio::io::AsyncWriteExt;

    let (mut raw_writer, b) = tokio::io::duplex(8);
    let reader = Framer::with_options(b, uuid::Uuid::new_v4(), 65_536, None);

    // Write a prefix claiming 65_537 bytes, then nothing else — if the
    // reader tried to read the payload it would hang forever on this tiny
    // duplex buffer.
    raw_writer.write_all(&65_537u32.to_be_bytes()).await.unwrap();

    assert!(matches!(
        reader.read_frame().await,
        Err(FrameError::MessageTooLarge { len: 65_537, max: 65_536 })
    ));
}
