#![forbid(unsafe_code)]
//! Canonical CBOR encoding and strict decoding for MASH messages.
//!
//! Encoding goes through `ciborium`, which is trusted because we fully
//! control the shape of what gets built — canonical key order is enforced
//! by [`value::canonical_sort`] before a single byte is written. Decoding
//! does not use `ciborium`'s `Value` deserializer: it needs to actively
//! reject inputs that `ciborium` would otherwise silently normalize
//! (indefinite-length containers, duplicate keys, NaN/Infinity), so it runs
//! over the hand-rolled reader in [`raw`].

mod error;
mod raw;
mod value;

pub use error::{DecodeError, EncodeError};
pub use value::{to_i64, to_u8};

use ciborium::Value as CborValue;
use mash_wire::{
    AttributeMap, Control, ControlType, Message, MessageId, Notification, Operation, Request,
    RequestPayload, Response, ResponsePayload, Status, SubscribePayload, Value,
};

use raw::{RawItem, Reader};
use value::{build_canonical_map, raw_to_value, value_to_cbor};

/// Result of [`peek_kind`]: the message family, classified from a handful of
/// top-level integer keys without building a typed [`Message`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeekKind {
    Request,
    Response,
    Notification,
    Control,
    Unknown,
}

/// Classify a frame's payload by message family, reading only the top-level
/// keys `1..=4`. See the module-level algorithm this mirrors: MASH's CONTROL
/// and short REQUEST messages share overlapping key positions, so the rules
/// must be applied in order.
pub fn peek_kind(bytes: &[u8]) -> PeekKind {
    let mut r = Reader::new(bytes);
    let slots = match r.peek_top_keys() {
        Some(s) => s,
        None => return PeekKind::Unknown,
    };
    let [k1, k2, k3, k4] = slots;

    if k1 == Some(0) {
        return PeekKind::Notification;
    }
    if matches!(k1, Some(1) | Some(2) | Some(3)) && k3.unwrap_or(0) == 0 && k4.unwrap_or(0) == 0 {
        return PeekKind::Control;
    }
    if matches!(k2, Some(v) if (1..=4).contains(&v)) && (k3.unwrap_or(0) > 0 || k4.unwrap_or(0) > 0)
    {
        return PeekKind::Request;
    }
    PeekKind::Response
}

// ---------------------------------------------------------------------
// encode
// ---------------------------------------------------------------------

/// Encode a [`Message`] into canonical CBOR bytes.
pub fn encode(message: &Message) -> Result<Vec<u8>, EncodeError> {
    let top = match message {
        Message::Request(req) => encode_request(req)?,
        Message::Response(resp) => encode_response(resp)?,
        Message::Notification(note) => encode_notification(note),
        Message::Control(ctrl) => encode_control(ctrl),
    };
    let mut out = Vec::new();
    ciborium::ser::into_writer(&top, &mut out)
        .map_err(|e| EncodeError::StructurallyInvalid(e.to_string()))?;
    Ok(out)
}

fn attribute_map_to_cbor(values: &AttributeMap) -> CborValue {
    let entries = values
        .iter()
        .map(|(id, v)| (*id as u64, value_to_cbor(v)))
        .collect();
    build_canonical_map(entries)
}

fn encode_request(req: &Request) -> Result<CborValue, EncodeError> {
    if req.message_id == 0 {
        return Err(EncodeError::InvalidMessageId);
    }
    let payload = match &req.payload {
        RequestPayload::Read { attribute_ids } => build_canonical_map(vec![(
            1,
            CborValue::Array(attribute_ids.iter().map(|id| CborValue::Integer((*id).into())).collect()),
        )]),
        RequestPayload::Write { values } => attribute_map_to_cbor(values),
        RequestPayload::Subscribe(SubscribePayload::Subscribe {
            attribute_ids,
            min_interval_ms,
            max_interval_ms,
        }) => build_canonical_map(vec![
            (
                1,
                CborValue::Array(attribute_ids.iter().map(|id| CborValue::Integer((*id).into())).collect()),
            ),
            (2, CborValue::Integer((*min_interval_ms).into())),
            (3, CborValue::Integer((*max_interval_ms).into())),
        ]),
        RequestPayload::Subscribe(SubscribePayload::Unsubscribe { subscription_id }) => {
            build_canonical_map(vec![(1, CborValue::Integer((*subscription_id).into()))])
        }
        RequestPayload::Invoke { command_id, parameters } => build_canonical_map(vec![
            (1, CborValue::Integer((*command_id).into())),
            (2, value_to_cbor(parameters)),
        ]),
    };
    Ok(build_canonical_map(vec![
        (1, CborValue::Integer(req.message_id.into())),
        (2, CborValue::Integer(req.operation.as_u8().into())),
        (3, CborValue::Integer(req.endpoint_id.into())),
        (4, CborValue::Integer(req.feature_id.into())),
        (5, payload),
    ]))
}

fn encode_response(resp: &Response) -> Result<CborValue, EncodeError> {
    if resp.message_id == 0 {
        return Err(EncodeError::InvalidMessageId);
    }
    let mut entries = vec![
        (1, CborValue::Integer(resp.message_id.into())),
        (2, CborValue::Integer(resp.status.as_u8().into())),
    ];
    match &resp.payload {
        ResponsePayload::Empty => {}
        ResponsePayload::Values(values) => entries.push((3, attribute_map_to_cbor(values))),
        ResponsePayload::Subscribed { subscription_id, priming_report } => {
            entries.push((
                3,
                build_canonical_map(vec![
                    (1, CborValue::Integer((*subscription_id).into())),
                    (2, attribute_map_to_cbor(priming_report)),
                ]),
            ));
        }
        ResponsePayload::Error { message } => {
            let mut err_entries = Vec::new();
            if let Some(msg) = message {
                err_entries.push((1, CborValue::Text(msg.clone())));
            }
            entries.push((3, build_canonical_map(err_entries)));
        }
    }
    Ok(build_canonical_map(entries))
}

fn encode_notification(note: &Notification) -> CborValue {
    build_canonical_map(vec![
        (1, CborValue::Integer(0.into())),
        (2, CborValue::Integer(note.subscription_id.into())),
        (3, CborValue::Integer(note.endpoint_id.into())),
        (4, CborValue::Integer(note.feature_id.into())),
        (5, attribute_map_to_cbor(&note.changes)),
    ])
}

fn encode_control(ctrl: &Control) -> CborValue {
    let mut entries = vec![(1, CborValue::Integer(ctrl.ty.as_u8().into()))];
    if ctrl.ty != ControlType::Close {
        entries.push((2, CborValue::Integer(ctrl.sequence.into())));
    }
    build_canonical_map(entries)
}

// ---------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------

/// A parsed top-level CBOR map with every key confirmed to be an unsigned
/// integer (MASH never uses string keys at any level).
struct TopMap(Vec<(u64, RawItem)>);

impl TopMap {
    fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let item = r.read_item()?;
        if !r.is_empty() {
            return Err(DecodeError::Cbor("trailing bytes after top-level item".into()));
        }
        Self::from_item(item)
    }

    fn from_item(item: RawItem) -> Result<Self, DecodeError> {
        let RawItem::Map(pairs) = item else {
            return Err(DecodeError::ValidationFailed("top-level item is not a map".into()));
        };
        let mut out = Vec::with_capacity(pairs.len());
        for (k, v) in pairs {
            let RawItem::UInt(key) = k else {
                return Err(DecodeError::StringKey);
            };
            out.push((key, v));
        }
        Ok(TopMap(out))
    }

    fn get(&self, key: u64) -> Option<&RawItem> {
        self.0.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

fn require<T>(opt: Option<T>, field: &str) -> Result<T, DecodeError> {
    opt.ok_or_else(|| DecodeError::ValidationFailed(format!("missing required field: {field}")))
}

fn require_u64(item: &RawItem, field: &str) -> Result<u64, DecodeError> {
    item.as_u64()
        .ok_or_else(|| DecodeError::BadInteger(format!("{field} is not an unsigned integer")))
}

fn require_u32(item: &RawItem, field: &str) -> Result<u32, DecodeError> {
    u32::try_from(require_u64(item, field)?)
        .map_err(|_| DecodeError::BadInteger(format!("{field} does not fit in u32")))
}

fn require_u16(v: u64, field: &str) -> Result<u16, DecodeError> {
    u16::try_from(v).map_err(|_| DecodeError::BadInteger(format!("{field} does not fit in u16")))
}

fn require_u8(item: &RawItem, field: &str) -> Result<u8, DecodeError> {
    u8::try_from(require_u64(item, field)?)
        .map_err(|_| DecodeError::BadInteger(format!("{field} does not fit in u8")))
}

fn require_map(item: &RawItem, field: &str) -> Result<Vec<(u64, RawItem)>, DecodeError> {
    let RawItem::Map(pairs) = item else {
        return Err(DecodeError::ValidationFailed(format!("{field} is not a map")));
    };
    let mut out = Vec::with_capacity(pairs.len());
    for (k, v) in pairs {
        let RawItem::UInt(key) = k else {
            return Err(DecodeError::StringKey);
        };
        out.push((*key, v.clone()));
    }
    Ok(out)
}

fn decode_attribute_map(pairs: &[(u64, RawItem)]) -> Result<AttributeMap, DecodeError> {
    let mut out = Vec::with_capacity(pairs.len());
    for (k, v) in pairs {
        let id = require_u16(*k, "attribute id")?;
        out.push((id, raw_to_value(v)?));
    }
    Ok(out)
}

/// Decode a REQUEST frame.
pub fn decode_request(bytes: &[u8]) -> Result<Request, DecodeError> {
    let top = TopMap::parse(bytes)?;
    let message_id: MessageId = require_u32(require(top.get(1), "messageId")?, "messageId")?;
    if message_id == 0 {
        return Err(DecodeError::ValidationFailed("REQUEST message_id must be >= 1".into()));
    }
    let op_byte = require_u8(require(top.get(2), "operation")?, "operation")?;
    let operation = Operation::from_u8(op_byte)
        .ok_or_else(|| DecodeError::ValidationFailed(format!("unknown operation: {op_byte}")))?;
    let endpoint_id = require_u8(require(top.get(3), "endpointId")?, "endpointId")?;
    let feature_id = require_u8(require(top.get(4), "featureId")?, "featureId")?;
    let payload_item = require(top.get(5), "payload")?;

    let payload = match operation {
        Operation::Read => {
            let fields = require_map(payload_item, "read payload")?;
            let attribute_ids = match fields.iter().find(|(k, _)| *k == 1) {
                Some((_, v)) => {
                    let RawItem::Array(items) = v else {
                        return Err(DecodeError::ValidationFailed("attribute_ids is not an array".into()));
                    };
                    items
                        .iter()
                        .map(|i| require_u16(require_u64(i, "attribute id")?, "attribute id"))
                        .collect::<Result<Vec<_>, _>>()?
                }
                None => Vec::new(),
            };
            RequestPayload::Read { attribute_ids }
        }
        Operation::Write => {
            let fields = require_map(payload_item, "write payload")?;
            RequestPayload::Write { values: decode_attribute_map(&fields)? }
        }
        Operation::Subscribe => {
            let fields = require_map(payload_item, "subscribe payload")?;
            if endpoint_id == 0 && feature_id == 0 {
                let sub_id = require_u32(
                    &fields
                        .iter()
                        .find(|(k, _)| *k == 1)
                        .map(|(_, v)| v.clone())
                        .ok_or_else(|| DecodeError::ValidationFailed("missing subscription_id".into()))?,
                    "subscription_id",
                )?;
                RequestPayload::Subscribe(SubscribePayload::Unsubscribe { subscription_id: sub_id })
            } else {
                let attribute_ids = match fields.iter().find(|(k, _)| *k == 1) {
                    Some((_, v)) => {
                        let RawItem::Array(items) = v else {
                            return Err(DecodeError::ValidationFailed("attribute_ids is not an array".into()));
                        };
                        items
                            .iter()
                            .map(|i| require_u16(require_u64(i, "attribute id")?, "attribute id"))
                            .collect::<Result<Vec<_>, _>>()?
                    }
                    None => Vec::new(),
                };
                let min_interval_ms = fields
                    .iter()
                    .find(|(k, _)| *k == 2)
                    .map(|(_, v)| require_u32(v, "min_interval_ms"))
                    .transpose()?
                    .unwrap_or(0);
                let max_interval_ms = fields
                    .iter()
                    .find(|(k, _)| *k == 3)
                    .map(|(_, v)| require_u32(v, "max_interval_ms"))
                    .transpose()?
                    .unwrap_or(0);
                RequestPayload::Subscribe(SubscribePayload::Subscribe {
                    attribute_ids,
                    min_interval_ms,
                    max_interval_ms,
                })
            }
        }
        Operation::Invoke => {
            let fields = require_map(payload_item, "invoke payload")?;
            let command_id = require_u16(
                require_u64(
                    &fields
                        .iter()
                        .find(|(k, _)| *k == 1)
                        .map(|(_, v)| v.clone())
                        .ok_or_else(|| DecodeError::ValidationFailed("missing command_id".into()))?,
                    "command_id",
                )?,
                "command_id",
            )?;
            let parameters = fields
                .iter()
                .find(|(k, _)| *k == 2)
                .map(|(_, v)| raw_to_value(v))
                .transpose()?
                .unwrap_or(Value::Null);
            RequestPayload::Invoke { command_id, parameters }
        }
    };

    Ok(Request { message_id, operation, endpoint_id, feature_id, payload })
}

/// Decode a RESPONSE frame. A RESPONSE's payload shape depends on which
/// request it answers, which the wire format doesn't carry; this function
/// only distinguishes the universally-decidable cases (`Error` on non-success
/// status, `Values` on a flat attribute map, `Empty` when no payload key is
/// present). Callers expecting a `Subscribed` payload — i.e. ones that
/// matched this response to a fresh Subscribe request — should use
/// [`decode_subscribe_response`] instead.
pub fn decode_response(bytes: &[u8]) -> Result<Response, DecodeError> {
    let top = TopMap::parse(bytes)?;
    let message_id: MessageId = require_u32(require(top.get(1), "messageId")?, "messageId")?;
    if message_id == 0 {
        return Err(DecodeError::ValidationFailed("RESPONSE message_id must be >= 1".into()));
    }
    let status_byte = require_u8(require(top.get(2), "status")?, "status")?;
    let status = Status::from_u8(status_byte)
        .ok_or_else(|| DecodeError::ValidationFailed(format!("unknown status: {status_byte}")))?;

    let payload = match top.get(3) {
        None => ResponsePayload::Empty,
        Some(item) => {
            if !status.is_success() {
                let fields = require_map(item, "error payload")?;
                let message = fields
                    .iter()
                    .find(|(k, _)| *k == 1)
                    .map(|(_, v)| match v {
                        RawItem::Text(s) => Ok(s.clone()),
                        _ => Err(DecodeError::ValidationFailed("error message is not text".into())),
                    })
                    .transpose()?;
                ResponsePayload::Error { message }
            } else {
                let fields = require_map(item, "response payload")?;
                ResponsePayload::Values(decode_attribute_map(&fields)?)
            }
        }
    };

    Ok(Response { message_id, status, payload })
}

/// Decode a RESPONSE known to answer a Subscribe request, extracting the
/// `{1: subscription_id, 2: priming_report}` payload shape.
pub fn decode_subscribe_response(bytes: &[u8]) -> Result<Response, DecodeError> {
    let top = TopMap::parse(bytes)?;
    let message_id: MessageId = require_u32(require(top.get(1), "messageId")?, "messageId")?;
    let status_byte = require_u8(require(top.get(2), "status")?, "status")?;
    let status = Status::from_u8(status_byte)
        .ok_or_else(|| DecodeError::ValidationFailed(format!("unknown status: {status_byte}")))?;

    let payload = match top.get(3) {
        None => ResponsePayload::Empty,
        Some(item) if !status.is_success() => {
            let fields = require_map(item, "error payload")?;
            let message = fields
                .iter()
                .find(|(k, _)| *k == 1)
                .map(|(_, v)| match v {
                    RawItem::Text(s) => Ok(s.clone()),
                    _ => Err(DecodeError::ValidationFailed("error message is not text".into())),
                })
                .transpose()?;
            ResponsePayload::Error { message }
        }
        Some(item) => {
            let fields = require_map(item, "subscribed payload")?;
            let subscription_id = require_u32(
                &fields
                    .iter()
                    .find(|(k, _)| *k == 1)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| DecodeError::ValidationFailed("missing subscription_id".into()))?,
                "subscription_id",
            )?;
            let priming_report = fields
                .iter()
                .find(|(k, _)| *k == 2)
                .map(|(_, v)| require_map(v, "priming_report"))
                .transpose()?
                .map(|m| decode_attribute_map(&m))
                .transpose()?
                .unwrap_or_default();
            ResponsePayload::Subscribed { subscription_id, priming_report }
        }
    };

    Ok(Response { message_id, status, payload })
}

/// Decode a NOTIFICATION frame.
pub fn decode_notification(bytes: &[u8]) -> Result<Notification, DecodeError> {
    let top = TopMap::parse(bytes)?;
    let message_id = require_u32(require(top.get(1), "messageId")?, "messageId")?;
    if message_id != 0 {
        return Err(DecodeError::ValidationFailed("NOTIFICATION message_id must be 0".into()));
    }
    let subscription_id = require_u32(require(top.get(2), "subscriptionId")?, "subscriptionId")?;
    let endpoint_id = require_u8(require(top.get(3), "endpointId")?, "endpointId")?;
    let feature_id = require_u8(require(top.get(4), "featureId")?, "featureId")?;
    let changes_item = require(top.get(5), "changes")?;
    let fields = require_map(changes_item, "changes")?;
    let changes = decode_attribute_map(&fields)?;
    Ok(Notification { subscription_id, endpoint_id, feature_id, changes })
}

/// Decode a CONTROL frame.
pub fn decode_control(bytes: &[u8]) -> Result<Control, DecodeError> {
    let top = TopMap::parse(bytes)?;
    let ty_byte = require_u8(require(top.get(1), "type")?, "type")?;
    let ty = ControlType::from_u8(ty_byte)
        .ok_or_else(|| DecodeError::ValidationFailed(format!("unknown control type: {ty_byte}")))?;
    let sequence = match top.get(2) {
        Some(item) => require_u32(item, "sequence")?,
        None => 0,
    };
    Ok(Control { ty, sequence })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mash_wire::{Operation, Status};

    fn sample_request() -> Request {
        Request {
            message_id: 7,
            operation: Operation::Read,
            endpoint_id: 1,
            feature_id: 2,
            payload: RequestPayload::Read { attribute_ids: vec![10, 20] },
        }
    }

    #[test]
    fn request_round_trips() {
        let req = sample_request();
        let bytes = encode(&Message::Request(req.clone())).unwrap();
        let decoded = decode_request(&bytes).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn peek_agrees_with_request_decode() {
        let bytes = encode(&Message::Request(sample_request())).unwrap();
        assert_eq!(peek_kind(&bytes), PeekKind::Request);
        assert!(decode_request(&bytes).is_ok());
    }

    #[test]
    fn peek_classifies_control() {
        let bytes = encode(&Message::Control(Control::ping(42))).unwrap();
        assert_eq!(peek_kind(&bytes), PeekKind::Control);
        let ctrl = decode_control(&bytes).unwrap();
        assert_eq!(ctrl, Control::ping(42));
    }

    #[test]
    fn peek_classifies_close_without_sequence_key() {
        let bytes = encode(&Message::Control(Control::close())).unwrap();
        assert_eq!(peek_kind(&bytes), PeekKind::Control);
        assert_eq!(decode_control(&bytes).unwrap(), Control::close());
    }

    #[test]
    fn peek_classifies_notification() {
        let note = Notification { subscription_id: 9, endpoint_id: 1, feature_id: 1, changes: vec![(5, Value::UInt(1))] };
        let bytes = encode(&Message::Notification(note.clone())).unwrap();
        assert_eq!(peek_kind(&bytes), PeekKind::Notification);
        assert_eq!(decode_notification(&bytes).unwrap(), note);
    }

    #[test]
    fn response_round_trips_values_payload() {
        let resp = Response {
            message_id: 3,
            status: Status::Success,
            payload: ResponsePayload::Values(vec![(1, Value::UInt(100))]),
        };
        let bytes = encode(&Message::Response(resp.clone())).unwrap();
        assert_eq!(peek_kind(&bytes), PeekKind::Response);
        assert_eq!(decode_response(&bytes).unwrap(), resp);
    }

    #[test]
    fn response_error_payload_round_trips() {
        let resp = Response {
            message_id: 3,
            status: Status::InvalidAttribute,
            payload: ResponsePayload::Error { message: Some("bad attribute".into()) },
        };
        let bytes = encode(&Message::Response(resp.clone())).unwrap();
        assert_eq!(decode_response(&bytes).unwrap(), resp);
    }

    #[test]
    fn subscribe_response_round_trips() {
        let resp = Response {
            message_id: 4,
            status: Status::Success,
            payload: ResponsePayload::Subscribed { subscription_id: 77, priming_report: vec![(2, Value::Bool(true))] },
        };
        let bytes = encode(&Message::Response(resp.clone())).unwrap();
        assert_eq!(decode_subscribe_response(&bytes).unwrap(), resp);
    }

    #[test]
    fn zero_message_id_request_is_rejected_on_encode() {
        let mut req = sample_request();
        req.message_id = 0;
        let err = encode(&Message::Request(req)).unwrap_err();
        assert_eq!(err, EncodeError::InvalidMessageId);
    }

    #[test]
    fn unsubscribe_round_trips() {
        let req = Request {
            message_id: 1,
            operation: Operation::Subscribe,
            endpoint_id: 0,
            feature_id: 0,
            payload: RequestPayload::Subscribe(SubscribePayload::Unsubscribe { subscription_id: 55 }),
        };
        let bytes = encode(&Message::Request(req.clone())).unwrap();
        assert_eq!(decode_request(&bytes).unwrap(), req);
    }

    #[test]
    fn unknown_top_level_keys_are_ignored() {
        // Build a valid CONTROL ping, then append an unknown key 9, as a
        // forward-compatible future field.
        let mut entries = vec![
            (CborValue::Integer(1u8.into()), CborValue::Integer(1u8.into())),
            (CborValue::Integer(2u8.into()), CborValue::Integer(5u32.into())),
            (CborValue::Integer(9u8.into()), CborValue::Text("future".into())),
        ];
        entries.sort_by_key(|(k, _)| match k {
            CborValue::Integer(i) => i128::from(*i),
            _ => unreachable!(),
        });
        let top = CborValue::Map(entries);
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&top, &mut bytes).unwrap();
        let ctrl = decode_control(&bytes).unwrap();
        assert_eq!(ctrl, Control::ping(5));
    }

    #[test]
    fn duplicate_key_is_rejected_on_decode() {
        let bytes = [0xa2, 0x01, 0x01, 0x01, 0x02];
        let err = decode_control(&bytes).unwrap_err();
        assert_eq!(err, DecodeError::DuplicateKey);
    }
}
