#![forbid(unsafe_code)]
//! Pure data types for the MASH wire protocol.
//!
//! This crate has no I/O and no serialization logic — it only defines the
//! message shapes described by the MASH core. [`mash_codec`](https://docs.rs/mash-codec)
//! turns these into canonical CBOR bytes and back; this crate exists so that
//! crate can share one definition with the connection layer and, eventually,
//! any out-of-tree test harness.

use std::fmt;

/// 32-bit message identifier. `0` is reserved to mark a NOTIFICATION;
/// REQUEST/RESPONSE pairs must use a value `>= 1`. See [`NOTIFICATION_MESSAGE_ID`].
pub type MessageId = u32;

/// The `message_id` value that marks a message as a NOTIFICATION.
pub const NOTIFICATION_MESSAGE_ID: MessageId = 0;

/// Read / Write / Subscribe / Invoke, as carried by a REQUEST.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Read = 1,
    Write = 2,
    Subscribe = 3,
    Invoke = 4,
}

impl Operation {
    pub fn from_u8(val: u8) -> Option<Self> {
        Some(match val {
            1 => Operation::Read,
            2 => Operation::Write,
            3 => Operation::Subscribe,
            4 => Operation::Invoke,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Operation {
    type Error = UnknownOperation;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        Operation::from_u8(val).ok_or(UnknownOperation(val))
    }
}

impl From<Operation> for u8 {
    fn from(op: Operation) -> u8 {
        op.as_u8()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Subscribe => "subscribe",
            Operation::Invoke => "invoke",
        };
        write!(f, "{name}")
    }
}

/// Error when converting from an unrecognized operation value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownOperation(pub u8);

impl fmt::Display for UnknownOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown operation: {}", self.0)
    }
}

impl std::error::Error for UnknownOperation {}

/// RESPONSE status code. `0` is success; `1..=12` are named errors.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Success = 0,
    InvalidEndpoint = 1,
    InvalidFeature = 2,
    InvalidAttribute = 3,
    InvalidCommand = 4,
    InvalidParameter = 5,
    ReadOnly = 6,
    WriteOnly = 7,
    NotAuthorized = 8,
    Busy = 9,
    Unsupported = 10,
    ConstraintError = 11,
    Timeout = 12,
}

impl Status {
    pub fn from_u8(val: u8) -> Option<Self> {
        Some(match val {
            0 => Status::Success,
            1 => Status::InvalidEndpoint,
            2 => Status::InvalidFeature,
            3 => Status::InvalidAttribute,
            4 => Status::InvalidCommand,
            5 => Status::InvalidParameter,
            6 => Status::ReadOnly,
            7 => Status::WriteOnly,
            8 => Status::NotAuthorized,
            9 => Status::Busy,
            10 => Status::Unsupported,
            11 => Status::ConstraintError,
            12 => Status::Timeout,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }

    /// Short machine-friendly name, e.g. `"invalid_endpoint"`.
    pub fn name(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::InvalidEndpoint => "invalid_endpoint",
            Status::InvalidFeature => "invalid_feature",
            Status::InvalidAttribute => "invalid_attribute",
            Status::InvalidCommand => "invalid_command",
            Status::InvalidParameter => "invalid_parameter",
            Status::ReadOnly => "read_only",
            Status::WriteOnly => "write_only",
            Status::NotAuthorized => "not_authorized",
            Status::Busy => "busy",
            Status::Unsupported => "unsupported",
            Status::ConstraintError => "constraint_error",
            Status::Timeout => "timeout",
        }
    }

    /// A human-readable description of this status, suitable for logs.
    pub fn description(self) -> &'static str {
        match self {
            Status::Success => "operation completed successfully",
            Status::InvalidEndpoint => "no such endpoint on this device",
            Status::InvalidFeature => "no such feature on this endpoint",
            Status::InvalidAttribute => "no such attribute on this feature",
            Status::InvalidCommand => "no such command on this feature",
            Status::InvalidParameter => "a command parameter was invalid",
            Status::ReadOnly => "attribute cannot be written",
            Status::WriteOnly => "attribute cannot be read",
            Status::NotAuthorized => "caller is not authorized for this operation",
            Status::Busy => "device is busy, retry later",
            Status::Unsupported => "operation is not supported",
            Status::ConstraintError => "value violates an attribute constraint",
            Status::Timeout => "operation timed out",
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = UnknownStatus;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        Status::from_u8(val).ok_or(UnknownStatus(val))
    }
}

impl From<Status> for u8 {
    fn from(s: Status) -> u8 {
        s.as_u8()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u8())
    }
}

/// Error when converting from an unrecognized status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownStatus(pub u8);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

/// CONTROL message kind: liveness probe, its reply, or graceful close.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlType {
    Ping = 1,
    Pong = 2,
    Close = 3,
}

impl ControlType {
    pub fn from_u8(val: u8) -> Option<Self> {
        Some(match val {
            1 => ControlType::Ping,
            2 => ControlType::Pong,
            3 => ControlType::Close,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ControlType {
    type Error = UnknownControlType;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        ControlType::from_u8(val).ok_or(UnknownControlType(val))
    }
}

impl From<ControlType> for u8 {
    fn from(c: ControlType) -> u8 {
        c.as_u8()
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlType::Ping => "ping",
            ControlType::Pong => "pong",
            ControlType::Close => "close",
        };
        write!(f, "{name}")
    }
}

/// Error when converting from an unrecognized control type value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownControlType(pub u8);

impl fmt::Display for UnknownControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown control type: {}", self.0)
    }
}

impl std::error::Error for UnknownControlType {}

/// A closed sum of the value shapes MASH payloads carry. `Null` is distinct
/// from a key's outright absence in an attribute map — see [`AttributeMap`].
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    UInt(u64),
    Bool(bool),
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Null,
}

/// An ordered attribute-id -> value mapping, as used by read responses,
/// write requests, and subscription priming reports / change sets.
///
/// Ordered (rather than a `HashMap`) so canonical encoding can preserve
/// insertion order before the codec re-sorts keys for the wire.
pub type AttributeMap = Vec<(u16, Value)>;

/// Top-level MASH message, tagged by kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
    Control(Control),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Request(_) => MessageKind::Request,
            Message::Response(_) => MessageKind::Response,
            Message::Notification(_) => MessageKind::Notification,
            Message::Control(_) => MessageKind::Control,
        }
    }
}

/// The four message families, as distinguished by [`mash_codec`]'s `peek_kind`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request,
    Response,
    Notification,
    Control,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
            MessageKind::Notification => "notification",
            MessageKind::Control => "control",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub message_id: MessageId,
    pub operation: Operation,
    pub endpoint_id: u8,
    pub feature_id: u8,
    pub payload: RequestPayload,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RequestPayload {
    Read {
        /// Empty means "all attributes".
        attribute_ids: Vec<u16>,
    },
    Write {
        /// Absent key = leave unchanged; `Value::Null` = clear.
        values: AttributeMap,
    },
    Subscribe(SubscribePayload),
    Invoke {
        command_id: u16,
        parameters: Value,
    },
}

/// A Subscribe-operation REQUEST is either a fresh subscription, or — when
/// `endpoint_id == 0 && feature_id == 0` — an unsubscribe by id.
#[derive(Clone, Debug, PartialEq)]
pub enum SubscribePayload {
    Subscribe {
        attribute_ids: Vec<u16>,
        min_interval_ms: u32,
        max_interval_ms: u32,
    },
    Unsubscribe {
        subscription_id: u32,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub message_id: MessageId,
    pub status: Status,
    pub payload: ResponsePayload,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub enum ResponsePayload {
    #[default]
    Empty,
    Values(AttributeMap),
    Subscribed {
        subscription_id: u32,
        priming_report: AttributeMap,
    },
    Error {
        message: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub subscription_id: u32,
    pub endpoint_id: u8,
    pub feature_id: u8,
    pub changes: AttributeMap,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Control {
    pub ty: ControlType,
    /// `0` for `Close`, otherwise the PING/PONG sequence number.
    pub sequence: u32,
}

impl Control {
    pub fn ping(sequence: u32) -> Self {
        Control { ty: ControlType::Ping, sequence }
    }

    pub fn pong(sequence: u32) -> Self {
        Control { ty: ControlType::Pong, sequence }
    }

    pub fn close() -> Self {
        Control { ty: ControlType::Close, sequence: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_round_trips_through_u8() {
        for op in [Operation::Read, Operation::Write, Operation::Subscribe, Operation::Invoke] {
            assert_eq!(Operation::try_from(op.as_u8()), Ok(op));
        }
        assert_eq!(Operation::try_from(0u8), Err(UnknownOperation(0)));
        assert_eq!(Operation::try_from(5u8), Err(UnknownOperation(5)));
    }

    #[test]
    fn status_name_is_snake_case() {
        assert_eq!(Status::InvalidEndpoint.name(), "invalid_endpoint");
        assert_eq!(Status::Success.as_u8(), 0);
        assert_eq!(Status::Timeout.as_u8(), 12);
    }

    #[test]
    fn control_type_round_trips() {
        for ty in [ControlType::Ping, ControlType::Pong, ControlType::Close] {
            assert_eq!(ControlType::try_from(ty.as_u8()), Ok(ty));
        }
    }

    #[test]
    fn control_close_has_zero_sequence() {
        let c = Control::close();
        assert_eq!(c.sequence, 0);
        assert_eq!(c.ty, ControlType::Close);
    }
}
