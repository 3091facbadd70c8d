use std::fmt;

/// Failures from [`crate::encode`].
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeError {
    /// A REQUEST or RESPONSE carried `message_id == 0`.
    InvalidMessageId,
    /// A REQUEST carried an operation byte outside `1..=4`.
    InvalidOperation(u8),
    /// The message's shape violates a MASH invariant not covered above.
    StructurallyInvalid(String),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::InvalidMessageId => {
                write!(f, "message_id must be >= 1 for REQUEST/RESPONSE")
            }
            EncodeError::InvalidOperation(v) => write!(f, "invalid operation byte: {v}"),
            EncodeError::StructurallyInvalid(msg) => write!(f, "structurally invalid message: {msg}"),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Failures from [`crate::decode_request`] and friends.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Malformed CBOR, or a construct MASH does not speak (tags, reserved
    /// additional-info values, truncated input).
    Cbor(String),
    /// The same key appeared twice in a CBOR map.
    DuplicateKey,
    /// An integer field did not fit the type it was decoded into.
    BadInteger(String),
    /// A float field decoded to NaN or +/-Infinity.
    NaNOrInfinity,
    /// A text-string key was found where MASH requires an integer key.
    StringKey,
    /// The CBOR was well-formed but failed a MASH-level invariant
    /// (missing required field, unknown message kind, out-of-range enum).
    ValidationFailed(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Cbor(msg) => write!(f, "malformed CBOR: {msg}"),
            DecodeError::DuplicateKey => write!(f, "duplicate key in CBOR map"),
            DecodeError::BadInteger(msg) => write!(f, "integer out of range: {msg}"),
            DecodeError::NaNOrInfinity => write!(f, "NaN or Infinity is not a valid MASH value"),
            DecodeError::StringKey => write!(f, "string key found where an integer key is required"),
            DecodeError::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl std::error::Error for DecodeError {}
