//! MASH: a mutually-authenticated, schema-driven hardware protocol.
//!
//! This crate is a facade over the individual layers, each published
//! separately so an integrator can depend on just the framing or just the
//! codec if that's all they need:
//!
//! - [`mash_wire`] — pure message types, no I/O.
//! - [`mash_codec`] — canonical CBOR encode/decode and the `peek_kind`
//!   classifier.
//! - [`mash_framer`] — length-prefixed byte framing over an async stream.
//! - [`mash_tls`] — TLS 1.3 profiles (operational mutual-auth, unauthenticated
//!   commissioning) and the post-handshake version/ALPN checks.
//! - [`mash_keepalive`] — PING/PONG liveness detection.
//! - [`mash_connection`] — the lifecycle state machine, read loop, and
//!   `Client`/`Server` factories that tie the rest together.
//!
//! Most integrations only need [`prelude`].

pub use mash_codec::{self as codec, DecodeError, EncodeError, PeekKind};
pub use mash_connection::{
    self as connection, Client, ClientStream, Connection, ConnectionConfig, ConnectionError, ConnectionObserver,
    ConnectionState, ControlDirection, NegotiatedTls, NullObserver, Server, ServerStream,
};
pub use mash_framer::{self as framer, Direction, FrameError, FrameEvent, FrameObserver, Framer};
pub use mash_keepalive::{self as keepalive, KeepaliveConfig, KeepaliveObserver};
pub use mash_tls::{self as tls, TlsError};
pub use mash_wire::{
    self as wire, AttributeMap, Control, ControlType, Message, MessageId, MessageKind, Notification, Operation,
    Request, RequestPayload, Response, ResponsePayload, Status, SubscribePayload, Value,
};

/// Default MASH port, per the wire protocol's external interface.
pub const DEFAULT_PORT: u16 = 8443;

/// Convenient imports for building a MASH client or server.
pub mod prelude {
    pub use crate::{
        Client, Connection, ConnectionConfig, ConnectionError, ConnectionObserver, ConnectionState, Control,
        ControlType, Message, Operation, Request, RequestPayload, Response, ResponsePayload, Server, Status, Value,
    };
}
