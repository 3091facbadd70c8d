#![forbid(unsafe_code)]
//! Connection lifecycle state machine and message pump for MASH.
//!
//! A [`Connection`] owns a single handshaked TLS stream, the framer over it,
//! and the keepalive task bound to it. It drives the four-state lifecycle
//! (`Disconnected` → `Connecting` → `Connected` → `Closing` →
//! `Disconnected`) described by the core protocol, dispatching CONTROL
//! frames itself and handing everything else to an application-supplied
//! [`ConnectionObserver`]. [`Client`] and [`Server`] are the two factories
//! that produce one: a `Client` dials out and runs the client side of the
//! TLS handshake; a `Server` owns a listener task and runs the server side
//! for each accepted socket.

mod client;
mod connection;
mod error;
mod server;
mod state;

pub use client::{Client, ClientStream};
pub use connection::{Connection, ConnectionConfig, ConnectionObserver, ControlDirection, NegotiatedTls, NullObserver};
pub use error::ConnectionError;
pub use mash_wire::ControlType;
pub use server::{Server, ServerStream};
pub use state::ConnectionState;
