use std::fmt;

/// Failures surfaced by [`crate::Connection`], its [`crate::Client`], and
/// its [`crate::Server`].
#[derive(Debug)]
pub enum ConnectionError {
    /// `connect`/`accept` was attempted on a connection not in `Disconnected`.
    AlreadyConnected,
    /// `send` was attempted outside `Connected`.
    NotConnected,
    /// The TLS handshake or post-handshake verification failed.
    Handshake(mash_tls::TlsError),
    /// A frame violated the framer's bounds or arrived truncated.
    Frame(mash_framer::FrameError),
    /// The keepalive task reported `max_missed` consecutive PONGs lost.
    KeepaliveTimeout,
    /// `close()` did not observe the read loop drain within `close_timeout`.
    CloseTimeout,
    /// A CONTROL frame failed to encode or decode.
    Codec(String),
    Io(std::io::Error),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::AlreadyConnected => write!(f, "connection is already connected"),
            ConnectionError::NotConnected => write!(f, "connection is not connected"),
            ConnectionError::Handshake(e) => write!(f, "TLS handshake failed: {e}"),
            ConnectionError::Frame(e) => write!(f, "frame error: {e}"),
            ConnectionError::KeepaliveTimeout => write!(f, "keepalive timeout: peer is unresponsive"),
            ConnectionError::CloseTimeout => write!(f, "graceful close timed out"),
            ConnectionError::Codec(msg) => write!(f, "control frame codec error: {msg}"),
            ConnectionError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectionError::Handshake(e) => Some(e),
            ConnectionError::Frame(e) => Some(e),
            ConnectionError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConnectionError {
    fn from(e: std::io::Error) -> Self {
        ConnectionError::Io(e)
    }
}

impl From<mash_framer::FrameError> for ConnectionError {
    fn from(e: mash_framer::FrameError) -> Self {
        ConnectionError::Frame(e)
    }
}

impl From<mash_tls::TlsError> for ConnectionError {
    fn from(e: mash_tls::TlsError) -> Self {
        ConnectionError::Handshake(e)
    }
}

impl From<mash_codec::DecodeError> for ConnectionError {
    fn from(e: mash_codec::DecodeError) -> Self {
        ConnectionError::Codec(e.to_string())
    }
}

impl From<mash_codec::EncodeError> for ConnectionError {
    fn from(e: mash_codec::EncodeError) -> Self {
        ConnectionError::Codec(e.to_string())
    }
}
