use std::fmt;

/// Failures building a TLS profile or verifying a negotiated connection.
#[derive(Debug)]
pub enum TlsError {
    /// A supplied PEM blob didn't contain a usable certificate or key.
    InvalidPem(String),
    /// rustls rejected a config, handshake, or certificate outright.
    Rustls(rustls::Error),
    /// The negotiated protocol version wasn't TLS 1.3.
    WrongVersion(Option<rustls::ProtocolVersion>),
    /// No ALPN protocol was negotiated.
    MissingAlpn,
    /// The negotiated ALPN protocol didn't match what this profile requires.
    WrongAlpn { negotiated: Vec<u8>, expected: Vec<u8> },
    /// The peer's leaf certificate failed to parse as X.509.
    MalformedCertificate(String),
    /// The peer's certificate lacks `serverAuth`/`clientAuth` key usage.
    MissingKeyUsage,
    /// An expected device id didn't match the peer certificate's CN or any DNS SAN.
    DeviceIdMismatch { expected: String },
    /// Server is configured for mutual TLS but the peer presented no certificate.
    PeerCertificateRequired,
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsError::InvalidPem(msg) => write!(f, "invalid PEM input: {msg}"),
            TlsError::Rustls(e) => write!(f, "TLS error: {e}"),
            TlsError::WrongVersion(v) => write!(f, "negotiated protocol version {v:?} is not TLS 1.3"),
            TlsError::MissingAlpn => write!(f, "no ALPN protocol was negotiated"),
            TlsError::WrongAlpn { negotiated, expected } => write!(
                f,
                "negotiated ALPN {:?} does not match required {:?}",
                String::from_utf8_lossy(negotiated),
                String::from_utf8_lossy(expected)
            ),
            TlsError::MalformedCertificate(msg) => write!(f, "malformed certificate: {msg}"),
            TlsError::MissingKeyUsage => write!(f, "certificate lacks serverAuth/clientAuth key usage"),
            TlsError::DeviceIdMismatch { expected } => {
                write!(f, "peer certificate does not match expected device id {expected}")
            }
            TlsError::PeerCertificateRequired => write!(f, "mutual TLS requires a client certificate"),
        }
    }
}

impl std::error::Error for TlsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TlsError::Rustls(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rustls::Error> for TlsError {
    fn from(e: rustls::Error) -> Self {
        TlsError::Rustls(e)
    }
}
