#![forbid(unsafe_code)]
//! TLS 1.3 connection profiles for MASH.
//!
//! Builds client/server rustls configs for the operational (mutual-auth,
//! device-id-verified) and commissioning (unauthenticated, PAKE-backed)
//! postures, and exposes the post-handshake checks every [`Connection`] must
//! run before trusting a newly-established stream: TLS version pinning and
//! strict ALPN.
//!
//! [`Connection`]: https://docs.rs/mash-connection

mod error;
mod profile;
mod verifier;

pub use error::TlsError;
pub use profile::{
    commissioning_client_config, commissioning_server_config, load_cert_chain, load_private_key,
    operational_client_config, operational_server_config, root_store_from_pem,
};
pub use verifier::{parse_peer_identity, require_server_or_client_auth_usage, PeerIdentity};

/// ALPN token for the operational profile.
pub const ALPN_OPERATIONAL: &[u8] = b"mash/1";
/// ALPN token for the commissioning profile.
pub const ALPN_COMMISSIONING: &[u8] = b"mash-commissioning/1";

/// Confirm a negotiated connection settled on TLS 1.3. Run this immediately
/// after handshake; any failure must abort the connection before the
/// application sees it.
pub fn verify_tls13(negotiated: Option<rustls::ProtocolVersion>) -> Result<(), TlsError> {
    match negotiated {
        Some(rustls::ProtocolVersion::TLSv1_3) => Ok(()),
        other => Err(TlsError::WrongVersion(other)),
    }
}

/// Confirm a negotiated connection agreed on exactly the expected ALPN
/// protocol.
pub fn verify_alpn(negotiated: Option<&[u8]>, expected: &[u8]) -> Result<(), TlsError> {
    match negotiated {
        Some(proto) if proto == expected => Ok(()),
        Some(proto) => Err(TlsError::WrongAlpn { negotiated: proto.to_vec(), expected: expected.to_vec() }),
        None => Err(TlsError::MissingAlpn),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_tls13_accepts_only_tls13() {
        assert!(verify_tls13(Some(rustls::ProtocolVersion::TLSv1_3)).is_ok());
        assert!(verify_tls13(Some(rustls::ProtocolVersion::TLSv1_2)).is_err());
        assert!(verify_tls13(None).is_err());
    }

    #[test]
    fn verify_alpn_requires_exact_match() {
        assert!(verify_alpn(Some(ALPN_OPERATIONAL), ALPN_OPERATIONAL).is_ok());
        assert!(verify_alpn(Some(ALPN_COMMISSIONING), ALPN_OPERATIONAL).is_err());
        assert!(verify_alpn(None, ALPN_OPERATIONAL).is_err());
    }

    #[test]
    fn device_identity_matches_cn_or_san() {
        let identity = PeerIdentity {
            common_name: Some("device-123".into()),
            dns_sans: vec!["device-123.zone.mash".into()],
        };
        assert!(identity.matches("device-123"));
        assert!(identity.matches("device-123.zone.mash"));
        assert!(!identity.matches("device-999"));
    }

    #[test]
    fn rcgen_cert_round_trips_through_loader() {
        let cert = rcgen::generate_simple_self_signed(vec!["device-1".into()]).unwrap();
        let pem = cert.cert.pem();
        let chain = load_cert_chain(pem.as_bytes()).unwrap();
        assert_eq!(chain.len(), 1);

        let identity = parse_peer_identity(&chain[0]).unwrap();
        assert!(identity.dns_sans.iter().any(|s| s == "device-1"));
    }
}
