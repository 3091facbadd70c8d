use std::io::BufReader;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};

use crate::error::TlsError;
use crate::verifier::{mutual_tls_client_verifier, DeviceIdentityVerifier, NoClientVerification, NoServerVerification};
use crate::{ALPN_COMMISSIONING, ALPN_OPERATIONAL};

/// Parse a chain of PEM-encoded certificates.
pub fn load_cert_chain(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = BufReader::new(pem);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::InvalidPem(e.to_string()))
}

/// Parse a single PEM-encoded private key (PKCS#8, SEC1, or PKCS#1).
pub fn load_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = BufReader::new(pem);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::InvalidPem(e.to_string()))?
        .ok_or_else(|| TlsError::InvalidPem("no private key found in PEM input".into()))
}

/// Build a Zone CA root store from one or more PEM-encoded CA certificates.
pub fn root_store_from_pem(pem: &[u8]) -> Result<RootCertStore, TlsError> {
    let mut store = RootCertStore::empty();
    for cert in load_cert_chain(pem)? {
        store
            .add(cert)
            .map_err(|e| TlsError::InvalidPem(format!("zone CA certificate rejected: {e}")))?;
    }
    Ok(store)
}

const TLS13_ONLY: &[&rustls::SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// The ring provider's default key-exchange group list, pinned to the
/// order the TLS profile requires: X25519 first, P-256 as fallback.
fn mash_crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    let mut provider = rustls::crypto::ring::default_provider();
    provider.kx_groups = vec![rustls::crypto::ring::kx_group::X25519, rustls::crypto::ring::kx_group::SECP256R1];
    Arc::new(provider)
}

/// Operational server profile: TLS 1.3 only, mutual TLS against the Zone CA.
pub fn operational_server_config(
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    zone_ca_roots: RootCertStore,
) -> Result<ServerConfig, TlsError> {
    let client_verifier = mutual_tls_client_verifier(Arc::new(zone_ca_roots))?;
    let mut config = ServerConfig::builder_with_provider(mash_crypto_provider())
        .with_protocol_versions(TLS13_ONLY)
        .map_err(TlsError::from)?
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(cert_chain, key)
        .map_err(TlsError::from)?;
    config.alpn_protocols = vec![ALPN_OPERATIONAL.to_vec()];
    // No session tickets, no resumption: every handshake re-runs full
    // mutual authentication against the Zone CA.
    config.send_tls13_tickets = 0;
    config.session_storage = Arc::new(rustls::server::NoServerSessionStorage {});
    Ok(config)
}

/// Operational client profile: TLS 1.3 only, validates the server's chain
/// against the Zone CA and (if given) the peer's device id, bypassing
/// hostname verification entirely.
pub fn operational_client_config(
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    zone_ca_roots: RootCertStore,
    expected_device_id: Option<String>,
) -> Result<ClientConfig, TlsError> {
    let verifier = DeviceIdentityVerifier::new(Arc::new(zone_ca_roots), expected_device_id)?;
    let mut config = ClientConfig::builder_with_provider(mash_crypto_provider())
        .with_protocol_versions(TLS13_ONLY)
        .map_err(TlsError::from)?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_client_auth_cert(cert_chain, key)
        .map_err(TlsError::from)?;
    config.alpn_protocols = vec![ALPN_OPERATIONAL.to_vec()];
    config.resumption = rustls::client::Resumption::disabled();
    Ok(config)
}

/// Commissioning server profile: TLS 1.3 only, no client certificate
/// requested. Trust is established out-of-band via a PAKE handshake.
pub fn commissioning_server_config(
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<ServerConfig, TlsError> {
    let mut config = ServerConfig::builder_with_provider(mash_crypto_provider())
        .with_protocol_versions(TLS13_ONLY)
        .map_err(TlsError::from)?
        .with_client_cert_verifier(Arc::new(NoClientVerification))
        .with_single_cert(cert_chain, key)
        .map_err(TlsError::from)?;
    config.alpn_protocols = vec![ALPN_COMMISSIONING.to_vec()];
    config.send_tls13_tickets = 0;
    config.session_storage = Arc::new(rustls::server::NoServerSessionStorage {});
    Ok(config)
}

/// Commissioning client profile: TLS 1.3 only, no peer verification, no
/// client certificate. Security relies entirely on the out-of-band PAKE.
pub fn commissioning_client_config() -> Result<ClientConfig, TlsError> {
    let mut config = ClientConfig::builder_with_provider(mash_crypto_provider())
        .with_protocol_versions(TLS13_ONLY)
        .map_err(TlsError::from)?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoServerVerification::new()))
        .with_no_client_auth();
    config.alpn_protocols = vec![ALPN_COMMISSIONING.to_vec()];
    config.resumption = rustls::client::Resumption::disabled();
    Ok(config)
}
