//! Custom peer verification.
//!
//! MASH identifies peers by a device id carried in the leaf certificate,
//! not by DNS hostname, so the stock `rustls` server-name check doesn't
//! apply. [`DeviceIdentityVerifier`] does the same chain-to-trust-anchor
//! work rustls's built-in verifier does, then skips straight past hostname
//! matching to the device-id check described in the TLS profile.

use std::fmt;
use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::WebPkiClientVerifier;
use rustls::{DigitallySignedStruct, DistinguishedName, Error as RustlsError, RootCertStore, SignatureScheme};

use crate::error::TlsError;

/// CN and DNS-SAN entries pulled from a leaf certificate, used to decide
/// whether it speaks for a given device id.
#[derive(Debug, Default, Clone)]
pub struct PeerIdentity {
    pub common_name: Option<String>,
    pub dns_sans: Vec<String>,
}

impl PeerIdentity {
    pub fn matches(&self, expected_device_id: &str) -> bool {
        self.common_name.as_deref() == Some(expected_device_id)
            || self.dns_sans.iter().any(|s| s == expected_device_id)
    }
}

/// Parse a leaf certificate's subject CN and DNS SANs.
pub fn parse_peer_identity(cert: &CertificateDer<'_>) -> Result<PeerIdentity, TlsError> {
    let (_, parsed) = x509_parser::parse_x509_certificate(cert.as_ref())
        .map_err(|e| TlsError::MalformedCertificate(e.to_string()))?;

    let common_name = parsed
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_owned);

    let mut dns_sans = Vec::new();
    if let Ok(Some(ext)) = parsed.subject_alternative_name() {
        for name in &ext.value.general_names {
            if let x509_parser::extensions::GeneralName::DNSName(dns) = name {
                dns_sans.push((*dns).to_owned());
            }
        }
    }

    Ok(PeerIdentity { common_name, dns_sans })
}

/// Require the certificate to carry `serverAuth` or `clientAuth` extended
/// key usage, per the TLS profile's required posture.
pub fn require_server_or_client_auth_usage(cert: &CertificateDer<'_>) -> Result<(), TlsError> {
    let (_, parsed) = x509_parser::parse_x509_certificate(cert.as_ref())
        .map_err(|e| TlsError::MalformedCertificate(e.to_string()))?;
    match parsed.extended_key_usage() {
        Ok(Some(eku)) if eku.value.server_auth || eku.value.client_auth => Ok(()),
        // Certificates with no EKU extension at all are treated as
        // unrestricted, matching widely-deployed self-signed device certs.
        Ok(None) => Ok(()),
        _ => Err(TlsError::MissingKeyUsage),
    }
}

/// Verifies the server's certificate chain against the configured Zone CA
/// set and, if an expected device id was provided, requires it to appear as
/// the leaf's CN or a DNS SAN. Never checks the connection hostname.
pub struct DeviceIdentityVerifier {
    inner: Arc<WebPkiServerVerifier>,
    expected_device_id: Option<String>,
}

impl fmt::Debug for DeviceIdentityVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentityVerifier")
            .field("expected_device_id", &self.expected_device_id)
            .finish()
    }
}

impl DeviceIdentityVerifier {
    pub fn new(roots: Arc<RootCertStore>, expected_device_id: Option<String>) -> Result<Self, TlsError> {
        let inner = WebPkiServerVerifier::builder(roots)
            .build()
            .map_err(|e| TlsError::Rustls(RustlsError::General(e.to_string())))?;
        Ok(DeviceIdentityVerifier { inner, expected_device_id })
    }
}

impl ServerCertVerifier for DeviceIdentityVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, RustlsError> {
        // Chain/signature validation is delegated to the stock verifier; we
        // supply a placeholder name purely to satisfy its signature, since
        // MASH identity comes from the device-id check below, not the
        // connection's hostname.
        let placeholder = ServerName::try_from("mash-peer")
            .map_err(|_| RustlsError::General("invalid placeholder server name".into()))?;
        self.inner
            .verify_server_cert(end_entity, intermediates, &placeholder, ocsp_response, now)?;

        require_server_or_client_auth_usage(end_entity)
            .map_err(|e| RustlsError::General(e.to_string()))?;

        if let Some(expected) = &self.expected_device_id {
            let identity = parse_peer_identity(end_entity).map_err(|e| RustlsError::General(e.to_string()))?;
            if !identity.matches(expected) {
                tracing::warn!(expected, cn = ?identity.common_name, "peer certificate did not match expected device id");
                return Err(RustlsError::General(format!(
                    "certificate does not match expected device id {expected}"
                )));
            }
        }

        tracing::debug!(expected_device_id = ?self.expected_device_id, "peer certificate chain verified");
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Commissioning-profile verifier: trusts any server certificate. Security
/// during commissioning comes from an out-of-band PAKE, not the TLS chain.
#[derive(Debug)]
pub struct NoServerVerification {
    schemes: Vec<SignatureScheme>,
}

impl NoServerVerification {
    pub fn new() -> Self {
        NoServerVerification {
            schemes: rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes(),
        }
    }
}

impl Default for NoServerVerification {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerCertVerifier for NoServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, RustlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.schemes.clone()
    }
}

/// Wraps rustls's stock mutual-TLS client verifier for the operational
/// server profile: any client certificate signed by the Zone CA is
/// accepted at the TLS layer. Key-usage and device-id checks against the
/// caller's access policy happen above this, once the connection is
/// established and [`parse_peer_identity`] can inspect the peer cert.
pub fn mutual_tls_client_verifier(
    roots: Arc<RootCertStore>,
) -> Result<Arc<dyn ClientCertVerifier>, TlsError> {
    WebPkiClientVerifier::builder(roots)
        .build()
        .map_err(|e| TlsError::Rustls(RustlsError::General(e.to_string())))
}

/// Commissioning-profile server-side verifier: no client certificate is
/// requested or required.
#[derive(Debug, Default)]
pub struct NoClientVerification;

impl ClientCertVerifier for NoClientVerification {
    fn offer_client_auth(&self) -> bool {
        false
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, RustlsError> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
