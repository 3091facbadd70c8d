//! Shared fixtures for end-to-end conformance tests: a one-shot Zone CA and
//! device certificates issued from it, so mutual-TLS scenarios don't need a
//! pre-provisioned PKI.

use rcgen::{BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair};

/// A self-signed Zone CA, generated fresh for each test.
pub struct ZoneCa {
    cert: Certificate,
    key: KeyPair,
}

/// A leaf certificate plus its private key, both PEM-encoded.
pub struct DeviceCert {
    pub cert_pem: String,
    pub key_pem: String,
}

impl ZoneCa {
    pub fn generate(name: &str) -> Self {
        let mut params = CertificateParams::new(Vec::new()).expect("empty SAN list is always valid");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, name);
        params.distinguished_name = dn;
        let key = KeyPair::generate().expect("key generation");
        let cert = params.self_signed(&key).expect("self-signing the zone CA");
        ZoneCa { cert, key }
    }

    pub fn cert_pem(&self) -> String {
        self.cert.pem()
    }

    /// Issue a device certificate signed by this CA, with `device_id` as
    /// both the subject common name and sole DNS SAN.
    pub fn issue(&self, device_id: &str) -> DeviceCert {
        let mut params = CertificateParams::new(vec![device_id.to_string()]).expect("device id is a valid DNS SAN");
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, device_id);
        params.distinguished_name = dn;
        let key = KeyPair::generate().expect("key generation");
        let cert = params.signed_by(&key, &self.cert, &self.key).expect("signing device cert");
        DeviceCert { cert_pem: cert.pem(), key_pem: key.serialize_pem() }
    }
}
