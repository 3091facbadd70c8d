//! Required-posture checks from the TLS profile that aren't exercised by a
//! live handshake: no session tickets, no resumption.

use mash_conformance::ZoneCa;

#[test]
fn operational_server_never_issues_session_tickets() {
    let zone = ZoneCa::generate("zone-ticket-check");
    let cert = zone.issue("device-ticket-check");
    let config = mash_tls::operational_server_config(
        mash_tls::load_cert_chain(cert.cert_pem.as_bytes()).unwrap(),
        mash_tls::load_private_key(cert.key_pem.as_bytes()).unwrap(),
        mash_tls::root_store_from_pem(zone.cert_pem().as_bytes()).unwrap(),
    )
    .unwrap();

    // rustls issues TLS 1.3 NewSessionTicket messages according to this
    // count; zero means the server sends none, so there is nothing for a
    // peer to resume with regardless of its own resumption settings.
    assert_eq!(config.send_tls13_tickets, 0);
}

#[test]
fn commissioning_server_never_issues_session_tickets() {
    let cert = rcgen::generate_simple_self_signed(vec!["commissioning-device".into()]).unwrap();
    let config = mash_tls::commissioning_server_config(
        mash_tls::load_cert_chain(cert.cert.pem().as_bytes()).unwrap(),
        mash_tls::load_private_key(cert.key_pair.serialize_pem().as_bytes()).unwrap(),
    )
    .unwrap();
    assert_eq!(config.send_tls13_tickets, 0);
}
