//! Dials the MASH echo server, sends a handful of WRITE requests, and prints
//! whatever comes back.
//!
//! Run with: `cargo run -p mash --example echo_client`

use std::sync::Arc;

use mash::{Client, ConnectionConfig, ConnectionObserver, Message, Operation, Request, RequestPayload, Value};

struct PrintObserver;

impl ConnectionObserver for PrintObserver {
    fn on_message(&self, connection_id: uuid::Uuid, bytes: Vec<u8>) {
        tracing::info!(%connection_id, len = bytes.len(), "server sent a frame");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cert = rcgen::generate_simple_self_signed(vec!["demo-client".into()])?;
    let cert_chain = mash_tls::load_cert_chain(cert.cert.pem().as_bytes())?;
    let key = mash_tls::load_private_key(cert.key_pair.serialize_pem().as_bytes())?;
    let zone_ca = mash_tls::root_store_from_pem(cert.cert.pem().as_bytes())?;

    // In this demo the client and server use separate self-signed certs, so
    // there is no shared Zone CA trust path; production deployments share one.
    let tls_config = mash_tls::operational_client_config(cert_chain, key, zone_ca, None)?;
    let client = Client::new(tls_config, ConnectionConfig::default());

    let conn = client.connect("127.0.0.1:8443", Arc::new(PrintObserver), None).await?;
    tracing::info!(connection_id = %conn.id(), "connected");

    let req = Request {
        message_id: 1,
        operation: Operation::Write,
        endpoint_id: 1,
        feature_id: 1,
        payload: RequestPayload::Write { values: vec![(1, Value::Bool(true))] },
    };
    let bytes = mash_codec::encode(&Message::Request(req))?;
    conn.send(&bytes).await?;

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    conn.close().await?;
    Ok(())
}
