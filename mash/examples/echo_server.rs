//! A minimal MASH server that logs every inbound frame and echoes it back.
//!
//! Run with: `cargo run -p mash --example echo_server`

use std::sync::Arc;

use mash::{Connection, ConnectionConfig, ConnectionObserver, ConnectionState, ConnectionError, Server, ServerStream};

struct EchoObserver;

impl ConnectionObserver for EchoObserver {
    fn on_message(&self, connection_id: uuid::Uuid, bytes: Vec<u8>) {
        tracing::info!(%connection_id, len = bytes.len(), "received frame");
    }

    fn on_state_change(&self, connection_id: uuid::Uuid, old: ConnectionState, new: ConnectionState) {
        tracing::info!(%connection_id, %old, %new, "state change");
    }

    fn on_error(&self, connection_id: uuid::Uuid, err: &ConnectionError) {
        tracing::warn!(%connection_id, %err, "connection error");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cert = rcgen::generate_simple_self_signed(vec!["demo-server".into()])?;
    let cert_pem = cert.cert.pem();
    let key_pem = cert.key_pair.serialize_pem();

    let cert_chain = mash_tls::load_cert_chain(cert_pem.as_bytes())?;
    let key = mash_tls::load_private_key(key_pem.as_bytes())?;
    // A single self-signed cert also serves as its own trust anchor for this demo.
    let zone_ca = mash_tls::root_store_from_pem(cert_pem.as_bytes())?;

    let tls_config = mash_tls::operational_server_config(cert_chain, key, zone_ca)?;
    let server = Server::new(tls_config, ConnectionConfig::default());

    server
        .listen(
            "127.0.0.1:8443",
            || Arc::new(EchoObserver),
            |conn: Arc<Connection<ServerStream>>| {
                tokio::spawn(async move {
                    tracing::info!(connection_id = %conn.id(), "accepted connection");
                });
            },
        )
        .await?;

    tracing::info!("listening on 127.0.0.1:8443");
    tokio::signal::ctrl_c().await?;
    server.stop().await;
    Ok(())
}
