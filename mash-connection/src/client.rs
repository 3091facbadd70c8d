use std::sync::Arc;

use tokio::net::{TcpStream, ToSocketAddrs};

use mash_framer::FrameObserver;

use crate::connection::{Connection, ConnectionConfig, ConnectionObserver};
use crate::error::ConnectionError;

/// The concrete stream type a [`Client`] connection runs over.
pub type ClientStream = tokio_rustls::client::TlsStream<TcpStream>;

/// A configured TLS client profile, reusable across many outbound
/// connections.
pub struct Client {
    connector: tokio_rustls::TlsConnector,
    connection_config: ConnectionConfig,
}

impl Client {
    pub fn new(tls_config: rustls::ClientConfig, connection_config: ConnectionConfig) -> Self {
        Client { connector: tokio_rustls::TlsConnector::from(Arc::new(tls_config)), connection_config }
    }

    /// Dial `addr`, complete the TLS handshake, and verify the negotiated
    /// version and ALPN before handing back a live [`Connection`]. MASH
    /// never relies on SNI-based identity, so the server name presented
    /// during the handshake is a fixed placeholder; the TLS profile's
    /// certificate verifier is what actually authenticates the peer.
    pub async fn connect(
        &self,
        addr: impl ToSocketAddrs,
        observer: Arc<dyn ConnectionObserver>,
        frame_observer: Option<Arc<dyn FrameObserver>>,
    ) -> Result<Connection<ClientStream>, ConnectionError> {
        let tcp = TcpStream::connect(addr).await?;
        tcp.set_nodelay(true).ok();

        let server_name = rustls::pki_types::ServerName::try_from("mash-peer")
            .expect("\"mash-peer\" is a valid DNS name literal")
            .to_owned();
        let stream = self.connector.connect(server_name, tcp).await?;

        Connection::establish(stream, observer, frame_observer, self.connection_config.clone()).await
    }
}
