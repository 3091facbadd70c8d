use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;

use crate::connection::{Connection, ConnectionConfig, ConnectionObserver, ControlDirection};
use crate::error::ConnectionError;
use crate::state::ConnectionState;
use mash_wire::ControlType;

/// The concrete stream type a [`Server`]-accepted connection runs over.
pub type ServerStream = tokio_rustls::server::TlsStream<TcpStream>;

/// Owns a listener task, accepting raw sockets, running the TLS handshake,
/// and constructing a [`Connection`] for each. Tracks every live connection
/// so [`Server::stop`] can tear them all down.
pub struct Server {
    acceptor: tokio_rustls::TlsAcceptor,
    connection_config: ConnectionConfig,
    connections: Arc<RwLock<HashMap<uuid::Uuid, Arc<Connection<ServerStream>>>>>,
    listener_task: AsyncMutex<Option<JoinHandle<()>>>,
}

impl Server {
    pub fn new(tls_config: rustls::ServerConfig, connection_config: ConnectionConfig) -> Arc<Self> {
        Arc::new(Server {
            acceptor: tokio_rustls::TlsAcceptor::from(Arc::new(tls_config)),
            connection_config,
            connections: Arc::new(RwLock::new(HashMap::new())),
            listener_task: AsyncMutex::new(None),
        })
    }

    /// Bind `addr` and start accepting connections in the background.
    /// `observer_factory` builds a fresh [`ConnectionObserver`] per
    /// connection; `on_accept` is notified once a connection has completed
    /// its handshake and joined `Connected`.
    pub async fn listen<F, H>(self: &Arc<Self>, addr: impl ToSocketAddrs, observer_factory: F, on_accept: H) -> Result<(), ConnectionError>
    where
        F: Fn() -> Arc<dyn ConnectionObserver> + Send + Sync + 'static,
        H: Fn(Arc<Connection<ServerStream>>) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        let server = self.clone();
        let on_accept = Arc::new(on_accept);

        let task = tokio::spawn(async move {
            loop {
                let (tcp, peer_addr) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept a TCP connection");
                        continue;
                    }
                };
                tcp.set_nodelay(true).ok();

                let acceptor = server.acceptor.clone();
                let connection_config = server.connection_config.clone();
                let connections = server.connections.clone();
                let observer: Arc<dyn ConnectionObserver> =
                    Arc::new(TrackingObserver { inner: observer_factory(), connections: connections.clone() });
                let on_accept = on_accept.clone();

                tokio::spawn(async move {
                    let tls_stream = match acceptor.accept(tcp).await {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::debug!(error = %e, %peer_addr, "TLS handshake failed");
                            return;
                        }
                    };
                    match Connection::establish(tls_stream, observer, None, connection_config).await {
                        Ok(conn) => {
                            let conn = Arc::new(conn);
                            connections.write().await.insert(conn.id(), conn.clone());
                            on_accept(conn);
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, %peer_addr, "connection establishment failed");
                        }
                    }
                });
            }
        });

        *self.listener_task.lock().await = Some(task);
        Ok(())
    }

    /// Stop accepting new connections and force-close every tracked
    /// connection.
    pub async fn stop(&self) {
        if let Some(task) = self.listener_task.lock().await.take() {
            task.abort();
        }
        let live: Vec<_> = self.connections.write().await.drain().map(|(_, c)| c).collect();
        for conn in live {
            conn.force_close().await;
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

/// Wraps a caller-supplied observer to also evict a connection from the
/// live-connection set once it reaches `Disconnected`.
struct TrackingObserver {
    inner: Arc<dyn ConnectionObserver>,
    connections: Arc<RwLock<HashMap<uuid::Uuid, Arc<Connection<ServerStream>>>>>,
}

impl ConnectionObserver for TrackingObserver {
    fn on_message(&self, connection_id: uuid::Uuid, bytes: Vec<u8>) {
        self.inner.on_message(connection_id, bytes);
    }

    fn on_state_change(&self, connection_id: uuid::Uuid, old: ConnectionState, new: ConnectionState) {
        self.inner.on_state_change(connection_id, old, new);
        if new == ConnectionState::Disconnected {
            let connections = self.connections.clone();
            tokio::spawn(async move {
                connections.write().await.remove(&connection_id);
            });
        }
    }

    fn on_error(&self, connection_id: uuid::Uuid, err: &ConnectionError) {
        self.inner.on_error(connection_id, err);
    }

    fn on_control(&self, connection_id: uuid::Uuid, ty: ControlType, sequence: u32, direction: ControlDirection) {
        self.inner.on_control(connection_id, ty, sequence, direction);
    }
}
