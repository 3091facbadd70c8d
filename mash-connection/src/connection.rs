use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex};

use mash_codec::PeekKind;
use mash_framer::{FrameObserver, Framer};
use mash_keepalive::{KeepaliveConfig, KeepaliveHandle, KeepaliveObserver, PongHandle};
use mash_wire::{Control, ControlType, Message};

use crate::error::ConnectionError;
use crate::state::{ConnectionState, StateCell};

/// Direction a CONTROL message travelled, for [`ConnectionObserver::on_control`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlDirection {
    Inbound,
    Outbound,
}

/// Callbacks a [`Connection`] drives from its read loop and state machine.
/// None of these may block; all default to doing nothing so a caller only
/// implements what it needs.
pub trait ConnectionObserver: Send + Sync + 'static {
    /// A non-CONTROL frame's raw payload, undecoded.
    fn on_message(&self, _connection_id: uuid::Uuid, _bytes: Vec<u8>) {}
    fn on_state_change(&self, _connection_id: uuid::Uuid, _old: ConnectionState, _new: ConnectionState) {}
    fn on_error(&self, _connection_id: uuid::Uuid, _err: &ConnectionError) {}
    /// Log-only hook for PING/PONG/Close traffic; the Connection handles
    /// these itself regardless of whether an observer is attached.
    fn on_control(&self, _connection_id: uuid::Uuid, _ty: ControlType, _sequence: u32, _direction: ControlDirection) {}
}

/// A no-op observer, useful when a caller only wants `send`/`close` and has
/// no interest in lifecycle events.
pub struct NullObserver;
impl ConnectionObserver for NullObserver {}

/// Extracts the negotiated TLS version and ALPN protocol from a handshaked
/// stream. Implemented for both `tokio_rustls` stream halves so
/// [`Connection::establish`] can run its post-handshake checks generically.
pub trait NegotiatedTls {
    fn negotiated_protocol_version(&self) -> Option<rustls::ProtocolVersion>;
    fn negotiated_alpn_protocol(&self) -> Option<Vec<u8>>;
}

impl<IO> NegotiatedTls for tokio_rustls::client::TlsStream<IO> {
    fn negotiated_protocol_version(&self) -> Option<rustls::ProtocolVersion> {
        self.get_ref().1.protocol_version()
    }

    fn negotiated_alpn_protocol(&self) -> Option<Vec<u8>> {
        self.get_ref().1.alpn_protocol().map(|p| p.to_vec())
    }
}

impl<IO> NegotiatedTls for tokio_rustls::server::TlsStream<IO> {
    fn negotiated_protocol_version(&self) -> Option<rustls::ProtocolVersion> {
        self.get_ref().1.protocol_version()
    }

    fn negotiated_alpn_protocol(&self) -> Option<Vec<u8>> {
        self.get_ref().1.alpn_protocol().map(|p| p.to_vec())
    }
}

/// Tunables for a [`Connection`]: framer bounds, the close handshake
/// deadline, keepalive cadence, and the ALPN token the caller's TLS profile
/// negotiated.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub max_message_size: usize,
    pub close_timeout: Duration,
    pub write_timeout: Option<Duration>,
    pub keepalive: KeepaliveConfig,
    pub alpn: Vec<u8>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            max_message_size: mash_framer::DEFAULT_MAX_MESSAGE_SIZE,
            close_timeout: Duration::from_secs(5),
            write_timeout: None,
            keepalive: KeepaliveConfig::default(),
            alpn: mash_tls::ALPN_OPERATIONAL.to_vec(),
        }
    }
}

struct Shared<S> {
    id: uuid::Uuid,
    state: StateCell,
    framer: Framer<S>,
    observer: Arc<dyn ConnectionObserver>,
    cancel_tx: watch::Sender<bool>,
    keepalive: AsyncMutex<Option<KeepaliveHandle>>,
    close_timeout: Duration,
    write_timeout: Option<Duration>,
}

/// A connected, TLS-secured MASH stream: the lifecycle state machine, its
/// read loop, and the keepalive task bound to it. Construct one via
/// [`Connection::establish`], or through [`crate::Client::connect`] /
/// [`crate::Server::listen`].
pub struct Connection<S> {
    shared: Arc<Shared<S>>,
    done_rx: AsyncMutex<Option<oneshot::Receiver<()>>>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static + NegotiatedTls,
{
    /// Run the post-handshake checks (`verify_tls13`, `verify_alpn`) over an
    /// already-handshaked stream, then spin up its framer, keepalive task,
    /// and read loop. On verification failure the connection falls straight
    /// back to `Disconnected`; no `Closing` state is entered, since no MASH
    /// bytes were ever exchanged.
    pub async fn establish(
        stream: S,
        observer: Arc<dyn ConnectionObserver>,
        frame_observer: Option<Arc<dyn FrameObserver>>,
        config: ConnectionConfig,
    ) -> Result<Connection<S>, ConnectionError> {
        let id = uuid::Uuid::new_v4();
        let state = StateCell::new(ConnectionState::Disconnected);
        if !state.transition(ConnectionState::Disconnected, ConnectionState::Connecting) {
            return Err(ConnectionError::AlreadyConnected);
        }
        observer.on_state_change(id, ConnectionState::Disconnected, ConnectionState::Connecting);

        let version = stream.negotiated_protocol_version();
        let alpn = stream.negotiated_alpn_protocol();
        if let Err(e) = mash_tls::verify_tls13(version).and_then(|_| mash_tls::verify_alpn(alpn.as_deref(), &config.alpn)) {
            state.force(ConnectionState::Disconnected);
            return Err(e.into());
        }

        if !state.transition(ConnectionState::Connecting, ConnectionState::Connected) {
            return Err(ConnectionError::AlreadyConnected);
        }
        observer.on_state_change(id, ConnectionState::Connecting, ConnectionState::Connected);
        tracing::debug!(connection_id = %id, "connection established");

        let framer = Framer::with_options(stream, id, config.max_message_size, frame_observer);
        let (cancel_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            id,
            state,
            framer,
            observer,
            cancel_tx,
            keepalive: AsyncMutex::new(None),
            close_timeout: config.close_timeout,
            write_timeout: config.write_timeout,
        });

        let bridge = KeepaliveBridge { shared: shared.clone() };
        let (pong_handle, keepalive_handle) = mash_keepalive::spawn(config.keepalive, bridge);
        *shared.keepalive.lock().await = Some(keepalive_handle);

        let (done_tx, done_rx) = oneshot::channel();
        let read_shared = shared.clone();
        tokio::spawn(async move {
            run_read_loop(read_shared, pong_handle, done_tx).await;
        });

        Ok(Connection { shared, done_rx: AsyncMutex::new(Some(done_rx)) })
    }

    pub fn id(&self) -> uuid::Uuid {
        self.shared.id
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.load()
    }

    /// Write one frame's raw payload. Valid only in `Connected`. If
    /// `config.write_timeout` is set, a write that doesn't complete within
    /// it fails with [`ConnectionError::Io`].
    pub async fn send(&self, payload: &[u8]) -> Result<(), ConnectionError> {
        if self.shared.state.load() != ConnectionState::Connected {
            return Err(ConnectionError::NotConnected);
        }
        let write = self.shared.framer.write_frame(payload);
        write_with_deadline(write, self.shared.write_timeout).await?.map_err(ConnectionError::from)
    }

    /// Send a CONTROL Close and wait up to `close_timeout` for the read loop
    /// to observe teardown. On timeout the stream is force-closed and
    /// [`ConnectionError::CloseTimeout`] is reported; force-close itself is
    /// idempotent either way.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        if self.shared.state.transition(ConnectionState::Connected, ConnectionState::Closing) {
            self.shared.observer.on_state_change(self.shared.id, ConnectionState::Connected, ConnectionState::Closing);
            let bytes = mash_codec::encode(&Message::Control(Control::close()))?;
            if self.shared.framer.write_frame(&bytes).await.is_ok() {
                self.shared.observer.on_control(self.shared.id, ControlType::Close, 0, ControlDirection::Outbound);
            }
        }

        let done_rx = self.done_rx.lock().await.take();
        let Some(done_rx) = done_rx else { return Ok(()) };

        match tokio::time::timeout(self.shared.close_timeout, done_rx).await {
            Ok(_) => Ok(()),
            Err(_) => {
                force_close_shared(&self.shared).await;
                Err(ConnectionError::CloseTimeout)
            }
        }
    }

    /// Tear the connection down immediately, skipping the close handshake.
    /// Idempotent.
    pub async fn force_close(&self) {
        force_close_shared(&self.shared).await;
    }
}

async fn write_with_deadline<F>(fut: F, deadline: Option<Duration>) -> Result<Result<(), mash_framer::FrameError>, ConnectionError>
where
    F: std::future::Future<Output = Result<(), mash_framer::FrameError>>,
{
    match deadline {
        None => Ok(fut.await),
        Some(d) => match tokio::time::timeout(d, fut).await {
            Ok(r) => Ok(r),
            Err(_) => Err(ConnectionError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "write deadline exceeded"))),
        },
    }
}

/// Unconditionally drive the state machine to `Disconnected`, passing
/// through `Closing` first if currently `Connected`, fire the cancellation
/// signal, and stop the keepalive task. Safe to call more than once.
async fn force_close_shared<S>(shared: &Arc<Shared<S>>) {
    if shared.state.transition(ConnectionState::Connected, ConnectionState::Closing) {
        shared.observer.on_state_change(shared.id, ConnectionState::Connected, ConnectionState::Closing);
    }
    let prev = shared.state.force(ConnectionState::Disconnected);
    if prev != ConnectionState::Disconnected {
        shared.observer.on_state_change(shared.id, prev, ConnectionState::Disconnected);
    }
    let _ = shared.cancel_tx.send(true);
    if let Some(handle) = shared.keepalive.lock().await.take() {
        handle.stop().await;
    }
}

struct KeepaliveBridge<S> {
    shared: Arc<Shared<S>>,
}

impl<S> KeepaliveObserver for KeepaliveBridge<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send_ping(&mut self, seq: u32) {
        let Ok(bytes) = mash_codec::encode(&Message::Control(Control::ping(seq))) else { return };
        if self.shared.framer.write_frame(&bytes).await.is_ok() {
            self.shared.observer.on_control(self.shared.id, ControlType::Ping, seq, ControlDirection::Outbound);
        }
    }

    fn on_timeout(&mut self) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            shared.observer.on_error(shared.id, &ConnectionError::KeepaliveTimeout);
            force_close_shared(&shared).await;
        });
    }
}

/// Returns `true` if the read loop should stop after this CONTROL frame.
async fn handle_control<S>(shared: &Arc<Shared<S>>, pong_handle: &PongHandle, bytes: &[u8]) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ctrl = match mash_codec::decode_control(bytes) {
        Ok(c) => c,
        Err(e) => {
            shared.observer.on_error(shared.id, &ConnectionError::from(e));
            return true;
        }
    };

    match ctrl.ty {
        ControlType::Ping => {
            shared.observer.on_control(shared.id, ControlType::Ping, ctrl.sequence, ControlDirection::Inbound);
            if let Ok(bytes) = mash_codec::encode(&Message::Control(Control::pong(ctrl.sequence))) {
                if shared.framer.write_frame(&bytes).await.is_ok() {
                    shared.observer.on_control(shared.id, ControlType::Pong, ctrl.sequence, ControlDirection::Outbound);
                }
            }
            false
        }
        ControlType::Pong => {
            shared.observer.on_control(shared.id, ControlType::Pong, ctrl.sequence, ControlDirection::Inbound);
            pong_handle.deliver(ctrl.sequence);
            false
        }
        ControlType::Close => {
            shared.observer.on_control(shared.id, ControlType::Close, 0, ControlDirection::Inbound);
            if shared.state.transition(ConnectionState::Connected, ConnectionState::Closing) {
                shared.observer.on_state_change(shared.id, ConnectionState::Connected, ConnectionState::Closing);
                if let Ok(bytes) = mash_codec::encode(&Message::Control(Control::close())) {
                    let _ = shared.framer.write_frame(&bytes).await;
                    shared.observer.on_control(shared.id, ControlType::Close, 0, ControlDirection::Outbound);
                }
            }
            true
        }
    }
}

async fn run_read_loop<S>(shared: Arc<Shared<S>>, pong_handle: PongHandle, done_tx: oneshot::Sender<()>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut cancel_rx = shared.cancel_tx.subscribe();
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel_rx.changed() => break,
            result = shared.framer.read_frame() => result,
        };

        match frame {
            Ok(bytes) => {
                if matches!(mash_codec::peek_kind(&bytes), PeekKind::Control) {
                    if handle_control(&shared, &pong_handle, &bytes).await {
                        break;
                    }
                } else {
                    shared.observer.on_message(shared.id, bytes);
                }
            }
            Err(e) => {
                shared.observer.on_error(shared.id, &ConnectionError::from(e));
                break;
            }
        }
    }
    force_close_shared(&shared).await;
    let _ = done_tx.send(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::Mutex as StdMutex;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// A plain duplex stream wearing a fixed, fake negotiated TLS version and
    /// ALPN protocol, so [`Connection::establish`]'s post-handshake checks
    /// can be exercised without a real TLS handshake.
    struct FakeTlsStream {
        inner: tokio::io::DuplexStream,
        version: Option<rustls::ProtocolVersion>,
        alpn: Option<Vec<u8>>,
    }

    impl NegotiatedTls for FakeTlsStream {
        fn negotiated_protocol_version(&self) -> Option<rustls::ProtocolVersion> {
            self.version
        }
        fn negotiated_alpn_protocol(&self) -> Option<Vec<u8>> {
            self.alpn.clone()
        }
    }

    impl AsyncRead for FakeTlsStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for FakeTlsStream {
        fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }
        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }
        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    fn fake_pair() -> (FakeTlsStream, tokio::io::DuplexStream) {
        let (a, b) = tokio::io::duplex(8192);
        (
            FakeTlsStream {
                inner: a,
                version: Some(rustls::ProtocolVersion::TLSv1_3),
                alpn: Some(mash_tls::ALPN_OPERATIONAL.to_vec()),
            },
            b,
        )
    }

    #[derive(Default)]
    struct Recorder {
        messages: StdMutex<Vec<Vec<u8>>>,
        states: StdMutex<Vec<(ConnectionState, ConnectionState)>>,
        errors: StdMutex<Vec<String>>,
    }

    impl ConnectionObserver for Recorder {
        fn on_message(&self, _id: uuid::Uuid, bytes: Vec<u8>) {
            self.messages.lock().unwrap().push(bytes);
        }
        fn on_state_change(&self, _id: uuid::Uuid, old: ConnectionState, new: ConnectionState) {
            self.states.lock().unwrap().push((old, new));
        }
        fn on_error(&self, _id: uuid::Uuid, err: &ConnectionError) {
            self.errors.lock().unwrap().push(err.to_string());
        }
    }

    #[tokio::test]
    async fn establish_rejects_a_non_tls13_handshake() {
        let (a, _b) = tokio::io::duplex(1024);
        let stream = FakeTlsStream { inner: a, version: Some(rustls::ProtocolVersion::TLSv1_2), alpn: None };
        let err = Connection::establish(stream, Arc::new(NullObserver), None, ConnectionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Handshake(_)));
    }

    #[tokio::test]
    async fn establish_rejects_a_mismatched_alpn() {
        let (a, _b) = tokio::io::duplex(1024);
        let stream = FakeTlsStream {
            inner: a,
            version: Some(rustls::ProtocolVersion::TLSv1_3),
            alpn: Some(b"something-else".to_vec()),
        };
        let err = Connection::establish(stream, Arc::new(NullObserver), None, ConnectionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Handshake(_)));
    }

    #[tokio::test]
    async fn ping_from_peer_is_answered_with_matching_pong() {
        let (stream, mut peer) = fake_pair();
        let recorder = Arc::new(Recorder::default());
        let conn = Connection::establish(stream, recorder.clone(), None, ConnectionConfig::default()).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Connected);

        let ping = mash_codec::encode(&Message::Control(Control::ping(42))).unwrap();
        peer.write_all(&(ping.len() as u32).to_be_bytes()).await.unwrap();
        peer.write_all(&ping).await.unwrap();

        let mut len_buf = [0u8; 4];
        peer.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        peer.read_exact(&mut payload).await.unwrap();
        let pong = mash_codec::decode_control(&payload).unwrap();
        assert_eq!(pong, Control::pong(42));

        conn.force_close().await;
    }

    #[tokio::test]
    async fn graceful_close_completes_once_peer_acks() {
        let (stream, mut peer) = fake_pair();
        let recorder = Arc::new(Recorder::default());
        let conn = Connection::establish(stream, recorder, None, ConnectionConfig::default()).await.unwrap();

        let peer_task = tokio::spawn(async move {
            let mut len_buf = [0u8; 4];
            peer.read_exact(&mut len_buf).await.unwrap();
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut payload = vec![0u8; len];
            peer.read_exact(&mut payload).await.unwrap();
            assert_eq!(mash_codec::decode_control(&payload).unwrap(), Control::close());

            let reply = mash_codec::encode(&Message::Control(Control::close())).unwrap();
            peer.write_all(&(reply.len() as u32).to_be_bytes()).await.unwrap();
            peer.write_all(&reply).await.unwrap();
        });

        conn.close().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        peer_task.await.unwrap();
    }

    #[tokio::test]
    async fn send_outside_connected_is_rejected() {
        let (stream, _peer) = fake_pair();
        let conn = Connection::establish(stream, Arc::new(NullObserver), None, ConnectionConfig::default()).await.unwrap();
        conn.force_close().await;
        assert!(matches!(conn.send(b"hi").await, Err(ConnectionError::NotConnected)));
    }
}
