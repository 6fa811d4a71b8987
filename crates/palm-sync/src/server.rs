//! The sync server: waits for a handheld, runs the handshake, hands a DLP
//! connection to the application, then ends the session cleanly.
//!
//! ```text
//! Idle -> Connecting -> AwaitingHandshake -> Handshaking -> SyncRunning
//!      -> EndOfSync -> Closed  (-> Connecting again when continuous)
//! ```

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use palm_sync_core::SyncTermCode;
use palm_sync_link::{
    accept_handshake, cmp, DlpConnection, LinkError, LinkHandle, NetSyncStream,
    NetSyncTransport, PadpStream, PadpTransport, TransactionTransport,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::error::{Result, SessionError};

/// TCP port handhelds dial for network HotSync.
pub const DEFAULT_NETSYNC_PORT: u16 = 14238;

const EVENT_CAPACITY: usize = 64;

/// Byte stream to a handheld.
pub trait DeviceIo: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> DeviceIo for T {}

pub type BoxedIo = Box<dyn DeviceIo>;

/// The DLP connection handed to a [`SyncHandler`].
pub type Connection = DlpConnection<Box<dyn TransactionTransport>>;

/// Framing family spoken on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// SLP framing, PADP and CMP. Serial, IrDA and older USB devices.
    Slp,
    /// NetSync framing and handshake. Newer USB devices and TCP.
    NetSync,
}

/// Where the server is in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Connecting,
    AwaitingHandshake,
    Handshaking,
    SyncRunning,
    EndOfSync,
    Closed,
}

/// Published on the server's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    StateChanged(SessionState),
    /// A session finished. `error` is the display form of its error.
    SessionEnded { session: u64, error: Option<String> },
}

/// Application logic run once per session.
#[async_trait]
pub trait SyncHandler: Send + Sync {
    async fn sync(&self, dlp: &Connection) -> anyhow::Result<()>;
}

/// Produces one connected handheld per call.
#[async_trait]
pub trait DeviceConnector: Send {
    async fn connect(&mut self) -> std::io::Result<(BoxedIo, Protocol)>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Connectors
// ─────────────────────────────────────────────────────────────────────────────

/// Network HotSync: accepts NetSync connections on a TCP listener.
#[derive(Debug)]
pub struct TcpConnector {
    listener: TcpListener,
}

impl TcpConnector {
    pub async fn bind(addr: impl ToSocketAddrs) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = ?listener.local_addr().ok(), "listening for network HotSync");
        Ok(Self { listener })
    }

    /// Listen on all interfaces at [`DEFAULT_NETSYNC_PORT`].
    pub async fn bind_default() -> std::io::Result<Self> {
        Self::bind(("0.0.0.0", DEFAULT_NETSYNC_PORT)).await
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

#[async_trait]
impl DeviceConnector for TcpConnector {
    async fn connect(&mut self) -> std::io::Result<(BoxedIo, Protocol)> {
        let (socket, peer) = self.listener.accept().await?;
        socket.set_nodelay(true)?;
        tracing::info!(%peer, "handheld connected");
        Ok((Box::new(socket), Protocol::NetSync))
    }
}

/// Streams supplied by the caller, such as serial or USB adapters.
///
/// Each queued stream is one session. Once every sender is dropped and the
/// queue is empty, `connect` fails with `UnexpectedEof`.
#[derive(Debug)]
pub struct StreamConnector {
    streams: mpsc::UnboundedReceiver<(BoxedIo, Protocol)>,
}

/// Feeds streams to a [`StreamConnector`].
#[derive(Debug, Clone)]
pub struct StreamSender(mpsc::UnboundedSender<(BoxedIo, Protocol)>);

impl StreamSender {
    /// Queue a connected stream. Returns false if the connector is gone.
    pub fn send(&self, io: impl DeviceIo, protocol: Protocol) -> bool {
        self.0.send((Box::new(io), protocol)).is_ok()
    }
}

impl StreamConnector {
    pub fn new() -> (StreamSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (StreamSender(tx), Self { streams: rx })
    }

    /// A connector that yields exactly one stream.
    pub fn single(io: impl DeviceIo, protocol: Protocol) -> Self {
        let (sender, connector) = Self::new();
        sender.send(io, protocol);
        connector
    }
}

#[async_trait]
impl DeviceConnector for StreamConnector {
    async fn connect(&mut self) -> std::io::Result<(BoxedIo, Protocol)> {
        self.streams.recv().await.ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "no more device streams")
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// HotSync server.
pub struct SyncServer<H> {
    config: ServerConfig,
    handler: H,
    cancel: CancellationToken,
    events: broadcast::Sender<ServerEvent>,
    state: Mutex<SessionState>,
    sessions: Mutex<u64>,
}

impl<H: SyncHandler> SyncServer<H> {
    pub fn new(config: ServerConfig, handler: H) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            handler,
            cancel: CancellationToken::new(),
            events,
            state: Mutex::new(SessionState::Idle),
            sessions: Mutex::new(0),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Root token. Every link the server opens uses a child of it.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop serving. Waits in progress return `Cancelled`.
    pub fn shutdown(&self) {
        tracing::info!("sync server shutting down");
        self.cancel.cancel();
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        tracing::debug!(?state, "session state");
        let _ = self.events.send(ServerEvent::StateChanged(state));
    }

    fn next_session(&self) -> u64 {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        *sessions += 1;
        *sessions
    }

    /// Accept handhelds from `connector` and sync each one.
    ///
    /// Without `continuous`, returns after the first session with its
    /// result. With it, session errors are logged and the server keeps
    /// going until cancelled or the connector fails.
    pub async fn serve<C: DeviceConnector>(&self, connector: &mut C) -> Result<()> {
        loop {
            self.set_state(SessionState::Connecting);
            let connected = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                connected = connector.connect() => Some(connected),
            };
            let Some(connected) = connected else {
                self.set_state(SessionState::Idle);
                return Ok(());
            };
            let (io, protocol) = match connected {
                Ok(connected) => connected,
                Err(err) => {
                    self.set_state(SessionState::Idle);
                    return Err(err.into());
                }
            };

            let result = self.run_session(io, protocol).await;
            if !self.config.continuous {
                self.set_state(SessionState::Idle);
                return result;
            }
            if let Err(err) = result {
                tracing::warn!(error = %err, "session failed, waiting for next device");
            }
            if self.cancel.is_cancelled() {
                self.set_state(SessionState::Idle);
                return Ok(());
            }
        }
    }

    /// Run one session over an already connected stream.
    pub async fn run_session(&self, io: impl DeviceIo, protocol: Protocol) -> Result<()> {
        let session = self.next_session();
        tracing::info!(session, ?protocol, "sync session started");
        self.set_state(SessionState::AwaitingHandshake);

        let result = match protocol {
            Protocol::Slp => self.run_slp(io).await,
            Protocol::NetSync => self.run_netsync(io).await,
        };

        self.set_state(SessionState::Closed);
        match &result {
            Ok(()) => tracing::info!(session, "sync session finished"),
            Err(err) => tracing::warn!(session, error = %err, "sync session failed"),
        }
        let _ = self.events.send(ServerEvent::SessionEnded {
            session,
            error: result.as_ref().err().map(ToString::to_string),
        });
        result
    }

    async fn run_slp(&self, io: impl DeviceIo) -> Result<()> {
        let (stream, link) = PadpStream::open(io, self.config.padp.clone(), &self.cancel);
        self.set_state(SessionState::Handshaking);
        if let Err(err) = cmp::accept(&stream, &self.config.cmp).await {
            return abort_handshake(err, link).await;
        }
        let transport: Box<dyn TransactionTransport> = Box::new(PadpTransport::new(stream));
        self.run_sync(DlpConnection::new(transport), link).await
    }

    async fn run_netsync(&self, io: impl DeviceIo) -> Result<()> {
        let (stream, link) = NetSyncStream::open(io, self.config.netsync.clone(), &self.cancel);
        self.set_state(SessionState::Handshaking);
        if let Err(err) = accept_handshake(&stream).await {
            return abort_handshake(err, link).await;
        }
        let transport: Box<dyn TransactionTransport> = Box::new(NetSyncTransport::new(stream));
        self.run_sync(DlpConnection::new(transport), link).await
    }

    async fn run_sync(&self, dlp: Connection, link: LinkHandle) -> Result<()> {
        self.set_state(SessionState::SyncRunning);
        let outcome = self.handler.sync(&dlp).await;

        self.set_state(SessionState::EndOfSync);
        let code = match &outcome {
            Ok(()) => SyncTermCode::Okay,
            Err(_) => SyncTermCode::UnknownError,
        };
        if link.is_closed() {
            tracing::debug!("link already closed, skipping EndOfSync");
        } else if let Err(err) = dlp.end_of_sync(code).await {
            tracing::warn!(error = %err, ?code, "EndOfSync not delivered");
        }
        tokio::time::sleep(self.config.end_of_sync_delay).await;

        let link_result = link.shutdown().await;
        session_result(outcome, link_result)
    }
}

impl<H> std::fmt::Debug for SyncServer<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

async fn abort_handshake(err: LinkError, link: LinkHandle) -> Result<()> {
    tracing::warn!(error = %err, "handshake failed");
    match link.shutdown().await {
        Err(fatal) if err.is_closure() => Err(fatal.into()),
        _ => Err(err.into()),
    }
}

/// The handler's error wins, unless it only saw the link go away while the
/// reader had a real failure to report.
fn session_result(
    outcome: anyhow::Result<()>,
    link: palm_sync_link::Result<()>,
) -> Result<()> {
    match (outcome, link) {
        (Err(err), Err(fatal)) if is_closure(&err) => Err(SessionError::Link(fatal)),
        (Err(err), link) => {
            if let Err(teardown) = link {
                tracing::debug!(error = %teardown, "link error during teardown");
            }
            Err(SessionError::Handler(err))
        }
        (Ok(()), Err(fatal)) => Err(SessionError::Link(fatal)),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn is_closure(err: &anyhow::Error) -> bool {
    err.downcast_ref::<LinkError>()
        .is_some_and(LinkError::is_closure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use palm_sync_core::ProtocolError;
    use palm_sync_core::DlpErrorCode;

    #[test]
    fn test_handler_error_wins() {
        let outcome = Err(anyhow::anyhow!("conduit broke"));
        let result = session_result(outcome, Err(LinkError::Closed));
        assert!(matches!(result, Err(SessionError::Handler(_))));
    }

    #[test]
    fn test_fatal_link_error_replaces_closure() {
        let outcome = Err(anyhow::Error::new(LinkError::Cancelled));
        let fatal = LinkError::Protocol(ProtocolError::FragmentSequence("offset 4, buffered 0".into()));
        let result = session_result(outcome, Err(fatal));
        assert!(matches!(
            result,
            Err(SessionError::Link(LinkError::Protocol(ProtocolError::FragmentSequence(_))))
        ));
    }

    #[test]
    fn test_closure_without_link_error_is_handler_error() {
        let outcome = Err(anyhow::Error::new(LinkError::Cancelled));
        assert!(matches!(
            session_result(outcome, Ok(())),
            Err(SessionError::Handler(_))
        ));
    }

    #[test]
    fn test_link_error_after_success() {
        let result = session_result(Ok(()), Err(LinkError::Closed));
        assert!(matches!(result, Err(SessionError::Link(LinkError::Closed))));
        assert!(session_result(Ok(()), Ok(())).is_ok());
    }

    #[test]
    fn test_command_code_through_handler() {
        let err = SessionError::Handler(anyhow::Error::new(LinkError::Command {
            command: "OpenDB",
            code: DlpErrorCode::NOT_FOUND,
        }));
        assert_eq!(err.command_code(), Some(DlpErrorCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_stream_connector_drains_then_fails() {
        let (sender, mut connector) = StreamConnector::new();
        let (a, _b) = tokio::io::duplex(64);
        assert!(sender.send(a, Protocol::Slp));
        drop(sender);

        let (_, protocol) = connector.connect().await.unwrap();
        assert_eq!(protocol, Protocol::Slp);
        let Err(err) = connector.connect().await else {
            panic!("drained connector produced a stream");
        };
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_tcp_connector_accepts_netsync() {
        let mut connector = TcpConnector::bind("127.0.0.1:0").await.unwrap();
        let addr = connector.local_addr().unwrap();
        let (accepted, dialed) = tokio::join!(
            connector.connect(),
            tokio::net::TcpStream::connect(addr)
        );
        dialed.unwrap();
        assert_eq!(accepted.unwrap().1, Protocol::NetSync);
    }
}
