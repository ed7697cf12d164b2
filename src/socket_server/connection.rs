//! Connection session handler
//!
//! Each accepted connection runs one [`Session`]: it reads frames, enforces
//! the handshake and dispatches commands until the peer leaves, a one-shot
//! command completes, or the server stops.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::error::{FastdevError, Result};
use crate::socket_server::app_registry::AppHandle;
use crate::socket_server::protocol::{
    AppSignal, Command, Frame, FrameCodec, APP_NOT_CONNECTED, INVALID_HANDSHAKE, NOT_FOUND, OK,
};
use crate::socket_server::server::ServerShared;

type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Outbound half of a session, shareable with the app registry.
///
/// Each `send` writes and flushes a whole frame under the lock, so frames
/// from the session and from forwarded signals never interleave. A send that
/// does not finish within the write timeout closes the writer: the stream may
/// hold a partial frame, so nothing more is written and the owning session
/// ends.
#[derive(Clone)]
pub struct SessionWriter {
    inner: Arc<tokio::sync::Mutex<FramedWrite<BoxedWrite, FrameCodec>>>,
    write_timeout: Duration,
    closed: CancellationToken,
}

impl SessionWriter {
    pub fn new<W>(writer: W, codec: FrameCodec, write_timeout: Duration) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let boxed: BoxedWrite = Box::new(writer);
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(FramedWrite::new(boxed, codec))),
            write_timeout,
            closed: CancellationToken::new(),
        }
    }

    /// Write one frame, waiting at most the write timeout (lock included).
    pub async fn send(&self, frame: Frame) -> Result<()> {
        if self.is_closed() {
            return Err(FastdevError::protocol("connection writer is closed"));
        }

        let write = async { self.inner.lock().await.send(frame).await };
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.closed.cancel();
                Err(e)
            }
            Err(_) => {
                self.closed.cancel();
                Err(FastdevError::protocol(format!(
                    "write timed out after {:?}",
                    self.write_timeout
                )))
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once a send has failed or timed out.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

/// Handshake state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHandshake,
    Authenticated,
    Closed,
}

/// What the read loop does after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the connection between frames
    PeerClosed,
    /// A command ended the session (kill-app, restart-app, shutdown, or a
    /// request before the handshake)
    Completed,
    /// The server stopped accepting and the read poll expired
    ServerStopped,
    /// Immediate server stop
    Aborted,
    /// Malformed frame, mid-frame disconnect, write failure or write timeout
    Error,
}

/// Handle a single accepted TCP connection
pub async fn handle_connection(stream: TcpStream, shared: Arc<ServerShared>) {
    let peer = stream.peer_addr().ok();
    handle_stream(stream, peer, shared).await;
}

/// Run a session over any byte stream
pub async fn handle_stream<S>(stream: S, peer: Option<SocketAddr>, shared: Arc<ServerShared>) -> CloseReason
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    tracing::info!("connected: {}", display_peer(peer));

    let codec = FrameCodec::new(shared.config.max_token_len);
    let (read_half, write_half) = tokio::io::split(stream);
    let reader = FramedRead::new(read_half, codec.clone());
    let writer = SessionWriter::new(write_half, codec, shared.config.write_timeout);

    let mut session = Session::new(peer, writer, shared);
    let reason = session.run(reader).await;
    session.cleanup();

    tracing::info!(?reason, "disconnected: {}", display_peer(peer));
    reason
}

fn display_peer(peer: Option<SocketAddr>) -> String {
    peer.map(|p| p.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// State for a single connection
struct Session {
    id: String,
    peer: Option<SocketAddr>,
    state: SessionState,
    is_app_connection: bool,
    writer: SessionWriter,
    shared: Arc<ServerShared>,
}

impl Session {
    fn new(peer: Option<SocketAddr>, writer: SessionWriter, shared: Arc<ServerShared>) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("ses_{}", &id[..8]),
            peer,
            state: SessionState::AwaitingHandshake,
            is_app_connection: false,
            writer,
            shared,
        }
    }

    async fn run<R>(&mut self, mut reader: FramedRead<R, FrameCodec>) -> CloseReason
    where
        R: AsyncRead + Unpin,
    {
        let shutdown = self.shared.shutdown.clone();
        let writer = self.writer.clone();

        let reason = loop {
            let read_poll = self.shared.config.read_poll;
            let next = tokio::select! {
                biased;
                _ = shutdown.aborted() => break CloseReason::Aborted,
                _ = writer.closed() => break CloseReason::Error,
                next = tokio::time::timeout(read_poll, reader.next()) => next,
            };

            let frame = match next {
                // Read poll expired; idle peers are normal while serving.
                Err(_) => {
                    if shutdown.is_accepting() {
                        continue;
                    }
                    break CloseReason::ServerStopped;
                }
                Ok(None) => break CloseReason::PeerClosed,
                Ok(Some(Err(e))) => {
                    tracing::warn!(session = %self.id, "closing connection: {}", e);
                    break CloseReason::Error;
                }
                Ok(Some(Ok(frame))) => frame,
            };

            self.shared.idle.touch();

            // A reply stuck on a slow peer must not outlive an immediate stop.
            let flow = tokio::select! {
                biased;
                _ = shutdown.aborted() => break CloseReason::Aborted,
                flow = self.dispatch(frame) => flow,
            };

            match flow {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) => break CloseReason::Completed,
                Err(e) => {
                    tracing::warn!(session = %self.id, "closing connection: {}", e);
                    break CloseReason::Error;
                }
            }
        };

        self.state = SessionState::Closed;
        reason
    }

    async fn dispatch(&mut self, frame: Frame) -> Result<Flow> {
        let command = frame
            .command()
            .ok_or_else(|| FastdevError::protocol("empty frame"))?;

        match command {
            Command::Handshake => {
                if self.handle_handshake(frame.arg(1)).await? {
                    self.register_as_app();
                }
                Ok(Flow::Continue)
            }
            Command::ScriptHandshake => {
                self.handle_handshake(frame.arg(1)).await?;
                Ok(Flow::Continue)
            }
            _ if self.state != SessionState::Authenticated => {
                tracing::warn!(
                    session = %self.id,
                    command = command.as_str(),
                    "request before handshake, rejecting"
                );
                self.reply(INVALID_HANDSHAKE).await?;
                Ok(Flow::Close)
            }
            Command::Get => {
                let path = frame
                    .arg(1)
                    .ok_or_else(|| FastdevError::protocol("get without a path"))?;
                self.shared.count_request();
                self.handle_get(&String::from_utf8_lossy(path)).await?;
                Ok(Flow::Continue)
            }
            Command::KillApp => {
                self.handle_app_signal(AppSignal::Kill).await?;
                Ok(Flow::Close)
            }
            Command::RestartApp => {
                self.handle_app_signal(AppSignal::Restart).await?;
                Ok(Flow::Close)
            }
            Command::Status => {
                self.handle_status().await?;
                Ok(Flow::Continue)
            }
            Command::Shutdown => {
                self.handle_shutdown().await?;
                Ok(Flow::Close)
            }
            Command::Unknown(name) => {
                // Unrecognized commands get no reply and keep the session open.
                tracing::debug!(session = %self.id, command = %name, "ignoring unknown command");
                Ok(Flow::Continue)
            }
        }
    }

    /// Returns whether the secret matched.
    async fn handle_handshake(&mut self, secret: Option<&bytes::Bytes>) -> Result<bool> {
        let offered = secret
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .unwrap_or_default();
        tracing::info!(session = %self.id, "handshake: {}", offered);

        if secret.is_some_and(|s| s.as_ref() == self.shared.config.secret.as_bytes()) {
            self.state = SessionState::Authenticated;
            self.reply(OK).await?;
            Ok(true)
        } else {
            tracing::warn!(session = %self.id, "handshake: invalid handshake sent, rejecting");
            self.reply(INVALID_HANDSHAKE).await?;
            Ok(false)
        }
    }

    fn register_as_app(&mut self) {
        self.is_app_connection = true;
        self.shared.registry.register(AppHandle::new(
            self.id.clone(),
            self.peer,
            self.writer.clone(),
        ));
        tracing::info!(session = %self.id, "app connected");
    }

    async fn handle_get(&mut self, relative_path: &str) -> Result<()> {
        match self.shared.overlay.read(relative_path).await {
            Ok(Some((path, contents))) => {
                tracing::info!("get {}: {}", relative_path, path.display());
                self.writer.send(Frame::single(contents)).await
            }
            Ok(None) => {
                tracing::warn!("get {}: path not found", relative_path);
                self.reply(NOT_FOUND).await
            }
            Err(e) => {
                tracing::warn!("get {}: read failed: {}", relative_path, e);
                self.reply(NOT_FOUND).await
            }
        }
    }

    async fn handle_app_signal(&mut self, signal: AppSignal) -> Result<()> {
        tracing::info!(session = %self.id, "request: {}-app", signal.token());

        let reply = match self.shared.registry.forward(signal).await {
            Ok(true) => OK.to_string(),
            Ok(false) => {
                tracing::warn!("{}: no app is connected", signal.token());
                APP_NOT_CONNECTED.to_string()
            }
            Err(FastdevError::Forwarding { message, .. }) => {
                tracing::error!("{}: error: {}", signal.token(), message);
                message
            }
            Err(e) => {
                tracing::error!("{}: error: {}", signal.token(), e);
                e.to_string()
            }
        };
        self.reply(reply).await
    }

    async fn handle_status(&mut self) -> Result<()> {
        tracing::info!(session = %self.id, "request: status");
        let status = self.shared.status();
        let json = serde_json::to_string(&status)
            .map_err(|e| FastdevError::protocol(format!("status serialization failed: {}", e)))?;
        self.reply(json).await
    }

    async fn handle_shutdown(&mut self) -> Result<()> {
        tracing::info!(session = %self.id, "request: shutdown");
        self.reply(OK).await?;
        self.shared.shutdown.graceful();
        Ok(())
    }

    async fn reply(&self, text: impl Into<String>) -> Result<()> {
        self.writer.send(Frame::single(text.into())).await
    }

    fn cleanup(&mut self) {
        if self.is_app_connection && self.shared.registry.release(&self.id) {
            tracing::info!(session = %self.id, "app disconnected");
        }
    }
}
