//! Client request helper
//!
//! Used by the CLI to talk to a running server: discover it through the lock
//! record, connect, `script-handshake`, then exchange frames.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::lock::LockRecord;
use crate::socket_server::protocol::{
    read_frame, write_frame, Frame, FrameCodec, StatusSnapshot, OK,
};
use crate::{FastdevError, Result};

/// How long to wait for the TCP connect to a locked server
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for the reply to one request
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// An authenticated connection to a running server
pub struct FastdevRequest {
    record: LockRecord,
    lock_file: PathBuf,
    framed: Framed<TcpStream, FrameCodec>,
}

impl FastdevRequest {
    /// Connect using the lock file.
    ///
    /// Fails with [`FastdevError::NoServer`] if there is no lock file and
    /// [`FastdevError::StaleLock`] if the recorded server cannot be reached
    /// or does not answer the handshake.
    pub async fn open(lock_file: &Path) -> Result<Self> {
        let record = LockRecord::read(lock_file)?.ok_or_else(|| FastdevError::NoServer {
            lock_file: lock_file.to_path_buf(),
        })?;
        Self::connect(record, lock_file).await
    }

    /// Connect to the server described by `record` and perform the handshake.
    pub async fn connect(record: LockRecord, lock_file: &Path) -> Result<Self> {
        let host = record.connect_host();
        let port = record.port;
        let stale = |message: String| FastdevError::StaleLock {
            lock_file: lock_file.to_path_buf(),
            port,
            message,
        };

        let stream = match tokio::time::timeout(
            CONNECT_TIMEOUT,
            TcpStream::connect((host.as_str(), port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(stale(e.to_string())),
            Err(_) => return Err(stale("connection timed out".to_string())),
        };
        stream.set_nodelay(true)?;

        let mut request = Self {
            framed: Framed::new(stream, FrameCodec::default()),
            lock_file: lock_file.to_path_buf(),
            record,
        };

        // Whatever holds the port now may accept and then stay silent.
        let guid = request.record.app_guid.clone();
        let handshake = Frame::from_parts(["script-handshake".to_string(), guid]);
        let reply = match tokio::time::timeout(REPLY_TIMEOUT, request.exchange(handshake)).await {
            Ok(reply) => reply?,
            Err(_) => {
                return Err(stale(format!(
                    "no handshake reply within {} sec",
                    REPLY_TIMEOUT.as_secs()
                )))
            }
        };
        match reply.and_then(|f| f.first_text()) {
            Some(text) if text == OK => Ok(request),
            _ => Err(FastdevError::HandshakeRejected),
        }
    }

    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    pub fn lock_file(&self) -> &Path {
        &self.lock_file
    }

    /// Send a frame and wait for one reply frame.
    ///
    /// `Ok(None)` means the server closed the connection without replying.
    /// A reply that does not arrive within [`REPLY_TIMEOUT`] is a protocol error.
    pub async fn send(&mut self, frame: Frame) -> Result<Option<Frame>> {
        tokio::time::timeout(REPLY_TIMEOUT, self.exchange(frame))
            .await
            .map_err(|_| {
                FastdevError::protocol(format!(
                    "no reply from server on port {} within {} sec",
                    self.record.port,
                    REPLY_TIMEOUT.as_secs()
                ))
            })?
    }

    async fn exchange(&mut self, frame: Frame) -> Result<Option<Frame>> {
        write_frame(&mut self.framed, frame).await?;
        read_frame(&mut self.framed).await
    }

    /// Send a single-token command and return the first reply token as text.
    pub async fn command(&mut self, command: &str) -> Result<Option<String>> {
        let reply = self.send(Frame::single(command.to_string())).await?;
        Ok(reply.and_then(|f| f.first_text()))
    }

    /// Fetch a resource by relative path
    pub async fn get(&mut self, relative_path: &str) -> Result<Option<Frame>> {
        self.send(Frame::from_parts(["get".to_string(), relative_path.to_string()]))
            .await
    }

    /// Query the server status
    pub async fn status(&mut self) -> Result<StatusSnapshot> {
        let text = self
            .command("status")
            .await?
            .ok_or_else(|| FastdevError::protocol("server closed connection before replying"))?;
        serde_json::from_str(&text)
            .map_err(|e| FastdevError::protocol(format!("invalid status reply: {}", e)))
    }

    /// Close the connection
    pub async fn close(mut self) {
        let _ = SinkExt::<Frame>::close(&mut self.framed).await;
    }
}

/// Whether a live server answers for this lock file.
pub async fn is_running(lock_file: &Path) -> bool {
    let Ok(mut request) = FastdevRequest::open(lock_file).await else {
        return false;
    };
    let running = request.status().await.is_ok();
    request.close().await;
    running
}
