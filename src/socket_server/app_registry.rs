//! Connected-app registry
//!
//! Holds at most one occupant: the session that most recently completed an
//! app `handshake`. Kill and restart requests from other sessions are
//! forwarded to it through its outbound writer.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{FastdevError, Result};
use crate::socket_server::connection::SessionWriter;
use crate::socket_server::protocol::{AppSignal, Frame};

/// Handle to the session registered as the running app
#[derive(Clone)]
pub struct AppHandle {
    pub session_id: String,
    pub peer: Option<SocketAddr>,
    writer: SessionWriter,
}

impl AppHandle {
    pub fn new(session_id: String, peer: Option<SocketAddr>, writer: SessionWriter) -> Self {
        Self {
            session_id,
            peer,
            writer,
        }
    }
}

impl std::fmt::Debug for AppHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppHandle")
            .field("session_id", &self.session_id)
            .field("peer", &self.peer)
            .finish()
    }
}

/// Single-slot registry shared by all sessions of one server
#[derive(Default)]
pub struct AppRegistry {
    slot: Mutex<Option<AppHandle>>,
}

impl AppRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `handle` the occupant, replacing any previous one without notice.
    pub fn register(&self, handle: AppHandle) {
        let previous = self.slot.lock().replace(handle);
        if let Some(previous) = previous {
            tracing::debug!(
                session = %previous.session_id,
                "Replacing previously registered app session"
            );
        }
    }

    /// Current occupant, if any
    pub fn current(&self) -> Option<AppHandle> {
        self.slot.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Clear the slot if `session_id` still occupies it.
    ///
    /// Returns true when the slot was cleared.
    pub fn release(&self, session_id: &str) -> bool {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|h| h.session_id == session_id) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Send a control signal to the occupant.
    ///
    /// Returns `Ok(false)` when no app is registered. Transport failures,
    /// including a write that exceeds the session's write timeout, are
    /// reported as [`FastdevError::Forwarding`].
    pub async fn forward(&self, signal: AppSignal) -> Result<bool> {
        // Clone out of the lock; the write below awaits.
        let Some(handle) = self.current() else {
            return Ok(false);
        };

        handle
            .writer
            .send(Frame::single(signal.token()))
            .await
            .map_err(|e| FastdevError::Forwarding {
                command: signal.token().to_string(),
                message: match e {
                    FastdevError::Io(io) => io.to_string(),
                    FastdevError::Protocol { message } => message,
                    other => other.to_string(),
                },
            })?;
        Ok(true)
    }
}
