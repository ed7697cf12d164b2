//! Server core: listener, accept loop and shutdown control

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::Result;
use crate::socket_server::app_registry::AppRegistry;
use crate::socket_server::connection::handle_connection;
use crate::socket_server::idle::{IdleClock, IdleOutcome, IdleSupervisor, DEFAULT_MAX_IDLE};
use crate::socket_server::protocol::{StatusSnapshot, DEFAULT_MAX_TOKEN_LEN};
use crate::socket_server::vfs::ResourceOverlay;

/// Default bind host
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// How long a session read waits before re-checking for shutdown
pub const DEFAULT_READ_POLL: Duration = Duration::from_secs(1);

/// Longest a single reply frame may take to reach a peer
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to (0 picks an ephemeral port)
    pub port: u16,
    /// Shared secret expected in handshakes (the app GUID)
    pub secret: String,
    /// Resources directory served by `get`
    pub resources_dir: PathBuf,
    /// Idle time after which the server stops itself
    pub max_idle: Duration,
    /// Largest token accepted from a peer
    pub max_token_len: usize,
    /// Bounded read interval for sessions
    pub read_poll: Duration,
    /// Bound on writing one frame to a peer; expiry closes the session
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: 0,
            secret: String::new(),
            resources_dir: PathBuf::from("Resources"),
            max_idle: DEFAULT_MAX_IDLE,
            max_token_len: DEFAULT_MAX_TOKEN_LEN,
            read_poll: DEFAULT_READ_POLL,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn new(resources_dir: impl Into<PathBuf>, secret: impl Into<String>) -> Self {
        Self {
            resources_dir: resources_dir.into(),
            secret: secret.into(),
            ..Self::default()
        }
    }
}

/// Two-level stop signal shared by the accept loop, sessions and supervisor.
///
/// `graceful` stops accepting; sessions notice at their next read poll.
/// `immediate` additionally cancels every session right away.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    accepting: CancellationToken,
    abort: CancellationToken,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let abort = CancellationToken::new();
        Self {
            accepting: abort.child_token(),
            abort,
        }
    }

    /// Stop accepting connections and let current sessions wind down.
    pub fn graceful(&self) {
        self.accepting.cancel();
    }

    /// Stop accepting and close every session now.
    pub fn immediate(&self) {
        self.abort.cancel();
    }

    pub fn is_accepting(&self) -> bool {
        !self.accepting.is_cancelled()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Resolves once either stop has been requested.
    pub async fn stopped(&self) {
        self.accepting.cancelled().await
    }

    /// Resolves once an immediate stop has been requested.
    pub async fn aborted(&self) {
        self.abort.cancelled().await
    }
}

/// State shared by every session of one server
pub struct ServerShared {
    pub config: ServerConfig,
    pub overlay: ResourceOverlay,
    pub registry: Arc<AppRegistry>,
    pub idle: Arc<IdleClock>,
    pub shutdown: ShutdownHandle,
    request_count: AtomicU64,
    started_at: Instant,
    port: u16,
}

impl ServerShared {
    pub fn new(config: ServerConfig, port: u16) -> Self {
        Self {
            overlay: ResourceOverlay::new(config.resources_dir.clone()),
            config,
            registry: AppRegistry::new(),
            idle: IdleClock::new(),
            shutdown: ShutdownHandle::new(),
            request_count: AtomicU64::new(0),
            started_at: Instant::now(),
            port,
        }
    }

    /// Count one dispatched `get`
    pub fn count_request(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            process_id: std::process::id(),
            app_connected: self.registry.is_connected(),
            request_count: self.request_count(),
            port: self.port,
        }
    }
}

/// Why [`FastdevServer::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A peer sent `shutdown` or a graceful stop was requested
    Requested,
    /// No traffic for the configured idle period
    IdleTimeout,
    /// Immediate stop (process interrupt)
    Interrupted,
}

/// The fastdev protocol server
pub struct FastdevServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    shared: Arc<ServerShared>,
    tracker: TaskTracker,
}

impl FastdevServer {
    /// Bind the listening socket. Port 0 resolves to an OS-assigned port.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;
        let shared = Arc::new(ServerShared::new(config, local_addr.port()));

        Ok(Self {
            listener,
            local_addr,
            shared,
            tracker: TaskTracker::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shared.shutdown.clone()
    }

    pub fn registry(&self) -> Arc<AppRegistry> {
        Arc::clone(&self.shared.registry)
    }

    pub fn status(&self) -> StatusSnapshot {
        self.shared.status()
    }

    /// Accept connections until stopped, then wait for sessions to finish.
    pub async fn run(self) -> Result<StopReason> {
        let shutdown = self.shared.shutdown.clone();
        let supervisor = IdleSupervisor::new(Arc::clone(&self.shared.idle), self.shared.config.max_idle)
            .spawn(shutdown.clone());

        loop {
            tokio::select! {
                _ = shutdown.stopped() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tracing::debug!("Accepted connection from {}", addr);
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                        }
                        let shared = Arc::clone(&self.shared);
                        self.tracker.spawn(handle_connection(stream, shared));
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                    }
                }
            }
        }

        drop(self.listener);
        tracing::debug!(sessions = self.tracker.len(), "Listener closed, draining sessions");
        self.tracker.close();
        self.tracker.wait().await;

        let idle_outcome = supervisor.await.unwrap_or(IdleOutcome::ServerStopped);
        let reason = if shutdown.is_aborted() {
            StopReason::Interrupted
        } else if idle_outcome == IdleOutcome::TimedOut {
            StopReason::IdleTimeout
        } else {
            StopReason::Requested
        };

        tracing::info!(?reason, "Fastdev server stopped.");
        Ok(reason)
    }
}
