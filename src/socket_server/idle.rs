//! Idle-timeout supervision
//!
//! Every parsed frame on any connection marks activity on a shared
//! [`IdleClock`]. A single [`IdleSupervisor`] task ticks once per second and
//! asks the server for a graceful stop once the idle time reaches the
//! configured maximum.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::socket_server::server::ShutdownHandle;

/// Default idle timeout: 30 minutes
pub const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(30 * 60);

/// Shared last-activity timestamp, cheap to reset from any session
#[derive(Debug)]
pub struct IdleClock {
    origin: Instant,
    last_activity_ms: AtomicU64,
}

impl IdleClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
        })
    }

    /// Record activity now; resets the idle time to zero.
    pub fn touch(&self) {
        let now = self.origin.elapsed().as_millis() as u64;
        self.last_activity_ms.fetch_max(now, Ordering::Relaxed);
    }

    /// Time since the last recorded activity
    pub fn idle_for(&self) -> Duration {
        let now = self.origin.elapsed().as_millis() as u64;
        let last = self.last_activity_ms.load(Ordering::Relaxed);
        Duration::from_millis(now.saturating_sub(last))
    }

    /// Whole seconds since the last recorded activity
    pub fn idle_secs(&self) -> u64 {
        self.idle_for().as_secs()
    }
}

/// Why the supervisor task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    /// The idle limit was reached and a graceful stop was requested
    TimedOut,
    /// The server stopped for another reason first
    ServerStopped,
}

/// Background task that stops the server after a period without traffic
#[derive(Debug, Clone)]
pub struct IdleSupervisor {
    clock: Arc<IdleClock>,
    max_idle: Duration,
    tick: Duration,
}

impl IdleSupervisor {
    pub fn new(clock: Arc<IdleClock>, max_idle: Duration) -> Self {
        Self {
            clock,
            max_idle,
            tick: Duration::from_secs(1),
        }
    }

    /// Override the tick resolution (tests)
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Spawn the supervisor loop.
    pub fn spawn(self, shutdown: ShutdownHandle) -> JoinHandle<IdleOutcome> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: ShutdownHandle) -> IdleOutcome {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if self.clock.idle_for() >= self.max_idle {
                tracing::info!(
                    idle_secs = self.clock.idle_secs(),
                    "Shutting down Fastdev server due to idle timeout"
                );
                shutdown.graceful();
                return IdleOutcome::TimedOut;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.stopped() => {
                    tracing::debug!("Idle supervisor stopping with server");
                    return IdleOutcome::ServerStopped;
                }
            }
        }
    }
}
