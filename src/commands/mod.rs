//! Command modules for the fastdev CLI
//!
//! ## Architecture
//!
//! Each command module implements a single top-level command:
//! - `start` - Bind the server, write the lock record, run until stopped
//! - `stop` - Ask a running server to shut down
//! - `status` - Report uptime, PID and request count of a running server
//! - `app` - Forward `kill-app` / `restart-app` to the connected app
//!
//! All command handlers take a shared `CommandContext` holding the resolved
//! project directory, lock file and server options.

pub mod app;
pub mod start;
pub mod status;
pub mod stop;

pub use app::{run_kill_app, run_restart_app};
pub use start::run_start;
pub use status::run_status;
pub use stop::run_stop;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::{Cli, Commands, DEFAULT_TIMEOUT_SECS};
use crate::error::FastdevError;
use crate::paths::{lock_file_path, resolve_project_dir};
use crate::socket_server::server::DEFAULT_HOST;

/// Shared context passed to all command handlers
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Absolute project directory
    pub project_dir: PathBuf,
    /// Lock file for this project
    pub lock_file: PathBuf,
    /// Host the server binds to
    pub host: String,
    /// Port the server binds to (0 picks a free port)
    pub port: u16,
    /// Idle period after which the server stops itself
    pub max_idle: Duration,
    /// Show verbose output
    pub verbose: bool,
}

impl CommandContext {
    /// Resolve directories and options from parsed CLI args
    pub fn from_cli(cli: &Cli) -> crate::Result<Self> {
        let project_dir = resolve_project_dir(cli.command.project().dir.as_deref())?;
        let lock_file = lock_file_path(&project_dir, cli.lock_file.as_deref());

        Ok(Self {
            lock_file,
            project_dir,
            host: cli.host.clone(),
            port: cli.port,
            max_idle: Duration::from_secs(cli.timeout),
            verbose: cli.verbose,
        })
    }

    /// Context for a project directory with default server options
    pub fn for_project(project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        Self {
            lock_file: lock_file_path(&project_dir, None),
            project_dir,
            host: DEFAULT_HOST.to_string(),
            port: 0,
            max_idle: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            verbose: false,
        }
    }
}

/// Dispatch a parsed command line to its handler
pub fn run(cli: &Cli) -> crate::Result<String> {
    let ctx = CommandContext::from_cli(cli)?;
    tracing::debug!(
        dir = %ctx.project_dir.display(),
        lock = %ctx.lock_file.display(),
        "Resolved project"
    );

    match &cli.command {
        Commands::Start(_) => run_start(&ctx),
        Commands::Stop(_) => run_stop(&ctx),
        Commands::Status(_) => run_status(&ctx),
        Commands::KillApp(_) => run_kill_app(&ctx),
        Commands::RestartApp(_) => run_restart_app(&ctx),
    }
}

/// Run an async command body on a fresh tokio runtime
pub(crate) fn block_on<F, T>(future: F) -> crate::Result<T>
where
    F: Future<Output = crate::Result<T>>,
{
    let runtime = tokio::runtime::Runtime::new().map_err(|e| FastdevError::Config {
        message: format!("Failed to create tokio runtime: {}", e),
    })?;
    runtime.block_on(future)
}
