//! CLI argument definitions using clap with subcommand architecture
//!
//! Global options configure the server (`start`) and locate the lock file
//! for every command; each subcommand takes an optional project directory.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::socket_server::server::DEFAULT_HOST;

/// Default idle timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;

/// Fastdev resource server for Titanium projects
#[derive(Parser, Debug)]
#[command(name = "fastdev")]
#[command(about = "Serve a project's Resources to a running app and control it remotely")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Port to bind to (0 picks a free port)
    #[arg(short, long, default_value_t = 0, env = "FASTDEV_PORT", global = true)]
    pub port: u16,

    /// Seconds without traffic before the server stops itself
    #[arg(
        short,
        long,
        value_name = "SECONDS",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        env = "FASTDEV_TIMEOUT",
        global = true
    )]
    pub timeout: u64,

    /// Lock file to use (default: <dir>/.fastdev.lock)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub lock_file: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST, global = true)]
    pub host: String,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands for fastdev
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server for a project
    Start(ProjectArgs),

    /// Stop the server for a project
    Stop(ProjectArgs),

    /// Show the status of the server for a project
    Status(ProjectArgs),

    /// Kill the connected app
    KillApp(ProjectArgs),

    /// Restart the connected app
    RestartApp(ProjectArgs),
}

/// Project directory argument shared by all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArgs {
    /// Project directory (default: current directory)
    #[arg(value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

impl Commands {
    pub fn project(&self) -> &ProjectArgs {
        match self {
            Self::Start(args)
            | Self::Stop(args)
            | Self::Status(args)
            | Self::KillApp(args)
            | Self::RestartApp(args) => args,
        }
    }
}
