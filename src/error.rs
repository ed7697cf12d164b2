//! Error types and exit codes for fastdev

use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

/// Main error type for fastdev operations
#[derive(Error, Debug)]
pub enum FastdevError {
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Handshake was not accepted by the Fastdev server")]
    HandshakeRejected,

    #[error("Couldn't {} app, result: {message}", signal_verb(.command))]
    Forwarding { command: String, message: String },

    #[error("Directory is not a Titanium Project: {}", dir.display())]
    NotAProject { dir: PathBuf },

    #[error("Invalid project descriptor {}: {message}", path.display())]
    Descriptor { path: PathBuf, message: String },

    #[error("Fastdev server already running for {app_id} on port {port}")]
    LockConflict { app_id: String, port: u16 },

    #[error(
        "{} found, but couldn't connect to the server on port {port}: {message}. \
         Try manually deleting {}.",
        lock_file.display(),
        lock_file.display()
    )]
    StaleLock {
        lock_file: PathBuf,
        port: u16,
        message: String,
    },

    #[error(
        "No Fastdev Servers found. The lock file at {} does not exist, you either need to \
         run \"start\" within your project or specify the lock file with -l <lock file>",
        lock_file.display()
    )]
    NoServer { lock_file: PathBuf },

    #[error("Invalid lock record {}: {message}", path.display())]
    LockRecord { path: PathBuf, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FastdevError {
    /// Convert error to an exit code:
    /// - 0: Success
    /// - 1: IO, project, descriptor or configuration error
    /// - 2: No server running / protocol or handshake failure
    /// - 3: Server already running
    /// - 4: Stale lock record
    /// - 5: App control request failed
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::NotAProject { .. } => ExitCode::from(1),
            Self::Descriptor { .. } => ExitCode::from(1),
            Self::LockRecord { .. } => ExitCode::from(1),
            Self::Config { .. } => ExitCode::from(1),
            Self::Io(_) => ExitCode::from(1),
            Self::NoServer { .. } => ExitCode::from(2),
            Self::Protocol { .. } => ExitCode::from(2),
            Self::HandshakeRejected => ExitCode::from(2),
            Self::LockConflict { .. } => ExitCode::from(3),
            Self::StaleLock { .. } => ExitCode::from(4),
            Self::Forwarding { .. } => ExitCode::from(5),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

fn signal_verb(command: &str) -> &str {
    command.strip_suffix("-app").unwrap_or(command)
}

/// Result type alias for fastdev operations
pub type Result<T> = std::result::Result<T, FastdevError>;
