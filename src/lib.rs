//! Fastdev: resource server and remote control for Titanium app development
//!
//! A `fastdev` server sits beside a project, serves files from its
//! `Resources` directory to the running app over a small length-prefixed
//! token protocol, and forwards kill/restart requests from the CLI to the app.
//! The server stops itself after a period without traffic.
//!
//! # Example
//!
//! ```ignore
//! use fastdev::socket_server::{FastdevServer, ServerConfig};
//!
//! let config = ServerConfig::new("/srv/apps/demo/Resources", "app-guid");
//! let server = FastdevServer::bind(config).await?;
//! println!("listening on {}", server.local_addr());
//! server.run().await?;
//! ```

pub mod cli;
pub mod client;
pub mod commands;
pub mod error;
pub mod lock;
pub mod paths;
pub mod project;
pub mod socket_server;

// Re-export commonly used types
pub use cli::{Cli, Commands};
pub use client::FastdevRequest;
pub use error::{FastdevError, Result};
pub use lock::LockRecord;
pub use project::ProjectDescriptor;
pub use socket_server::{FastdevServer, ServerConfig, ShutdownHandle, StopReason};
