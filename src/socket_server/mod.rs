//! Fastdev Socket Server
//!
//! Serves a project's resource files to a running app and accepts remote
//! control commands from the `fastdev` CLI.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     FASTDEV SERVER (one per project)                │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  TcpListener ──► Session task per connection                        │
//! │                    AwaitingHandshake ──► Authenticated ──► Closed   │
//! │                                                                     │
//! │  ServerShared (Arc)                                                 │
//! │    - AppRegistry   single slot: the session that sent `handshake`   │
//! │    - IdleClock     last activity, reset by every frame              │
//! │    - request_count `get` requests served                            │
//! │    - ShutdownHandle graceful / immediate stop                       │
//! │                                                                     │
//! │  IdleSupervisor ──► graceful stop after `max_idle` without traffic  │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol
//!
//! Frames of length-prefixed byte tokens (see [`protocol`]):
//!
//! ```text
//! ["handshake", guid]          -> ["OK"] | ["Invalid Handshake"]
//! ["script-handshake", guid]   -> ["OK"] | ["Invalid Handshake"]
//! ["get", "app.js"]            -> [contents] | ["NOT_FOUND"]
//! ["kill-app"]                 -> ["OK"] | ["App not connected"] | [error]
//! ["restart-app"]              -> ["OK"] | ["App not connected"] | [error]
//! ["status"]                   -> [json]
//! ["shutdown"]                 -> ["OK"]
//! ```

pub mod app_registry;
pub mod connection;
pub mod idle;
pub mod protocol;
pub mod server;
pub mod vfs;

pub use app_registry::{AppHandle, AppRegistry};
pub use connection::{handle_connection, handle_stream, CloseReason, SessionState, SessionWriter};
pub use idle::{IdleClock, IdleOutcome, IdleSupervisor};
pub use protocol::{read_frame, write_frame, AppSignal, Command, Frame, FrameCodec, StatusSnapshot};
pub use server::{FastdevServer, ServerConfig, ServerShared, ShutdownHandle, StopReason};
pub use vfs::ResourceOverlay;
