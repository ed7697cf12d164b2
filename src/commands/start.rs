//! Start command handler
//!
//! Refuses to start over an existing lock record, binds the server, publishes
//! the lock record and runs until `shutdown`, the idle timeout, or Ctrl-C.

use std::path::{Path, PathBuf};

use crate::client::FastdevRequest;
use crate::error::FastdevError;
use crate::lock::{remove_lock, LockRecord};
use crate::paths::resources_dir;
use crate::project::ProjectDescriptor;
use crate::socket_server::{FastdevServer, ServerConfig, ShutdownHandle, StopReason};

use super::{block_on, CommandContext};

/// A bound server whose lock record has been written
pub struct StartedServer {
    server: FastdevServer,
    record: LockRecord,
    lock_file: PathBuf,
}

impl StartedServer {
    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    pub fn lock_file(&self) -> &Path {
        &self.lock_file
    }

    pub fn port(&self) -> u16 {
        self.server.port()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.server.shutdown_handle()
    }

    /// Run until stopped, then remove the lock record.
    pub async fn run(self) -> crate::Result<StopReason> {
        let result = self.server.run().await;

        match remove_lock(&self.lock_file) {
            Ok(_) => tracing::debug!("Removed {}", self.lock_file.display()),
            Err(e) => tracing::warn!("Failed to remove {}: {}", self.lock_file.display(), e),
        }
        result
    }
}

/// Check the lock, load the project, bind and write the lock record.
pub async fn start_server(ctx: &CommandContext) -> crate::Result<StartedServer> {
    ensure_not_running(&ctx.lock_file).await?;

    let descriptor = ProjectDescriptor::load(&ctx.project_dir)?;

    let config = ServerConfig {
        host: ctx.host.clone(),
        port: ctx.port,
        max_idle: ctx.max_idle,
        ..ServerConfig::new(resources_dir(&ctx.project_dir), descriptor.guid.clone())
    };
    let server = FastdevServer::bind(config).await?;

    let record = LockRecord {
        ip: ctx.host.clone(),
        port: server.port(),
        dir: ctx.project_dir.clone(),
        app_id: descriptor.id,
        app_guid: descriptor.guid,
    };
    record.write_atomic(&ctx.lock_file)?;

    tracing::info!(
        "Starting Fastdev server for {} on port {}",
        record.app_id,
        record.port
    );

    Ok(StartedServer {
        server,
        record,
        lock_file: ctx.lock_file.clone(),
    })
}

/// Fail if a lock record exists: conflict when its server answers, stale otherwise.
async fn ensure_not_running(lock_file: &Path) -> crate::Result<()> {
    let Some(record) = LockRecord::read(lock_file)? else {
        return Ok(());
    };

    let conflict = FastdevError::LockConflict {
        app_id: record.app_id.clone(),
        port: record.port,
    };
    match FastdevRequest::connect(record, lock_file).await {
        Ok(request) => {
            request.close().await;
            Err(conflict)
        }
        // Something is listening there, just not with our secret.
        Err(FastdevError::HandshakeRejected) => Err(conflict),
        Err(e) => Err(e),
    }
}

/// Run the start command
pub fn run_start(ctx: &CommandContext) -> crate::Result<String> {
    block_on(async {
        let started = start_server(ctx).await?;

        let handle = started.shutdown_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("Terminated");
                handle.immediate();
            }
        });

        let app_id = started.record().app_id.clone();
        let reason = started.run().await?;
        Ok(match reason {
            StopReason::IdleTimeout => {
                format!("Fastdev server for {} stopped after idle timeout.\n", app_id)
            }
            StopReason::Requested | StopReason::Interrupted => String::new(),
        })
    })
}
