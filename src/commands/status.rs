//! Status command handler

use std::fmt::Write;

use crate::client::FastdevRequest;
use crate::lock::LockRecord;
use crate::socket_server::StatusSnapshot;

use super::{block_on, CommandContext};

/// Run the status command
pub fn run_status(ctx: &CommandContext) -> crate::Result<String> {
    block_on(status(ctx))
}

/// Report the server for this project, if any.
///
/// An unreachable server surfaces as [`crate::FastdevError::StaleLock`].
pub async fn status(ctx: &CommandContext) -> crate::Result<String> {
    let Some(record) = LockRecord::read(&ctx.lock_file)? else {
        return Ok(format!(
            "No Fastdev servers running in {}\n",
            ctx.project_dir.display()
        ));
    };

    let mut request = FastdevRequest::connect(record, &ctx.lock_file).await?;
    let snapshot = request.status().await?;
    let output = format_status(request.record(), &snapshot);
    request.close().await;
    Ok(output)
}

fn format_status(record: &LockRecord, status: &StatusSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Fastdev server running for app {}:", record.app_id);
    let _ = writeln!(out, "Port: {}", status.port);
    let _ = writeln!(out, "Uptime: {} sec", status.uptime_seconds);
    let _ = writeln!(out, "PID: {}", status.process_id);
    let _ = writeln!(out, "Requests: {}", status.request_count);
    let _ = writeln!(
        out,
        "App connected: {}",
        if status.app_connected { "yes" } else { "no" }
    );
    out
}
