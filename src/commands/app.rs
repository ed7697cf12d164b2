//! kill-app / restart-app command handlers

use crate::client::FastdevRequest;
use crate::error::FastdevError;
use crate::socket_server::protocol::OK;

use super::{block_on, CommandContext};

/// Run the kill-app command
pub fn run_kill_app(ctx: &CommandContext) -> crate::Result<String> {
    block_on(control_app(ctx, "kill-app"))
}

/// Run the restart-app command
pub fn run_restart_app(ctx: &CommandContext) -> crate::Result<String> {
    block_on(control_app(ctx, "restart-app"))
}

/// Forward `command` to the connected app through the server.
pub async fn control_app(ctx: &CommandContext, command: &str) -> crate::Result<String> {
    let mut request = FastdevRequest::open(&ctx.lock_file).await?;
    let app_id = request.record().app_id.clone();

    let result = request.command(command).await?.unwrap_or_default();
    request.close().await;

    if result != OK {
        return Err(FastdevError::Forwarding {
            command: command.to_string(),
            message: result,
        });
    }

    let verb = if command == "kill-app" { "Killed" } else { "Restarted" };
    Ok(format!("{} app {}.\n", verb, app_id))
}
