//! Stop command handler

use crate::client::FastdevRequest;

use super::{block_on, CommandContext};

/// Run the stop command
pub fn run_stop(ctx: &CommandContext) -> crate::Result<String> {
    block_on(stop(ctx))
}

/// Send `shutdown` and report the reply
pub async fn stop(ctx: &CommandContext) -> crate::Result<String> {
    let mut request = FastdevRequest::open(&ctx.lock_file).await?;
    let app_id = request.record().app_id.clone();

    let reply = request.command("shutdown").await?.unwrap_or_default();
    request.close().await;

    Ok(format!("{}\nFastdev server for {} stopped.\n", reply, app_id))
}
