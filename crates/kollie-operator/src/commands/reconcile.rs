//! `kollie reconcile`

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use kollie_common::Result;

use super::Context;
use crate::image_updater;
use crate::shutdown::cancel_on_signal;

/// Run the image-update loop until Ctrl-C or SIGTERM
pub async fn run(ctx: Context) -> Result<()> {
    let token = CancellationToken::new();
    let signals = cancel_on_signal(token.clone());

    info!("starting image update reconciliation");
    image_updater::reconcile(ctx.orchestrator.clone(), ctx.image_policy_api(), token.clone()).await;

    token.cancel();
    if let Err(e) = signals.await {
        error!(error = %e, "signal listener panicked");
    }
    Ok(())
}
