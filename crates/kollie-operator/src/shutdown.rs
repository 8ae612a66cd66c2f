//! Process shutdown on Ctrl-C or SIGTERM

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Cancel `token` on the first interrupt or terminate signal
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM, only Ctrl-C will stop the process");
                wait_for_ctrl_c(&token).await;
                return;
            }
        };

        tokio::select! {
            _ = wait_for_ctrl_c(&token) => {}
            _ = sigterm.recv() => {
                info!("received terminate signal");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}

/// Cancel `token` on Ctrl-C
///
/// If the handler can't be installed, only an explicit cancel stops the
/// process; the token is never cancelled on that error.
async fn wait_for_ctrl_c(token: &CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received interrupt signal");
            token.cancel();
        }
        Err(e) => {
            error!(error = %e, "cannot listen for Ctrl-C");
            token.cancelled().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn listener_waits_for_a_signal_and_ends_on_cancel() {
        let token = CancellationToken::new();
        let listener = cancel_on_signal(token.clone());

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!token.is_cancelled());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), listener)
            .await
            .unwrap()
            .unwrap();
    }
}
