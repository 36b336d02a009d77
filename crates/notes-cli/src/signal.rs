use notes_core::CancellationToken;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Cancel `token` on the first interrupt.
///
/// The watcher stops on its own once the token is cancelled by someone else.
pub fn cancel_on_interrupt(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    info!("interrupt received, cancelling");
                    token.cancel();
                }
                Err(e) => warn!("unable to listen for interrupts: {}", e),
            },
            _ = token.cancelled() => {}
        }
    })
}
