use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Install a handler that listens for SIGTERM and SIGHUP.
///
/// Returns a `CancellationToken` that is cancelled when either signal is
/// received. The allocation loop and the task stream watch it so the client
/// closes its side of the stream before exiting. SIGINT is not handled here;
/// it is forwarded to the remote task instead.
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
            }
            _ = sighup.recv() => {
                tracing::info!("Received SIGHUP, shutting down");
            }
        }

        token_clone.cancel();
    });

    Ok(token)
}
