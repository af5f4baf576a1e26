//! Shutdown on SIGINT, SIGTERM, or the parent going away.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancel `cancel` when the process receives SIGINT or SIGTERM.
pub fn spawn_shutdown_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = wait_for_signal() => {
                tracing::info!("Shutdown signal received");
                cancel.cancel();
            }
            () = cancel.cancelled() => {}
        }
    })
}

/// Cancel `cancel` once `input` reaches EOF or fails. Data read from it is
/// discarded.
pub fn spawn_stdin_watcher<R>(mut input: R, cancel: CancellationToken) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 256];
        loop {
            tokio::select! {
                read = input.read(&mut buf) => match read {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "Stdin read failed");
                        break;
                    }
                },
                () = cancel.cancelled() => return,
            }
        }
        tracing::info!("Stdin closed; parent is gone");
        cancel.cancel();
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
