//! The worker process.
//!
//! The worker owns the [`PinController`](crate::gpio::PinController) and
//! serves protocol requests over one transport:
//!
//! - **stdio**: JSON lines on stdin/stdout, `WORKER_READY` on stderr.
//! - **http**: a loopback axum server, `SERVICE_PORT:<port>` on stderr.
//!
//! Stderr carries marker lines only. Pins are released when serving ends,
//! whether by EOF, a signal, or a transport error.

mod error;
mod http;
mod side_channel;
mod signal;
mod stdio;

pub use error::*;
pub use http::{bind_listener, build_router, serve, status_for, WorkerState};
pub use side_channel::SideChannel;
pub use signal::{spawn_shutdown_listener, spawn_stdin_watcher};
pub use stdio::serve_lines;

use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use crate::config::{TransportKind, WorkerSettings};
use crate::gpio::{backend_from_settings, PinController};
use crate::protocol::ProtocolHandler;

/// Run the worker until its input closes or it is signalled.
///
/// # Errors
///
/// Returns `WorkerError` if the transport cannot be set up or fails while
/// serving. Startup failures are also reported as `SERVICE_ERROR` markers.
pub async fn run(settings: &WorkerSettings, transport: TransportKind) -> Result<(), WorkerError> {
    let controller = PinController::new(backend_from_settings(settings));
    tracing::info!(
        transport = %transport,
        backend = controller.backend_name(),
        hardware_available = controller.hardware_available(),
        "Starting GPIO worker"
    );
    if !controller.hardware_available() {
        tracing::warn!("GPIO hardware not available; pin operations will fail");
    }

    let handler = ProtocolHandler::new(controller);
    let mut side = SideChannel::new(std::io::stderr());
    let cancel = CancellationToken::new();
    let signals = spawn_shutdown_listener(cancel.clone());

    let result = match transport {
        TransportKind::Stdio => run_stdio(handler, &mut side, &cancel).await,
        TransportKind::Http => run_http(handler, settings, &mut side, &cancel).await,
    };

    cancel.cancel();
    signals.abort();

    match &result {
        Ok(()) => tracing::info!("GPIO worker stopped"),
        Err(e) => tracing::error!(error = %e, "GPIO worker failed"),
    }
    result
}

async fn run_stdio<W: std::io::Write>(
    mut handler: ProtocolHandler,
    side: &mut SideChannel<W>,
    cancel: &CancellationToken,
) -> Result<(), WorkerError> {
    side.ready()?;

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    let served = serve_lines(stdin, stdout, &mut handler, cancel).await;

    handler.release();
    let served = served?;
    tracing::info!(served, "Line transport finished");
    Ok(())
}

async fn run_http<W: std::io::Write>(
    handler: ProtocolHandler,
    settings: &WorkerSettings,
    side: &mut SideChannel<W>,
    cancel: &CancellationToken,
) -> Result<(), WorkerError> {
    let listener = match bind_listener(settings.port_range_start, settings.port_attempts).await {
        Ok(listener) => listener,
        Err(e) => {
            side.error(&e.to_string())?;
            return Err(e);
        }
    };
    let port = listener.local_addr()?.port();
    tracing::info!(port, "HTTP worker listening");
    side.port(port)?;

    let watcher = settings
        .exit_on_stdin_eof
        .then(|| spawn_stdin_watcher(tokio::io::stdin(), cancel.clone()));

    let state = WorkerState::new(handler);
    let served = serve(listener, state.clone(), cancel.clone()).await;
    if let Some(watcher) = watcher {
        watcher.abort();
    }

    state.release().await;
    served?;
    Ok(())
}
