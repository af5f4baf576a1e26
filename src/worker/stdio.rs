//! Line transport: one JSON request per line in, one response line out.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::protocol::ProtocolHandler;

/// Serve requests until EOF or cancellation.
///
/// Blank lines are skipped. Every other line, valid or not, produces
/// exactly one flushed response line. Returns the number of responses
/// written.
///
/// # Errors
///
/// Returns an error if reading the input or writing a response fails.
pub async fn serve_lines<R, W>(
    mut reader: R,
    mut writer: W,
    handler: &mut ProtocolHandler,
    cancel: &CancellationToken,
) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let mut served = 0u64;

    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("Line transport cancelled");
                break;
            }
            read = reader.read_until(b'\n', &mut buf) => read?,
        };

        if read == 0 {
            tracing::debug!(served, "Input closed");
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        if line.trim().is_empty() {
            continue;
        }

        let response = handler.handle_line(&line);
        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        served += 1;
    }

    Ok(served)
}
