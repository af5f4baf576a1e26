//! Reader for the worker's stderr.
//!
//! A background task splits the stream into lines. Whole-line markers are
//! forwarded as [`SideEvent`]s; everything else is kept as diagnostics. The
//! task keeps draining after readiness so the worker never blocks on a full
//! pipe.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::protocol::Marker;

/// Diagnostic lines kept for startup failure reports.
pub const DIAGNOSTIC_LINES: usize = 50;

/// Something observed on the side channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEvent {
    Marker(Marker),
    /// The stream reached EOF.
    Closed,
}

/// Bounded buffer of the most recent non-marker lines.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl Diagnostics {
    fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == DIAGNOSTIC_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Captured lines, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// Handle to the background stderr reader.
#[derive(Debug)]
pub struct SideChannelReader {
    events: mpsc::UnboundedReceiver<SideEvent>,
    diagnostics: Diagnostics,
    task: JoinHandle<()>,
}

impl SideChannelReader {
    /// Start reading `stream` in a background task.
    pub fn spawn<R>(stream: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, events) = mpsc::unbounded_channel();
        let diagnostics = Diagnostics::default();
        let task = tokio::spawn(read_side_channel(stream, tx, diagnostics.clone()));
        Self {
            events,
            diagnostics,
            task,
        }
    }

    /// Next event. `None` once the reader has finished and every event has
    /// been consumed.
    pub async fn next_event(&mut self) -> Option<SideEvent> {
        self.events.recv().await
    }

    #[must_use]
    pub fn diagnostics(&self) -> Vec<String> {
        self.diagnostics.snapshot()
    }
}

impl Drop for SideChannelReader {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_side_channel<R>(
    stream: R,
    tx: mpsc::UnboundedSender<SideEvent>,
    diagnostics: Diagnostics,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Worker stderr read failed");
                break;
            }
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(marker) = Marker::parse(line) {
            tracing::debug!(%marker, "Worker marker");
            // Nobody listening after startup; keep draining.
            let _ = tx.send(SideEvent::Marker(marker));
        } else if !line.is_empty() {
            tracing::debug!(line, "Worker stderr");
            diagnostics.push(line.to_string());
        }
    }

    let _ = tx.send(SideEvent::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_markers_and_diagnostics() {
        let input = b"booting\nWORKER_READY\nnote: WORKER_READY\r\n".as_slice();
        let mut reader = SideChannelReader::spawn(input);

        assert_eq!(
            reader.next_event().await,
            Some(SideEvent::Marker(Marker::Ready))
        );
        assert_eq!(reader.next_event().await, Some(SideEvent::Closed));
        assert_eq!(reader.next_event().await, None);
        assert_eq!(reader.diagnostics(), vec!["booting", "note: WORKER_READY"]);
    }

    #[tokio::test]
    async fn test_error_marker() {
        let input = b"SERVICE_ERROR:no free port\n".as_slice();
        let mut reader = SideChannelReader::spawn(input);
        assert_eq!(
            reader.next_event().await,
            Some(SideEvent::Marker(Marker::Error("no free port".to_string())))
        );
    }

    #[tokio::test]
    async fn test_diagnostics_are_bounded() {
        let input: String = (0..DIAGNOSTIC_LINES + 10)
            .map(|i| format!("line {i}\n"))
            .collect();
        let mut reader = SideChannelReader::spawn(std::io::Cursor::new(input.into_bytes()));
        assert_eq!(reader.next_event().await, Some(SideEvent::Closed));

        let lines = reader.diagnostics();
        assert_eq!(lines.len(), DIAGNOSTIC_LINES);
        assert_eq!(lines[0], "line 10");
    }
}
