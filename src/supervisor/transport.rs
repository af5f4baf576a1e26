//! Request/response exchange with a running worker.
//!
//! [`Transport`] hides the framing: [`StdioTransport`] writes JSON lines to
//! the worker's stdin and reads its stdout, [`HttpTransport`](super::HttpTransport)
//! posts to `/rpc`. Both match responses to requests by id.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::error::millis;
use super::ClientError;
use crate::config::TransportKind;
use crate::protocol::{Request, Response};

/// One outstanding request at a time; callers hold `&mut self`.
#[async_trait]
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Send `request` and wait up to `timeout` for the response carrying its id.
    ///
    /// # Errors
    ///
    /// `ResponseTimeout` if no matching response arrives in time,
    /// `TransportLost` if the connection is gone.
    async fn exchange(
        &mut self,
        request: &Request,
        timeout: Duration,
    ) -> Result<Response, ClientError>;

    /// Close the request side of the connection.
    async fn close(&mut self) {}
}

/// JSON lines over a pair of byte streams.
#[derive(Debug)]
pub struct StdioTransport<W> {
    writer: Option<W>,
    responses: mpsc::UnboundedReceiver<Response>,
    reader_task: JoinHandle<()>,
}

impl<W> StdioTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap the worker's stdin (`writer`) and stdout (`reader`).
    pub fn new<R>(writer: W, reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, responses) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(read_responses(reader, tx));
        Self {
            writer: Some(writer),
            responses,
            reader_task,
        }
    }

    /// A write cut short by the deadline may leave a partial line on the
    /// pipe, so the writer is dropped and the transport is lost.
    async fn send(&mut self, request: &Request, deadline: Instant) -> Result<(), ClientError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(ClientError::TransportLost("worker input closed".to_string()));
        };

        let mut line = serde_json::to_vec(request)
            .map_err(|e| ClientError::Protocol(format!("Failed to encode request: {e}")))?;
        line.push(b'\n');

        let write = async {
            writer.write_all(&line).await?;
            writer.flush().await
        };
        match tokio::time::timeout_at(deadline, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.writer = None;
                Err(ClientError::TransportLost(format!(
                    "Failed to write request: {e}"
                )))
            }
            Err(_) => {
                self.writer = None;
                Err(ClientError::TransportLost(format!(
                    "Timed out writing request {}",
                    request.id
                )))
            }
        }
    }
}

#[async_trait]
impl<W> Transport for StdioTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn exchange(
        &mut self,
        request: &Request,
        timeout: Duration,
    ) -> Result<Response, ClientError> {
        let deadline = Instant::now() + timeout;
        let timed_out = || ClientError::ResponseTimeout {
            id: request.id,
            timeout_ms: millis(timeout),
        };

        self.send(request, deadline).await?;

        loop {
            match tokio::time::timeout_at(deadline, self.responses.recv()).await {
                Err(_) => return Err(timed_out()),
                Ok(None) => {
                    return Err(ClientError::TransportLost(
                        "worker closed its output".to_string(),
                    ))
                }
                Ok(Some(response)) if response.id == Some(request.id) => return Ok(response),
                Ok(Some(response)) => {
                    tracing::debug!(
                        expected = request.id,
                        received = ?response.id,
                        "Discarding response for another request"
                    );
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
    }
}

impl<W> Drop for StdioTransport<W> {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn read_responses<R>(reader: R, tx: mpsc::UnboundedSender<Response>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Worker stdout read failed");
                break;
            }
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Response>(line) {
            Ok(response) => {
                if tx.send(response).is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, line, "Discarding unparseable worker output"),
        }
    }
    tracing::debug!("Worker output closed");
}
