//! Request/response over the worker's loopback HTTP server.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::error::millis;
use super::{ClientError, Transport};
use crate::config::TransportKind;
use crate::protocol::{Health, Request, Response};

/// Posts envelopes to `/rpc`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
}

impl HttpTransport {
    /// Connect to a worker listening on `127.0.0.1:<port>`.
    ///
    /// # Errors
    ///
    /// Returns `TransportLost` if the HTTP client cannot be built.
    pub fn new(port: u16) -> Result<Self, ClientError> {
        let base = Url::parse(&format!("http://127.0.0.1:{port}/"))
            .map_err(|e| ClientError::TransportLost(format!("Invalid worker address: {e}")))?;
        Self::with_base_url(base)
    }

    /// Connect to a worker at `base`.
    ///
    /// # Errors
    ///
    /// Returns `TransportLost` if the HTTP client cannot be built.
    pub fn with_base_url(base: Url) -> Result<Self, ClientError> {
        // The worker is always local; never route through a proxy.
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| ClientError::TransportLost(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, base })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Query `GET /health`.
    ///
    /// # Errors
    ///
    /// Returns `TransportLost` if the worker does not answer, or
    /// `ResponseTimeout` (id 0) if it answers too slowly.
    pub async fn health(&self, timeout: Duration) -> Result<Health, ClientError> {
        let url = self.endpoint("health")?;
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_error(&e, 0, timeout))?;
        response
            .json::<Health>()
            .await
            .map_err(|e| map_error(&e, 0, timeout))
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path)
            .map_err(|e| ClientError::TransportLost(format!("Invalid worker URL: {e}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn exchange(
        &mut self,
        request: &Request,
        timeout: Duration,
    ) -> Result<Response, ClientError> {
        let url = self.endpoint("rpc")?;
        let reply = self
            .client
            .post(url)
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| map_error(&e, request.id, timeout))?;

        // Error statuses still carry an envelope.
        let status = reply.status();
        let response: Response = reply
            .json()
            .await
            .map_err(|e| map_error(&e, request.id, timeout))?;
        tracing::trace!(id = request.id, %status, "HTTP exchange complete");

        match response.id {
            Some(id) if id == request.id => Ok(response),
            // Only our request can be answered on this connection.
            None if response.error.is_some() => Ok(response),
            other => Err(ClientError::Protocol(format!(
                "Response id {other:?} does not match request {}",
                request.id
            ))),
        }
    }
}

fn map_error(error: &reqwest::Error, id: u64, timeout: Duration) -> ClientError {
    if error.is_timeout() {
        ClientError::ResponseTimeout {
            id,
            timeout_ms: millis(timeout),
        }
    } else if error.is_decode() {
        ClientError::Protocol(format!("Malformed worker response: {error}"))
    } else {
        ClientError::TransportLost(error.to_string())
    }
}
