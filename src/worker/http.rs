//! HTTP transport with axum router and graceful shutdown.

use std::net::Ipv4Addr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use super::WorkerError;
use crate::protocol::{ErrorCode, ErrorObject, Health, Operation, ProtocolHandler, Request, Response};

/// State shared across handlers.
#[derive(Clone)]
pub struct WorkerState {
    handler: Arc<Mutex<ProtocolHandler>>,
    /// Read once at startup so `/health` never waits on the handler lock.
    hardware_available: bool,
}

impl WorkerState {
    #[must_use]
    pub fn new(handler: ProtocolHandler) -> Self {
        let hardware_available = handler.hardware_available();
        Self {
            handler: Arc::new(Mutex::new(handler)),
            hardware_available,
        }
    }

    /// Release all claimed pins.
    pub async fn release(&self) {
        self.handler.lock().await.release();
    }

    async fn handle(&self, body: &str) -> Response {
        self.handler.lock().await.handle_line(body)
    }

    async fn call(&self, operation: Operation, arguments: Map<String, Value>) -> Response {
        let request = Request {
            id: 0,
            operation: operation.as_str().to_string(),
            arguments,
        };
        self.handler.lock().await.handle(&request)
    }
}

/// Build the router with all routes and middleware.
pub fn build_router(state: WorkerState) -> Router {
    Router::new()
        .route("/rpc", post(post_rpc))
        .route("/gpio/set", post(post_set))
        .route("/gpio/read", post(post_read))
        .route("/gpio/status", get(get_status))
        .route("/gpio/pins", get(get_pins))
        .route("/tools", get(get_tools))
        .route("/health", get(get_health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// HTTP status for a response envelope.
#[must_use]
pub fn status_for(response: &Response) -> StatusCode {
    let Some(error) = &response.error else {
        return StatusCode::OK;
    };
    match error.kind() {
        Some(
            ErrorCode::ParseError
            | ErrorCode::InvalidRequest
            | ErrorCode::InvalidArguments
            | ErrorCode::InvalidPin
            | ErrorCode::InvalidState,
        ) => StatusCode::BAD_REQUEST,
        Some(ErrorCode::UnknownOperation) => StatusCode::NOT_FOUND,
        Some(ErrorCode::HardwareUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
        Some(ErrorCode::HardwareFault) | None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// POST /rpc - Request envelope in, response envelope out.
async fn post_rpc(State(state): State<WorkerState>, body: String) -> (StatusCode, Json<Response>) {
    let response = state.handle(&body).await;
    (status_for(&response), Json(response))
}

/// POST /gpio/set - `{pin, state}`.
async fn post_set(State(state): State<WorkerState>, body: String) -> (StatusCode, Json<Value>) {
    match parse_arguments(&body) {
        Ok(arguments) => unwrap_envelope(state.call(Operation::SetPin, arguments).await),
        Err(error) => unwrap_envelope(Response::failure(None, error)),
    }
}

/// POST /gpio/read - `{pin}`.
async fn post_read(State(state): State<WorkerState>, body: String) -> (StatusCode, Json<Value>) {
    match parse_arguments(&body) {
        Ok(arguments) => unwrap_envelope(state.call(Operation::ReadPin, arguments).await),
        Err(error) => unwrap_envelope(Response::failure(None, error)),
    }
}

/// GET /gpio/status - Claimed pins.
async fn get_status(State(state): State<WorkerState>) -> (StatusCode, Json<Value>) {
    unwrap_envelope(state.call(Operation::GetStatus, Map::new()).await)
}

/// GET /gpio/pins - Valid pins and header mapping.
async fn get_pins(State(state): State<WorkerState>) -> (StatusCode, Json<Value>) {
    unwrap_envelope(state.call(Operation::ListValidPins, Map::new()).await)
}

/// GET /tools - Tool descriptors.
async fn get_tools(State(state): State<WorkerState>) -> (StatusCode, Json<Value>) {
    unwrap_envelope(state.call(Operation::ListTools, Map::new()).await)
}

/// GET /health - Liveness.
async fn get_health(State(state): State<WorkerState>) -> Json<Health> {
    Json(Health::healthy(state.hardware_available))
}

/// The convenience routes answer with the bare result, or `{"error": ...}`.
fn unwrap_envelope(response: Response) -> (StatusCode, Json<Value>) {
    let status = status_for(&response);
    match response.into_result() {
        Ok(result) => (status, Json(result)),
        Err(error) => (status, Json(json!({ "error": error }))),
    }
}

fn parse_arguments(body: &str) -> Result<Map<String, Value>, ErrorObject> {
    if body.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ErrorObject::new(
            ErrorCode::InvalidRequest,
            "Request body must be a JSON object",
        )),
        Err(e) => Err(ErrorObject::new(
            ErrorCode::ParseError,
            format!("Invalid JSON: {e}"),
        )),
    }
}

/// Bind a loopback listener.
///
/// With `start == 0` the OS picks the port. Otherwise ports
/// `start..start + attempts` are probed in order and the first free one wins.
///
/// # Errors
///
/// Returns `WorkerError::Bind` if no port in the range can be bound.
pub async fn bind_listener(start: u16, attempts: u16) -> Result<TcpListener, WorkerError> {
    if start == 0 {
        return TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(|source| WorkerError::Bind {
                start,
                end: 0,
                source,
            });
    }

    let end = u32::from(start) + u32::from(attempts.max(1));
    let mut last_error = None;
    for port in (start..=u16::MAX).take(usize::from(attempts.max(1))) {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                tracing::debug!(port, error = %e, "Port unavailable");
                last_error = Some(e);
            }
        }
    }

    Err(WorkerError::Bind {
        start,
        end,
        source: last_error.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "port range exhausted")
        }),
    })
}

/// Serve until the token is cancelled.
///
/// # Errors
///
/// Returns an error if the server fails while serving.
pub async fn serve(
    listener: TcpListener,
    state: WorkerState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let app = build_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            tracing::info!("HTTP worker shutting down gracefully");
        })
        .await
}
