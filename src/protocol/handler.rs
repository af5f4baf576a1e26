//! Worker-side request dispatch.
//!
//! Each request moves through `Received -> Validated -> Dispatched ->
//! Encoded`. Failures at any stage become an error response; nothing here
//! panics or returns early to the transport.

use serde::Serialize;
use serde_json::{Map, Value};

use super::{
    tool_descriptors, BoardInfo, ErrorCode, ErrorObject, InitializeResult, Operation, PinResult,
    Request, Response, ServerInfo, ToolList, ValidPins, PROTOCOL_VERSION,
};
use crate::gpio::PinController;

/// Name reported in `initialize`.
pub const SERVER_NAME: &str = "gpio-bridge-worker";

/// Decodes envelopes and dispatches them to the owned [`PinController`].
#[derive(Debug)]
pub struct ProtocolHandler {
    controller: PinController,
    handled: u64,
}

impl ProtocolHandler {
    #[must_use]
    pub fn new(controller: PinController) -> Self {
        Self {
            controller,
            handled: 0,
        }
    }

    #[must_use]
    pub fn controller(&self) -> &PinController {
        &self.controller
    }

    #[must_use]
    pub fn hardware_available(&self) -> bool {
        self.controller.hardware_available()
    }

    /// Number of requests answered so far.
    #[must_use]
    pub fn handled(&self) -> u64 {
        self.handled
    }

    /// Release all claimed pins. Called once at worker shutdown.
    pub fn release(&mut self) {
        self.controller.release();
    }

    /// Decode one line (or HTTP body) and answer it.
    pub fn handle_line(&mut self, line: &str) -> Response {
        match decode_request(line) {
            Ok(request) => self.handle(&request),
            Err(response) => {
                self.handled += 1;
                tracing::warn!(
                    id = ?response.id,
                    error = ?response.error,
                    "Rejected malformed request"
                );
                response
            }
        }
    }

    /// Answer a decoded request.
    pub fn handle(&mut self, request: &Request) -> Response {
        self.handled += 1;
        let id = Some(request.id);
        tracing::debug!(id = request.id, operation = %request.operation, "Received request");

        let Some(operation) = Operation::from_name(&request.operation) else {
            tracing::warn!(operation = %request.operation, "Unknown operation");
            return Response::failure(
                id,
                ErrorObject::new(
                    ErrorCode::UnknownOperation,
                    format!("Unknown operation: {}", request.operation),
                ),
            );
        };

        let response = match self.dispatch(operation, &request.arguments) {
            Ok(result) => Response::success(id, result),
            Err(error) => Response::failure(id, error),
        };
        tracing::trace!(id = request.id, ok = response.is_success(), "Encoded response");
        response
    }

    fn dispatch(
        &mut self,
        operation: Operation,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ErrorObject> {
        match operation {
            Operation::Initialize => encode(&self.describe()),
            Operation::ListTools => encode(&ToolList {
                tools: tool_descriptors(),
            }),
            Operation::SetPin => {
                let pin = pin_argument(arguments)?;
                let state = state_argument(arguments)?;
                let reading = self.controller.set_pin(pin, &state)?;
                encode(&PinResult::set(reading))
            }
            Operation::ReadPin => {
                let pin = pin_argument(arguments)?;
                let reading = self.controller.read_pin(pin)?;
                encode(&PinResult::read(reading))
            }
            Operation::GetStatus => encode(&self.controller.get_status()),
            Operation::ListValidPins => encode(&ValidPins::board()),
        }
    }

    fn describe(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: Operation::ALL
                .iter()
                .map(|op| op.as_str().to_string())
                .collect(),
            hardware_available: self.controller.hardware_available(),
            board: Some(BoardInfo::raspberry_pi()),
        }
    }
}

/// Parse and validate an envelope.
///
/// On failure the returned response carries the request id if one could
/// still be read from the envelope, otherwise `null`.
///
/// # Errors
///
/// Returns the ready-to-send failure response.
pub fn decode_request(line: &str) -> Result<Request, Response> {
    let value: Value = serde_json::from_str(line.trim()).map_err(|e| {
        Response::failure(
            None,
            ErrorObject::new(ErrorCode::ParseError, format!("Invalid JSON: {e}")),
        )
    })?;

    let Value::Object(mut envelope) = value else {
        return Err(invalid_request(None, "Request must be a JSON object"));
    };

    let id = envelope.get("id").and_then(Value::as_u64);
    let Some(id) = id else {
        return Err(invalid_request(
            None,
            "Request is missing a non-negative integer 'id'",
        ));
    };

    let operation = match envelope.remove("operation") {
        Some(Value::String(op)) => op,
        _ => return Err(invalid_request(Some(id), "Request is missing 'operation'")),
    };

    let arguments = match envelope.remove("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(invalid_request(Some(id), "'arguments' must be an object")),
    };

    Ok(Request {
        id,
        operation,
        arguments,
    })
}

fn invalid_request(id: Option<u64>, message: &str) -> Response {
    Response::failure(id, ErrorObject::new(ErrorCode::InvalidRequest, message))
}

fn invalid_arguments(message: &str) -> ErrorObject {
    ErrorObject::new(ErrorCode::InvalidArguments, message)
}

/// An integer pin too large for `i64` can never be on the allow-list.
fn pin_out_of_range(text: &str) -> ErrorObject {
    ErrorObject::new(
        ErrorCode::InvalidPin,
        format!("Invalid pin number: {text}. Valid pins are 4, 5, 6, 12, 13 and 16-27 (BCM)"),
    )
}

fn is_integer_text(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// `pin` as an integer. Numeric strings are accepted.
fn pin_argument(arguments: &Map<String, Value>) -> Result<i64, ErrorObject> {
    match arguments.get("pin") {
        Some(Value::Number(n)) => {
            if let Some(pin) = n.as_i64() {
                Ok(pin)
            } else if n.is_u64() || n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0) {
                Err(pin_out_of_range(&n.to_string()))
            } else {
                Err(invalid_arguments("'pin' must be an integer"))
            }
        }
        Some(Value::String(s)) => {
            let text = s.trim();
            match text.parse() {
                Ok(pin) => Ok(pin),
                Err(_) if is_integer_text(text) => Err(pin_out_of_range(text)),
                Err(_) => Err(invalid_arguments("'pin' must be an integer")),
            }
        }
        Some(_) => Err(invalid_arguments("'pin' must be an integer")),
        None => Err(invalid_arguments("Missing required argument 'pin'")),
    }
}

/// `state` as a token. Numbers and booleans are taken as their text.
fn state_argument(arguments: &Map<String, Value>) -> Result<String, ErrorObject> {
    match arguments.get("state") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(_) => Err(invalid_arguments("'state' must be a string")),
        None => Err(invalid_arguments("Missing required argument 'state'")),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, ErrorObject> {
    serde_json::to_value(value).map_err(|e| {
        ErrorObject::new(
            ErrorCode::HardwareFault,
            format!("Failed to encode result: {e}"),
        )
    })
}
