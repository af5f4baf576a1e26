//! Request and response envelopes.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::gpio::GpioError;

/// Version reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Operations a worker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Initialize,
    ListTools,
    SetPin,
    ReadPin,
    GetStatus,
    ListValidPins,
}

impl Operation {
    pub const ALL: [Self; 6] = [
        Self::Initialize,
        Self::ListTools,
        Self::SetPin,
        Self::ReadPin,
        Self::GetStatus,
        Self::ListValidPins,
    ];

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::ListTools => "listTools",
            Self::SetPin => "setPin",
            Self::ReadPin => "readPin",
            Self::GetStatus => "getStatus",
            Self::ListValidPins => "listValidPins",
        }
    }

    /// Look up an operation by wire name. Exact match.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: u64,
    pub operation: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl Request {
    /// Build a request. Non-object `arguments` are treated as empty.
    #[must_use]
    pub fn new(id: u64, operation: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id,
            operation: operation.into(),
            arguments,
        }
    }
}

/// Error codes carried in failure responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The envelope was not valid JSON.
    ParseError,
    /// The envelope was JSON but not a valid request.
    InvalidRequest,
    UnknownOperation,
    /// Arguments missing or of the wrong type.
    InvalidArguments,
    InvalidPin,
    InvalidState,
    HardwareFault,
    /// The worker has no GPIO hardware.
    HardwareUnavailable,
}

impl ErrorCode {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::UnknownOperation => -32601,
            Self::InvalidArguments => -32602,
            Self::InvalidPin => -32001,
            Self::InvalidState => -32002,
            Self::HardwareFault => -32003,
            Self::HardwareUnavailable => -32004,
        }
    }

    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        [
            Self::ParseError,
            Self::InvalidRequest,
            Self::UnknownOperation,
            Self::InvalidArguments,
            Self::InvalidPin,
            Self::InvalidState,
            Self::HardwareFault,
            Self::HardwareUnavailable,
        ]
        .into_iter()
        .find(|c| c.code() == code)
    }

    /// Whether the failure is a malformed envelope or arguments.
    #[must_use]
    pub fn is_protocol_error(self) -> bool {
        matches!(
            self,
            Self::ParseError | Self::InvalidRequest | Self::InvalidArguments
        )
    }
}

/// Failure payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
}

impl ErrorObject {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
        }
    }

    /// The known code, if any.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl From<GpioError> for ErrorObject {
    fn from(err: GpioError) -> Self {
        let code = match err {
            GpioError::InvalidPin(_) => ErrorCode::InvalidPin,
            GpioError::InvalidState(_) => ErrorCode::InvalidState,
            GpioError::HardwareFault { .. } => ErrorCode::HardwareFault,
            GpioError::Unavailable => ErrorCode::HardwareUnavailable,
        };
        Self::new(code, err.to_string())
    }
}

/// A response envelope: exactly one of `result` or `error` is set.
///
/// `id` is `null` when the request id could not be recovered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    #[must_use]
    pub fn success(id: Option<u64>, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(id: Option<u64>, error: ErrorObject) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.result.is_some()
    }

    /// Split into the payload or the error.
    ///
    /// # Errors
    ///
    /// Returns the carried error, or an `InvalidRequest` error if the
    /// envelope carried neither.
    pub fn into_result(self) -> Result<Value, ErrorObject> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Err(ErrorObject::new(
                ErrorCode::InvalidRequest,
                "Response carried neither result nor error",
            )),
        }
    }
}
