//! Supervisor client error types.

use crate::protocol::{ErrorCode, ErrorObject};

/// Errors returned by [`SupervisorClient`](super::SupervisorClient).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The worker rejected the pin number.
    #[error("Invalid pin: {0}")]
    InvalidPin(String),

    /// The worker rejected the state token.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The worker does not know the operation.
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Malformed envelope or arguments, on either side.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The GPIO backend failed, or no hardware is present.
    #[error("Hardware fault: {0}")]
    HardwareFault(String),

    /// The worker exited or reported an error before becoming ready.
    #[error("Worker failed to start: {message}")]
    StartupFailure {
        message: String,
        /// Diagnostic stderr lines captured before the failure.
        diagnostics: Vec<String>,
    },

    /// No readiness marker within the startup timeout.
    #[error("Worker not ready after {timeout_ms}ms")]
    StartupTimeout { timeout_ms: u64 },

    /// No matching response within the call timeout.
    #[error("No response to request {id} after {timeout_ms}ms")]
    ResponseTimeout { id: u64, timeout_ms: u64 },

    /// The connection to the worker is gone.
    #[error("Transport lost: {0}")]
    TransportLost(String),

    /// The client has not been started.
    #[error("Client not started")]
    NotStarted,

    /// The operation is not valid in the current state.
    #[error("Cannot {operation} while {state}")]
    WrongState {
        operation: &'static str,
        state: String,
    },
}

impl ClientError {
    /// Whether the error leaves the client unusable until restarted.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StartupFailure { .. } | Self::StartupTimeout { .. } | Self::TransportLost(_)
        )
    }
}

impl From<ErrorObject> for ClientError {
    fn from(error: ErrorObject) -> Self {
        let message = error.message;
        match ErrorCode::from_code(error.code) {
            Some(ErrorCode::InvalidPin) => Self::InvalidPin(message),
            Some(ErrorCode::InvalidState) => Self::InvalidState(message),
            Some(ErrorCode::UnknownOperation) => Self::UnknownOperation(message),
            Some(ErrorCode::HardwareFault | ErrorCode::HardwareUnavailable) => {
                Self::HardwareFault(message)
            }
            Some(
                ErrorCode::ParseError | ErrorCode::InvalidRequest | ErrorCode::InvalidArguments,
            ) => Self::Protocol(message),
            None => Self::Protocol(format!("{message} (code {})", error.code)),
        }
    }
}

/// Convert a millisecond duration for error messages.
pub(crate) fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
