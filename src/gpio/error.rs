//! GPIO error types.

use super::PinNumber;

/// Errors returned by [`super::PinController`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GpioError {
    /// Pin is not in the allow-list.
    #[error("Invalid pin number: {0}. Valid pins are 4, 5, 6, 12, 13 and 16-27 (BCM)")]
    InvalidPin(i64),

    /// State token is not a recognised alias.
    #[error("Invalid state: {0:?}. Use 'high', 'low', 'on', 'off', '1', '0', 'true' or 'false'")]
    InvalidState(String),

    /// The hardware layer rejected the operation.
    #[error("Hardware fault on pin {pin}: {message}")]
    HardwareFault { pin: PinNumber, message: String },

    /// No GPIO hardware was found when the controller was built.
    #[error("GPIO hardware not available")]
    Unavailable,
}

impl GpioError {
    pub(crate) fn hardware(pin: PinNumber, err: &std::io::Error) -> Self {
        Self::HardwareFault {
            pin,
            message: err.to_string(),
        }
    }
}
