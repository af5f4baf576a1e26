//! Pin registry and set/read operations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{is_valid_pin, GpioBackend, GpioError, Level, PinMode, PinNumber, VALID_PINS};

/// Tracked state of a claimed pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinState {
    pub mode: PinMode,
    /// Last level written or read; `None` until the first successful I/O.
    pub level: Option<Level>,
}

/// Result of a set or read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinReading {
    pub pin: PinNumber,
    pub level: Level,
}

/// One claimed pin in a status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinSnapshot {
    pub pin: PinNumber,
    pub mode: PinMode,
    pub level: Option<Level>,
}

/// Snapshot of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinStatus {
    /// Claimed pins, ascending.
    pub claimed_pins: Vec<PinNumber>,
    pub count: usize,
    pub hardware_available: bool,
    pub backend: String,
    pub pins: Vec<PinSnapshot>,
}

/// Owns the hardware backend and the registry of claimed pins.
///
/// Every operation leaves the registry either fully updated or untouched
/// for the pin involved. Claimed pins are released on [`release`] or, if
/// that never ran, on drop.
///
/// [`release`]: PinController::release
pub struct PinController {
    backend: Box<dyn GpioBackend>,
    registry: BTreeMap<PinNumber, PinState>,
    hardware_available: bool,
}

impl std::fmt::Debug for PinController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinController")
            .field("backend", &self.backend.name())
            .field("registry", &self.registry)
            .field("hardware_available", &self.hardware_available)
            .finish()
    }
}

impl PinController {
    /// Build a controller, probing the backend for hardware once.
    #[must_use]
    pub fn new(backend: Box<dyn GpioBackend>) -> Self {
        let hardware_available = backend.is_available();
        if hardware_available {
            tracing::info!(backend = backend.name(), "GPIO controller initialized");
        } else {
            tracing::warn!(
                backend = backend.name(),
                "GPIO hardware not available; pin operations will fail"
            );
        }
        Self {
            backend,
            registry: BTreeMap::new(),
            hardware_available,
        }
    }

    #[must_use]
    pub fn hardware_available(&self) -> bool {
        self.hardware_available
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// State of a pin, if claimed.
    #[must_use]
    pub fn pin_state(&self, pin: PinNumber) -> Option<PinState> {
        self.registry.get(&pin).copied()
    }

    /// The static allow-list.
    #[must_use]
    pub fn list_valid_pins() -> Vec<PinNumber> {
        VALID_PINS.to_vec()
    }

    /// Drive `pin` to the level named by `state`, claiming it as output first.
    ///
    /// # Errors
    ///
    /// `InvalidPin`, `InvalidState`, `Unavailable` or `HardwareFault`.
    pub fn set_pin(&mut self, pin: i64, state: &str) -> Result<PinReading, GpioError> {
        let pin = validate_pin(pin)?;
        let level =
            Level::parse_token(state).ok_or_else(|| GpioError::InvalidState(state.to_string()))?;
        self.ensure_available()?;

        let previous = self.registry.get(&pin).copied();
        let needs_claim = previous.map(|p| p.mode) != Some(PinMode::Output);

        if needs_claim {
            if let Err(e) = self.backend.claim(pin, PinMode::Output) {
                self.restore(pin, previous);
                tracing::error!(pin, error = %e, "Failed to claim pin as output");
                return Err(GpioError::hardware(pin, &e));
            }
            tracing::info!(pin, "Pin claimed as output");
        }

        if let Err(e) = self.backend.write(pin, level) {
            if needs_claim {
                self.restore(pin, previous);
            }
            tracing::error!(pin, error = %e, "Failed to set pin");
            return Err(GpioError::hardware(pin, &e));
        }

        self.registry.insert(
            pin,
            PinState {
                mode: PinMode::Output,
                level: Some(level),
            },
        );
        tracing::info!(pin, level = %level, "Pin set");
        Ok(PinReading { pin, level })
    }

    /// Sense the level of `pin`, claiming it as input if unclaimed.
    ///
    /// An output pin is read back without changing its direction.
    ///
    /// # Errors
    ///
    /// `InvalidPin`, `Unavailable` or `HardwareFault`.
    pub fn read_pin(&mut self, pin: i64) -> Result<PinReading, GpioError> {
        let pin = validate_pin(pin)?;
        self.ensure_available()?;

        let previous = self.registry.get(&pin).copied();
        if previous.is_none() {
            if let Err(e) = self.backend.claim(pin, PinMode::Input) {
                self.restore(pin, None);
                tracing::error!(pin, error = %e, "Failed to claim pin as input");
                return Err(GpioError::hardware(pin, &e));
            }
            tracing::info!(pin, "Pin claimed as input");
        }

        let level = match self.backend.read(pin) {
            Ok(level) => level,
            Err(e) => {
                if previous.is_none() {
                    self.restore(pin, None);
                }
                tracing::error!(pin, error = %e, "Failed to read pin");
                return Err(GpioError::hardware(pin, &e));
            }
        };

        let mode = previous.map_or(PinMode::Input, |p| p.mode);
        self.registry.insert(
            pin,
            PinState {
                mode,
                level: Some(level),
            },
        );
        tracing::debug!(pin, level = %level, "Pin read");
        Ok(PinReading { pin, level })
    }

    /// Report claimed pins. No side effects.
    #[must_use]
    pub fn get_status(&self) -> PinStatus {
        let pins: Vec<PinSnapshot> = self
            .registry
            .iter()
            .map(|(pin, state)| PinSnapshot {
                pin: *pin,
                mode: state.mode,
                level: state.level,
            })
            .collect();
        PinStatus {
            claimed_pins: pins.iter().map(|p| p.pin).collect(),
            count: pins.len(),
            hardware_available: self.hardware_available,
            backend: self.backend.name().to_string(),
            pins,
        }
    }

    /// Release every claimed pin and empty the registry.
    ///
    /// Safe to call repeatedly; a call with nothing claimed does nothing.
    pub fn release(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        let count = self.registry.len();
        for pin in std::mem::take(&mut self.registry).into_keys() {
            if let Err(e) = self.backend.release(pin) {
                tracing::warn!(pin, error = %e, "Failed to release pin");
            }
        }
        tracing::info!(count, "GPIO cleanup completed");
    }

    fn ensure_available(&self) -> Result<(), GpioError> {
        if self.hardware_available {
            Ok(())
        } else {
            Err(GpioError::Unavailable)
        }
    }

    /// Put the backend back the way the registry describes `pin`.
    fn restore(&mut self, pin: PinNumber, previous: Option<PinState>) {
        let result = match previous {
            Some(state) => self.backend.claim(pin, state.mode),
            None => self.backend.release(pin),
        };
        if let Err(e) = result {
            tracing::warn!(pin, error = %e, "Failed to restore pin after error");
        }
    }
}

impl Drop for PinController {
    fn drop(&mut self) {
        self.release();
    }
}

fn validate_pin(pin: i64) -> Result<PinNumber, GpioError> {
    if !is_valid_pin(pin) {
        return Err(GpioError::InvalidPin(pin));
    }
    PinNumber::try_from(pin).map_err(|_| GpioError::InvalidPin(pin))
}
