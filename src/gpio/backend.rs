//! Hardware access seam and the in-memory simulated backend.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use super::{Level, PinMode, PinNumber};

/// Low-level pin access used by [`super::PinController`].
///
/// Implementations do no validation of their own; the controller only
/// calls them with allow-listed pins.
pub trait GpioBackend: Send {
    /// Short name for logs and status output.
    fn name(&self) -> &'static str;

    /// Whether the hardware is present. Read once by the controller.
    fn is_available(&self) -> bool;

    /// Configure the pin direction.
    fn claim(&mut self, pin: PinNumber, mode: PinMode) -> io::Result<()>;

    /// Drive an output pin.
    fn write(&mut self, pin: PinNumber, level: Level) -> io::Result<()>;

    /// Sense the pin level. For output pins this is the driven level.
    fn read(&mut self, pin: PinNumber) -> io::Result<Level>;

    /// Return the pin to its unclaimed state.
    fn release(&mut self, pin: PinNumber) -> io::Result<()>;
}

#[derive(Debug, Default)]
struct SimulatedState {
    available: bool,
    claimed: HashMap<PinNumber, PinMode>,
    driven: HashMap<PinNumber, Level>,
    inputs: HashMap<PinNumber, Level>,
    faults: HashSet<PinNumber>,
    release_count: usize,
}

/// In-memory backend for development machines and tests.
///
/// Clones share state, so a test can keep a handle after moving the
/// backend into a controller.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    state: Arc<Mutex<SimulatedState>>,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimulatedState {
                available: true,
                ..SimulatedState::default()
            })),
        }
    }

    /// A backend that reports no hardware.
    #[must_use]
    pub fn unavailable() -> Self {
        let backend = Self::new();
        backend.with_state(|s| s.available = false);
        backend
    }

    /// Set the externally driven level seen by an input pin.
    #[must_use]
    pub fn with_input_level(self, pin: PinNumber, level: Level) -> Self {
        self.set_input_level(pin, level);
        self
    }

    /// Make every operation on `pin` fail.
    #[must_use]
    pub fn with_fault(self, pin: PinNumber) -> Self {
        self.set_fault(pin);
        self
    }

    pub fn set_input_level(&self, pin: PinNumber, level: Level) {
        self.with_state(|s| s.inputs.insert(pin, level));
    }

    pub fn set_fault(&self, pin: PinNumber) {
        self.with_state(|s| s.faults.insert(pin));
    }

    pub fn clear_fault(&self, pin: PinNumber) {
        self.with_state(|s| s.faults.remove(&pin));
    }

    /// Pins currently configured, sorted.
    #[must_use]
    pub fn claimed_pins(&self) -> Vec<PinNumber> {
        let mut pins: Vec<_> = self.with_state(|s| s.claimed.keys().copied().collect());
        pins.sort_unstable();
        pins
    }

    #[must_use]
    pub fn mode_of(&self, pin: PinNumber) -> Option<PinMode> {
        self.with_state(|s| s.claimed.get(&pin).copied())
    }

    /// Number of successful `release` calls.
    #[must_use]
    pub fn release_count(&self) -> usize {
        self.with_state(|s| s.release_count)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SimulatedState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn check(state: &SimulatedState, pin: PinNumber) -> io::Result<()> {
        if state.faults.contains(&pin) {
            return Err(io::Error::other(format!("simulated fault on pin {pin}")));
        }
        Ok(())
    }
}

impl GpioBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn is_available(&self) -> bool {
        self.with_state(|s| s.available)
    }

    fn claim(&mut self, pin: PinNumber, mode: PinMode) -> io::Result<()> {
        self.with_state(|s| {
            Self::check(s, pin)?;
            s.claimed.insert(pin, mode);
            if mode == PinMode::Input {
                s.driven.remove(&pin);
            }
            Ok(())
        })
    }

    fn write(&mut self, pin: PinNumber, level: Level) -> io::Result<()> {
        self.with_state(|s| {
            Self::check(s, pin)?;
            match s.claimed.get(&pin) {
                Some(PinMode::Output) => {
                    s.driven.insert(pin, level);
                    Ok(())
                }
                _ => Err(io::Error::other(format!(
                    "pin {pin} is not configured as output"
                ))),
            }
        })
    }

    fn read(&mut self, pin: PinNumber) -> io::Result<Level> {
        self.with_state(|s| {
            Self::check(s, pin)?;
            match s.claimed.get(&pin) {
                Some(PinMode::Output) => Ok(s.driven.get(&pin).copied().unwrap_or(Level::Low)),
                Some(PinMode::Input) => Ok(s.inputs.get(&pin).copied().unwrap_or(Level::Low)),
                None => Err(io::Error::other(format!("pin {pin} is not configured"))),
            }
        })
    }

    fn release(&mut self, pin: PinNumber) -> io::Result<()> {
        self.with_state(|s| {
            s.claimed.remove(&pin);
            s.driven.remove(&pin);
            s.release_count += 1;
            Ok(())
        })
    }
}
