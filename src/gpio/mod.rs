//! GPIO pin control.
//!
//! [`PinController`] validates pins and state tokens and tracks claimed
//! pins. Hardware access goes through the [`GpioBackend`] trait, with a
//! simulated backend for development and a Linux sysfs backend for boards.

mod backend;
mod controller;
mod error;
mod pins;
mod sysfs;

pub use backend::*;
pub use controller::*;
pub use error::*;
pub use pins::*;
pub use sysfs::*;

use crate::config::{BackendKind, WorkerSettings};

/// Build the backend selected in the worker settings.
#[must_use]
pub fn backend_from_settings(settings: &WorkerSettings) -> Box<dyn GpioBackend> {
    match settings.backend {
        BackendKind::Simulated => Box::new(SimulatedBackend::new()),
        BackendKind::Sysfs => Box::new(SysfsBackend::new(&settings.sysfs_root)),
    }
}
