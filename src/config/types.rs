//! Configuration types.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gpio::DEFAULT_SYSFS_ROOT;

/// Framing used between supervisor and worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// JSON lines over the worker's stdin/stdout.
    #[default]
    Stdio,
    /// JSON envelopes over HTTP on a loopback port.
    Http,
}

impl TransportKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hardware backend used by the worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Simulated,
    #[default]
    Sysfs,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simulated => "simulated",
            Self::Sysfs => "sysfs",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for the worker process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerSettings {
    pub backend: BackendKind,
    /// Root of the sysfs GPIO class directory.
    pub sysfs_root: PathBuf,
    /// First port to probe for the HTTP transport; 0 lets the OS choose.
    pub port_range_start: u16,
    /// Number of consecutive ports to probe.
    pub port_attempts: u16,
    /// Worker log file. Without one the worker does not log.
    pub log_file: Option<PathBuf>,
    /// HTTP worker: shut down when stdin reaches EOF, i.e. the parent is gone.
    pub exit_on_stdin_eof: bool,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            port_range_start: 0,
            port_attempts: 10,
            log_file: None,
            exit_on_stdin_eof: false,
        }
    }
}

/// Settings for the supervisor client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientSettings {
    pub transport: TransportKind,
    /// Worker executable. Defaults to the running binary.
    pub worker_program: Option<PathBuf>,
    pub startup_timeout_ms: u64,
    pub call_timeout_ms: u64,
    pub stop_grace_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            worker_program: None,
            startup_timeout_ms: 10_000,
            call_timeout_ms: 10_000,
            stop_grace_ms: 5_000,
        }
    }
}

impl ClientSettings {
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub worker: WorkerSettings,
    pub client: ClientSettings,
}
