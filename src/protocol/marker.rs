//! Side-channel marker lines.
//!
//! The worker's stderr carries nothing but these lines. A marker is only
//! recognised as a whole line; text that merely contains a sentinel is
//! treated as diagnostic output.

use std::fmt;

/// Readiness sentinel for the line transport.
pub const READY_MARKER: &str = "WORKER_READY";

/// Prefix announcing the HTTP transport's bound port.
pub const PORT_PREFIX: &str = "SERVICE_PORT:";

/// Prefix announcing a startup failure.
pub const ERROR_PREFIX: &str = "SERVICE_ERROR:";

/// A parsed side-channel line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Ready,
    Port(u16),
    Error(String),
}

impl Marker {
    /// Parse a side-channel line. Trailing `\r`/`\n` is ignored.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line == READY_MARKER {
            return Some(Self::Ready);
        }
        if let Some(port) = line.strip_prefix(PORT_PREFIX) {
            return port.trim().parse().ok().filter(|p| *p != 0).map(Self::Port);
        }
        line.strip_prefix(ERROR_PREFIX)
            .map(|message| Self::Error(message.trim().to_string()))
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str(READY_MARKER),
            Self::Port(port) => write!(f, "{PORT_PREFIX}{port}"),
            // Keep the marker on one line.
            Self::Error(message) => write!(f, "{ERROR_PREFIX}{}", message.replace('\n', " ")),
        }
    }
}
