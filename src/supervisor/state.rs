//! Client lifecycle state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`SupervisorClient`](super::SupervisorClient).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientState {
    #[default]
    NotStarted,
    Starting,
    Ready,
    /// A call is outstanding. Carries the number in flight.
    InFlight(usize),
    Stopping,
    Stopped,
    Failed,
}

impl ClientState {
    /// Whether `start` is allowed.
    #[must_use]
    pub fn can_start(self) -> bool {
        matches!(self, Self::NotStarted | Self::Stopped)
    }

}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not started"),
            Self::Starting => f.write_str("starting"),
            Self::Ready => f.write_str("ready"),
            Self::InFlight(n) => write!(f, "in flight ({n})"),
            Self::Stopping => f.write_str("stopping"),
            Self::Stopped => f.write_str("stopped"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// State machine for tracking the client lifecycle.
#[derive(Debug, Clone)]
pub struct ClientStateMachine {
    state: ClientState,
    starts: usize,
    calls: usize,
    failures: usize,
    timeouts: usize,
}

impl Default for ClientStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ClientState::NotStarted,
            starts: 0,
            calls: 0,
            failures: 0,
            timeouts: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn transition(&mut self, new_state: ClientState) {
        tracing::debug!(from = %self.state, to = %new_state, "Client state transition");
        match new_state {
            ClientState::Starting => self.starts = self.starts.saturating_add(1),
            ClientState::Failed => self.failures = self.failures.saturating_add(1),
            _ => {}
        }
        self.state = new_state;
    }

    pub fn record_call(&mut self) {
        self.calls = self.calls.saturating_add(1);
    }

    pub fn record_timeout(&mut self) {
        self.timeouts = self.timeouts.saturating_add(1);
    }

    #[must_use]
    pub fn stats(&self) -> ClientStats {
        ClientStats {
            starts: self.starts,
            calls: self.calls,
            failures: self.failures,
            timeouts: self.timeouts,
        }
    }
}

/// Client statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStats {
    pub starts: usize,
    pub calls: usize,
    pub failures: usize,
    pub timeouts: usize,
}
