//! The supervisor client.
//!
//! [`SupervisorClient`] spawns a worker, waits for its readiness marker,
//! and issues requests over the configured transport. It owns the worker
//! process and every background task it starts; [`SupervisorClient::stop`]
//! releases all of them.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::time::Instant;

use super::error::millis;
use super::{
    ClientError, ClientState, ClientStateMachine, ClientStats, HttpTransport, SideChannelReader,
    SideEvent, StdioTransport, Transport, WorkerCommand, WorkerProcess,
};
use crate::config::{BridgeConfig, ConfigError, TransportKind};
use crate::protocol::{
    InitializeResult, Marker, Operation, PinResult, PinStatus, ToolList, ValidPins,
};

/// Default time to wait for the readiness marker.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time to wait for a response.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time a stopping worker gets before it is killed.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Exit-status polling interval while starting.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to keep collecting stderr after the worker died during startup.
const DIAGNOSTIC_DRAIN: Duration = Duration::from_millis(200);

/// How to launch and talk to a worker.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub command: WorkerCommand,
    pub transport: TransportKind,
    pub startup_timeout: Duration,
    pub call_timeout: Duration,
    pub stop_grace: Duration,
}

impl ClientConfig {
    #[must_use]
    pub fn new(command: WorkerCommand, transport: TransportKind) -> Self {
        Self {
            command,
            transport,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    /// Build from a loaded configuration. Without `worker_program` the
    /// running executable is launched as the worker.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::WorkerProgram` if the running executable
    /// cannot be located.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, ConfigError> {
        let program = match &config.client.worker_program {
            Some(program) => program.clone(),
            None => std::env::current_exe().map_err(ConfigError::WorkerProgram)?,
        };
        let transport = config.client.transport;
        let command = WorkerCommand::worker(program, transport, &config.worker);

        Ok(Self::new(command, transport)
            .with_startup_timeout(config.client.startup_timeout())
            .with_call_timeout(config.client.call_timeout())
            .with_stop_grace(config.client.stop_grace()))
    }

    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }
}

/// Client for one worker process.
///
/// `call` takes `&mut self`, so at most one request is outstanding.
pub struct SupervisorClient {
    config: ClientConfig,
    machine: ClientStateMachine,
    process: Option<WorkerProcess>,
    side: Option<SideChannelReader>,
    transport: Option<Box<dyn Transport>>,
    next_id: u64,
}

impl std::fmt::Debug for SupervisorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorClient")
            .field("transport", &self.config.transport)
            .field("state", &self.machine.state())
            .field("pid", &self.worker_id())
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl SupervisorClient {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            machine: ClientStateMachine::new(),
            process: None,
            side: None,
            transport: None,
            next_id: 0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        self.machine.state()
    }

    #[must_use]
    pub fn stats(&self) -> ClientStats {
        self.machine.stats()
    }

    /// Worker process id while it runs.
    #[must_use]
    pub fn worker_id(&self) -> Option<u32> {
        self.process.as_ref().and_then(WorkerProcess::id)
    }

    /// Non-marker stderr lines captured from the worker.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<String> {
        self.side
            .as_ref()
            .map(SideChannelReader::diagnostics)
            .unwrap_or_default()
    }

    /// Spawn the worker and wait for it to become ready.
    ///
    /// Valid from `NotStarted` and `Stopped`.
    ///
    /// # Errors
    ///
    /// - `StartupFailure` if the worker cannot be spawned, exits, closes
    ///   stderr or reports `SERVICE_ERROR` before it is ready.
    /// - `StartupTimeout` if no marker arrives in time. The worker is killed.
    /// - `WrongState` if called in any other state.
    pub async fn start(&mut self) -> Result<(), ClientError> {
        let state = self.machine.state();
        if !state.can_start() {
            return Err(ClientError::WrongState {
                operation: "start",
                state: state.to_string(),
            });
        }

        self.machine.transition(ClientState::Starting);
        let deadline = Instant::now() + self.config.startup_timeout;
        tracing::info!(
            program = %self.config.command.program().display(),
            transport = %self.config.transport,
            "Starting worker"
        );

        let mut process = match WorkerProcess::spawn(&self.config.command, self.config.transport) {
            Ok(process) => process,
            Err(e) => {
                self.machine.transition(ClientState::Failed);
                return Err(ClientError::StartupFailure {
                    message: e.to_string(),
                    diagnostics: Vec::new(),
                });
            }
        };

        let Some(stderr) = process.take_stderr() else {
            return self.abort_start(process, "worker stderr unavailable").await;
        };
        let mut side = SideChannelReader::spawn(stderr);

        match self.connect(&mut process, &mut side, deadline).await {
            Ok(transport) => {
                tracing::info!(pid = process.id(), "Worker ready");
                self.process = Some(process);
                self.side = Some(side);
                self.transport = Some(transport);
                self.machine.transition(ClientState::Ready);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Worker failed to start");
                let _ = process.kill().await;
                self.side = Some(side);
                self.machine.transition(ClientState::Failed);
                Err(e)
            }
        }
    }

    async fn abort_start(
        &mut self,
        mut process: WorkerProcess,
        message: &str,
    ) -> Result<(), ClientError> {
        let _ = process.kill().await;
        self.machine.transition(ClientState::Failed);
        Err(ClientError::StartupFailure {
            message: message.to_string(),
            diagnostics: Vec::new(),
        })
    }

    /// Wait for the marker and build the transport.
    async fn connect(
        &self,
        process: &mut WorkerProcess,
        side: &mut SideChannelReader,
        deadline: Instant,
    ) -> Result<Box<dyn Transport>, ClientError> {
        let port = self.wait_for_marker(process, side, deadline).await?;

        match (self.config.transport, port) {
            (TransportKind::Stdio, _) => {
                let (Some(stdin), Some(stdout)) = (process.take_stdin(), process.take_stdout())
                else {
                    return Err(startup_failure("worker pipes unavailable", side));
                };
                Ok(Box::new(StdioTransport::new(stdin, stdout)))
            }
            (TransportKind::Http, Some(port)) => {
                let transport = HttpTransport::new(port)?;
                let remaining = deadline.saturating_duration_since(Instant::now());
                match transport.health(remaining).await {
                    Ok(health) => {
                        tracing::debug!(port, hardware_available = health.hardware_available, "Worker healthy");
                        Ok(Box::new(transport))
                    }
                    Err(ClientError::ResponseTimeout { .. }) => Err(ClientError::StartupTimeout {
                        timeout_ms: millis(self.config.startup_timeout),
                    }),
                    Err(e) => Err(startup_failure(&format!("health check failed: {e}"), side)),
                }
            }
            (TransportKind::Http, None) => Err(startup_failure("worker announced no port", side)),
        }
    }

    /// Returns the announced port for the HTTP transport.
    async fn wait_for_marker(
        &self,
        process: &mut WorkerProcess,
        side: &mut SideChannelReader,
        deadline: Instant,
    ) -> Result<Option<u16>, ClientError> {
        let transport = self.config.transport;
        let mut poll = tokio::time::interval(EXIT_POLL_INTERVAL);

        loop {
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => {
                    return Err(ClientError::StartupTimeout {
                        timeout_ms: millis(self.config.startup_timeout),
                    });
                }
                event = side.next_event() => match event {
                    Some(SideEvent::Marker(Marker::Ready)) if transport == TransportKind::Stdio => {
                        return Ok(None);
                    }
                    Some(SideEvent::Marker(Marker::Port(port))) if transport == TransportKind::Http => {
                        return Ok(Some(port));
                    }
                    Some(SideEvent::Marker(Marker::Error(message))) => {
                        return Err(startup_failure(&message, side));
                    }
                    Some(SideEvent::Marker(other)) => {
                        tracing::warn!(marker = %other, %transport, "Ignoring marker for another transport");
                    }
                    Some(SideEvent::Closed) | None => {
                        let status = process.wait_timeout(DIAGNOSTIC_DRAIN).await.ok().flatten();
                        let message = match status {
                            Some(status) => format!("worker exited with {status} before becoming ready"),
                            None => "worker closed stderr before becoming ready".to_string(),
                        };
                        return Err(startup_failure(&message, side));
                    }
                },
                _ = poll.tick() => {
                    match process.try_wait() {
                        Ok(Some(status)) => {
                            drain_until_closed(side, DIAGNOSTIC_DRAIN.min(
                                deadline.saturating_duration_since(Instant::now()),
                            ))
                            .await;
                            return Err(startup_failure(
                                &format!("worker exited with {status} before becoming ready"),
                                side,
                            ));
                        }
                        Ok(None) => {}
                        Err(e) => {
                            return Err(startup_failure(&format!("cannot query worker: {e}"), side));
                        }
                    }
                }
            }
        }
    }

    /// Send a request and wait for its response.
    ///
    /// # Errors
    ///
    /// - `NotStarted` before `start`.
    /// - `TransportLost` after `stop`, after a fatal error, or if the
    ///   connection breaks. The client moves to `Failed` in the last case.
    /// - `ResponseTimeout` if the worker does not answer in time. The
    ///   client stays usable.
    /// - The worker's error mapped to a `ClientError` variant.
    pub async fn call(&mut self, operation: &str, arguments: Value) -> Result<Value, ClientError> {
        match self.machine.state() {
            ClientState::Ready => {}
            ClientState::InFlight(n) => {
                tracing::debug!(abandoned = n, "Previous call was abandoned");
            }
            ClientState::NotStarted => return Err(ClientError::NotStarted),
            state @ (ClientState::Stopping | ClientState::Stopped | ClientState::Failed) => {
                return Err(ClientError::TransportLost(format!("client is {state}")));
            }
            state @ ClientState::Starting => {
                return Err(ClientError::WrongState {
                    operation: "call",
                    state: state.to_string(),
                });
            }
        }

        if let Some(process) = self.process.as_mut() {
            if let Ok(Some(status)) = process.try_wait() {
                self.machine.transition(ClientState::Failed);
                return Err(ClientError::TransportLost(format!("worker exited with {status}")));
            }
        }

        let Some(transport) = self.transport.as_mut() else {
            self.machine.transition(ClientState::Failed);
            return Err(ClientError::TransportLost("no connection to worker".to_string()));
        };

        self.next_id += 1;
        let request = crate::protocol::Request::new(self.next_id, operation, arguments);
        self.machine.transition(ClientState::InFlight(1));
        self.machine.record_call();
        tracing::debug!(id = request.id, operation, "Sending request");

        match transport.exchange(&request, self.config.call_timeout).await {
            Ok(response) => {
                self.machine.transition(ClientState::Ready);
                response.into_result().map_err(ClientError::from)
            }
            Err(e) if e.is_fatal() => {
                tracing::warn!(error = %e, "Lost connection to worker");
                self.machine.transition(ClientState::Failed);
                Err(e)
            }
            Err(e) => {
                if matches!(e, ClientError::ResponseTimeout { .. }) {
                    self.machine.record_timeout();
                }
                self.machine.transition(ClientState::Ready);
                Err(e)
            }
        }
    }

    async fn call_typed<T: DeserializeOwned>(
        &mut self,
        operation: Operation,
        arguments: Value,
    ) -> Result<T, ClientError> {
        let result = self.call(operation.as_str(), arguments).await?;
        serde_json::from_value(result).map_err(|e| {
            ClientError::Protocol(format!("Unexpected {operation} result: {e}"))
        })
    }

    /// Drive `pin` to `state` (`high`/`low`, `on`/`off`, `1`/`0`, `true`/`false`).
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn set_pin(&mut self, pin: i64, state: &str) -> Result<PinResult, ClientError> {
        self.call_typed(Operation::SetPin, json!({ "pin": pin, "state": state }))
            .await
    }

    /// Read the level of `pin`.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn read_pin(&mut self, pin: i64) -> Result<PinResult, ClientError> {
        self.call_typed(Operation::ReadPin, json!({ "pin": pin })).await
    }

    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn get_status(&mut self) -> Result<PinStatus, ClientError> {
        self.call_typed(Operation::GetStatus, json!({})).await
    }

    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn list_valid_pins(&mut self) -> Result<ValidPins, ClientError> {
        self.call_typed(Operation::ListValidPins, json!({})).await
    }

    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn list_tools(&mut self) -> Result<ToolList, ClientError> {
        self.call_typed(Operation::ListTools, json!({})).await
    }

    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn initialize(&mut self) -> Result<InitializeResult, ClientError> {
        self.call_typed(Operation::Initialize, json!({})).await
    }

    /// Shut the worker down and release every handle.
    ///
    /// The line transport closes the worker's stdin; the HTTP transport
    /// sends SIGTERM. A worker still running after the grace period is
    /// killed. Calling `stop` again is a no-op.
    pub async fn stop(&mut self) {
        if self.machine.state() == ClientState::Stopped {
            return;
        }
        self.machine.transition(ClientState::Stopping);

        let transport = self.transport.take();
        if let Some(mut process) = self.process.take() {
            let grace = self.config.stop_grace;
            match self.config.transport {
                TransportKind::Stdio => {
                    if let Some(mut transport) = transport {
                        transport.close().await;
                    }
                    match process.wait_timeout(grace).await {
                        Ok(Some(status)) => tracing::debug!(%status, "Worker exited"),
                        Ok(None) => {
                            tracing::warn!(grace_ms = millis(grace), "Worker did not exit; killing");
                            if let Err(e) = process.kill().await {
                                tracing::warn!(error = %e, "Failed to kill worker");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to wait for worker");
                            let _ = process.kill().await;
                        }
                    }
                }
                TransportKind::Http => {
                    drop(transport);
                    if let Err(e) = process.graceful_terminate(grace).await {
                        tracing::warn!(error = %e, "Failed to terminate worker");
                    }
                }
            }
        }

        // Dropping the reader aborts its task.
        self.side = None;
        self.machine.transition(ClientState::Stopped);
        tracing::info!("Worker stopped");
    }

    /// Start a client, run `f`, and stop the client on every exit path.
    ///
    /// # Errors
    ///
    /// Returns the startup error, or whatever `f` returns.
    pub async fn scoped<T, F>(config: ClientConfig, f: F) -> Result<T, ClientError>
    where
        F: for<'a> FnOnce(&'a mut SupervisorClient) -> BoxFuture<'a, Result<T, ClientError>>,
    {
        let mut client = Self::new(config);
        if let Err(e) = client.start().await {
            client.stop().await;
            return Err(e);
        }
        let result = f(&mut client).await;
        client.stop().await;
        result
    }
}

fn startup_failure(message: &str, side: &SideChannelReader) -> ClientError {
    ClientError::StartupFailure {
        message: message.to_string(),
        diagnostics: side.diagnostics(),
    }
}

/// Consume side events until EOF or `limit`, so late stderr lines are captured.
async fn drain_until_closed(side: &mut SideChannelReader, limit: Duration) {
    let _ = tokio::time::timeout(limit, async {
        while let Some(event) = side.next_event().await {
            if event == SideEvent::Closed {
                break;
            }
        }
    })
    .await;
}
