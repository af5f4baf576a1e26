//! Supervisor client tests.

mod client_test;
mod scripted_test;

use std::time::Duration;

use gpio_bridge::config::{BackendKind, TransportKind, WorkerSettings};
use gpio_bridge::supervisor::{ClientConfig, WorkerCommand};

/// Client config launching the real binary with the simulated backend.
pub fn simulated_config(transport: TransportKind) -> ClientConfig {
    let settings = WorkerSettings {
        backend: BackendKind::Simulated,
        ..WorkerSettings::default()
    };
    ClientConfig::new(WorkerCommand::worker(crate::BIN, transport, &settings), transport)
        .with_stop_grace(Duration::from_secs(2))
}

/// Client config launching `sh -c <script>` over the line transport.
pub fn script_config(script: &str) -> ClientConfig {
    ClientConfig::new(
        WorkerCommand::new("sh").arg("-c").arg(script),
        TransportKind::Stdio,
    )
    .with_startup_timeout(Duration::from_secs(5))
    .with_stop_grace(Duration::from_millis(500))
}

/// Verify all public supervisor types are exported from the library.
#[test]
fn test_all_supervisor_types_exported() {
    use gpio_bridge::supervisor::{
        ClientError, ClientState, ClientStateMachine, HttpTransport, SupervisorClient,
        DEFAULT_CALL_TIMEOUT,
    };

    let client = SupervisorClient::new(simulated_config(TransportKind::Stdio));
    assert_eq!(client.state(), ClientState::NotStarted);
    assert_eq!(client.config().call_timeout, DEFAULT_CALL_TIMEOUT);
    assert_eq!(ClientStateMachine::new().stats().calls, 0);
    assert!(HttpTransport::new(8080).is_ok());
    let _ = ClientError::NotStarted;
}
