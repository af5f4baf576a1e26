//! SupervisorClient against scripted `sh` workers.

#![cfg(unix)]

use std::time::{Duration, Instant};

use gpio_bridge::supervisor::{ClientError, ClientState, SupervisorClient};
use serde_json::json;

use super::script_config;

/// Answers each request line with `{"echo": <id>}`. Request 1 is answered
/// after a one second delay.
const DELAYED_ECHO: &str = r#"
echo WORKER_READY >&2
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed 's/.*"id":\([0-9]*\).*/\1/')
  if [ "$id" = "1" ]; then sleep 1; fi
  printf '{"id":%s,"result":{"echo":%s}}\n' "$id" "$id"
done
"#;

#[tokio::test]
async fn test_immediate_exit_is_startup_failure() {
    let config = script_config("exit 0");
    let timeout = config.startup_timeout;
    let mut client = SupervisorClient::new(config);

    let started = Instant::now();
    let err = client.start().await.unwrap_err();
    assert!(matches!(err, ClientError::StartupFailure { .. }), "{err:?}");
    assert!(started.elapsed() < timeout);
    assert_eq!(client.state(), ClientState::Failed);
}

#[tokio::test]
async fn test_startup_failure_carries_diagnostics() {
    let mut client = SupervisorClient::new(script_config(
        "echo 'gpio: permission denied' >&2; exit 3",
    ));
    let err = client.start().await.unwrap_err();
    let ClientError::StartupFailure { diagnostics, .. } = err else {
        panic!("expected StartupFailure, got {err:?}");
    };
    assert_eq!(diagnostics, vec!["gpio: permission denied"]);
}

#[tokio::test]
async fn test_service_error_marker_fails_fast() {
    let mut client = SupervisorClient::new(script_config(
        "echo 'SERVICE_ERROR:no free port' >&2; sleep 30",
    ));
    let started = Instant::now();
    let err = client.start().await.unwrap_err();
    assert!(
        matches!(err, ClientError::StartupFailure { ref message, .. } if message == "no free port"),
        "{err:?}"
    );
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_embedded_marker_text_is_not_readiness() {
    let mut client = SupervisorClient::new(
        script_config("echo 'waiting for WORKER_READY' >&2; sleep 30")
            .with_startup_timeout(Duration::from_millis(300)),
    );
    let err = client.start().await.unwrap_err();
    assert_eq!(err, ClientError::StartupTimeout { timeout_ms: 300 });
    assert_eq!(client.state(), ClientState::Failed);

    client.stop().await;
    assert_eq!(client.state(), ClientState::Stopped);
}

#[tokio::test]
async fn test_delayed_responses_never_cross_deliver() {
    let mut client = SupervisorClient::new(
        script_config(DELAYED_ECHO).with_call_timeout(Duration::from_millis(700)),
    );
    client.start().await.unwrap();

    let err = client.call("getStatus", json!({})).await.unwrap_err();
    assert_eq!(
        err,
        ClientError::ResponseTimeout {
            id: 1,
            timeout_ms: 700
        }
    );
    assert_eq!(client.state(), ClientState::Ready);

    // The late answer to request 1 arrives first and is discarded.
    let result = client.call("getStatus", json!({})).await.unwrap();
    assert_eq!(result, json!({"echo": 2}));

    let result = client.call("getStatus", json!({})).await.unwrap();
    assert_eq!(result, json!({"echo": 3}));
    assert_eq!(client.stats().timeouts, 1);

    client.stop().await;
}

#[tokio::test]
async fn test_worker_death_is_transport_lost() {
    let mut client = SupervisorClient::new(script_config(
        "echo WORKER_READY >&2; read line; exit 0",
    ));
    client.start().await.unwrap();

    let err = client.call("getStatus", json!({})).await.unwrap_err();
    assert!(matches!(err, ClientError::TransportLost(_)), "{err:?}");
    assert_eq!(client.state(), ClientState::Failed);

    let err = client.call("getStatus", json!({})).await.unwrap_err();
    assert!(matches!(err, ClientError::TransportLost(_)));

    client.stop().await;
    assert!(client.state().can_start());
}

#[tokio::test]
async fn test_stop_kills_worker_that_ignores_eof() {
    let mut client = SupervisorClient::new(script_config(
        "trap '' TERM; echo WORKER_READY >&2; while true; do sleep 1; done",
    ));
    client.start().await.unwrap();

    let started = Instant::now();
    client.stop().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(client.state(), ClientState::Stopped);
    assert!(client.worker_id().is_none());
}
