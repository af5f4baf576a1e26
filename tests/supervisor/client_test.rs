//! SupervisorClient against the real worker binary.

use std::time::Duration;

use futures_util::FutureExt;
use gpio_bridge::config::TransportKind;
use gpio_bridge::gpio::{Level, PinMode};
use gpio_bridge::supervisor::{ClientError, ClientState, SupervisorClient};
use serde_json::json;

use super::simulated_config;

async fn exercise(transport: TransportKind) {
    let mut client = SupervisorClient::new(simulated_config(transport));
    client.start().await.unwrap();
    assert_eq!(client.state(), ClientState::Ready);
    assert!(client.worker_id().is_some());

    let info = client.initialize().await.unwrap();
    assert_eq!(info.server_info.name, "gpio-bridge-worker");
    assert!(info.hardware_available);

    let set = client.set_pin(22, "high").await.unwrap();
    assert_eq!(set.level, Level::High);
    let read = client.read_pin(22).await.unwrap();
    assert_eq!(read.level, Level::High);

    let err = client.set_pin(3, "on").await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidPin(_)), "{err:?}");
    let err = client.set_pin(18, "bogus").await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidState(_)), "{err:?}");
    let err = client.call("explode", json!({})).await.unwrap_err();
    assert!(matches!(err, ClientError::UnknownOperation(_)), "{err:?}");
    assert_eq!(client.state(), ClientState::Ready);

    let pins = client.list_valid_pins().await.unwrap();
    assert_eq!(pins.valid_pins.len(), 17);
    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.tools.len(), 4);

    client.stop().await;
    assert_eq!(client.state(), ClientState::Stopped);
    assert!(client.worker_id().is_none());

    let err = tokio::time::timeout(Duration::from_secs(2), client.get_status())
        .await
        .expect("call after stop must not hang")
        .unwrap_err();
    assert!(matches!(err, ClientError::TransportLost(_)), "{err:?}");

    client.stop().await;
    assert_eq!(client.state(), ClientState::Stopped);
}

#[tokio::test]
async fn test_stdio_client_round_trip() {
    exercise(TransportKind::Stdio).await;
}

#[tokio::test]
async fn test_http_client_round_trip() {
    exercise(TransportKind::Http).await;
}

#[tokio::test]
async fn test_status_reports_claimed_pins_in_any_order() {
    for order in [[18, 22], [22, 18]] {
        let mut client = SupervisorClient::new(simulated_config(TransportKind::Stdio));
        client.start().await.unwrap();
        client.set_pin(order[0], "on").await.unwrap();
        client.read_pin(order[1]).await.unwrap();

        let status = client.get_status().await.unwrap();
        assert_eq!(status.claimed_pins, vec![18, 22]);
        assert_eq!(status.count, 2);
        let modes: Vec<PinMode> = status.pins.iter().map(|p| p.mode).collect();
        assert_eq!(modes.len(), 2);
        client.stop().await;
    }
}

#[tokio::test]
async fn test_restart_after_stop() {
    let mut client = SupervisorClient::new(simulated_config(TransportKind::Stdio));
    client.start().await.unwrap();
    client.set_pin(18, "on").await.unwrap();
    client.stop().await;

    client.start().await.unwrap();
    // A fresh worker has a fresh registry.
    assert_eq!(client.get_status().await.unwrap().count, 0);
    assert_eq!(client.stats().starts, 2);
    client.stop().await;
}

#[tokio::test]
async fn test_scoped_client_stops_worker() {
    let status = SupervisorClient::scoped(simulated_config(TransportKind::Http), |client| {
        async move {
            client.set_pin(17, "1").await?;
            client.get_status().await
        }
        .boxed()
    })
    .await
    .unwrap();
    assert_eq!(status.claimed_pins, vec![17]);
}

#[tokio::test]
async fn test_scoped_client_propagates_errors() {
    let err = SupervisorClient::scoped(simulated_config(TransportKind::Stdio), |client| {
        async move { client.read_pin(99).await }.boxed()
    })
    .await
    .unwrap_err();
    assert!(matches!(err, ClientError::InvalidPin(_)));
}
