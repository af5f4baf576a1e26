//! HTTP transport against the real worker binary.

use std::process::Stdio;
use std::time::Duration;

use gpio_bridge::protocol::{Health, Marker, Response};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;

use super::fake_sysfs;

const WAIT: Duration = Duration::from_secs(10);

fn spawn_http_worker(extra: &[&str]) -> Child {
    Command::new(crate::BIN)
        .args(["worker", "--transport", "http"])
        .args(extra)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .unwrap()
}

async fn first_marker(child: &mut Child) -> Option<Marker> {
    let stderr = child.stderr.take().unwrap();
    let mut lines = BufReader::new(stderr).lines();
    let line = timeout(WAIT, lines.next_line()).await.unwrap().unwrap()?;
    Marker::parse(&line)
}

fn http() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn test_announces_port_and_serves_rpc() {
    let mut child = spawn_http_worker(&["--backend", "simulated", "--port", "0"]);
    let Some(Marker::Port(port)) = first_marker(&mut child).await else {
        panic!("expected SERVICE_PORT marker");
    };
    let base = format!("http://127.0.0.1:{port}");

    let health: Health = http()
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, Health::healthy(true));

    let response: Response = http()
        .post(format!("{base}/rpc"))
        .json(&json!({"id": 1, "operation": "setPin", "arguments": {"pin": 18, "state": "1"}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response.id, Some(1));
    assert_eq!(response.result.unwrap()["level"], json!("HIGH"));

    let status: Value = http()
        .get(format!("{base}/gpio/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["claimedPins"], json!([18]));

    #[cfg(unix)]
    {
        super::sigterm(&child);
        let status = timeout(WAIT, child.wait()).await.unwrap().unwrap();
        assert!(status.success());
    }
}

#[tokio::test]
async fn test_bind_failure_reports_service_error() {
    let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = held.local_addr().unwrap().port().to_string();

    let mut child = spawn_http_worker(&["--backend", "simulated", "--port", &port, "--port-attempts", "1"]);
    let marker = first_marker(&mut child).await;
    assert!(
        matches!(marker, Some(Marker::Error(ref message)) if message.contains(&port)),
        "got {marker:?}"
    );

    let status = timeout(WAIT, child.wait()).await.unwrap().unwrap();
    assert!(!status.success());
}

async fn set_pin_18(port: u16) {
    let response: Response = http()
        .post(format!("http://127.0.0.1:{port}/rpc"))
        .json(&json!({"id": 1, "operation": "setPin", "arguments": {"pin": 18, "state": "on"}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(response.is_success(), "{response:?}");
}

#[cfg(unix)]
#[tokio::test]
async fn test_sigterm_releases_pins() {
    let sysfs = fake_sysfs(&[18]);
    let root = sysfs.path().to_str().unwrap().to_string();
    let mut child = spawn_http_worker(&["--backend", "sysfs", "--sysfs-root", &root, "--port", "0"]);
    let Some(Marker::Port(port)) = first_marker(&mut child).await else {
        panic!("expected SERVICE_PORT marker");
    };

    set_pin_18(port).await;
    let direction = sysfs.path().join("gpio18").join("direction");
    assert_eq!(std::fs::read_to_string(&direction).unwrap(), "out");

    super::sigterm(&child);
    let status = timeout(WAIT, child.wait()).await.unwrap().unwrap();
    assert!(status.success());
    assert_eq!(std::fs::read_to_string(&direction).unwrap(), "in");
}

#[tokio::test]
async fn test_stdin_eof_stops_worker_and_releases() {
    let sysfs = fake_sysfs(&[18]);
    let root = sysfs.path().to_str().unwrap().to_string();
    let mut child = spawn_http_worker(&[
        "--backend",
        "sysfs",
        "--sysfs-root",
        &root,
        "--port",
        "0",
        "--exit-on-stdin-eof",
    ]);
    let Some(Marker::Port(port)) = first_marker(&mut child).await else {
        panic!("expected SERVICE_PORT marker");
    };

    set_pin_18(port).await;
    let direction = sysfs.path().join("gpio18").join("direction");
    assert_eq!(std::fs::read_to_string(&direction).unwrap(), "out");

    // Closing stdin is what the worker sees when its supervisor dies.
    drop(child.stdin.take());
    let status = timeout(WAIT, child.wait()).await.unwrap().unwrap();
    assert!(status.success());
    assert_eq!(std::fs::read_to_string(&direction).unwrap(), "in");
}
