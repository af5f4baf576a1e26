//! Line transport against the real worker binary.

use std::process::Stdio;
use std::time::Duration;

use gpio_bridge::protocol::{ErrorCode, Response};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;

use super::fake_sysfs;

const WAIT: Duration = Duration::from_secs(10);

struct Worker {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr: Lines<BufReader<ChildStderr>>,
}

impl Worker {
    fn spawn(extra: &[&str]) -> Self {
        let mut child = Command::new(crate::BIN)
            .args(["worker", "--transport", "stdio"])
            .args(extra)
            .env_remove("RUST_LOG")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        Self {
            stdin: child.stdin.take(),
            stdout: BufReader::new(child.stdout.take().unwrap()).lines(),
            stderr: BufReader::new(child.stderr.take().unwrap()).lines(),
            child,
        }
    }

    async fn expect_ready(&mut self) {
        let line = timeout(WAIT, self.stderr.next_line()).await.unwrap().unwrap();
        assert_eq!(line.as_deref(), Some("WORKER_READY"));
    }

    async fn send(&mut self, line: &str) -> Response {
        let stdin = self.stdin.as_mut().unwrap();
        stdin.write_all(line.as_bytes()).await.unwrap();
        stdin.write_all(b"\n").await.unwrap();
        stdin.flush().await.unwrap();
        let reply = timeout(WAIT, self.stdout.next_line())
            .await
            .unwrap()
            .unwrap()
            .expect("worker closed stdout");
        serde_json::from_str(&reply).unwrap()
    }

    async fn close(mut self) -> (std::process::ExitStatus, Vec<String>) {
        drop(self.stdin.take());
        let status = timeout(WAIT, self.child.wait()).await.unwrap().unwrap();
        let mut rest = Vec::new();
        while let Ok(Some(line)) = self.stderr.next_line().await {
            rest.push(line);
        }
        (status, rest)
    }
}

#[tokio::test]
async fn test_set_then_read_round_trip() {
    let mut worker = Worker::spawn(&["--backend", "simulated"]);
    worker.expect_ready().await;

    let set = worker
        .send(r#"{"id":1,"operation":"setPin","arguments":{"pin":22,"state":"high"}}"#)
        .await;
    assert_eq!(set.id, Some(1));
    assert!(set.is_success());

    let read = worker
        .send(r#"{"id":2,"operation":"readPin","arguments":{"pin":22}}"#)
        .await;
    assert_eq!(read.id, Some(2));
    assert_eq!(read.result.unwrap()["level"], json!("HIGH"));

    let (status, stderr) = worker.close().await;
    assert!(status.success());
    assert!(stderr.is_empty(), "stderr carries markers only: {stderr:?}");
}

#[tokio::test]
async fn test_malformed_lines_do_not_stop_the_loop() {
    let mut worker = Worker::spawn(&["--backend", "simulated"]);
    worker.expect_ready().await;

    let bad = worker.send("this is not json").await;
    assert_eq!(bad.id, None);
    assert_eq!(bad.error.unwrap().kind(), Some(ErrorCode::ParseError));

    let unknown = worker.send(r#"{"id":7,"operation":"selfDestruct"}"#).await;
    assert_eq!(unknown.id, Some(7));
    let error = unknown.error.unwrap();
    assert_eq!(error.kind(), Some(ErrorCode::UnknownOperation));
    assert!(error.message.contains("selfDestruct"));

    let invalid = worker
        .send(r#"{"id":8,"operation":"setPin","arguments":{"pin":2,"state":"on"}}"#)
        .await;
    assert_eq!(invalid.error.unwrap().kind(), Some(ErrorCode::InvalidPin));

    let status = worker.send(r#"{"id":9,"operation":"getStatus"}"#).await;
    assert_eq!(status.result.unwrap()["count"], json!(0));

    let (exit, _) = worker.close().await;
    assert!(exit.success());
}

#[tokio::test]
async fn test_sysfs_backend_drives_files_and_releases() {
    let sysfs = fake_sysfs(&[18]);
    let root = sysfs.path().to_str().unwrap().to_string();
    let mut worker = Worker::spawn(&["--backend", "sysfs", "--sysfs-root", &root]);
    worker.expect_ready().await;

    let set = worker
        .send(r#"{"id":1,"operation":"setPin","arguments":{"pin":18,"state":"on"}}"#)
        .await;
    assert!(set.is_success(), "{set:?}");

    let pin_dir = sysfs.path().join("gpio18");
    assert_eq!(std::fs::read_to_string(pin_dir.join("direction")).unwrap(), "out");
    assert_eq!(std::fs::read_to_string(pin_dir.join("value")).unwrap(), "1");

    let (status, _) = worker.close().await;
    assert!(status.success());
    // Released on exit: the pre-exported pin is back to input.
    assert_eq!(std::fs::read_to_string(pin_dir.join("direction")).unwrap(), "in");
}

#[tokio::test]
async fn test_missing_hardware_still_serves() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("no-gpio");
    let mut worker = Worker::spawn(&["--backend", "sysfs", "--sysfs-root", root.to_str().unwrap()]);
    worker.expect_ready().await;

    let init = worker.send(r#"{"id":1,"operation":"initialize"}"#).await;
    assert_eq!(init.result.unwrap()["hardwareAvailable"], json!(false));

    let set = worker
        .send(r#"{"id":2,"operation":"setPin","arguments":{"pin":18,"state":"on"}}"#)
        .await;
    assert_eq!(
        set.error.unwrap().kind(),
        Some(ErrorCode::HardwareUnavailable)
    );

    let pins = worker.send(r#"{"id":3,"operation":"listValidPins"}"#).await;
    assert_eq!(pins.result.unwrap()["validPins"].as_array().map(Vec::len), Some(17));

    worker.close().await;
}

#[tokio::test]
async fn test_logs_go_to_log_file_only() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("worker.log");
    let mut worker = Worker::spawn(&[
        "--backend",
        "simulated",
        "--log-file",
        log.to_str().unwrap(),
    ]);
    worker.expect_ready().await;
    worker.send(r#"{"id":1,"operation":"getStatus"}"#).await;

    let (status, stderr) = worker.close().await;
    assert!(status.success());
    assert!(stderr.is_empty());

    let contents = std::fs::read_to_string(&log).unwrap();
    assert!(contents.contains("Starting GPIO worker"), "log: {contents}");
}

#[cfg(unix)]
#[tokio::test]
async fn test_sigterm_releases_pins() {
    let sysfs = fake_sysfs(&[18]);
    let root = sysfs.path().to_str().unwrap().to_string();
    let mut worker = Worker::spawn(&["--backend", "sysfs", "--sysfs-root", &root]);
    worker.expect_ready().await;

    let set = worker
        .send(r#"{"id":1,"operation":"setPin","arguments":{"pin":18,"state":"on"}}"#)
        .await;
    assert!(set.is_success(), "{set:?}");
    let direction = sysfs.path().join("gpio18").join("direction");
    assert_eq!(std::fs::read_to_string(&direction).unwrap(), "out");

    // Stdin stays open: only the signal ends the worker.
    super::sigterm(&worker.child);
    let status = timeout(WAIT, worker.child.wait()).await.unwrap().unwrap();
    assert!(status.success());
    assert_eq!(std::fs::read_to_string(&direction).unwrap(), "in");
}
