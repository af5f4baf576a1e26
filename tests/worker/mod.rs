//! Worker process tests, driving the real binary.

mod http_test;
mod stdio_test;

/// A fake sysfs GPIO tree with `pins` already exported as inputs.
pub fn fake_sysfs(pins: &[u8]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("export"), "").unwrap();
    std::fs::write(dir.path().join("unexport"), "").unwrap();
    for pin in pins {
        let pin_dir = dir.path().join(format!("gpio{pin}"));
        std::fs::create_dir(&pin_dir).unwrap();
        std::fs::write(pin_dir.join("direction"), "in").unwrap();
        std::fs::write(pin_dir.join("value"), "0").unwrap();
    }
    dir
}

#[cfg(unix)]
pub fn sigterm(child: &tokio::process::Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(i32::try_from(child.id().unwrap()).unwrap());
    kill(pid, Signal::SIGTERM).unwrap();
}

/// Verify the public worker API is exported from the library.
#[test]
fn test_all_worker_types_exported() {
    use gpio_bridge::gpio::{PinController, SimulatedBackend};
    use gpio_bridge::protocol::ProtocolHandler;
    use gpio_bridge::worker::{build_router, SideChannel, WorkerError, WorkerState};

    let mut side = SideChannel::new(Vec::new());
    side.ready().unwrap();
    assert_eq!(side.into_inner(), b"WORKER_READY\n");

    let handler = ProtocolHandler::new(PinController::new(Box::new(SimulatedBackend::new())));
    let _router = build_router(WorkerState::new(handler));

    let err = WorkerError::from(std::io::Error::other("closed"));
    assert!(err.to_string().contains("closed"));
}
