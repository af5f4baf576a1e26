//! Worker process spawning and control.
//!
//! This module provides a builder for the worker command line and a
//! handle for managing the running process.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::config::{TransportKind, WorkerSettings};

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The binary was not found.
    #[error("Worker binary not found: {0}")]
    NotFound(PathBuf),
    /// Permission denied when spawning.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(program: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(program.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(program.to_path_buf()),
            _ => Self::Io(err),
        }
    }
}

/// Builder for the worker command line.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    /// Run `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Run `program worker ...` with flags taken from the worker settings.
    #[must_use]
    pub fn worker(
        program: impl Into<PathBuf>,
        transport: TransportKind,
        settings: &WorkerSettings,
    ) -> Self {
        let mut command = Self::new(program)
            .arg("worker")
            .arg("--transport")
            .arg(transport.as_str())
            .arg("--backend")
            .arg(settings.backend.as_str())
            .arg("--sysfs-root")
            .arg(&settings.sysfs_root)
            .arg("--port")
            .arg(settings.port_range_start.to_string())
            .arg("--port-attempts")
            .arg(settings.port_attempts.to_string());

        if let Some(log_file) = &settings.log_file {
            command = command.arg("--log-file").arg(log_file);
        }
        // The supervisor holds the worker's stdin; EOF means it has died.
        if transport == TransportKind::Http || settings.exit_on_stdin_eof {
            command = command.arg("--exit-on-stdin-eof");
        }
        command
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    #[must_use]
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }
}

/// A running worker process.
#[derive(Debug)]
pub struct WorkerProcess {
    child: Child,
}

impl WorkerProcess {
    /// Spawn the worker.
    ///
    /// Stdin and stderr are always piped. Stdout is piped for the line
    /// transport and discarded otherwise. The child is killed if the
    /// handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn(command: &WorkerCommand, transport: TransportKind) -> Result<Self, SpawnError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match transport {
            TransportKind::Stdio => cmd.stdout(Stdio::piped()),
            TransportKind::Http => cmd.stdout(Stdio::null()),
        };

        let child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(&command.program, e))?;
        tracing::debug!(
            program = %command.program.display(),
            pid = child.id(),
            "Spawned worker"
        );

        Ok(Self { child })
    }

    /// Take ownership of the stdin handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Take ownership of the stdout handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take ownership of the stderr handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if the process has exited without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for exit, up to `timeout`. Returns `None` if still running.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => status.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Forcefully kill the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    /// Ask the process to exit.
    ///
    /// On Unix this sends SIGTERM. On other platforms it kills outright.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be delivered.
    pub async fn terminate(&mut self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.id() {
                let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
                kill(nix_pid, Signal::SIGTERM).map_err(std::io::Error::from)?;
            }
            Ok(())
        }

        #[cfg(not(unix))]
        {
            self.kill().await
        }
    }

    /// Attempt graceful termination with a timeout.
    ///
    /// Sends SIGTERM first, then kills after the timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if termination fails.
    pub async fn graceful_terminate(&mut self, timeout: Duration) -> std::io::Result<()> {
        if self.id().is_none() {
            // Process already exited
            return Ok(());
        }
        if let Err(e) = self.terminate().await {
            tracing::debug!(error = %e, "SIGTERM failed");
        }
        if self.wait_timeout(timeout).await?.is_none() {
            tracing::warn!(
                timeout_ms = super::error::millis(timeout),
                "Worker ignored SIGTERM; killing"
            );
            self.kill().await?;
        }
        Ok(())
    }
}
