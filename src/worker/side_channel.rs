//! Marker output on the worker's stderr.

use std::io::Write;

use crate::protocol::Marker;

/// Writes [`Marker`] lines. Readiness (`WORKER_READY` or `SERVICE_PORT`)
/// is announced at most once.
#[derive(Debug)]
pub struct SideChannel<W: Write> {
    writer: W,
    announced: bool,
}

impl<W: Write> SideChannel<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            announced: false,
        }
    }

    #[must_use]
    pub fn announced(&self) -> bool {
        self.announced
    }

    /// Announce readiness of the line transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the side channel cannot be written.
    pub fn ready(&mut self) -> std::io::Result<()> {
        self.announce(&Marker::Ready)
    }

    /// Announce the HTTP transport's bound port.
    ///
    /// # Errors
    ///
    /// Returns an error if the side channel cannot be written.
    pub fn port(&mut self, port: u16) -> std::io::Result<()> {
        self.announce(&Marker::Port(port))
    }

    /// Report a startup failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the side channel cannot be written.
    pub fn error(&mut self, message: &str) -> std::io::Result<()> {
        self.emit(&Marker::Error(message.to_string()))
    }

    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn announce(&mut self, marker: &Marker) -> std::io::Result<()> {
        if self.announced {
            tracing::debug!(%marker, "Readiness already announced");
            return Ok(());
        }
        self.emit(marker)?;
        self.announced = true;
        Ok(())
    }

    fn emit(&mut self, marker: &Marker) -> std::io::Result<()> {
        writeln!(self.writer, "{marker}")?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(channel: SideChannel<Vec<u8>>) -> Vec<String> {
        String::from_utf8(channel.into_inner())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_ready_written_once() {
        let mut channel = SideChannel::new(Vec::new());
        channel.ready().unwrap();
        channel.ready().unwrap();
        channel.port(5000).unwrap();
        assert!(channel.announced());
        assert_eq!(lines(channel), vec!["WORKER_READY"]);
    }

    #[test]
    fn test_port_marker() {
        let mut channel = SideChannel::new(Vec::new());
        channel.port(41000).unwrap();
        assert_eq!(lines(channel), vec!["SERVICE_PORT:41000"]);
    }

    #[test]
    fn test_error_marker_is_one_line() {
        let mut channel = SideChannel::new(Vec::new());
        channel.error("bind failed\naddress in use").unwrap();
        assert!(!channel.announced());
        assert_eq!(lines(channel), vec!["SERVICE_ERROR:bind failed address in use"]);
    }
}
