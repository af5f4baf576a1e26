//! Linux sysfs GPIO backend (`/sys/class/gpio`).

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{GpioBackend, Level, PinMode, PinNumber};

/// Default sysfs GPIO class directory.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

/// Backend driving pins through the sysfs GPIO interface.
///
/// Pins exported by this backend are unexported again on release. Pins
/// that were already exported by someone else are left exported.
#[derive(Debug)]
pub struct SysfsBackend {
    root: PathBuf,
    exported: HashSet<PinNumber>,
}

impl SysfsBackend {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exported: HashSet::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pin_dir(&self, pin: PinNumber) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    fn write_attr(path: &Path, value: &str) -> io::Result<()> {
        fs::write(path, value).map_err(|e| {
            io::Error::new(e.kind(), format!("{}: {e}", path.display()))
        })
    }
}

impl GpioBackend for SysfsBackend {
    fn name(&self) -> &'static str {
        "sysfs"
    }

    fn is_available(&self) -> bool {
        self.root.join("export").exists()
    }

    fn claim(&mut self, pin: PinNumber, mode: PinMode) -> io::Result<()> {
        let dir = self.pin_dir(pin);
        if !dir.exists() {
            Self::write_attr(&self.root.join("export"), &pin.to_string())?;
            self.exported.insert(pin);
            tracing::debug!(pin, "Exported pin");
        }
        let direction = match mode {
            PinMode::Output => "out",
            PinMode::Input => "in",
        };
        Self::write_attr(&dir.join("direction"), direction)
    }

    fn write(&mut self, pin: PinNumber, level: Level) -> io::Result<()> {
        let value = if level.is_high() { "1" } else { "0" };
        Self::write_attr(&self.pin_dir(pin).join("value"), value)
    }

    fn read(&mut self, pin: PinNumber) -> io::Result<Level> {
        let path = self.pin_dir(pin).join("value");
        let raw = fs::read_to_string(&path)
            .map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", path.display())))?;
        match raw.trim() {
            "1" => Ok(Level::High),
            "0" => Ok(Level::Low),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected value {other:?} in {}", path.display()),
            )),
        }
    }

    fn release(&mut self, pin: PinNumber) -> io::Result<()> {
        if self.exported.remove(&pin) {
            Self::write_attr(&self.root.join("unexport"), &pin.to_string())?;
            tracing::debug!(pin, "Unexported pin");
        } else {
            // Leave a pre-exported pin safe: input, not driving the line.
            let direction = self.pin_dir(pin).join("direction");
            if direction.exists() {
                Self::write_attr(&direction, "in")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs(pins: &[PinNumber]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("export"), "").unwrap();
        fs::write(dir.path().join("unexport"), "").unwrap();
        for pin in pins {
            let pin_dir = dir.path().join(format!("gpio{pin}"));
            fs::create_dir(&pin_dir).unwrap();
            fs::write(pin_dir.join("direction"), "in").unwrap();
            fs::write(pin_dir.join("value"), "0").unwrap();
        }
        dir
    }

    #[test]
    fn availability_follows_export_file() {
        let dir = fake_sysfs(&[]);
        assert!(SysfsBackend::new(dir.path()).is_available());
        assert!(!SysfsBackend::new(dir.path().join("missing")).is_available());
    }

    #[test]
    fn claim_output_and_write_value() {
        let dir = fake_sysfs(&[18]);
        let mut backend = SysfsBackend::new(dir.path());

        backend.claim(18, PinMode::Output).unwrap();
        backend.write(18, Level::High).unwrap();

        let pin_dir = dir.path().join("gpio18");
        assert_eq!(fs::read_to_string(pin_dir.join("direction")).unwrap(), "out");
        assert_eq!(fs::read_to_string(pin_dir.join("value")).unwrap(), "1");
        assert_eq!(backend.read(18).unwrap(), Level::High);
    }

    #[test]
    fn claim_exports_missing_pin() {
        let dir = fake_sysfs(&[]);
        let mut backend = SysfsBackend::new(dir.path());

        // The fake tree has no kernel to create gpio22/, so the direction
        // write fails after the export succeeded.
        assert!(backend.claim(22, PinMode::Input).is_err());
        assert_eq!(fs::read_to_string(dir.path().join("export")).unwrap(), "22");

        backend.release(22).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("unexport")).unwrap(), "22");
    }

    #[test]
    fn release_pre_exported_pin_sets_input() {
        let dir = fake_sysfs(&[23]);
        let mut backend = SysfsBackend::new(dir.path());
        backend.claim(23, PinMode::Output).unwrap();
        backend.release(23).unwrap();

        let direction = fs::read_to_string(dir.path().join("gpio23/direction")).unwrap();
        assert_eq!(direction, "in");
        assert_eq!(fs::read_to_string(dir.path().join("unexport")).unwrap(), "");
    }

    #[test]
    fn read_rejects_garbage() {
        let dir = fake_sysfs(&[24]);
        fs::write(dir.path().join("gpio24/value"), "x\n").unwrap();
        let mut backend = SysfsBackend::new(dir.path());
        let err = backend.read(24).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
