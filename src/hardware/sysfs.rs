//! Lines of the Linux GPIO class (`/sys/class/gpio`)

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use super::{HwError, InputPin, OutputPin};

/// Default mount point of the GPIO class
pub const GPIO_CLASS_ROOT: &str = "/sys/class/gpio";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    In,
    /// Output with its initial level
    Out(bool),
}

/// A line exported through sysfs. Unexported on drop if this process exported it.
#[derive(Debug)]
pub struct SysfsLine {
    root: PathBuf,
    line: u32,
    exported: bool,
}

impl SysfsLine {
    /// Export `line` (chip base already added) as an input
    pub fn input(root: impl AsRef<Path>, line: u32) -> Result<Self, HwError> {
        Self::open(root.as_ref(), line, Direction::In)
    }

    /// Export `line` (chip base already added) as an output driven low
    pub fn output(root: impl AsRef<Path>, line: u32) -> Result<Self, HwError> {
        Self::open(root.as_ref(), line, Direction::Out(false))
    }

    fn open(root: &Path, line: u32, direction: Direction) -> Result<Self, HwError> {
        let line_dir = root.join(format!("gpio{line}"));
        let mut exported = false;
        if !line_dir.exists() {
            debug!("Exporting gpio{}", line);
            fs::write(root.join("export"), line.to_string())
                .map_err(|source| HwError::Export { line, source })?;
            exported = true;
        }

        // the kernel sets the level atomically with the direction when given high/low
        let dir = match direction {
            Direction::In => "in",
            Direction::Out(true) => "high",
            Direction::Out(false) => "low",
        };
        fs::write(line_dir.join("direction"), dir).map_err(|source| HwError::Io { line, source })?;

        Ok(Self {
            root: root.to_path_buf(),
            line,
            exported,
        })
    }

    fn value_path(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.line)).join("value")
    }
}

impl InputPin for SysfsLine {
    fn is_high(&mut self) -> Result<bool, HwError> {
        let line = self.line;
        let raw = fs::read_to_string(self.value_path())
            .map_err(|source| HwError::Io { line, source })?;
        match raw.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(HwError::Parse {
                line,
                value: other.to_string(),
            }),
        }
    }
}

impl OutputPin for SysfsLine {
    fn write(&mut self, high: bool) -> Result<(), HwError> {
        let line = self.line;
        fs::write(self.value_path(), if high { "1" } else { "0" })
            .map_err(|source| HwError::Io { line, source })
    }
}

impl Drop for SysfsLine {
    fn drop(&mut self) {
        if self.exported {
            if let Err(err) = fs::write(self.root.join("unexport"), self.line.to_string()) {
                warn!("Could not unexport gpio{}: {}", self.line, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A fake class directory with `gpio<line>` already present
    fn fake_root(name: &str, line: u32) -> PathBuf {
        let root = std::env::temp_dir().join(format!("rv-alarm-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join(format!("gpio{line}"))).unwrap();
        fs::write(root.join(format!("gpio{line}")).join("value"), "0\n").unwrap();
        root
    }

    #[test]
    fn reads_value_file() {
        let root = fake_root("read", 5);
        let mut pin = SysfsLine::input(&root, 5).unwrap();
        assert_eq!(fs::read_to_string(root.join("gpio5/direction")).unwrap(), "in");
        assert!(!pin.is_high().unwrap());
        fs::write(root.join("gpio5/value"), "1\n").unwrap();
        assert!(pin.is_high().unwrap());
        fs::write(root.join("gpio5/value"), "x\n").unwrap();
        assert!(matches!(pin.is_high(), Err(HwError::Parse { line: 5, .. })));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn output_starts_low_and_writes() {
        let root = fake_root("write", 22);
        let mut pin = SysfsLine::output(&root, 22).unwrap();
        assert_eq!(fs::read_to_string(root.join("gpio22/direction")).unwrap(), "low");
        pin.write(true).unwrap();
        assert_eq!(fs::read_to_string(root.join("gpio22/value")).unwrap(), "1");
        // no dimming on sysfs lines, any duty is on
        pin.write_duty(1).unwrap();
        assert_eq!(fs::read_to_string(root.join("gpio22/value")).unwrap(), "1");
        drop(pin);
        // not exported by us, so not unexported either
        assert!(!root.join("unexport").exists());
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn missing_class_fails_export() {
        let root = std::env::temp_dir().join(format!("rv-alarm-missing-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        assert!(matches!(
            SysfsLine::input(&root, 9),
            Err(HwError::Export { line: 9, .. })
        ));
    }
}
