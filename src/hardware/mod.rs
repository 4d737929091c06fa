//! Digital line access.
//!
//! The controller only sees [`InputPin`] and [`OutputPin`]; [`sysfs`] binds them to the
//! Linux GPIO class and [`sim`] to in-memory lines for tests and mock runs.

pub mod sim;
pub mod sysfs;

use std::io;

use thiserror::Error;

/// A failed hardware access
#[derive(Debug, Error)]
pub enum HwError {
    #[error("could not export line {line}: {source}")]
    Export { line: u32, source: io::Error },
    #[error("i/o on line {line} failed: {source}")]
    Io { line: u32, source: io::Error },
    #[error("line {line} is unavailable")]
    Unavailable { line: u32 },
    #[error("line {line} returned unexpected value {value:?}")]
    Parse { line: u32, value: String },
}

/// A readable digital line
pub trait InputPin: Send {
    /// Electrical level of the line
    fn is_high(&mut self) -> Result<bool, HwError>;
}

/// A writable digital line
pub trait OutputPin: Send {
    fn write(&mut self, high: bool) -> Result<(), HwError>;

    /// Drive at a reduced intensity.
    /// Lines without variable intensity are simply switched on for any non-zero duty.
    fn write_duty(&mut self, percent: u8) -> Result<(), HwError> {
        self.write(percent > 0)
    }
}

impl<P: InputPin + ?Sized> InputPin for Box<P> {
    fn is_high(&mut self) -> Result<bool, HwError> {
        (**self).is_high()
    }
}

impl<P: OutputPin + ?Sized> OutputPin for Box<P> {
    fn write(&mut self, high: bool) -> Result<(), HwError> {
        (**self).write(high)
    }

    fn write_duty(&mut self, percent: u8) -> Result<(), HwError> {
        (**self).write_duty(percent)
    }
}

/// Which electrical level means "asserted"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    #[default]
    ActiveHigh,
    /// Pulled up, asserted when shorted to ground
    ActiveLow,
}

impl Polarity {
    pub fn from_active_low(active_low: bool) -> Self {
        if active_low {
            Polarity::ActiveLow
        } else {
            Polarity::ActiveHigh
        }
    }

    /// Logical value of an electrical level
    pub fn asserted(self, high: bool) -> bool {
        match self {
            Polarity::ActiveHigh => high,
            Polarity::ActiveLow => !high,
        }
    }
}

/// An input line with its polarity applied
pub struct LogicalInput<P> {
    pin: P,
    polarity: Polarity,
}

impl<P: InputPin> LogicalInput<P> {
    pub fn new(pin: P, polarity: Polarity) -> Self {
        Self { pin, polarity }
    }

    pub fn is_asserted(&mut self) -> Result<bool, HwError> {
        Ok(self.polarity.asserted(self.pin.is_high()?))
    }
}

#[cfg(test)]
mod tests {
    use super::{sim::SimLine, *};

    #[test]
    fn active_low_inverts() {
        let line = SimLine::new();
        let mut input = LogicalInput::new(line.clone(), Polarity::ActiveLow);
        assert!(input.is_asserted().unwrap());
        line.set(true);
        assert!(!input.is_asserted().unwrap());
    }

    #[test]
    fn boxed_pins_forward() {
        let line = SimLine::new();
        let mut out: Box<dyn OutputPin> = Box::new(line.clone());
        out.write_duty(1).unwrap();
        assert_eq!(line.duty(), 1);
        let mut input: Box<dyn InputPin> = Box::new(line.clone());
        assert!(input.is_high().unwrap());
    }
}
