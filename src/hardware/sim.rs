//! In-memory lines.
//!
//! A [`SimLine`] is both an input and an output; clones share the same wire, so wiring an
//! output clone to an input clone models an intact loop. Used by `--mock` and by tests.

use std::sync::{
    atomic::{AtomicBool, AtomicU8, Ordering},
    Arc,
};

use super::{HwError, InputPin, OutputPin};

const NOT_STUCK: u8 = 0;
const STUCK_LOW: u8 = 1;
const STUCK_HIGH: u8 = 2;

#[derive(Debug, Default)]
struct Wire {
    duty: AtomicU8,
    stuck: AtomicU8,
    failing: AtomicBool,
    write_failing: AtomicBool,
}

/// A simulated digital line
#[derive(Debug, Clone, Default)]
pub struct SimLine {
    wire: Arc<Wire>,
    id: u32,
}

impl SimLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// A line reporting `id` in errors
    pub fn with_id(id: u32) -> Self {
        Self {
            wire: Arc::default(),
            id,
        }
    }

    /// Drive the line from the outside, as a button or sensor would
    pub fn set(&self, high: bool) {
        self.wire
            .duty
            .store(if high { 100 } else { 0 }, Ordering::Relaxed);
    }

    /// Level seen by readers
    pub fn level(&self) -> bool {
        match self.wire.stuck.load(Ordering::Relaxed) {
            STUCK_LOW => false,
            STUCK_HIGH => true,
            _ => self.duty() > 0,
        }
    }

    /// Last driven duty cycle in percent
    pub fn duty(&self) -> u8 {
        self.wire.duty.load(Ordering::Relaxed)
    }

    /// Force readers to see low regardless of the driver, as a cut wire does
    pub fn stick_low(&self) {
        self.wire.stuck.store(STUCK_LOW, Ordering::Relaxed);
    }

    /// Force readers to see high regardless of the driver, as a short to supply does
    pub fn stick_high(&self) {
        self.wire.stuck.store(STUCK_HIGH, Ordering::Relaxed);
    }

    pub fn repair(&self) {
        self.wire.stuck.store(NOT_STUCK, Ordering::Relaxed);
    }

    /// Make every access fail until cleared
    pub fn set_failing(&self, failing: bool) {
        self.wire.failing.store(failing, Ordering::Relaxed);
    }

    /// Make writes fail until cleared, reads keep working
    pub fn set_write_failing(&self, failing: bool) {
        self.wire.write_failing.store(failing, Ordering::Relaxed);
    }

    fn check_write(&self) -> Result<(), HwError> {
        if self.wire.write_failing.load(Ordering::Relaxed) {
            return Err(HwError::Unavailable { line: self.id });
        }
        self.check()
    }

    fn check(&self) -> Result<(), HwError> {
        if self.wire.failing.load(Ordering::Relaxed) {
            Err(HwError::Unavailable { line: self.id })
        } else {
            Ok(())
        }
    }
}

impl InputPin for SimLine {
    fn is_high(&mut self) -> Result<bool, HwError> {
        self.check()?;
        Ok(self.level())
    }
}

impl OutputPin for SimLine {
    fn write(&mut self, high: bool) -> Result<(), HwError> {
        self.check_write()?;
        self.set(high);
        Ok(())
    }

    fn write_duty(&mut self, percent: u8) -> Result<(), HwError> {
        self.check_write()?;
        self.wire.duty.store(percent.min(100), Ordering::Relaxed);
        Ok(())
    }
}
