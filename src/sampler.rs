//! Input sampling: buttons, motion sensor and the bike tamper loop.
//!
//! Inputs are read once per cycle. Buttons report rising edges only; the hold-off
//! between toggles belongs to the engine. The PIR and tamper loop are not debounced.

use crate::{
    hardware::{HwError, InputPin, LogicalInput, OutputPin, Polarity},
    Channel,
};

/// Facts gathered in one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Inputs {
    pub red_button_pressed: bool,
    pub blue_button_pressed: bool,
    pub pir_triggered: bool,
    pub bike_wire_fault: bool,
}

impl Inputs {
    /// Whether the button of `channel` went down this cycle
    pub fn pressed(&self, channel: Channel) -> bool {
        match channel {
            Channel::Interior => self.red_button_pressed,
            Channel::Bike => self.blue_button_pressed,
        }
    }
}

/// One read-back of the tamper loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TamperReading {
    pub expected: [bool; 2],
    pub observed: [bool; 2],
}

impl TamperReading {
    /// A cut or shorted conductor makes a sensed line disagree with its driver
    pub fn is_fault(&self) -> bool {
        self.expected != self.observed
    }
}

/// Two conductors run through the bike, each driven from one line and read back on another.
/// The drive pattern is complementary and flips every check, so a conductor stuck at either
/// level or shorted to its neighbour is caught within two cycles.
pub struct TamperLoop {
    drive: [Box<dyn OutputPin>; 2],
    sense: [Box<dyn InputPin>; 2],
    phase: bool,
    /// The drive lines are known to carry the pattern of `phase`
    driven: bool,
}

impl TamperLoop {
    /// Drives the first reference pattern immediately
    pub fn new(
        drive: [Box<dyn OutputPin>; 2],
        sense: [Box<dyn InputPin>; 2],
    ) -> Result<Self, HwError> {
        let mut tamper = Self {
            drive,
            sense,
            phase: true,
            driven: false,
        };
        tamper.drive_phase(true)?;
        Ok(tamper)
    }

    fn pattern(&self) -> [bool; 2] {
        [self.phase, !self.phase]
    }

    /// `phase` is only committed once both lines are written
    fn drive_phase(&mut self, phase: bool) -> Result<(), HwError> {
        self.driven = false;
        self.drive[0].write(phase)?;
        self.drive[1].write(!phase)?;
        self.phase = phase;
        self.driven = true;
        Ok(())
    }

    /// Compare the sensed lines with the pattern currently driven, then drive the next one.
    ///
    /// Returns `None` when an earlier drive failed and the lines were in an unknown state;
    /// the pattern is driven again and compared on the next check.
    pub fn check(&mut self) -> Result<Option<TamperReading>, HwError> {
        if !self.driven {
            self.drive_phase(self.phase)?;
            return Ok(None);
        }

        let observed = [self.sense[0].is_high()?, self.sense[1].is_high()?];
        let reading = TamperReading {
            expected: self.pattern(),
            observed,
        };
        self.drive_phase(!self.phase)?;
        Ok(Some(reading))
    }

    /// Release the drive lines
    pub fn release(&mut self) -> Result<(), HwError> {
        self.driven = false;
        self.drive[0].write(false)?;
        self.drive[1].write(false)
    }
}

/// Reads every input of the controller
pub struct Sampler {
    red_button: LogicalInput<Box<dyn InputPin>>,
    blue_button: LogicalInput<Box<dyn InputPin>>,
    pir: LogicalInput<Box<dyn InputPin>>,
    tamper: TamperLoop,
    red_held: bool,
    blue_held: bool,
    last_tamper: Option<TamperReading>,
}

/// Lines and polarities for a [`Sampler`]
pub struct SamplerPins {
    pub red_button: Box<dyn InputPin>,
    pub blue_button: Box<dyn InputPin>,
    pub buttons: Polarity,
    pub pir: Box<dyn InputPin>,
    pub pir_polarity: Polarity,
    pub tamper: TamperLoop,
}

impl Sampler {
    pub fn new(pins: SamplerPins) -> Self {
        Self {
            red_button: LogicalInput::new(pins.red_button, pins.buttons),
            blue_button: LogicalInput::new(pins.blue_button, pins.buttons),
            pir: LogicalInput::new(pins.pir, pins.pir_polarity),
            tamper: pins.tamper,
            red_held: false,
            blue_held: false,
            last_tamper: None,
        }
    }

    /// Read all inputs. Nothing is committed unless every read succeeds,
    /// so a failed cycle cannot swallow a button edge.
    pub fn sample(&mut self) -> Result<Inputs, HwError> {
        let red = self.red_button.is_asserted()?;
        let blue = self.blue_button.is_asserted()?;
        let pir_triggered = self.pir.is_asserted()?;
        let tamper = self.tamper.check()?;

        let inputs = Inputs {
            red_button_pressed: red && !self.red_held,
            blue_button_pressed: blue && !self.blue_held,
            pir_triggered,
            bike_wire_fault: tamper.is_some_and(|t| t.is_fault()),
        };
        self.red_held = red;
        self.blue_held = blue;
        self.last_tamper = tamper;
        Ok(inputs)
    }

    /// The tamper loop reading of the last successful sample, `None` if it only re-drove the loop
    pub fn last_tamper(&self) -> Option<TamperReading> {
        self.last_tamper
    }

    pub fn release(&mut self) -> Result<(), HwError> {
        self.tamper.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::sim::SimLine;

    struct Rig {
        red: SimLine,
        blue: SimLine,
        pir: SimLine,
        loop_a: SimLine,
        loop_b: SimLine,
        sampler: Sampler,
    }

    fn rig() -> Rig {
        let (red, blue, pir) = (SimLine::new(), SimLine::new(), SimLine::new());
        let (loop_a, loop_b) = (SimLine::new(), SimLine::new());
        let tamper = TamperLoop::new(
            [Box::new(loop_a.clone()), Box::new(loop_b.clone())],
            [Box::new(loop_a.clone()), Box::new(loop_b.clone())],
        )
        .unwrap();
        let sampler = Sampler::new(SamplerPins {
            red_button: Box::new(red.clone()),
            blue_button: Box::new(blue.clone()),
            buttons: Polarity::ActiveHigh,
            pir: Box::new(pir.clone()),
            pir_polarity: Polarity::ActiveHigh,
            tamper,
        });
        Rig {
            red,
            blue,
            pir,
            loop_a,
            loop_b,
            sampler,
        }
    }

    #[test]
    fn button_reports_rising_edge_once() {
        let mut rig = rig();
        assert!(!rig.sampler.sample().unwrap().red_button_pressed);
        rig.red.set(true);
        assert!(rig.sampler.sample().unwrap().red_button_pressed);
        assert!(!rig.sampler.sample().unwrap().red_button_pressed);
        rig.red.set(false);
        assert!(!rig.sampler.sample().unwrap().red_button_pressed);
        rig.red.set(true);
        let inputs = rig.sampler.sample().unwrap();
        assert!(inputs.pressed(Channel::Interior));
        assert!(!inputs.pressed(Channel::Bike));
    }

    #[test]
    fn pir_is_level_not_edge() {
        let mut rig = rig();
        rig.pir.set(true);
        assert!(rig.sampler.sample().unwrap().pir_triggered);
        assert!(rig.sampler.sample().unwrap().pir_triggered);
    }

    #[test]
    fn intact_loop_has_no_fault() {
        let mut rig = rig();
        for _ in 0..4 {
            assert!(!rig.sampler.sample().unwrap().bike_wire_fault);
        }
    }

    #[test]
    fn cut_wire_is_a_fault_within_two_cycles() {
        let mut rig = rig();
        rig.loop_a.stick_low();
        let first = rig.sampler.sample().unwrap().bike_wire_fault;
        let second = rig.sampler.sample().unwrap().bike_wire_fault;
        assert!(first || second);
    }

    #[test]
    fn shorted_pair_is_a_fault() {
        let mut rig = rig();
        // both conductors read as the same level while driven complementary
        rig.loop_a.stick_high();
        rig.loop_b.stick_high();
        assert!(rig.sampler.sample().unwrap().bike_wire_fault);
        assert!(rig.sampler.last_tamper().unwrap().is_fault());
    }

    #[test]
    fn failed_read_keeps_button_edge() {
        let mut rig = rig();
        rig.red.set(true);
        rig.pir.set_failing(true);
        assert!(rig.sampler.sample().is_err());
        rig.pir.set_failing(false);
        assert!(rig.sampler.sample().unwrap().red_button_pressed);
    }

    #[test]
    fn failed_drive_is_not_a_fault() {
        for line in ["a", "b"] {
            let mut rig = rig();
            let drive = if line == "a" { rig.loop_a.clone() } else { rig.loop_b.clone() };
            assert!(!rig.sampler.sample().unwrap().bike_wire_fault);

            drive.set_write_failing(true);
            assert!(rig.sampler.sample().is_err());
            drive.set_write_failing(false);

            // re-drives without comparing, then checks normally again
            let inputs = rig.sampler.sample().unwrap();
            assert!(!inputs.bike_wire_fault);
            assert_eq!(rig.sampler.last_tamper(), None);
            for _ in 0..4 {
                assert!(!rig.sampler.sample().unwrap().bike_wire_fault);
            }
            assert!(!rig.sampler.last_tamper().unwrap().is_fault());
        }
    }

    #[test]
    fn cut_wire_after_failed_drive_is_still_caught() {
        let mut rig = rig();
        rig.loop_a.set_write_failing(true);
        assert!(rig.sampler.sample().is_err());
        rig.loop_a.set_write_failing(false);
        rig.loop_a.stick_low();
        let faults = (0..3)
            .filter(|_| rig.sampler.sample().unwrap().bike_wire_fault)
            .count();
        assert!(faults >= 1);
    }

    #[test]
    fn release_drives_loop_low() {
        let mut rig = rig();
        rig.blue.set(true);
        rig.sampler.sample().unwrap();
        rig.sampler.release().unwrap();
        assert!(!rig.loop_a.level());
        assert!(!rig.loop_b.level());
    }
}
