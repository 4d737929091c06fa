//! Annunciation mixer.
//!
//! Each channel drives its own light. The buzzer and horn are shared, so the weights of
//! both channels are summed and the sum picks steady, slow blink or fast blink.

use crate::{
    config::AlarmConfig,
    hardware::{HwError, OutputPin},
    state::AlarmState,
    Channel,
};

/// Brightness of a channel light
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightLevel {
    Off,
    On,
    Dim,
}

/// A physical annunciator output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    RedLight,
    BlueLight,
    Buzzer,
    Horn,
}

impl Output {
    pub fn light(channel: Channel) -> Self {
        match channel {
            Channel::Interior => Output::RedLight,
            Channel::Bike => Output::BlueLight,
        }
    }
}

/// Lights, buzzer and horn as seen by the mixer
pub trait Annunciator: Send {
    fn set_light(&mut self, channel: Channel, level: LightLevel) -> Result<(), HwError>;
    fn set_buzzer(&mut self, on: bool) -> Result<(), HwError>;
    fn set_horn(&mut self, on: bool) -> Result<(), HwError>;
    fn toggle(&mut self, output: Output) -> Result<(), HwError>;

    /// Drive every output to the safe state, attempting all of them
    fn all_off(&mut self) -> Result<(), HwError> {
        let results = [
            self.set_light(Channel::Interior, LightLevel::Off),
            self.set_light(Channel::Bike, LightLevel::Off),
            self.set_buzzer(false),
            self.set_horn(false),
        ];
        results.into_iter().collect()
    }
}

/// Output behaviour selected by a (combined) weight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Off,
    Steady,
    SlowBlink,
    FastBlink,
}

impl Pattern {
    /// Above this the output blinks fast, from 3 up to it slowly
    pub const FAST_THRESHOLD: u8 = 8;

    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Pattern::Off,
            1 => Pattern::Steady,
            // two channels both asking for steady on one shared output
            2 => Pattern::FastBlink,
            l if l > Self::FAST_THRESHOLD => Pattern::FastBlink,
            _ => Pattern::SlowBlink,
        }
    }
}

/// What to do with one output this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drive {
    Off,
    On,
    Dim,
    Toggle,
    /// Blinking, but not on a toggle cycle
    Hold,
}

/// The drive of all four outputs for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPlan {
    pub red: Drive,
    pub blue: Drive,
    pub buzzer: Drive,
    pub horn: Drive,
    /// Summed buzzer weight
    pub buzzer_level: u8,
    /// Summed horn weight
    pub horn_level: u8,
}

/// Turns the two channel states into output drives
#[derive(Debug, Clone)]
pub struct Mixer {
    fast_blink_cycles: u64,
    slow_blink_cycles: u64,
    quiet: bool,
}

impl Mixer {
    pub fn new(config: &AlarmConfig) -> Self {
        Self {
            fast_blink_cycles: config.fast_blink_cycles.max(1),
            slow_blink_cycles: config.slow_blink_cycles.max(1),
            quiet: config.quiet,
        }
    }

    fn drive(&self, pattern: Pattern, loop_count: u64, night: bool) -> Drive {
        let period = match pattern {
            Pattern::Off => return Drive::Off,
            Pattern::Steady if night => return Drive::Dim,
            Pattern::Steady => return Drive::On,
            Pattern::SlowBlink => self.slow_blink_cycles,
            Pattern::FastBlink => self.fast_blink_cycles,
        };
        if loop_count % period == 0 {
            Drive::Toggle
        } else {
            Drive::Hold
        }
    }

    /// Plan the outputs for one cycle
    pub fn plan(
        &self,
        interior: AlarmState,
        bike: AlarmState,
        loop_count: u64,
        night: bool,
    ) -> OutputPlan {
        let (int_w, bike_w) = (interior.weights(), bike.weights());
        let buzzer_level = int_w.buzzer + bike_w.buzzer;
        let horn_level = int_w.horn + bike_w.horn;

        // the buzzer and horn never dim
        let (buzzer, horn) = if self.quiet {
            (Drive::Off, Drive::Off)
        } else {
            (
                self.drive(Pattern::from_level(buzzer_level), loop_count, false),
                self.drive(Pattern::from_level(horn_level), loop_count, false),
            )
        };

        OutputPlan {
            red: self.drive(Pattern::from_level(int_w.light), loop_count, night),
            blue: self.drive(Pattern::from_level(bike_w.light), loop_count, night),
            buzzer,
            horn,
            buzzer_level,
            horn_level,
        }
    }

    /// Drive the annunciator. Every output is attempted; the first failure is returned.
    pub fn apply<A: Annunciator + ?Sized>(
        plan: &OutputPlan,
        annunciator: &mut A,
    ) -> Result<(), HwError> {
        let results = [
            apply_light(annunciator, Channel::Interior, plan.red),
            apply_light(annunciator, Channel::Bike, plan.blue),
            apply_switch(annunciator, Output::Buzzer, plan.buzzer),
            apply_switch(annunciator, Output::Horn, plan.horn),
        ];
        results.into_iter().collect()
    }
}

fn apply_light<A: Annunciator + ?Sized>(
    annunciator: &mut A,
    channel: Channel,
    drive: Drive,
) -> Result<(), HwError> {
    match drive {
        Drive::Off => annunciator.set_light(channel, LightLevel::Off),
        Drive::On => annunciator.set_light(channel, LightLevel::On),
        Drive::Dim => annunciator.set_light(channel, LightLevel::Dim),
        Drive::Toggle => annunciator.toggle(Output::light(channel)),
        Drive::Hold => Ok(()),
    }
}

fn apply_switch<A: Annunciator + ?Sized>(
    annunciator: &mut A,
    output: Output,
    drive: Drive,
) -> Result<(), HwError> {
    let on = match drive {
        Drive::Off => false,
        Drive::On | Drive::Dim => true,
        Drive::Toggle => return annunciator.toggle(output),
        Drive::Hold => return Ok(()),
    };
    match output {
        Output::Horn => annunciator.set_horn(on),
        _ => annunciator.set_buzzer(on),
    }
}

/// Annunciator on four output lines
pub struct PinAnnunciator {
    red: Box<dyn OutputPin>,
    blue: Box<dyn OutputPin>,
    buzzer: Box<dyn OutputPin>,
    horn: Box<dyn OutputPin>,
    /// Last commanded on/off of red, blue, buzzer, horn
    lit: [bool; 4],
    dim_percent: u8,
}

impl PinAnnunciator {
    pub fn new(
        red: Box<dyn OutputPin>,
        blue: Box<dyn OutputPin>,
        buzzer: Box<dyn OutputPin>,
        horn: Box<dyn OutputPin>,
        dim_percent: u8,
    ) -> Self {
        Self {
            red,
            blue,
            buzzer,
            horn,
            lit: [false; 4],
            dim_percent,
        }
    }

    fn slot(&mut self, output: Output) -> (&mut Box<dyn OutputPin>, &mut bool) {
        match output {
            Output::RedLight => (&mut self.red, &mut self.lit[0]),
            Output::BlueLight => (&mut self.blue, &mut self.lit[1]),
            Output::Buzzer => (&mut self.buzzer, &mut self.lit[2]),
            Output::Horn => (&mut self.horn, &mut self.lit[3]),
        }
    }

    fn switch(&mut self, output: Output, on: bool) -> Result<(), HwError> {
        let (pin, lit) = self.slot(output);
        pin.write(on)?;
        *lit = on;
        Ok(())
    }
}

impl Annunciator for PinAnnunciator {
    fn set_light(&mut self, channel: Channel, level: LightLevel) -> Result<(), HwError> {
        let output = Output::light(channel);
        match level {
            LightLevel::Off => self.switch(output, false),
            LightLevel::On => self.switch(output, true),
            LightLevel::Dim => {
                let duty = self.dim_percent;
                let (pin, lit) = self.slot(output);
                pin.write_duty(duty)?;
                *lit = true;
                Ok(())
            }
        }
    }

    fn set_buzzer(&mut self, on: bool) -> Result<(), HwError> {
        self.switch(Output::Buzzer, on)
    }

    fn set_horn(&mut self, on: bool) -> Result<(), HwError> {
        self.switch(Output::Horn, on)
    }

    fn toggle(&mut self, output: Output) -> Result<(), HwError> {
        let on = !*self.slot(output).1;
        self.switch(output, on)
    }
}
