//! Wiring of physical lines into a [`Sampler`] and a [`PinAnnunciator`]

use std::path::Path;

use tracing::info;

use crate::{
    hardware::{sim::SimLine, sysfs::SysfsLine, HwError, Polarity},
    mixer::PinAnnunciator,
    sampler::{Sampler, SamplerPins, TamperLoop},
};

/// Line offsets on the GPIO chip, before the chip base is added
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMap {
    pub red_button: u32,
    pub blue_button: u32,
    pub pir: u32,
    pub red_light: u32,
    pub blue_light: u32,
    pub buzzer: u32,
    pub horn: u32,
    pub tamper_drive: [u32; 2],
    pub tamper_sense: [u32; 2],
}

impl Default for PinMap {
    fn default() -> Self {
        Self {
            red_button: 6,
            blue_button: 13,
            pir: 5,
            red_light: 12,
            blue_light: 19,
            buzzer: 22,
            horn: 27,
            tamper_drive: [23, 24],
            tamper_sense: [25, 26],
        }
    }
}

/// Electrical options of the inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputPolarity {
    pub buttons: Polarity,
    pub pir: Polarity,
}

/// Open every line of `pins` through the GPIO class at `root`
pub fn sysfs_board(
    root: &Path,
    base: u32,
    pins: &PinMap,
    polarity: InputPolarity,
    dim_percent: u8,
) -> Result<(Sampler, PinAnnunciator), HwError> {
    info!("Opening GPIO lines under {:?} with base {}", root, base);
    let input = |offset: u32| SysfsLine::input(root, base + offset);
    let output = |offset: u32| SysfsLine::output(root, base + offset);

    let tamper = TamperLoop::new(
        [
            Box::new(output(pins.tamper_drive[0])?),
            Box::new(output(pins.tamper_drive[1])?),
        ],
        [
            Box::new(input(pins.tamper_sense[0])?),
            Box::new(input(pins.tamper_sense[1])?),
        ],
    )?;
    let sampler = Sampler::new(SamplerPins {
        red_button: Box::new(input(pins.red_button)?),
        blue_button: Box::new(input(pins.blue_button)?),
        buttons: polarity.buttons,
        pir: Box::new(input(pins.pir)?),
        pir_polarity: polarity.pir,
        tamper,
    });
    let annunciator = PinAnnunciator::new(
        Box::new(output(pins.red_light)?),
        Box::new(output(pins.blue_light)?),
        Box::new(output(pins.buzzer)?),
        Box::new(output(pins.horn)?),
        dim_percent,
    );
    Ok((sampler, annunciator))
}

/// In-memory board. Inputs are active high and the tamper loop is intact.
#[derive(Debug, Clone)]
pub struct SimBoard {
    pub red_button: SimLine,
    pub blue_button: SimLine,
    pub pir: SimLine,
    pub tamper: [SimLine; 2],
    pub red_light: SimLine,
    pub blue_light: SimLine,
    pub buzzer: SimLine,
    pub horn: SimLine,
}

impl SimBoard {
    /// Lines carry the default pin numbers as ids
    pub fn new() -> Self {
        let pins = PinMap::default();
        Self {
            red_button: SimLine::with_id(pins.red_button),
            blue_button: SimLine::with_id(pins.blue_button),
            pir: SimLine::with_id(pins.pir),
            tamper: [
                SimLine::with_id(pins.tamper_sense[0]),
                SimLine::with_id(pins.tamper_sense[1]),
            ],
            red_light: SimLine::with_id(pins.red_light),
            blue_light: SimLine::with_id(pins.blue_light),
            buzzer: SimLine::with_id(pins.buzzer),
            horn: SimLine::with_id(pins.horn),
        }
    }

    pub fn build(&self, dim_percent: u8) -> Result<(Sampler, PinAnnunciator), HwError> {
        let tamper = TamperLoop::new(
            [Box::new(self.tamper[0].clone()), Box::new(self.tamper[1].clone())],
            [Box::new(self.tamper[0].clone()), Box::new(self.tamper[1].clone())],
        )?;
        let sampler = Sampler::new(SamplerPins {
            red_button: Box::new(self.red_button.clone()),
            blue_button: Box::new(self.blue_button.clone()),
            buttons: Polarity::ActiveHigh,
            pir: Box::new(self.pir.clone()),
            pir_polarity: Polarity::ActiveHigh,
            tamper,
        });
        let annunciator = PinAnnunciator::new(
            Box::new(self.red_light.clone()),
            Box::new(self.blue_light.clone()),
            Box::new(self.buzzer.clone()),
            Box::new(self.horn.clone()),
            dim_percent,
        );
        Ok((sampler, annunciator))
    }

    /// Whether any annunciator output is energised
    pub fn any_output_on(&self) -> bool {
        [&self.red_light, &self.blue_light, &self.buzzer, &self.horn]
            .iter()
            .any(|line| line.level())
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn sysfs_board_uses_chip_base() {
        let root = std::env::temp_dir().join(format!("rv-alarm-board-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        let pins = PinMap::default();
        let base = 100;
        let all = [
            pins.red_button,
            pins.blue_button,
            pins.pir,
            pins.red_light,
            pins.blue_light,
            pins.buzzer,
            pins.horn,
            pins.tamper_drive[0],
            pins.tamper_drive[1],
            pins.tamper_sense[0],
            pins.tamper_sense[1],
        ];
        for offset in all {
            let dir = root.join(format!("gpio{}", base + offset));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("value"), "0").unwrap();
        }

        let (_sampler, _ann) =
            sysfs_board(&root, base, &pins, InputPolarity::default(), 1).unwrap();
        assert_eq!(fs::read_to_string(root.join("gpio105/direction")).unwrap(), "in");
        assert_eq!(fs::read_to_string(root.join("gpio127/direction")).unwrap(), "low");
        // first tamper pattern is driven straight away
        assert_eq!(fs::read_to_string(root.join("gpio123/value")).unwrap(), "1");
        assert_eq!(fs::read_to_string(root.join("gpio124/value")).unwrap(), "0");
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn sim_board_starts_quiet() {
        let board = SimBoard::new();
        let (mut sampler, _ann) = board.build(1).unwrap();
        let inputs = sampler.sample().unwrap();
        assert!(!inputs.bike_wire_fault);
        assert!(!board.any_output_on());
    }
}
