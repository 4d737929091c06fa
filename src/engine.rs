//! The state machine engine: applies button toggles, sensor trips and timers to both
//! channels once per cycle.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::{
    config::{AlarmConfig, DebounceMode},
    sampler::Inputs,
    state::{AlarmChannel, AlarmState},
    Channel,
};

/// What caused a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    Button,
    Tamper,
    Motion,
    Timer,
}

/// A transition applied during a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub channel: Channel,
    pub from: AlarmState,
    pub to: AlarmState,
    pub cause: Cause,
}

/// Owns both alarm channels
#[derive(Debug, Clone)]
pub struct Engine {
    interior: AlarmChannel,
    bike: AlarmChannel,
    /// Last accepted toggle per channel; in shared mode only the first slot is used
    last_button: [Option<Instant>; 2],
    entry_exit_delay: Duration,
    max_alarm: Duration,
    button_debounce: Duration,
    debounce_mode: DebounceMode,
}

impl Engine {
    /// Both channels start `Off`
    pub fn new(config: &AlarmConfig) -> Self {
        Self {
            interior: AlarmChannel::new(),
            bike: AlarmChannel::new(),
            last_button: [None; 2],
            entry_exit_delay: config.entry_exit_delay,
            max_alarm: config.max_alarm,
            button_debounce: config.button_debounce,
            debounce_mode: config.debounce_mode,
        }
    }

    pub fn channel(&self, channel: Channel) -> &AlarmChannel {
        match channel {
            Channel::Interior => &self.interior,
            Channel::Bike => &self.bike,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut AlarmChannel {
        match channel {
            Channel::Interior => &mut self.interior,
            Channel::Bike => &mut self.bike,
        }
    }

    pub fn state(&self, channel: Channel) -> AlarmState {
        self.channel(channel).state()
    }

    pub fn all_off(&self) -> bool {
        self.interior.state() == AlarmState::Off && self.bike.state() == AlarmState::Off
    }

    /// Run one cycle of rules at `now`.
    ///
    /// `inputs` is `None` when the inputs could not be read; only the timers run then,
    /// a failed read is never taken as "nothing happened".
    pub fn step(&mut self, inputs: Option<&Inputs>, now: Instant) -> Vec<Transition> {
        let mut applied = Vec::new();

        match inputs {
            Some(inputs) => {
                for channel in Channel::ALL {
                    if inputs.pressed(channel) {
                        self.press(channel, now, &mut applied);
                    }
                }
                self.check_bike_wire(inputs.bike_wire_fault, now, &mut applied);
                self.check_interior(inputs.pir_triggered, now, &mut applied);
            }
            None => debug!("Inputs unavailable, only running timers"),
        }

        for channel in Channel::ALL {
            self.update_timed(channel, now, &mut applied);
        }

        applied
    }

    fn debounce_slot(&self, channel: Channel) -> usize {
        match (self.debounce_mode, channel) {
            (DebounceMode::Shared, _) | (DebounceMode::PerChannel, Channel::Interior) => 0,
            (DebounceMode::PerChannel, Channel::Bike) => 1,
        }
    }

    fn press(&mut self, channel: Channel, now: Instant, applied: &mut Vec<Transition>) {
        let slot = self.debounce_slot(channel);
        let held_off = self.last_button[slot]
            .is_some_and(|last| now.saturating_duration_since(last) < self.button_debounce);
        if held_off {
            debug!("{} button ignored, within debounce", channel.color());
            return;
        }
        self.last_button[slot] = Some(now);

        let to = if self.state(channel) == AlarmState::Off {
            info!("{} Starting", channel.color());
            AlarmState::Starting
        } else {
            info!("{} Stopping", channel.color());
            AlarmState::Off
        };
        self.set(channel, to, Cause::Button, now, applied);
    }

    fn check_bike_wire(&mut self, fault: bool, now: Instant, applied: &mut Vec<Transition>) {
        let state = self.bike.state();
        if !fault || !state.is_watching() {
            return;
        }
        if state == AlarmState::Starting {
            warn!("Bike tamper loop open while arming");
            self.set(Channel::Bike, AlarmState::StartError, Cause::Tamper, now, applied);
        } else {
            // no entry delay on the bike loop
            info!("Bike Alarm triggered");
            self.trip(Channel::Bike, AlarmState::Triggered, Cause::Tamper, now, applied);
        }
    }

    fn check_interior(&mut self, pir_triggered: bool, now: Instant, applied: &mut Vec<Transition>) {
        if !pir_triggered {
            return;
        }
        match self.interior.state() {
            AlarmState::Starting => {
                warn!("Interior motion while arming");
                self.set(Channel::Interior, AlarmState::StartError, Cause::Motion, now, applied);
            }
            AlarmState::On => {
                info!("Interior Alarm triggered");
                self.trip(Channel::Interior, AlarmState::TrigDelay, Cause::Motion, now, applied);
            }
            _ => {}
        }
    }

    fn update_timed(&mut self, channel: Channel, now: Instant, applied: &mut Vec<Transition>) {
        let chan = self.channel(channel);
        let to = match chan.state() {
            AlarmState::Starting | AlarmState::StartError
                if chan.since_entry(now) > self.entry_exit_delay =>
            {
                AlarmState::On
            }
            AlarmState::TrigDelay if chan.since_trigger(now) > self.entry_exit_delay => {
                AlarmState::Triggered
            }
            AlarmState::Triggered if chan.since_trigger(now) > self.max_alarm => {
                AlarmState::Silenced
            }
            _ => return,
        };
        info!("{} {} -> {}", channel, chan.state(), to);
        self.set(channel, to, Cause::Timer, now, applied);
    }

    fn set(
        &mut self,
        channel: Channel,
        to: AlarmState,
        cause: Cause,
        now: Instant,
        applied: &mut Vec<Transition>,
    ) {
        let from = self.channel_mut(channel).set_state(to, now);
        applied.push(Transition {
            channel,
            from,
            to,
            cause,
        });
    }

    fn trip(
        &mut self,
        channel: Channel,
        to: AlarmState,
        cause: Cause,
        now: Instant,
        applied: &mut Vec<Transition>,
    ) {
        let from = self.channel_mut(channel).trip(to, now);
        applied.push(Transition {
            channel,
            from,
            to,
            cause,
        });
    }
}
