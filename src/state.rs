//! Alarm lifecycle states and the per-channel record the engine mutates.

use std::{
    fmt,
    time::{Duration, Instant},
};

use serde::Serialize;

/// Lifecycle of a single alarm channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    /// Disarmed
    #[default]
    Off,
    /// Armed and watching
    On,
    /// Exit delay after arming
    Starting,
    /// A sensor tripped during the exit delay, silent
    StartError,
    /// Entry delay after a trip, before sounding
    TrigDelay,
    /// Sounding
    Triggered,
    /// Sounded for the maximum time, muted until disarmed
    Silenced,
}

impl AlarmState {
    /// Annunciation weights for this state.
    ///
    /// `0` is off, `1` steady on, `4` slow blink and `16` fast blink.
    pub const fn weights(self) -> Weights {
        match self {
            AlarmState::Off => Weights::new(0, 0, 0),
            AlarmState::Starting => Weights::new(4, 4, 0),
            AlarmState::StartError => Weights::new(16, 16, 0),
            AlarmState::On => Weights::new(1, 0, 0),
            AlarmState::TrigDelay => Weights::new(16, 16, 0),
            AlarmState::Triggered => Weights::new(16, 16, 1),
            AlarmState::Silenced => Weights::new(16, 16, 0),
        }
    }

    /// Whether a tamper or motion trip should be acted on in this state
    pub const fn is_watching(self) -> bool {
        matches!(self, AlarmState::On | AlarmState::Starting)
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlarmState::Off => "Off",
            AlarmState::On => "On",
            AlarmState::Starting => "Starting",
            AlarmState::StartError => "StartError",
            AlarmState::TrigDelay => "TrigDelay",
            AlarmState::Triggered => "Triggered",
            AlarmState::Silenced => "Silenced",
        };
        f.write_str(name)
    }
}

/// Severity weights of one channel for the three annunciation assets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weights {
    pub light: u8,
    pub buzzer: u8,
    pub horn: u8,
}

impl Weights {
    pub const fn new(light: u8, buzzer: u8, horn: u8) -> Self {
        Self {
            light,
            buzzer,
            horn,
        }
    }
}

/// One alarm circuit.
/// The state is only changed through [`AlarmChannel::set_state`] and [`AlarmChannel::trip`].
#[derive(Debug, Clone, Default)]
pub struct AlarmChannel {
    state: AlarmState,
    state_entry_time: Option<Instant>,
    alarm_trigger_time: Option<Instant>,
}

impl AlarmChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// When the channel last entered `Starting`
    pub fn state_entry_time(&self) -> Option<Instant> {
        self.state_entry_time
    }

    /// When the channel last tripped
    pub fn alarm_trigger_time(&self) -> Option<Instant> {
        self.alarm_trigger_time
    }

    /// Move to `state`, recording the entry time when arming starts.
    /// Returns the previous state.
    pub fn set_state(&mut self, state: AlarmState, now: Instant) -> AlarmState {
        if state == AlarmState::Starting {
            self.state_entry_time = Some(now);
        }
        std::mem::replace(&mut self.state, state)
    }

    /// Move to a triggered `state`, recording the trip time
    pub fn trip(&mut self, state: AlarmState, now: Instant) -> AlarmState {
        self.alarm_trigger_time = Some(now);
        self.set_state(state, now)
    }

    /// Time spent since arming started, zero if never armed
    pub fn since_entry(&self, now: Instant) -> Duration {
        self.state_entry_time
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default()
    }

    /// Time spent since the last trip, zero if never tripped
    pub fn since_trigger(&self, now: Instant) -> Duration {
        self.alarm_trigger_time
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_triggered_sounds_the_horn() {
        let all = [
            AlarmState::Off,
            AlarmState::On,
            AlarmState::Starting,
            AlarmState::StartError,
            AlarmState::TrigDelay,
            AlarmState::Triggered,
            AlarmState::Silenced,
        ];
        for state in all {
            assert_eq!(state.weights().horn == 1, state == AlarmState::Triggered);
        }
    }

    #[test]
    fn start_error_is_visible_but_has_no_horn() {
        let w = AlarmState::StartError.weights();
        assert_eq!(w, Weights::new(16, 16, 0));
    }

    #[test]
    fn starting_records_entry_time_only() {
        let t0 = Instant::now();
        let mut chan = AlarmChannel::new();
        assert_eq!(chan.set_state(AlarmState::Starting, t0), AlarmState::Off);
        assert_eq!(chan.state_entry_time(), Some(t0));
        assert_eq!(chan.alarm_trigger_time(), None);

        let t1 = t0 + Duration::from_secs(5);
        chan.set_state(AlarmState::On, t1);
        assert_eq!(chan.state_entry_time(), Some(t0));
        assert_eq!(chan.since_entry(t1), Duration::from_secs(5));
    }

    #[test]
    fn trip_records_trigger_time() {
        let t0 = Instant::now();
        let mut chan = AlarmChannel::new();
        chan.set_state(AlarmState::On, t0);
        let t1 = t0 + Duration::from_secs(3);
        assert_eq!(chan.trip(AlarmState::TrigDelay, t1), AlarmState::On);
        assert_eq!(chan.alarm_trigger_time(), Some(t1));
        assert_eq!(chan.since_trigger(t1 + Duration::from_secs(2)), Duration::from_secs(2));
    }

    #[test]
    fn serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&AlarmState::StartError).unwrap(),
            "\"start_error\""
        );
    }
}
