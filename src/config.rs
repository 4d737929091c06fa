//! Timing and behaviour settings of the alarm controller

use std::time::Duration;

/// How button presses are held off after a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebounceMode {
    /// Both buttons share one hold-off clock, so a press on one suppresses the other
    #[default]
    Shared,
    /// Each button has its own hold-off clock
    PerChannel,
}

/// Local hours during which steady lights are dimmed.
/// The window may wrap midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightWindow {
    /// First dimmed hour
    pub start_hour: u32,
    /// First full brightness hour
    pub end_hour: u32,
}

impl NightWindow {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

impl Default for NightWindow {
    fn default() -> Self {
        Self {
            start_hour: 20,
            end_hour: 8,
        }
    }
}

/// Settings for one controller
#[derive(Debug, Clone)]
pub struct AlarmConfig {
    /// Exit delay after arming and entry delay after a trip
    pub entry_exit_delay: Duration,
    /// How long the horn may sound before the channel is silenced
    pub max_alarm: Duration,
    /// Period of the polling loop
    pub loop_delay: Duration,
    /// Blink toggle period for fast blinking, in cycles
    pub fast_blink_cycles: u64,
    /// Blink toggle period for slow blinking, in cycles. Must be a multiple of the fast period
    pub slow_blink_cycles: u64,
    /// Minimum time between two accepted button toggles
    pub button_debounce: Duration,
    pub debounce_mode: DebounceMode,
    pub night: NightWindow,
    /// Duty cycle in percent of a dimmed steady light
    pub dim_percent: u8,
    /// Keep the buzzer and horn relays de-energised
    pub quiet: bool,
    /// Cycles between two tamper loop health records
    pub tamper_log_cycles: u64,
}

impl AlarmConfig {
    /// Maximum alarm time given in whole minutes
    pub fn with_max_alarm_minutes(mut self, minutes: u64) -> Self {
        self.max_alarm = Duration::from_secs(minutes.saturating_mul(60));
        self
    }
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            entry_exit_delay: Duration::from_secs(30),
            max_alarm: Duration::from_secs(2 * 60),
            loop_delay: Duration::from_millis(300),
            fast_blink_cycles: 1,
            slow_blink_cycles: 6,
            button_debounce: Duration::from_secs(1),
            debounce_mode: DebounceMode::Shared,
            night: NightWindow::default(),
            dim_percent: 1,
            quiet: false,
            tamper_log_cycles: 14400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn night_window_wraps_midnight() {
        let night = NightWindow::default();
        assert!(night.contains(20));
        assert!(night.contains(23));
        assert!(night.contains(0));
        assert!(night.contains(7));
        assert!(!night.contains(8));
        assert!(!night.contains(12));
        assert!(!night.contains(19));
    }

    #[test]
    fn night_window_same_day() {
        let window = NightWindow {
            start_hour: 1,
            end_hour: 5,
        };
        assert!(window.contains(1));
        assert!(window.contains(4));
        assert!(!window.contains(5));
        assert!(!window.contains(0));
    }

    #[test]
    fn max_alarm_minutes() {
        let conf = AlarmConfig::default().with_max_alarm_minutes(5);
        assert_eq!(conf.max_alarm, Duration::from_secs(300));
        assert_eq!(AlarmConfig::default().max_alarm, Duration::from_secs(120));
        let conf = AlarmConfig::default().with_max_alarm_minutes(u64::MAX);
        assert_eq!(conf.max_alarm, Duration::from_secs(u64::MAX));
    }
}
