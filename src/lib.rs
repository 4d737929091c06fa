pub mod mqtt_handler;

// MODULES
pub mod board;
pub mod config;
pub mod controller;
pub mod engine;
pub mod hardware;
pub mod mixer;
pub mod sampler;
pub mod state;

use std::fmt;

use serde::Serialize;

use crate::state::AlarmState;

/// One of the two independent alarm circuits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    /// PIR motion sensor, red button and light
    Interior,
    /// Tamper loop, blue button and light
    Bike,
}

impl Channel {
    /// Both channels, in evaluation order
    pub const ALL: [Channel; 2] = [Channel::Interior, Channel::Bike];

    /// The colour of the button and light wired to this channel
    pub fn color(self) -> &'static str {
        match self {
            Channel::Interior => "Red",
            Channel::Bike => "Blue",
        }
    }

    /// The topic transitions of this channel are published on
    pub fn state_topic(self) -> &'static str {
        match self {
            Channel::Interior => INTERIOR_STATE_TOPIC,
            Channel::Bike => BIKE_STATE_TOPIC,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Interior => write!(f, "Interior"),
            Channel::Bike => write!(f, "Bike"),
        }
    }
}

/// A state transition to be published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlarmEvent {
    pub channel: Channel,
    pub from: AlarmState,
    pub to: AlarmState,
    /// Wall clock time of the transition, ms since the unix epoch
    pub time_ms: u64,
}

/// the topic interior channel transitions are published to
pub const INTERIOR_STATE_TOPIC: &str = "RV/Alarm/Interior/State";

/// the topic bike channel transitions are published to
pub const BIKE_STATE_TOPIC: &str = "RV/Alarm/Bike/State";
