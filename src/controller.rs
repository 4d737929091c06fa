//! Main loop driver: sample, step, mix, once per loop period

use std::{error::Error, time::Duration, time::Instant};

use chrono::{Local, Timelike, Utc};
use tokio::{
    sync::mpsc::{error::TrySendError, Sender},
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    config::{AlarmConfig, NightWindow},
    engine::{Engine, Transition},
    hardware::HwError,
    mixer::{Annunciator, Mixer, OutputPlan},
    sampler::Sampler,
    AlarmEvent, Channel,
};

/// Owns both channels and all hardware of the alarm
pub struct AlarmController {
    sampler: Sampler,
    engine: Engine,
    mixer: Mixer,
    annunciator: Box<dyn Annunciator>,
    loop_count: u64,
    read_failures: u32,
    tamper_log_cycles: u64,
    night: NightWindow,
    loop_delay: Duration,
    events: Option<Sender<AlarmEvent>>,
}

impl AlarmController {
    /// Creates a controller with both channels `Off`.
    /// * `events` - Optional, a sender of every transition, for publishing
    pub fn new(
        config: &AlarmConfig,
        sampler: Sampler,
        annunciator: Box<dyn Annunciator>,
        events: Option<Sender<AlarmEvent>>,
    ) -> Self {
        Self {
            sampler,
            engine: Engine::new(config),
            mixer: Mixer::new(config),
            annunciator,
            loop_count: 0,
            read_failures: 0,
            tamper_log_cycles: config.tamper_log_cycles.max(1),
            night: config.night,
            loop_delay: config.loop_delay,
            events,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn loop_count(&self) -> u64 {
        self.loop_count
    }

    /// Consecutive cycles whose inputs could not be read
    pub fn read_failures(&self) -> u32 {
        self.read_failures
    }

    /// Whether `hour` (local) is in the dimming window
    pub fn is_night(&self, hour: u32) -> bool {
        self.night.contains(hour)
    }

    /// Run one cycle at `now`. Returns the transitions applied and the plan driven.
    pub fn cycle(&mut self, now: Instant, night: bool) -> (Vec<Transition>, OutputPlan) {
        if self.engine.all_off() {
            self.loop_count = 1;
        } else {
            self.loop_count = self.loop_count.wrapping_add(1);
        }

        let inputs = match self.sampler.sample() {
            Ok(inputs) => {
                if self.read_failures > 0 {
                    info!("Inputs readable again after {} failed cycles", self.read_failures);
                }
                self.read_failures = 0;
                self.log_tamper();
                Some(inputs)
            }
            Err(err) => {
                self.read_failures += 1;
                warn!(
                    "Could not read inputs ({} cycles in a row): {}",
                    self.read_failures, err
                );
                None
            }
        };

        let applied = self.engine.step(inputs.as_ref(), now);
        for transition in &applied {
            self.publish(transition);
        }

        let plan = self.mixer.plan(
            self.engine.state(Channel::Interior),
            self.engine.state(Channel::Bike),
            self.loop_count,
            night,
        );
        trace!("Cycle {}: {:?}", self.loop_count, plan);
        if let Err(err) = Mixer::apply(&plan, self.annunciator.as_mut()) {
            warn!("Could not drive annunciator: {}", err);
        }

        (applied, plan)
    }

    fn log_tamper(&self) {
        let Some(reading) = self.sampler.last_tamper() else {
            return;
        };
        if reading.is_fault() || self.loop_count % self.tamper_log_cycles == 0 {
            debug!(
                "Tamper loop expected {:?} observed {:?}, cycle {}",
                reading.expected, reading.observed, self.loop_count
            );
        }
    }

    fn publish(&self, transition: &Transition) {
        let Some(ref events) = self.events else {
            return;
        };
        let event = AlarmEvent {
            channel: transition.channel,
            from: transition.from,
            to: transition.to,
            time_ms: Utc::now().timestamp_millis().max(0) as u64,
        };
        // never stall the loop on a slow broker
        match events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => warn!("Event queue full, dropping {:?}", event),
            Err(TrySendError::Closed(_)) => trace!("Event queue closed"),
        }
    }

    /// Drive every output off and release the tamper loop
    pub fn shutdown(&mut self) -> Result<(), HwError> {
        let outputs = self.annunciator.all_off();
        let tamper = self.sampler.release();
        outputs.and(tamper)
    }
}

/// Runs the alarm loop until cancelled, then leaves the outputs off
pub async fn alarm_runner(
    cancel_token: CancellationToken,
    mut controller: AlarmController,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    // interval panics on a zero period
    let mut ticker = interval(controller.loop_delay.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                debug!("Shutting down alarm loop!");
                controller.shutdown()?;
                info!("Outputs off");
                break Ok(());
            },
            tick = ticker.tick() => {
                let night = controller.is_night(Local::now().hour());
                controller.cycle(tick.into_std(), night);
            }
        }
    }
}
