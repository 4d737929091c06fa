use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use rumqttc::v5::AsyncClient;
use rv_alarm::{
    board::{sysfs_board, InputPolarity, PinMap, SimBoard},
    config::{AlarmConfig, DebounceMode},
    controller::{alarm_runner, AlarmController},
    hardware::{sysfs::GPIO_CLASS_ROOT, Polarity},
    mqtt_handler::{MqttProcessor, MqttProcessorOptions},
    AlarmEvent,
};
use tokio::{
    signal::{
        self,
        unix::{signal as unix_signal, SignalKind},
    },
    sync::mpsc,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// rv-alarm command line arguments
#[derive(Parser, Debug)]
#[command(version)]
struct AlarmArgs {
    /// Run on in-memory lines instead of GPIO
    #[arg(long, env = "RV_ALARM_MOCK")]
    mock: bool,

    /// Never energise the buzzer or horn
    #[arg(short = 'q', long, env = "RV_ALARM_QUIET")]
    quiet: bool,

    /// Give each button its own debounce clock instead of one shared clock
    #[arg(long, env = "RV_ALARM_PER_CHANNEL_DEBOUNCE")]
    per_channel_debounce: bool,

    /// The MQTT broker to publish transitions to, host:port.  Publishing is off if unset
    #[arg(short = 'u', long, env = "RV_ALARM_MQTT_URL")]
    mqtt_url: Option<String>,

    /// The GPIO class directory
    #[arg(long, default_value = GPIO_CLASS_ROOT, env = "RV_ALARM_GPIO_ROOT")]
    gpio_root: PathBuf,

    /// Number of the first line of the GPIO chip (non zero on a Pi 5)
    #[arg(long, default_value_t = 0, env = "RV_ALARM_GPIO_BASE")]
    gpio_base: u32,

    /// Buttons pull the line low when pressed
    #[arg(long, env = "RV_ALARM_BUTTONS_ACTIVE_LOW")]
    buttons_active_low: bool,

    /// The PIR pulls the line low on motion
    #[arg(long, env = "RV_ALARM_PIR_ACTIVE_LOW")]
    pir_active_low: bool,

    /// Exit and entry delay, seconds
    #[arg(long, default_value_t = 30, env = "RV_ALARM_ENTRY_EXIT_DELAY")]
    entry_exit_delay: u64,

    /// Longest time the horn sounds before silencing, minutes
    #[arg(long, default_value_t = 2, env = "RV_ALARM_MAX_ALARM_MINUTES")]
    max_alarm_minutes: u64,

    /// Loop period, milliseconds
    #[arg(
        long,
        default_value_t = 300,
        env = "RV_ALARM_LOOP_DELAY_MS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    loop_delay_ms: u64,

    #[arg(long, default_value_t = 6, env = "RV_ALARM_RED_BUTTON")]
    red_button: u32,
    #[arg(long, default_value_t = 13, env = "RV_ALARM_BLUE_BUTTON")]
    blue_button: u32,
    #[arg(long, default_value_t = 5, env = "RV_ALARM_PIR")]
    pir: u32,
    #[arg(long, default_value_t = 12, env = "RV_ALARM_RED_LIGHT")]
    red_light: u32,
    #[arg(long, default_value_t = 19, env = "RV_ALARM_BLUE_LIGHT")]
    blue_light: u32,
    #[arg(long, default_value_t = 22, env = "RV_ALARM_BUZZER")]
    buzzer: u32,
    #[arg(long, default_value_t = 27, env = "RV_ALARM_HORN")]
    horn: u32,

    /// Tamper loop, drive line of the first conductor
    #[arg(long, default_value_t = 23, env = "RV_ALARM_TAMPER_DRIVE_A")]
    tamper_drive_a: u32,
    /// Tamper loop, drive line of the second conductor
    #[arg(long, default_value_t = 24, env = "RV_ALARM_TAMPER_DRIVE_B")]
    tamper_drive_b: u32,
    /// Tamper loop, sense line of the first conductor
    #[arg(long, default_value_t = 25, env = "RV_ALARM_TAMPER_SENSE_A")]
    tamper_sense_a: u32,
    /// Tamper loop, sense line of the second conductor
    #[arg(long, default_value_t = 26, env = "RV_ALARM_TAMPER_SENSE_B")]
    tamper_sense_b: u32,
}

impl AlarmArgs {
    fn config(&self) -> AlarmConfig {
        AlarmConfig {
            entry_exit_delay: Duration::from_secs(self.entry_exit_delay),
            loop_delay: Duration::from_millis(self.loop_delay_ms),
            debounce_mode: if self.per_channel_debounce {
                DebounceMode::PerChannel
            } else {
                DebounceMode::Shared
            },
            quiet: self.quiet,
            ..Default::default()
        }
        .with_max_alarm_minutes(self.max_alarm_minutes)
    }

    fn pins(&self) -> PinMap {
        PinMap {
            red_button: self.red_button,
            blue_button: self.blue_button,
            pir: self.pir,
            red_light: self.red_light,
            blue_light: self.blue_light,
            buzzer: self.buzzer,
            horn: self.horn,
            tamper_drive: [self.tamper_drive_a, self.tamper_drive_b],
            tamper_sense: [self.tamper_sense_a, self.tamper_sense_b],
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = AlarmArgs::parse();

    println!("Initializing rv alarm...");
    println!("Initializing fmt subscriber");
    // construct a subscriber that prints formatted traces to stdout
    // if RUST_LOG is not set, defaults to loglevel INFO
    let subscriber = tracing_subscriber::fmt()
        .with_thread_ids(true)
        .with_ansi(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .finish();
    // use that subscriber to process traces emitted after this point
    tracing::subscriber::set_global_default(subscriber).expect("Could not init tracing");

    let config = cli.config();
    if config.quiet {
        warn!("Quiet mode, buzzer and horn stay off!");
    }

    let (sampler, annunciator) = if cli.mock {
        info!("Using mock hardware");
        SimBoard::new()
            .build(config.dim_percent)
            .expect("Could not build mock board")
    } else {
        sysfs_board(
            &cli.gpio_root,
            cli.gpio_base,
            &cli.pins(),
            InputPolarity {
                buttons: Polarity::from_active_low(cli.buttons_active_low),
                pir: Polarity::from_active_low(cli.pir_active_low),
            },
            config.dim_percent,
        )
        .expect("Could not open GPIO lines")
    };

    let task_tracker = TaskTracker::new();
    let token = CancellationToken::new();

    // channel to pass transitions to the publisher, only if publishing
    let event_tx = if let Some(mqtt_url) = cli.mqtt_url.clone() {
        let (event_tx, event_rx) = mpsc::channel::<AlarmEvent>(100);
        info!("Running MQTT publisher");
        let (processor, opts) = MqttProcessor::new(
            token.clone(),
            event_rx,
            MqttProcessorOptions {
                mqtt_path: mqtt_url,
            },
        )
        .expect("Invalid MQTT options");
        let (client, eventloop) = AsyncClient::new(opts, 100);
        task_tracker.spawn(processor.process_mqtt(Arc::new(client), eventloop));
        Some(event_tx)
    } else {
        None
    };

    info!("Running alarm loop");
    let controller = AlarmController::new(&config, sampler, Box::new(annunciator), event_tx);
    let alarm = task_tracker.spawn(alarm_runner(token.clone(), controller));

    task_tracker.close();

    info!("Initialization complete, ready...");
    info!("Use Ctrl+C, SIGINT or SIGTERM to exit cleanly!");

    let mut sigterm = unix_signal(SignalKind::terminate()).expect("Could not listen for SIGTERM");
    tokio::select! {
        res = signal::ctrl_c() => res.expect("Could not read cancellation trigger (ctr+c)"),
        _ = sigterm.recv() => {},
    }
    info!("Received exit signal, shutting down!");
    token.cancel();
    task_tracker.wait().await;

    match alarm.await {
        Ok(Ok(())) => info!("Alarm loop stopped cleanly"),
        Ok(Err(err)) => warn!("Alarm loop stopped with error: {}", err),
        Err(err) => warn!("Alarm loop panicked: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_loop_delay_is_rejected() {
        assert!(AlarmArgs::try_parse_from(["rv-alarm", "--loop-delay-ms", "0"]).is_err());
        let args = AlarmArgs::try_parse_from(["rv-alarm", "--loop-delay-ms", "1"]).unwrap();
        assert_eq!(args.config().loop_delay, Duration::from_millis(1));
    }

    #[test]
    fn huge_alarm_time_saturates() {
        let max = u64::MAX.to_string();
        let args =
            AlarmArgs::try_parse_from(["rv-alarm", "--max-alarm-minutes", max.as_str()]).unwrap();
        assert_eq!(args.config().max_alarm, Duration::from_secs(u64::MAX));
    }
}
