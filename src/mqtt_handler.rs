use std::{
    error::Error,
    sync::Arc,
    time::{Duration, SystemTime},
};

use rumqttc::v5::{
    mqttbytes::{v5::Packet, QoS},
    AsyncClient, Event, EventLoop, MqttOptions,
};
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::AlarmEvent;

/// Publishes alarm transitions to the broker.
///     Takes in:
/// - event_rx: A receiver of every transition the controller applies
///
/// Each event is published retained, so a new subscriber sees the current state of each channel.
pub struct MqttProcessor {
    cancel_token: CancellationToken,
    event_rx: Receiver<AlarmEvent>,
}

/// processor options, these are static immutable settings
pub struct MqttProcessorOptions {
    /// host:port of the mqtt server
    pub mqtt_path: String,
}

impl MqttProcessor {
    /// Creates a new mqtt publisher
    pub fn new(
        cancel_token: CancellationToken,
        event_rx: Receiver<AlarmEvent>,
        opts: MqttProcessorOptions,
    ) -> Result<(MqttProcessor, MqttOptions), Box<dyn Error + Send + Sync>> {
        let (host, port) = split_url(&opts.mqtt_path)
            .ok_or_else(|| format!("Invalid MQTT URL {:?}, expected host:port", opts.mqtt_path))?;

        let mut mqtt_opts = MqttOptions::new(
            format!(
                "RvAlarm-{:?}",
                SystemTime::now()
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis()
            ),
            host,
            port,
        );
        mqtt_opts
            .set_keep_alive(Duration::from_secs(20))
            .set_clean_start(false)
            .set_connection_timeout(3);

        Ok((
            MqttProcessor {
                cancel_token,
                event_rx,
            },
            mqtt_opts,
        ))
    }

    /// This drives the connection and publishes events, returns once cancelled or the sender
    /// is gone.  Publishing never waits on the broker: while it is unreachable the client
    /// queue fills and further events are dropped.
    /// * `eventloop` - The eventloop returned by ::new to connect to
    /// * `client` - The async mqtt v5 client to publish with
    pub async fn process_mqtt(mut self, client: Arc<AsyncClient>, mut eventloop: EventLoop) {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!("Shutting down MQTT processor!");
                    break;
                },
                msg = eventloop.poll() => match msg {
                    Ok(Event::Incoming(Packet::ConnAck(..))) => {
                        info!("Connected to MQTT broker");
                    }
                    Err(e) => {
                        trace!("Recieved error: {}", e);
                        // back off so an absent broker does not spin the loop
                        tokio::select! {
                            _ = self.cancel_token.cancelled() => {
                                debug!("Shutting down MQTT processor!");
                                break;
                            },
                            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                        }
                    }
                    _ => {}
                },
                event = self.event_rx.recv() => {
                    let Some(event) = event else {
                        debug!("Event sender gone, stopping MQTT processor");
                        break;
                    };
                    trace!("Sending {:?}", event);
                    let Ok(bytes) = event_payload(&event) else {
                        warn!("Failed to serialize event!");
                        continue;
                    };
                    let topic = event.channel.state_topic();
                    if let Err(err) = client.try_publish(topic, QoS::AtLeastOnce, true, bytes) {
                        warn!("Dropping {:?}, could not queue MQTT message! {}", event, err);
                    }
                }
            }
        }
    }
}

/// JSON body of a published event
pub fn event_payload(event: &AlarmEvent) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(event)
}

fn split_url(path: &str) -> Option<(&str, u16)> {
    let (host, port) = path.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    Some((host, port.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{state::AlarmState, Channel};

    #[test]
    fn payload_is_json() {
        let event = AlarmEvent {
            channel: Channel::Interior,
            from: AlarmState::TrigDelay,
            to: AlarmState::Triggered,
            time_ms: 1730247194876,
        };
        let value: serde_json::Value =
            serde_json::from_slice(&event_payload(&event).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "channel": "Interior",
                "from": "trig_delay",
                "to": "triggered",
                "time_ms": 1730247194876u64,
            })
        );
    }

    #[test]
    fn url_needs_host_and_port() {
        assert_eq!(split_url("localhost:1883"), Some(("localhost", 1883)));
        assert_eq!(split_url("10.0.0.2:8883"), Some(("10.0.0.2", 8883)));
        assert_eq!(split_url("localhost"), None);
        assert_eq!(split_url(":1883"), None);
        assert_eq!(split_url("localhost:mqtt"), None);
    }

    #[tokio::test]
    async fn unreachable_broker_does_not_block_cancel() {
        let token = CancellationToken::new();
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let (processor, opts) = MqttProcessor::new(
            token.clone(),
            rx,
            MqttProcessorOptions {
                mqtt_path: "127.0.0.1:1".to_string(),
            },
        )
        .unwrap();
        // a client queue of one fills after the first event
        let (client, eventloop) = AsyncClient::new(opts, 1);
        let handle = tokio::spawn(processor.process_mqtt(Arc::new(client), eventloop));

        for n in 0..8 {
            tx.send(AlarmEvent {
                channel: Channel::Bike,
                from: AlarmState::On,
                to: AlarmState::Triggered,
                time_ms: n,
            })
            .await
            .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("processor did not stop after cancel")
            .unwrap();
    }
}
