//! rumqttc-backed publisher

use async_trait::async_trait;
use floorsensor_core::OutboundEvent;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::publisher::{PublishError, Publisher};

/// Pause before the event loop retries after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,
    /// 0 = at most once, 1 = at least once, 2 = exactly once
    pub qos: u8,
    pub retain: bool,
    /// Requests buffered between the client handle and the event loop
    pub capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "sentient-floorsensor".to_string(),
            keep_alive_secs: 30,
            qos: 0,
            retain: false,
            capacity: 100,
        }
    }
}

impl MqttConfig {
    pub fn qos(&self) -> QoS {
        match self.qos {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        }
    }
}

/// Publisher holding a rumqttc client; the connection lives in a background task
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    qos: QoS,
    retain: bool,
}

impl MqttPublisher {
    /// Create the client and spawn the task that drives its event loop.
    ///
    /// The broker connection is established lazily by that task and
    /// re-established after errors, so this never fails. The task ends once
    /// a requested disconnect has been sent.
    pub fn connect(config: &MqttConfig) -> (Self, JoinHandle<()>) {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        let (client, mut eventloop) = AsyncClient::new(options, config.capacity);

        let broker = format!("{}:{}", config.host, config.port);
        let driver = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(broker = %broker, "MQTT connected");
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!(broker = %broker, "MQTT disconnected by broker");
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        info!(broker = %broker, "MQTT disconnected");
                        break;
                    }
                    Ok(event) => {
                        debug!(?event, "MQTT event");
                    }
                    Err(e) => {
                        warn!(broker = %broker, error = %e, "MQTT connection error");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        });

        let publisher = Self {
            client,
            qos: config.qos(),
            retain: config.retain,
        };
        (publisher, driver)
    }

    /// Ask the broker for a clean disconnect after the queued publishes
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "MQTT disconnect request not delivered");
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, event: &OutboundEvent) -> Result<(), PublishError> {
        self.client
            .publish(
                event.topic.clone(),
                self.qos,
                self.retain,
                event.value.clone().into_bytes(),
            )
            .await
            .map_err(|e| PublishError::Rejected {
                topic: event.topic.clone(),
                reason: e.to_string(),
            })
    }
}
