use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{Incoming, Outgoing};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::fimp::{FimpAddress, FimpMessage, Publisher, PublishError};

pub struct MqttClient {
    client: AsyncClient,
    event_loop: EventLoop,
    subscriptions: Vec<String>,
}

#[derive(Debug)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Bytes,
}

// Small abstraction on top of rumqttc::EventLoop,
// to make mqtt messages easier to work with in the rest of the application.
impl MqttClient {
    pub fn new(config: &Config) -> MqttClient {
        let (host, port) = config.mqtt_host_port();
        let mut mqtt_options = MqttOptions::new(config.mqtt_client_id(), host, port);
        mqtt_options
            .set_keep_alive(Duration::from_secs(30))
            .set_max_packet_size(1024 * 1024, 1024 * 1024);
        if !config.mqtt_username.is_empty() {
            mqtt_options.set_credentials(
                config.mqtt_username.clone(),
                config.mqtt_password.clone(),
            );
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, 50);

        MqttClient {
            client,
            event_loop,
            subscriptions: Vec::new(),
        }
    }

    // subscriptions are resent after every connect
    pub fn subscribe(&mut self, topic: String) {
        self.subscriptions.push(topic);
    }

    pub fn run(self) -> (JoinHandle<()>, mpsc::Receiver<MqttMessage>, AsyncClient) {
        let (tx, rx) = mpsc::channel(32);
        let MqttClient {
            client,
            mut event_loop,
            subscriptions,
        } = self;

        let handle = tokio::spawn({
            let client = client.clone();

            async move {
                loop {
                    let event = event_loop.poll().await;

                    match event {
                        Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                            info!("mqtt transport connected");
                            for topic in &subscriptions {
                                let result = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce);
                                if let Err(e) = result {
                                    error!("cannot subscribe to {}: {:?}", topic, e);
                                }
                            }
                        }
                        Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                            // queued publishes went out ahead of the disconnect
                            info!("mqtt transport disconnected");
                            break;
                        }
                        Ok(event) => {
                            let result = MqttClient::handle_event(event);
                            if let Some(msg) = result {
                                if let Err(e) = tx.send(msg).await {
                                    error!("cannot send to mqtt message channel: {:?}", e);
                                    break; // break event loop if channel is closed
                                }
                            }
                        }
                        Err(e) => {
                            // rumqttc reconnects on the next poll
                            error!("rumqttc polling error: {:?}", e);
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        });

        (handle, rx, client)
    }

    fn handle_event(event: Event) -> Option<MqttMessage> {
        match event {
            Event::Incoming(Incoming::Publish(p)) => {
                debug!("Topic: {}, Payload: {:?}", p.topic, p.payload);

                Option::Some(MqttMessage {
                    topic: p.topic,
                    payload: p.payload,
                })
            }
            _ => Option::None,
        }
    }
}

impl MqttMessage {
    pub fn decode(&self) -> Result<(FimpAddress, FimpMessage), crate::fimp::FimpError> {
        let addr = FimpAddress::parse(&self.topic)?;
        let msg = FimpMessage::from_slice(&self.payload)?;
        Ok((addr, msg))
    }
}

// A full request queue (broker down) fails the publish instead of waiting.
pub struct MqttPublisher {
    client: AsyncClient,
    global_prefix: String,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient, global_prefix: &str) -> Self {
        MqttPublisher {
            client,
            global_prefix: global_prefix.to_string(),
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, addr: &FimpAddress, msg: &FimpMessage) -> Result<(), PublishError> {
        let payload = msg.to_vec().map_err(|e| PublishError(e.to_string()))?;

        self.client
            .try_publish(addr.topic(&self.global_prefix), QoS::AtLeastOnce, false, payload)
            .map_err(|e| PublishError(e.to_string()))
    }
}
