// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! MQTT telemetry publisher
//!
//! Messages go out at QoS 1. A publish completes when the broker's PUBACK
//! arrives, so an unacknowledged message stays pending in the client and is
//! sent again after a reconnection.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time;

use super::TelemetryPublisher;
use crate::config::MqttConfig;

const REQUEST_CAPACITY: usize = 16;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Telemetry over an MQTT broker with at-least-once delivery
///
/// The connection is driven by a background task polling the rumqttc event
/// loop. Publishes are serialized so that each one waits for its own
/// acknowledgement. A publish that is not acknowledged within the timeout
/// drops the connection, the event loop reconnects on its next poll.
pub struct MqttTelemetryPublisher {
    client: AsyncClient,
    acks: broadcast::Sender<u16>,
    reconnect: Arc<Notify>,
    in_flight: Mutex<()>,
    publish_timeout: Duration,
    driver: JoinHandle<()>,
}

impl std::fmt::Debug for MqttTelemetryPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTelemetryPublisher")
            .field("publish_timeout", &self.publish_timeout)
            .finish_non_exhaustive()
    }
}

/// Build the client options: endpoint, credentials, keep-alive and TLS
pub fn mqtt_options(config: &MqttConfig) -> Result<MqttOptions> {
    let endpoint = config.endpoint()?;
    let mut options = MqttOptions::new(config.client_id.clone(), endpoint.host, endpoint.port);
    options.set_keep_alive(config.keep_alive());

    if let Some(username) = &config.username {
        options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
    }

    if endpoint.tls {
        let ca_file = config
            .ca_file
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("MQTT over TLS needs a trust store"))?;
        let ca = fs::read(ca_file)
            .with_context(|| format!("Failed to read MQTT trust store {:?}", ca_file))?;
        let client_auth = match (&config.cert_file, &config.key_file) {
            (Some(cert_file), Some(key_file)) => Some((
                fs::read(cert_file).with_context(|| {
                    format!("Failed to read MQTT client certificate {:?}", cert_file)
                })?,
                fs::read(key_file)
                    .with_context(|| format!("Failed to read MQTT client key {:?}", key_file))?,
            )),
            _ => None,
        };
        options.set_transport(Transport::tls(ca, client_auth, None));
    }

    Ok(options)
}

impl MqttTelemetryPublisher {
    /// Connect to the broker
    ///
    /// Fails when the broker does not accept the connection within
    /// `publish_timeout`.
    pub async fn connect(config: &MqttConfig, publish_timeout: Duration) -> Result<Self> {
        let options = mqtt_options(config)?;
        info!("Connecting to MQTT broker at {}", config.url);

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (acks, _) = broadcast::channel(REQUEST_CAPACITY);
        let (connected_tx, mut connected) = watch::channel(false);
        let reconnect = Arc::new(Notify::new());

        let driver = tokio::spawn(drive_event_loop(
            event_loop,
            acks.clone(),
            connected_tx,
            reconnect.clone(),
        ));

        let publisher = Self {
            client,
            acks,
            reconnect,
            in_flight: Mutex::new(()),
            publish_timeout,
            driver,
        };

        let result = match time::timeout(publish_timeout, connected.wait_for(|up| *up)).await {
            Ok(Ok(_)) => Ok(publisher),
            Ok(Err(_)) => anyhow::bail!("MQTT event loop stopped before connecting"),
            Err(_) => anyhow::bail!(
                "MQTT broker {} did not accept the connection within {:?}",
                config.url,
                publish_timeout
            ),
        };
        result
    }
}

impl Drop for MqttTelemetryPublisher {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

async fn drive_event_loop(
    mut event_loop: EventLoop,
    acks: broadcast::Sender<u16>,
    connected: watch::Sender<bool>,
    reconnect: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = reconnect.notified() => {
                connected.send_replace(false);
                event_loop.clean();
            }
            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to MQTT broker");
                    connected.send_replace(true);
                }
                Ok(Event::Incoming(Packet::PubAck(ack))) => {
                    // No receiver means nobody is waiting, e.g. a late retransmit
                    let _ = acks.send(ack.pkid);
                }
                Ok(_) => {}
                Err(e) => {
                    if *connected.borrow() {
                        warn!("MQTT connection lost: {}", e);
                    } else {
                        debug!("MQTT connection attempt failed: {}", e);
                    }
                    connected.send_replace(false);
                    time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
}

#[async_trait]
impl TelemetryPublisher for MqttTelemetryPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        let _in_flight = self.in_flight.lock().await;
        let mut acks = self.acks.subscribe();

        let delivery = async {
            self.client
                .publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
                .await?;
            match acks.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => Ok(()),
                Err(broadcast::error::RecvError::Closed) => {
                    Err(anyhow::anyhow!("MQTT event loop stopped"))
                }
            }
        };

        match time::timeout(self.publish_timeout, delivery).await {
            Ok(Ok(())) => {
                debug!("Published on {}, acknowledged by the broker", topic);
                Ok(())
            }
            Ok(Err(e)) => {
                self.reconnect.notify_one();
                Err(anyhow::anyhow!("Publish on {} failed: {}", topic, e))
            }
            Err(_) => {
                warn!(
                    "Publish on {} not acknowledged after {:?}, reconnecting",
                    topic, self.publish_timeout
                );
                self.reconnect.notify_one();
                Err(anyhow::anyhow!(
                    "Publish on {} timed out after {:?}",
                    topic,
                    self.publish_timeout
                ))
            }
        }
    }
}
