// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Telemetry publication of rotor snapshots
//!
//! One JSON message per rotor and publish round, on the topic
//! `TS{unit}/Rotor{name}`. The MQTT transport delivers at least once (QoS 1),
//! the Redis pub/sub transport at most once. Either way a failed publish is
//! logged by the caller and does not stop the round.

pub mod mqtt;
pub mod redis;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;

pub use self::mqtt::MqttTelemetryPublisher;
pub use self::redis::RedisTelemetryPublisher;

#[async_trait]
pub trait TelemetryPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()>;
}

/// Topic of one rotor's telemetry
pub fn rotor_topic(unit: &str, rotor: &str) -> String {
    format!("TS{}/Rotor{}", unit, rotor)
}

/// Publisher keeping every message in memory, for diagnostics and tests
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<(String, String)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages published so far, as `(topic, payload)`
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TelemetryPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        self.messages
            .lock()
            .map_err(|_| anyhow::anyhow!("recording publisher lock poisoned"))?
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotor_topic() {
        assert_eq!(rotor_topic("2", "LP1"), "TS2/RotorLP1");
    }

    #[tokio::test]
    async fn test_recording_publisher() {
        let publisher = RecordingPublisher::new();
        publisher.publish("TS1/RotorA", "{}").await.unwrap();
        assert_eq!(
            publisher.messages(),
            vec![("TS1/RotorA".to_string(), "{}".to_string())]
        );
    }
}
