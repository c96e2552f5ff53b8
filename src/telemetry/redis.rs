// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Redis pub/sub telemetry publisher

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use redis::AsyncCommands;

use super::TelemetryPublisher;
use crate::storage::RedisConnection;

pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes each message on the Redis channel named after its topic
///
/// A publish that fails or exceeds the timeout drops the shared connection,
/// the next publish reconnects.
#[derive(Debug)]
pub struct RedisTelemetryPublisher {
    connection: Arc<RedisConnection>,
    publish_timeout: Duration,
}

impl RedisTelemetryPublisher {
    pub fn new(connection: Arc<RedisConnection>, publish_timeout: Duration) -> Self {
        Self {
            connection,
            publish_timeout,
        }
    }
}

#[async_trait]
impl TelemetryPublisher for RedisTelemetryPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        let mut conn = self.connection.get_connection().await?;
        let result: Result<redis::RedisResult<i64>, _> =
            tokio::time::timeout(self.publish_timeout, conn.publish(topic, payload)).await;

        match result {
            Ok(Ok(receivers)) => {
                debug!("Published on {} to {} subscriber(s)", topic, receivers);
                Ok(())
            }
            Ok(Err(e)) => {
                self.connection.invalidate().await;
                Err(anyhow::anyhow!("Publish on {} failed: {}", topic, e))
            }
            Err(_) => {
                self.connection.invalidate().await;
                Err(anyhow::anyhow!(
                    "Publish on {} timed out after {:?}",
                    topic,
                    self.publish_timeout
                ))
            }
        }
    }
}
