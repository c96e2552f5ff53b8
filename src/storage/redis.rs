// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Redis backed counter store
//!
//! A single multiplexed connection is shared by all rotors. When a command
//! fails the connection is dropped and re-established by the next caller.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{error, info, warn};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tokio::sync::Mutex;

use super::CounterStore;

/// Shared Redis client with a lazily re-opened multiplexed connection
pub struct RedisConnection {
    url: String,
    client: Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnection")
            .field("url", &self.url)
            .finish()
    }
}

impl RedisConnection {
    /// Open the client and verify the server answers
    ///
    /// # Errors
    ///
    /// An invalid URL, a refused connection or a failed `ECHO` probe.
    pub async fn connect(url: &str) -> Result<Self> {
        let client =
            Client::open(url).with_context(|| format!("Invalid Redis URL {}", url))?;
        let connection = Self {
            url: url.to_string(),
            client,
            connection: Mutex::new(None),
        };

        let mut conn = connection.get_connection().await?;
        let _: String = redis::cmd("ECHO")
            .arg("connection_test")
            .query_async(&mut conn)
            .await
            .with_context(|| format!("Redis connection test failed on {}", url))?;
        info!("Connected to Redis at {}", url);
        Ok(connection)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// A handle on the shared connection, opened if needed
    pub async fn get_connection(&self) -> Result<MultiplexedConnection> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => {
                *slot = Some(conn.clone());
                Ok(conn)
            }
            Err(e) => {
                error!("Redis connection error: {}", e);
                Err(anyhow::anyhow!("Redis connection error: {}", e))
            }
        }
    }

    /// Forget the current connection after a failure
    pub async fn invalidate(&self) {
        let mut slot = self.connection.lock().await;
        if slot.take().is_some() {
            warn!("Dropping Redis connection to {}", self.url);
        }
    }
}

/// [`CounterStore`] on Redis hashes
#[derive(Debug)]
pub struct RedisCounterStore {
    connection: std::sync::Arc<RedisConnection>,
}

impl RedisCounterStore {
    pub fn new(connection: std::sync::Arc<RedisConnection>) -> Self {
        Self { connection }
    }

    async fn checked<T>(&self, result: redis::RedisResult<T>, what: String) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                self.connection.invalidate().await;
                Err(anyhow::Error::new(e).context(what))
            }
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.connection.get_connection().await?;
        let result = conn.hget(key, field).await;
        self.checked(result, format!("HGET {} {}", key, field)).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.connection.get_connection().await?;
        let result: redis::RedisResult<()> = conn.hset(key, field, value).await;
        self.checked(result, format!("HSET {} {}", key, field)).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.connection.get_connection().await?;
        let result = conn.hgetall(key).await;
        self.checked(result, format!("HGETALL {}", key)).await
    }
}
