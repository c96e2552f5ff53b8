// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP client polling the remote rotor controller
//!
//! The client reads holding registers only. A request larger than
//! [`MAX_REGISTERS_PER_READ`] is split into sequential reads whose results are
//! concatenated. Any failed sub-read abandons the whole call, drops the
//! connection and schedules a reconnect once the back-off delay has elapsed.
//! Calls made during the back-off return immediately without any I/O.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::time::{timeout, Instant};
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

/// Largest register count of one read holding registers request
pub const MAX_REGISTERS_PER_READ: u16 = 125;

pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(200);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Source of holding register values
///
/// An empty result means the read failed. Failures are logged by the
/// implementation and never propagated.
#[async_trait]
pub trait RegisterReader: Send {
    async fn read_registers(&mut self, start: u16, count: u16) -> Vec<u16>;
}

#[derive(Error, Debug)]
pub enum FieldBusError {
    #[error("Connection to {address} failed: {source}")]
    Connect {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection to {address} timed out after {timeout:?}")]
    ConnectTimeout {
        address: SocketAddr,
        timeout: Duration,
    },

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(#[from] tokio_modbus::Error),

    #[error("Exception response: {0:?}")]
    Exception(ExceptionCode),

    #[error("Expected {expected} registers, received {received}")]
    ShortResponse { expected: usize, received: usize },

    #[error("Register range {start} + {count} exceeds the address space")]
    AddressRange { start: u16, count: u16 },

    #[error("Not connected, next attempt in {0:?}")]
    BackOff(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Addressing and timing of a field-bus client
#[derive(Debug, Clone)]
pub struct FieldBusSettings {
    pub address: SocketAddr,
    pub slave: u8,
    pub response_timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl FieldBusSettings {
    pub fn new(address: SocketAddr, slave: u8) -> Self {
        Self {
            address,
            slave,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Modbus TCP client owned by one rotor
pub struct FieldBusClient {
    settings: FieldBusSettings,
    context: Option<Context>,
    state: ConnectionState,
    retry_at: Option<Instant>,
}

impl FieldBusClient {
    /// Create a client and try to connect once
    ///
    /// A failed connection is logged and left to the back-off path, the
    /// client is returned in either case.
    pub async fn connect(settings: FieldBusSettings) -> Self {
        let mut client = Self {
            settings,
            context: None,
            state: ConnectionState::Disconnected,
            retry_at: None,
        };
        if let Err(e) = client.open().await {
            warn!(
                "Field-bus client for slave {} not connected: {}",
                client.settings.slave, e
            );
            client.schedule_retry();
        }
        client
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn settings(&self) -> &FieldBusSettings {
        &self.settings
    }

    async fn open(&mut self) -> Result<(), FieldBusError> {
        let address = self.settings.address;
        let connect_timeout = self.settings.connect_timeout;
        self.state = ConnectionState::Connecting;
        debug!("Connecting to {} (slave {})", address, self.settings.slave);

        let context = match timeout(
            connect_timeout,
            tcp::connect_slave(address, Slave(self.settings.slave)),
        )
        .await
        {
            Ok(Ok(context)) => context,
            Ok(Err(source)) => {
                self.state = ConnectionState::Disconnected;
                return Err(FieldBusError::Connect { address, source });
            }
            Err(_) => {
                self.state = ConnectionState::Disconnected;
                return Err(FieldBusError::ConnectTimeout {
                    address,
                    timeout: connect_timeout,
                });
            }
        };

        info!("Connected to {} (slave {})", address, self.settings.slave);
        self.context = Some(context);
        self.state = ConnectionState::Connected;
        self.retry_at = None;
        Ok(())
    }

    fn schedule_retry(&mut self) {
        self.context = None;
        self.state = ConnectionState::Disconnected;
        self.retry_at = Some(Instant::now() + self.settings.reconnect_delay);
    }

    async fn ensure_connected(&mut self) -> Result<(), FieldBusError> {
        if self.context.is_some() {
            return Ok(());
        }
        if let Some(retry_at) = self.retry_at {
            let now = Instant::now();
            if now < retry_at {
                return Err(FieldBusError::BackOff(retry_at - now));
            }
        }
        self.open().await
    }

    /// Read `count` holding registers starting at `start`
    ///
    /// # Errors
    ///
    /// Any connection, transport or protocol failure. The connection is
    /// dropped and a reconnect scheduled before the error is returned.
    pub async fn try_read(&mut self, start: u16, count: u16) -> Result<Vec<u16>, FieldBusError> {
        if u32::from(start) + u32::from(count) > u32::from(u16::MAX) + 1 {
            return Err(FieldBusError::AddressRange { start, count });
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        match self.read_chunks(start, count).await {
            Ok(values) => Ok(values),
            Err(FieldBusError::BackOff(remaining)) => Err(FieldBusError::BackOff(remaining)),
            Err(e) => {
                self.schedule_retry();
                Err(e)
            }
        }
    }

    async fn read_chunks(&mut self, start: u16, count: u16) -> Result<Vec<u16>, FieldBusError> {
        self.ensure_connected().await?;
        let response_timeout = self.settings.response_timeout;
        let context = match self.context.as_mut() {
            Some(context) => context,
            None => return Err(FieldBusError::BackOff(Duration::ZERO)),
        };

        let mut values = Vec::with_capacity(count.into());
        let mut offset = 0u16;
        while offset < count {
            let chunk = (count - offset).min(MAX_REGISTERS_PER_READ);
            let address = start + offset;
            debug!("Reading {} holding registers at {}", chunk, address);

            let words = timeout(response_timeout, context.read_holding_registers(address, chunk))
                .await
                .map_err(|_| FieldBusError::Timeout(response_timeout))??
                .map_err(FieldBusError::Exception)?;

            if words.len() != usize::from(chunk) {
                return Err(FieldBusError::ShortResponse {
                    expected: chunk.into(),
                    received: words.len(),
                });
            }
            values.extend_from_slice(&words);
            offset += chunk;
        }
        Ok(values)
    }
}

#[async_trait]
impl RegisterReader for FieldBusClient {
    async fn read_registers(&mut self, start: u16, count: u16) -> Vec<u16> {
        match self.try_read(start, count).await {
            Ok(values) => values,
            Err(FieldBusError::BackOff(remaining)) => {
                debug!(
                    "Skipping read of {} registers at {}, reconnect in {:?}",
                    count, start, remaining
                );
                Vec::new()
            }
            Err(e) => {
                warn!(
                    "Read of {} registers at {} from {} failed: {}",
                    count, start, self.settings.address, e
                );
                Vec::new()
            }
        }
    }
}
