// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP configuration
//!
//! Two sections share this module: the field-bus client polling the remote
//! controller and the Modbus server exposing the computed register map.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::modbus::FieldBusSettings;

/// Resolve `address:port`, accepting host names as well as IP literals
pub fn resolve_socket_addr(address: &str, port: u16) -> Result<SocketAddr> {
    (address, port)
        .to_socket_addrs()
        .with_context(|| format!("Cannot resolve {}:{}", address, port))?
        .next()
        .with_context(|| format!("No address found for {}:{}", address, port))
}

/// Configuration for the Modbus TCP server component.
///
/// # Example
///
/// ```
/// use rust_rotor_monitor::config::ModbusConfig;
///
/// let modbus_config = ModbusConfig {
///     enabled: true,
///     port: 5020,
///     address: "0.0.0.0".to_string(),
/// };
/// assert!(modbus_config.enabled);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// When disabled no listener is opened and snapshots only go to telemetry
    pub enabled: bool,

    /// The TCP port the Modbus server will listen on.
    ///
    /// Valid range is 1-65534.
    pub port: u16,

    /// The network address the Modbus server will bind to.
    pub address: String,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 5020,
            address: "127.0.0.1".to_string(),
        }
    }
}

impl ModbusConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        resolve_socket_addr(&self.address, self.port)
    }
}

/// Connection to the remote controller providing control words and
/// surface temperatures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldBusClientConfig {
    pub address: String,
    pub port: u16,
    /// Upper bound on each read request, in milliseconds
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Back-off after a failed connect or read, in milliseconds
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_response_timeout_ms() -> u64 {
    200
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

impl Default for FieldBusClientConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 502,
            response_timeout_ms: default_response_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl FieldBusClientConfig {
    /// Client settings for the rotor answering on `slave`
    pub fn settings_for(&self, slave: u8) -> Result<FieldBusSettings> {
        let address = resolve_socket_addr(&self.address, self.port)?;
        Ok(FieldBusSettings {
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            ..FieldBusSettings::new(address, slave)
        })
    }
}
