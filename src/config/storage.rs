// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Key/value store, telemetry and parameter source configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the rotor parameter records are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterSource {
    /// JSON parameter file at `parameters.path`
    File,
    /// `TS{unit}:Mechanism:RotorParams` hash of the key/value store
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParametersConfig {
    pub source: ParameterSource,
    #[serde(default = "default_parameters_path")]
    pub path: PathBuf,
}

fn default_parameters_path() -> PathBuf {
    PathBuf::from("parameters.json")
}

impl Default for ParametersConfig {
    fn default() -> Self {
        Self {
            source: ParameterSource::File,
            path: default_parameters_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL, `redis://host:port/db`
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
        }
    }
}

/// Transport carrying the telemetry messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryTransport {
    /// MQTT broker of the `mqtt` section, at-least-once delivery
    #[default]
    Mqtt,
    /// Redis pub/sub on the `redis` connection, at-most-once delivery
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub enabled: bool,
    #[serde(default)]
    pub transport: TelemetryTransport,
    pub publish_timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            transport: TelemetryTransport::Mqtt,
            publish_timeout_ms: 5000,
        }
    }
}

impl TelemetryConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}
