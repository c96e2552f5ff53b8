// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! MQTT broker configuration for the telemetry publisher

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

const PLAIN_PORT: u16 = 1883;
const TLS_PORT: u16 = 8883;

/// Broker endpoint extracted from [`MqttConfig::url`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker URL, `tcp://host:port` or `mqtt://...` in clear, `ssl://` or `mqtts://` over TLS
    pub url: String,

    /// Client identifier announced to the broker
    pub client_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// PEM trust store, switches the connection to TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,

    /// PEM client certificate, used together with `key_file`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,

    #[serde(default = "default_keep_alive_s")]
    pub keep_alive_s: u64,
}

fn default_keep_alive_s() -> u64 {
    45
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            url: "tcp://127.0.0.1:1883".to_string(),
            client_id: "rust_rotor_monitor".to_string(),
            username: None,
            password: None,
            ca_file: None,
            cert_file: None,
            key_file: None,
            keep_alive_s: default_keep_alive_s(),
        }
    }
}

impl MqttConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_s)
    }

    /// Host, port and transport of the broker
    ///
    /// The port defaults to 1883 in clear and 8883 over TLS. A trust store
    /// turns a clear scheme into TLS.
    pub fn endpoint(&self) -> Result<MqttEndpoint> {
        let (scheme, rest) = self
            .url
            .split_once("://")
            .ok_or_else(|| anyhow::anyhow!("MQTT URL {} has no scheme", self.url))?;
        let tls = match scheme {
            "tcp" | "mqtt" => self.ca_file.is_some(),
            "ssl" | "mqtts" => true,
            other => anyhow::bail!("Unsupported MQTT scheme {} in {}", other, self.url),
        };

        let authority = rest.trim_end_matches('/');
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>()
                    .map_err(|_| anyhow::anyhow!("Invalid MQTT port in {}", self.url))?,
            ),
            None => (authority, if tls { TLS_PORT } else { PLAIN_PORT }),
        };
        if host.is_empty() {
            anyhow::bail!("MQTT URL {} has no host", self.url);
        }

        Ok(MqttEndpoint {
            host: host.to_string(),
            port,
            tls,
        })
    }
}
