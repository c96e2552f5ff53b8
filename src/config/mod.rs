// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the rotor monitor
//!
//! The configuration is backed by a YAML file and validated against a JSON
//! schema before being deserialized, then checked against the rules the
//! schema cannot express.
//!
//! ## Configuration Structure
//!
//! - `unit`: identifier of the turbine unit, used in every key and topic
//! - `parameters`: where the rotor parameter records come from
//! - `field_bus_client`: the remote controller polled for inputs
//! - `modbus`: the Modbus TCP server exposing the results
//! - `redis`: durable counters and snapshot hand-off
//! - `mqtt`: broker receiving the telemetry
//! - `telemetry`: snapshot publication and its transport
//! - `scheduler`: cycle period and publish cadence
//! - `alerts`: life ratio limits
//! - `simulation`: stress concentration and surface reading bounds
//!
//! ## Usage
//!
//! ```no_run
//! use rust_rotor_monitor::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! config.apply_args(
//!     Some("10.0.0.5".to_string()),          // Field-bus client address
//!     Some(502),                             // Field-bus client port
//!     None,                                  // Modbus server address
//!     Some(5020),                            // Modbus server port
//!     Some("redis://10.0.0.9/0".to_string()), // Redis URL
//!     Some("2".to_string()),                 // Unit
//! );
//!
//! println!("Server port: {}", config.modbus.port);
//! ```

pub mod modbus;
pub mod monitoring;
pub mod mqtt;
pub mod storage;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

pub use modbus::{resolve_socket_addr, FieldBusClientConfig, ModbusConfig};
pub use monitoring::{AlertsConfig, SchedulerConfig, SimulationConfig};
pub use mqtt::{MqttConfig, MqttEndpoint};
pub use storage::{
    ParameterSource, ParametersConfig, RedisConfig, TelemetryConfig, TelemetryTransport,
};
pub use utils::{is_valid_ip_address, output_config_schema};

fn default_unit() -> String {
    "1".to_string()
}

/// Root configuration structure of the rotor monitor.
///
/// Every section falls back to its defaults when absent from the file, a
/// minimal configuration only names what differs from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Turbine unit identifier, the `{unit}` in `TS{unit}:...` keys and topics
    #[serde(default = "default_unit")]
    pub unit: String,

    #[serde(default)]
    pub parameters: ParametersConfig,

    /// Remote controller providing the control words and surface temperatures
    #[serde(default)]
    pub field_bus_client: FieldBusClientConfig,

    /// Modbus TCP server exposing the computed register map
    #[serde(default)]
    pub modbus: ModbusConfig,

    #[serde(default)]
    pub redis: RedisConfig,

    /// Telemetry broker, used when `telemetry.transport` is `mqtt`
    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unit: default_unit(),
            parameters: ParametersConfig::default(),
            field_bus_client: FieldBusClientConfig::default(),
            modbus: ModbusConfig::default(),
            redis: RedisConfig::default(),
            mqtt: MqttConfig::default(),
            telemetry: TelemetryConfig::default(),
            scheduler: SchedulerConfig::default(),
            alerts: AlertsConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Config {
    /// Write a `*.sample.yaml` next to an invalid configuration file
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let sample_path = path.as_ref().with_extension("sample.yaml");
        debug!("Creating sample configuration file at {:?}", sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with the default configuration. A file that
    /// fails validation leaves a sample configuration next to it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;
        Self::from_yaml_str(&contents).inspect_err(|_| {
            if let Err(e) = Self::create_sample_config(path) {
                error!("Failed to create sample config: {}", e);
            }
        })
    }

    /// Validate and deserialize a YAML document
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let yaml_value: serde_yml::Value =
            serde_yml::from_str(contents).context("Failed to parse YAML configuration")?;

        let json_value = serde_json::to_value(&yaml_value)
            .context("Failed to convert YAML to JSON for validation")?;

        let schema_str = include_str!("../../resources/config.schema.json");
        let schema: serde_json::Value =
            serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating configuration against schema");
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = serde_yml::from_str(contents).map_err(|err| {
            error!("Configuration deserialization error: {}", err);
            anyhow::anyhow!("Failed to deserialize configuration: {}", err)
        })?;

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Each argument is also readable from its environment variable through
    /// clap, so deployments driven by the environment end up here too.
    ///
    /// # Parameters
    ///
    /// * `client_address` - Remote controller address (`MODBUS_CLIENT_IP`)
    /// * `client_port` - Remote controller port (`MODBUS_CLIENT_PORT`)
    /// * `server_address` - Modbus server bind address (`MODBUS_SERVER_IP`)
    /// * `server_port` - Modbus server port (`MODBUS_SERVER_PORT`)
    /// * `redis_url` - Key/value store URL (`REDIS_URL`)
    /// * `unit` - Unit identifier (`ROTOR_UNIT`)
    pub fn apply_args(
        &mut self,
        client_address: Option<String>,
        client_port: Option<u16>,
        server_address: Option<String>,
        server_port: Option<u16>,
        redis_url: Option<String>,
        unit: Option<String>,
    ) {
        if let Some(address) = client_address {
            debug!("Overriding field-bus client address from command line: {}", address);
            self.field_bus_client.address = address;
        }
        if let Some(port) = client_port {
            debug!("Overriding field-bus client port from command line: {}", port);
            self.field_bus_client.port = port;
        }
        if let Some(address) = server_address {
            debug!("Overriding Modbus address from command line: {}", address);
            self.modbus.address = address;
        }
        if let Some(port) = server_port {
            debug!("Overriding Modbus port from command line: {}", port);
            self.modbus.port = port;
        }
        if let Some(url) = redis_url {
            debug!("Overriding Redis URL from command line");
            self.redis.url = url;
        }
        if let Some(unit) = unit {
            debug!("Overriding unit from command line: {}", unit);
            self.unit = unit;
        }
    }
}
