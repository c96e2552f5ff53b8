// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! Schema output and the validation rules the JSON schema cannot express.

use anyhow::{Context, Result};
use log::{debug, warn};

use super::{Config, ParameterSource, TelemetryTransport};

/// Output the embedded JSON schema to the console.
///
/// Called for the `--show-config-schema` flag.
///
/// ```bash
/// ./rust_rotor_monitor --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema_str = include_str!("../../resources/config.schema.json");
    let schema: serde_json::Value =
        serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;
    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;
    println!("{}", formatted_schema);
    Ok(())
}

/// Check if a string is a valid IP address
///
/// Accepts IPv4 and IPv6 literals plus `localhost`.
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }
    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

fn check_port(what: &str, port: u16) -> Result<()> {
    if !(1..=65534).contains(&port) {
        anyhow::bail!("Invalid {} port number: {}", what, port);
    }
    Ok(())
}

fn check_positive(what: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        anyhow::bail!("{} must be a finite positive number, got {}", what, value);
    }
    Ok(())
}

/// Validates the configuration against rules not covered by the JSON schema.
///
/// # Validation Rules
///
/// - **Ports**: client and server ports within 1-65534
/// - **Timing**: a non-zero period, `publish_every >= 1` and non-zero timeouts
/// - **Alerts**: finite positive thresholds
/// - **Surface temperature**: finite bounds with `min < max`, fallback inside them
/// - **MQTT**: a parsable broker URL, a trust store for TLS schemes, and a
///   client certificate and key given together
/// - **Addresses**: unusual host strings only produce a warning
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if config.unit.trim().is_empty() {
        anyhow::bail!("The unit identifier must not be empty");
    }

    check_port("field-bus client", config.field_bus_client.port)?;
    if config.modbus.enabled {
        check_port("Modbus server", config.modbus.port)?;
    }

    if config.scheduler.period_us == 0 {
        anyhow::bail!("The scheduler period must be greater than zero");
    }
    if config.scheduler.publish_every == 0 {
        anyhow::bail!("publish_every must be at least 1");
    }
    if config.field_bus_client.response_timeout_ms == 0
        || config.field_bus_client.connect_timeout_ms == 0
    {
        anyhow::bail!("Field-bus timeouts must be greater than zero");
    }
    if config.telemetry.enabled && config.telemetry.publish_timeout_ms == 0 {
        anyhow::bail!("The telemetry publish timeout must be greater than zero");
    }

    check_positive("overhaul_threshold", config.alerts.overhaul_threshold)?;
    check_positive("scrap_threshold", config.alerts.scrap_threshold)?;
    check_positive(
        "stress_concentration",
        config.simulation.stress_concentration,
    )?;

    let simulation = &config.simulation;
    if !simulation.surface_temp_min.is_finite() || !simulation.surface_temp_max.is_finite() {
        anyhow::bail!("Surface temperature bounds must be finite");
    }
    if simulation.surface_temp_min >= simulation.surface_temp_max {
        anyhow::bail!(
            "surface_temp_min ({}) must be lower than surface_temp_max ({})",
            simulation.surface_temp_min,
            simulation.surface_temp_max
        );
    }
    if !(simulation.surface_temp_min..=simulation.surface_temp_max)
        .contains(&simulation.fallback_temperature)
    {
        anyhow::bail!(
            "fallback_temperature {} is outside [{}, {}]",
            simulation.fallback_temperature,
            simulation.surface_temp_min,
            simulation.surface_temp_max
        );
    }

    if config.telemetry.enabled && config.telemetry.transport == TelemetryTransport::Mqtt {
        let mqtt = &config.mqtt;
        let endpoint = mqtt.endpoint()?;
        if endpoint.tls && mqtt.ca_file.is_none() {
            anyhow::bail!("MQTT over TLS ({}) needs mqtt.ca_file", mqtt.url);
        }
        if mqtt.cert_file.is_some() != mqtt.key_file.is_some() {
            anyhow::bail!("mqtt.cert_file and mqtt.key_file must be given together");
        }
        if mqtt.password.is_some() && mqtt.username.is_none() {
            anyhow::bail!("mqtt.password is set without mqtt.username");
        }
    }

    if config.parameters.source == ParameterSource::File
        && config.parameters.path.as_os_str().is_empty()
    {
        anyhow::bail!("A parameter file path is required when parameters.source is file");
    }

    for (what, address) in [
        ("field-bus client", &config.field_bus_client.address),
        ("Modbus server", &config.modbus.address),
    ] {
        if !is_valid_ip_address(address) {
            // Host names are resolved at startup
            warn!("Potentially invalid {} address: {}", what, address);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes() {
        assert!(validate_specific_rules(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_inverted_surface_bounds() {
        let mut config = Config::default();
        config.simulation.surface_temp_min = 700.0;
        let err = validate_specific_rules(&config).unwrap_err();
        assert!(err.to_string().contains("surface_temp_min"));
    }

    #[test]
    fn test_rejects_zero_publish_every() {
        let mut config = Config::default();
        config.scheduler.publish_every = 0;
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_disabled_server_port_ignored() {
        let mut config = Config::default();
        config.modbus.enabled = false;
        config.modbus.port = 65535;
        assert!(validate_specific_rules(&config).is_ok());
    }

    #[test]
    fn test_mqtt_rules() {
        let mut config = Config::default();
        config.mqtt.url = "mqtts://broker:8883".to_string();
        let err = validate_specific_rules(&config).unwrap_err();
        assert!(err.to_string().contains("ca_file"));

        config.mqtt.ca_file = Some("ca.pem".into());
        config.mqtt.cert_file = Some("client.pem".into());
        assert!(validate_specific_rules(&config).is_err());

        config.mqtt.key_file = Some("client.key".into());
        assert!(validate_specific_rules(&config).is_ok());

        // The broker is not used with the Redis transport
        config.mqtt.url = "broker:1883".to_string();
        assert!(validate_specific_rules(&config).is_err());
        config.telemetry.transport = TelemetryTransport::Redis;
        assert!(validate_specific_rules(&config).is_ok());
    }

    #[test]
    fn test_ip_addresses() {
        assert!(is_valid_ip_address("192.168.1.10"));
        assert!(is_valid_ip_address("::1"));
        assert!(is_valid_ip_address("localhost"));
        assert!(!is_valid_ip_address("controller.local"));
    }
}
