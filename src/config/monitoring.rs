// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Scheduling, alerting and simulation settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::physics::fatigue::DEFAULT_STRESS_CONCENTRATION;
use crate::rotor::snapshot::{DEFAULT_OVERHAUL_THRESHOLD, DEFAULT_SCRAP_THRESHOLD};
use crate::rotor::{AlertThresholds, SimulationSettings};
use crate::scheduler::{SchedulerSettings, DEFAULT_PUBLISH_EVERY};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cycle period in microseconds
    pub period_us: u64,
    /// Publish the snapshots once every this many rounds
    pub publish_every: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period_us: 5_000_000,
            publish_every: DEFAULT_PUBLISH_EVERY,
        }
    }
}

impl SchedulerConfig {
    pub fn settings(&self, unit: &str) -> SchedulerSettings {
        SchedulerSettings {
            unit: unit.to_string(),
            period: Duration::from_micros(self.period_us),
            publish_every: self.publish_every,
        }
    }
}

/// Life ratio limits raising the snapshot alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Life ratio above which an overhaul is due
    pub overhaul_threshold: f64,
    /// Overhaul life ratio above which the rotor must be scrapped
    pub scrap_threshold: f64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            overhaul_threshold: DEFAULT_OVERHAUL_THRESHOLD,
            scrap_threshold: DEFAULT_SCRAP_THRESHOLD,
        }
    }
}

impl From<&AlertsConfig> for AlertThresholds {
    fn from(config: &AlertsConfig) -> Self {
        Self {
            overhaul: config.overhaul_threshold,
            scrap: config.scrap_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub stress_concentration: f64,
    /// Surface readings below this value are rejected
    pub surface_temp_min: f64,
    /// Surface readings above this value are rejected
    pub surface_temp_max: f64,
    /// Starting temperature of the field when the controller cannot be read
    pub fallback_temperature: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let defaults = SimulationSettings::default();
        Self {
            stress_concentration: DEFAULT_STRESS_CONCENTRATION,
            surface_temp_min: defaults.surface_temp_min,
            surface_temp_max: defaults.surface_temp_max,
            fallback_temperature: defaults.fallback_temperature,
        }
    }
}

impl SimulationConfig {
    pub fn settings(&self, alerts: &AlertsConfig) -> SimulationSettings {
        SimulationSettings {
            stress_concentration: self.stress_concentration,
            surface_temp_min: self.surface_temp_min,
            surface_temp_max: self.surface_temp_max,
            fallback_temperature: self.fallback_temperature,
            alerts: alerts.into(),
        }
    }
}
