// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-rotor result bundle published to telemetry and to the register map

use serde::{Serialize, Serializer};

use crate::physics::fatigue::LifeRatios;
use crate::physics::thermal::SERIES_LEN;

/// Default life ratio above which an overhaul is recommended
pub const DEFAULT_OVERHAUL_THRESHOLD: f64 = 0.75;

/// Default overhaul life ratio above which scrapping is recommended
pub const DEFAULT_SCRAP_THRESHOLD: f64 = 0.06;

/// Maintenance recommendation derived from the two life ratios
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Alert {
    #[default]
    None,
    Overhaul,
    Scrap,
}

impl Alert {
    /// Value written to the alert register
    pub fn code(self) -> u16 {
        match self {
            Alert::None => 0,
            Alert::Overhaul => 1,
            Alert::Scrap => 2,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Alert::None),
            1 => Some(Alert::Overhaul),
            2 => Some(Alert::Scrap),
            _ => None,
        }
    }

    pub fn message(self) -> Option<&'static str> {
        match self {
            Alert::None => None,
            Alert::Overhaul => Some("Life consumption above the overhaul threshold, overhaul recommended"),
            Alert::Scrap => Some("Overhaul life consumption above the scrap threshold, scrapping recommended"),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Alert::None)
    }
}

/// Ratio limits used to raise an [`Alert`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    pub overhaul: f64,
    pub scrap: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            overhaul: DEFAULT_OVERHAUL_THRESHOLD,
            scrap: DEFAULT_SCRAP_THRESHOLD,
        }
    }
}

impl AlertThresholds {
    /// Scrap takes precedence over overhaul when both limits are exceeded
    pub fn evaluate(&self, ratios: LifeRatios) -> Alert {
        if ratios.overhaul_life > self.scrap {
            Alert::Scrap
        } else if ratios.life > self.overhaul {
            Alert::Overhaul
        } else {
            Alert::None
        }
    }
}

fn serialize_alert<S: Serializer>(alert: &Alert, serializer: S) -> Result<S::Ok, S::Error> {
    match alert.message() {
        Some(message) => serializer.serialize_str(message),
        None => serializer.serialize_none(),
    }
}

/// Computed metrics of one rotor at the end of a step
///
/// Serializes to the telemetry JSON object. The `alert` key is omitted when
/// no maintenance action is recommended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotorSnapshot {
    pub life_ratio: f64,
    pub overhaul_life_ratio: f64,
    #[serde(skip_serializing_if = "Alert::is_none", serialize_with = "serialize_alert")]
    pub alert: Alert,
    /// Latest accepted surface temperature reading, taken at the end of the step
    #[serde(rename = "ts")]
    pub surface_temperature: f64,
    /// Decimated radial temperature series, outer pair first
    pub temperature: [f64; SERIES_LEN],
    /// Bore temperature
    #[serde(rename = "t0")]
    pub bore_temperature: f64,
    pub center_thermal_stress: f64,
    pub surface_thermal_stress: f64,
    pub thermal_stress: f64,
    pub thermal_stress_margin: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn snapshot(alert: Alert) -> RotorSnapshot {
        RotorSnapshot {
            life_ratio: 0.1,
            overhaul_life_ratio: 0.01,
            alert,
            surface_temperature: 410.0,
            temperature: [400.0; SERIES_LEN],
            bore_temperature: 380.0,
            center_thermal_stress: -12.5,
            surface_thermal_stress: 20.0,
            thermal_stress: 20.0,
            thermal_stress_margin: 96.0,
        }
    }

    #[test]
    fn test_thresholds_and_precedence() {
        let thresholds = AlertThresholds::default();
        let ratios = |life, overhaul_life| LifeRatios {
            life,
            overhaul_life,
        };
        assert_eq!(thresholds.evaluate(ratios(0.5, 0.01)), Alert::None);
        assert_eq!(thresholds.evaluate(ratios(0.75, 0.06)), Alert::None);
        assert_eq!(thresholds.evaluate(ratios(0.8, 0.01)), Alert::Overhaul);
        assert_eq!(thresholds.evaluate(ratios(0.1, 0.07)), Alert::Scrap);
        assert_eq!(thresholds.evaluate(ratios(0.9, 0.07)), Alert::Scrap);
    }

    #[test]
    fn test_json_field_names() {
        let value = serde_json::to_value(snapshot(Alert::None)).unwrap();
        let object = value.as_object().unwrap();
        for key in [
            "lifeRatio",
            "overhaulLifeRatio",
            "ts",
            "temperature",
            "t0",
            "centerThermalStress",
            "surfaceThermalStress",
            "thermalStress",
            "thermalStressMargin",
        ] {
            assert!(object.contains_key(key), "missing {}", key);
        }
        assert!(!object.contains_key("alert"));
        assert_eq!(object["temperature"].as_array().unwrap().len(), SERIES_LEN);
    }

    #[test]
    fn test_alert_is_a_message_string() {
        let value = serde_json::to_value(snapshot(Alert::Scrap)).unwrap();
        assert!(matches!(&value["alert"], Value::String(s) if s.contains("scrap")));
    }

    #[test]
    fn test_alert_codes() {
        for alert in [Alert::None, Alert::Overhaul, Alert::Scrap] {
            assert_eq!(Alert::from_code(alert.code()), Some(alert));
        }
        assert_eq!(Alert::from_code(3), None);
    }
}
