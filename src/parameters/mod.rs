// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Rotor parameter records
//!
//! Each monitored rotor is described by one record holding its geometry, its
//! temperature dependent material tables, its fatigue curves and the field-bus
//! addressing used to acquire its inputs. Records come from one of two origins
//! and both shapes are accepted by the same loader:
//!
//! - a JSON parameter file mapping rotor names to nested records, where curves
//!   are `{ "X": [...], "Y": [...] }` objects and scalars are numbers;
//! - a key/value hash where every rotor field holds a JSON string, scalars are
//!   numeric strings and curves are flattened to comma separated
//!   `tcz_X` / `tcz_Y` strings.
//!
//! A curve's effective point count comes from its optional `points` field.
//! Without it, the four property tables (`tcz`, `shz`, `emz`, `prz`) use at
//! most their first eight points; `lecz` and the S-N curves use the full table.
//!
//! Loading fails fast: a missing or non-numeric field, a malformed curve or an
//! impossible geometry aborts startup with a [`ParameterError`].
//!
//! Records are stored in a [`RotorRegistry`] ordered by rotor name. The order
//! defines the rotor index used for the field-bus server register blocks.

mod error;

pub use error::ParameterError;

use log::debug;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use crate::physics::interpolation::MaterialCurve;
use crate::physics::thermal::NODE_COUNT;

/// Effective point count of the property tables when `points` is absent
pub const PROPERTY_CURVE_POINTS: usize = 8;

/// Immutable physical description of one rotor
#[derive(Debug, Clone, PartialEq)]
pub struct RotorParameters {
    /// Material density
    pub density: f64,
    /// Outer radius
    pub radius: f64,
    /// Central bore radius
    pub hole_radius: f64,
    /// Radial distance between two nodes
    pub delta_r: f64,
    /// Simulation time step
    pub scan_cycle: f64,
    /// Geometry factor applied to the surface thermal stress
    pub surface_factor: f64,
    /// Geometry factor applied to the bore thermal stress
    pub center_factor: f64,
    /// Reference stress used for the stress margin
    pub free_factor: f64,
    pub thermal_conductivity: MaterialCurve,
    pub specific_heat: MaterialCurve,
    pub elastic_modulus: MaterialCurve,
    pub poisson_ratio: MaterialCurve,
    pub linear_expansion: MaterialCurve,
    /// S-N curves for the low, middle and high temperature bands
    pub sn_curves: [MaterialCurve; 3],
    /// Temperature boundaries between the three S-N bands
    pub sn_band: [f64; 2],
}

impl RotorParameters {
    /// Radius of node `index`, node 0 being the outer surface node
    pub fn node_radius(&self, index: usize) -> f64 {
        self.radius - self.delta_r * index as f64
    }
}

/// Parameters plus the field-bus addressing of one rotor
#[derive(Debug, Clone)]
pub struct RotorRecord {
    pub name: String,
    /// Field-bus slave identifier of the remote controller
    pub slave_id: u8,
    /// Holding register carrying the operator reset bits
    pub control_word: u16,
    /// First of the two holding registers carrying the surface temperature
    pub surface_temp_register: u16,
    pub parameters: Arc<RotorParameters>,
}

/// All rotor records of a unit, keyed by rotor name
#[derive(Debug, Clone, Default)]
pub struct RotorRegistry {
    rotors: BTreeMap<String, RotorRecord>,
}

impl RotorRegistry {
    /// Load a JSON parameter file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ParameterError> {
        let path = path.as_ref();
        debug!("Loading rotor parameters from {:?}", path);
        let contents = std::fs::read_to_string(path).map_err(|source| ParameterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, ParameterError> {
        let value: Value = serde_json::from_str(contents)?;
        Self::from_value(&value)
    }

    /// Build the registry from a `{ name: record }` JSON object
    pub fn from_value(value: &Value) -> Result<Self, ParameterError> {
        let object = value.as_object().ok_or_else(|| ParameterError::NotAnObject {
            what: "the parameter set".to_string(),
        })?;
        let mut rotors = BTreeMap::new();
        for (name, record) in object {
            rotors.insert(name.clone(), parse_record(name, record)?);
        }
        Self::from_records(rotors)
    }

    /// Build the registry from a key/value hash whose values are JSON strings
    pub fn from_hash(hash: &HashMap<String, String>) -> Result<Self, ParameterError> {
        let mut rotors = BTreeMap::new();
        for (name, raw) in hash {
            let record: Value =
                serde_json::from_str(raw).map_err(|source| ParameterError::RecordJson {
                    rotor: name.clone(),
                    source,
                })?;
            rotors.insert(name.clone(), parse_record(name, &record)?);
        }
        Self::from_records(rotors)
    }

    fn from_records(rotors: BTreeMap<String, RotorRecord>) -> Result<Self, ParameterError> {
        if rotors.is_empty() {
            return Err(ParameterError::Empty);
        }
        debug!(
            "Loaded parameters for {} rotor(s): {:?}",
            rotors.len(),
            rotors.keys().collect::<Vec<_>>()
        );
        Ok(Self { rotors })
    }

    pub fn get(&self, name: &str) -> Option<&RotorRecord> {
        self.rotors.get(name)
    }

    /// Records in rotor index order
    pub fn iter(&self) -> impl Iterator<Item = &RotorRecord> {
        self.rotors.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rotors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rotors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rotors.is_empty()
    }
}

/// Parse and validate one rotor record
pub fn parse_record(name: &str, record: &Value) -> Result<RotorRecord, ParameterError> {
    let fields = record.as_object().ok_or_else(|| ParameterError::NotAnObject {
        what: format!("rotor '{}'", name),
    })?;
    let reader = RecordReader { rotor: name, fields };

    let sn = reader.number_list("sn")?;
    if sn.len() != 2 {
        return Err(reader.out_of_range("sn", format!("must hold 2 values, got {}", sn.len())));
    }
    if sn[0] > sn[1] {
        return Err(reader.out_of_range("sn", "boundaries must be ordered".to_string()));
    }

    let parameters = RotorParameters {
        density: reader.number("density")?,
        radius: reader.number("radius")?,
        hole_radius: reader.number("holeRadius")?,
        delta_r: reader.number("deltaR")?,
        scan_cycle: reader.number("scanCycle")?,
        surface_factor: reader.number("surfaceFactor")?,
        center_factor: reader.number("centerFactor")?,
        free_factor: reader.number("freeFactor")?,
        thermal_conductivity: reader.curve("tcz", Some(PROPERTY_CURVE_POINTS))?,
        specific_heat: reader.curve("shz", Some(PROPERTY_CURVE_POINTS))?,
        elastic_modulus: reader.curve("emz", Some(PROPERTY_CURVE_POINTS))?,
        poisson_ratio: reader.curve("prz", Some(PROPERTY_CURVE_POINTS))?,
        linear_expansion: reader.curve("lecz", None)?,
        sn_curves: [
            reader.curve("SN1", None)?,
            reader.curve("SN2", None)?,
            reader.curve("SN3", None)?,
        ],
        sn_band: [sn[0], sn[1]],
    };
    reader.check_geometry(&parameters)?;

    Ok(RotorRecord {
        name: name.to_string(),
        slave_id: reader.integer("slaveID", u8::MAX.into())? as u8,
        control_word: reader.integer("controlWord", u16::MAX.into())? as u16,
        surface_temp_register: match reader.fields.get("surfaceTempRegister") {
            Some(_) => reader.integer("surfaceTempRegister", u16::MAX.into())? as u16,
            None => 0,
        },
        parameters: Arc::new(parameters),
    })
}

struct RecordReader<'a> {
    rotor: &'a str,
    fields: &'a Map<String, Value>,
}

impl RecordReader<'_> {
    fn number(&self, field: &str) -> Result<f64, ParameterError> {
        let value = self.fields.get(field).ok_or_else(|| self.missing(field))?;
        let number = self.coerce(field, value)?;
        if !number.is_finite() {
            return Err(self.non_numeric(field, value));
        }
        Ok(number)
    }

    fn integer(&self, field: &str, max: u32) -> Result<u32, ParameterError> {
        let number = self.number(field)?;
        if number < 0.0 || number > f64::from(max) || number.fract() != 0.0 {
            return Err(self.out_of_range(field, format!("must be an integer in 0..={}", max)));
        }
        Ok(number as u32)
    }

    fn coerce(&self, field: &str, value: &Value) -> Result<f64, ParameterError> {
        match value {
            Value::Number(n) => n.as_f64().ok_or_else(|| self.non_numeric(field, value)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| self.non_numeric(field, value)),
            _ => Err(self.non_numeric(field, value)),
        }
    }

    /// A list given either as a JSON array or as a comma separated string
    fn number_list(&self, field: &str) -> Result<Vec<f64>, ParameterError> {
        let value = self.fields.get(field).ok_or_else(|| self.missing(field))?;
        self.list_from(field, value)
    }

    fn list_from(&self, field: &str, value: &Value) -> Result<Vec<f64>, ParameterError> {
        match value {
            Value::Array(items) => items.iter().map(|item| self.coerce(field, item)).collect(),
            Value::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| {
                    item.parse::<f64>().map_err(|_| ParameterError::NonNumeric {
                        rotor: self.rotor.to_string(),
                        field: field.to_string(),
                        value: item.to_string(),
                    })
                })
                .collect(),
            _ => Err(self.non_numeric(field, value)),
        }
    }

    /// A curve given either as `{X, Y, points?}` or as flat `name_X` / `name_Y`
    ///
    /// `default_points` caps the effective point count when none is given.
    fn curve(
        &self,
        name: &str,
        default_points: Option<usize>,
    ) -> Result<MaterialCurve, ParameterError> {
        let (x, y, points) = match self.fields.get(name) {
            Some(Value::Object(table)) => {
                let x_field = format!("{}.X", name);
                let y_field = format!("{}.Y", name);
                let x = table.get("X").ok_or_else(|| self.missing(&x_field))?;
                let y = table.get("Y").ok_or_else(|| self.missing(&y_field))?;
                let points = table
                    .get("points")
                    .map(|p| self.coerce(&format!("{}.points", name), p))
                    .transpose()?;
                (
                    self.list_from(&x_field, x)?,
                    self.list_from(&y_field, y)?,
                    points,
                )
            }
            Some(other) => return Err(self.non_numeric(name, other)),
            None => {
                let points_field = format!("{}_points", name);
                let points = match self.fields.get(&points_field) {
                    Some(p) => Some(self.coerce(&points_field, p)?),
                    None => None,
                };
                (
                    self.number_list(&format!("{}_X", name))?,
                    self.number_list(&format!("{}_Y", name))?,
                    points,
                )
            }
        };

        let invalid = |source| ParameterError::InvalidCurve {
            rotor: self.rotor.to_string(),
            curve: name.to_string(),
            source,
        };
        let curve = MaterialCurve::new(x, y).map_err(invalid)?;
        match points {
            Some(p) if p >= 0.0 && p.fract() == 0.0 => {
                curve.with_points(p as usize).map_err(invalid)
            }
            Some(_) => Err(self.out_of_range(
                &format!("{}.points", name),
                "must be a positive integer".to_string(),
            )),
            None => match default_points {
                Some(cap) if cap < curve.points() => curve.with_points(cap).map_err(invalid),
                _ => Ok(curve),
            },
        }
    }

    fn check_geometry(&self, p: &RotorParameters) -> Result<(), ParameterError> {
        for (field, value) in [
            ("density", p.density),
            ("deltaR", p.delta_r),
            ("scanCycle", p.scan_cycle),
            ("radius", p.radius),
        ] {
            if value <= 0.0 {
                return Err(self.out_of_range(field, "must be positive".to_string()));
            }
        }
        if p.free_factor == 0.0 {
            return Err(self.out_of_range("freeFactor", "must not be zero".to_string()));
        }
        let innermost = p.node_radius(NODE_COUNT - 1);
        if 2.0 * innermost - p.delta_r <= 0.0 {
            return Err(self.out_of_range(
                "deltaR",
                format!(
                    "is too large for radius {}: node {} would sit at {}",
                    p.radius,
                    NODE_COUNT - 1,
                    innermost
                ),
            ));
        }
        Ok(())
    }

    fn missing(&self, field: &str) -> ParameterError {
        ParameterError::MissingField {
            rotor: self.rotor.to_string(),
            field: field.to_string(),
        }
    }

    fn non_numeric(&self, field: &str, value: &Value) -> ParameterError {
        ParameterError::NonNumeric {
            rotor: self.rotor.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    fn out_of_range(&self, field: &str, reason: String) -> ParameterError {
        ParameterError::OutOfRange {
            rotor: self.rotor.to_string(),
            field: field.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// A physically plausible record in the nested JSON file shape
    pub(crate) fn sample_record() -> Value {
        json!({
            "density": 7850,
            "radius": 0.5,
            "holeRadius": 0.05,
            "deltaR": 0.0225,
            "scanCycle": 5,
            "surfaceFactor": 1.0,
            "centerFactor": 1.0,
            "freeFactor": 500,
            "slaveID": "1",
            "controlWord": "100",
            "tcz": { "X": [0, 200, 400, 600], "Y": [38.0, 36.5, 34.0, 31.0] },
            "shz": { "X": [0, 200, 400, 600], "Y": [0.46, 0.50, 0.55, 0.62] },
            "emz": { "X": [0, 200, 400, 600], "Y": [210.0, 198.0, 185.0, 170.0] },
            "prz": { "X": [0, 600], "Y": [0.29, 0.31] },
            "lecz": { "X": [0, 200, 400, 600], "Y": [11.5, 12.3, 13.1, 13.8] },
            "SN1": { "X": [100, 200, 400], "Y": [1.0e6, 1.0e5, 1.0e4] },
            "SN2": { "X": [90, 180, 360], "Y": [8.0e5, 8.0e4, 8.0e3] },
            "SN3": { "X": [80, 160, 320], "Y": [6.0e5, 6.0e4, 6.0e3] },
            "sn": [250, 450]
        })
    }

    #[test]
    fn test_nested_record() {
        let record = parse_record("A", &sample_record()).unwrap();
        assert_eq!(record.slave_id, 1);
        assert_eq!(record.control_word, 100);
        assert_eq!(record.surface_temp_register, 0);
        assert_eq!(record.parameters.sn_band, [250.0, 450.0]);
        assert_eq!(record.parameters.thermal_conductivity.points(), 4);
        assert_eq!(record.parameters.sn_curves[1].first_x(), 90.0);
    }

    #[test]
    fn test_flat_string_record() {
        let record = json!({
            "density": "7850", "radius": "0.5", "holeRadius": "0.05", "deltaR": "0.0225",
            "scanCycle": "5", "surfaceFactor": "1", "centerFactor": "1", "freeFactor": "500",
            "slaveID": "3", "controlWord": "7", "surfaceTempRegister": "12",
            "tcz_X": "0,600", "tcz_Y": "38,31",
            "shz_X": "0,600", "shz_Y": "0.46,0.62",
            "emz_X": "0,600", "emz_Y": "210,170",
            "prz_X": "0,600", "prz_Y": "0.29,0.31",
            "lecz_X": "0,600", "lecz_Y": "11.5,13.8", "lecz_points": "2",
            "SN1_X": "100,200", "SN1_Y": "1e6,1e5",
            "SN2_X": "100,200", "SN2_Y": "1e6,1e5",
            "SN3_X": "100,200", "SN3_Y": "1e6,1e5",
            "sn": "250,450"
        });
        let mut hash = HashMap::new();
        hash.insert("B".to_string(), record.to_string());

        let registry = RotorRegistry::from_hash(&hash).unwrap();
        let record = registry.get("B").unwrap();
        assert_eq!(record.slave_id, 3);
        assert_eq!(record.surface_temp_register, 12);
        assert_eq!(record.parameters.linear_expansion.y(), &[11.5, 13.8]);
    }

    #[test]
    fn test_default_point_counts() {
        let mut record = sample_record();
        let x: Vec<f64> = (0..10).map(|i| f64::from(i) * 60.0).collect();
        let y: Vec<f64> = (0..10).map(|i| 40.0 - f64::from(i)).collect();
        let table = json!({ "X": x, "Y": y });
        record["tcz"] = table.clone();
        record["lecz"] = table.clone();
        record["SN1"] = json!({ "X": x, "Y": (0..10).map(|i| 1.0e6 / f64::from(i + 1)).collect::<Vec<_>>() });
        record["shz"] = json!({ "X": x, "Y": y, "points": 10 });

        let parameters = parse_record("A", &record).unwrap().parameters;
        assert_eq!(parameters.thermal_conductivity.points(), PROPERTY_CURVE_POINTS);
        // Beyond the eighth point the property table is clamped to it
        assert_eq!(parameters.thermal_conductivity.value_at(540.0), 33.0);
        assert_eq!(parameters.specific_heat.points(), 10);
        assert_eq!(parameters.linear_expansion.points(), 10);
        assert_eq!(parameters.sn_curves[0].points(), 10);
        // Shorter tables keep their own length
        assert_eq!(parameters.poisson_ratio.points(), 2);
    }

    #[test]
    fn test_missing_field_is_reported() {
        let mut record = sample_record();
        record.as_object_mut().unwrap().remove("deltaR");
        let err = parse_record("A", &record).unwrap_err();
        assert!(matches!(err, ParameterError::MissingField { ref field, .. } if field == "deltaR"));
    }

    #[test]
    fn test_non_numeric_field_is_reported() {
        let mut record = sample_record();
        record["density"] = json!("heavy");
        let err = parse_record("A", &record).unwrap_err();
        assert!(matches!(err, ParameterError::NonNumeric { ref field, .. } if field == "density"));
    }

    #[test]
    fn test_non_increasing_curve_is_rejected() {
        let mut record = sample_record();
        record["emz"] = json!({ "X": [0, 200, 200], "Y": [1, 2, 3] });
        let err = parse_record("A", &record).unwrap_err();
        assert!(matches!(err, ParameterError::InvalidCurve { ref curve, .. } if curve == "emz"));
    }

    #[test]
    fn test_geometry_is_checked() {
        let mut record = sample_record();
        record["deltaR"] = json!(0.03);
        assert!(matches!(
            parse_record("A", &record),
            Err(ParameterError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_registry_is_ordered_and_not_empty() {
        let set = json!({ "Z": sample_record(), "A": sample_record() });
        let registry = RotorRegistry::from_value(&set).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["A", "Z"]);

        assert!(matches!(
            RotorRegistry::from_value(&json!({})),
            Err(ParameterError::Empty)
        ));
    }
}
