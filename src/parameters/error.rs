// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::path::PathBuf;
use thiserror::Error;

use crate::physics::interpolation::CurveError;

/// Errors raised while loading rotor parameter records
///
/// All of them are fatal at startup.
#[derive(Error, Debug)]
pub enum ParameterError {
    #[error("Failed to read parameter file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parameter document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parameter record for '{rotor}' is not valid JSON: {source}")]
    RecordJson {
        rotor: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Expected a JSON object for {what}")]
    NotAnObject { what: String },

    #[error("Parameter set is empty")]
    Empty,

    #[error("Rotor '{rotor}': missing required field '{field}'")]
    MissingField { rotor: String, field: String },

    #[error("Rotor '{rotor}': field '{field}' is not numeric ({value})")]
    NonNumeric {
        rotor: String,
        field: String,
        value: String,
    },

    #[error("Rotor '{rotor}': curve '{curve}' is invalid: {source}")]
    InvalidCurve {
        rotor: String,
        curve: String,
        #[source]
        source: CurveError,
    },

    #[error("Rotor '{rotor}': field '{field}' {reason}")]
    OutOfRange {
        rotor: String,
        field: String,
        reason: String,
    },
}
