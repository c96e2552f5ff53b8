// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Piecewise-linear material property tables
//!
//! Every temperature dependent property of a rotor (thermal conductivity,
//! specific heat, elastic modulus, Poisson's ratio, linear expansion) and the
//! three S-N fatigue curves are stored as a [`MaterialCurve`]. Lookups clamp
//! outside the tabulated range and interpolate linearly inside it.

use thiserror::Error;

/// Reasons a property table is rejected when it is loaded
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CurveError {
    #[error("curve has no points")]
    Empty,

    #[error("curve X has {x} values but Y has {y}")]
    LengthMismatch { x: usize, y: usize },

    #[error("curve X must be strictly increasing (X[{index}] = {value} is not above {prev_value})")]
    NotIncreasing {
        index: usize,
        value: f64,
        prev_value: f64,
    },

    #[error("curve contains a non-finite value at index {index}")]
    NonFinite { index: usize },

    #[error("effective point count {points} is outside 1..={len}")]
    PointCount { points: usize, len: usize },
}

/// An immutable, strictly increasing (x, y) table
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialCurve {
    x: Vec<f64>,
    y: Vec<f64>,
    points: usize,
}

impl MaterialCurve {
    /// Build a curve using every tabulated point
    ///
    /// # Errors
    ///
    /// Returns a [`CurveError`] when the table is empty, X and Y differ in
    /// length, a value is not finite, or X is not strictly increasing.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, CurveError> {
        if x.len() != y.len() {
            return Err(CurveError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            });
        }
        if x.is_empty() {
            return Err(CurveError::Empty);
        }
        if let Some(index) = x
            .iter()
            .zip(y.iter())
            .position(|(a, b)| !a.is_finite() || !b.is_finite())
        {
            return Err(CurveError::NonFinite { index });
        }
        if let Some(index) = (1..x.len()).find(|&i| x[i] <= x[i - 1]) {
            return Err(CurveError::NotIncreasing {
                index,
                value: x[index],
                prev_value: x[index - 1],
            });
        }

        let points = x.len();
        Ok(Self { x, y, points })
    }

    /// Restrict lookups to the first `points` entries of the table
    pub fn with_points(mut self, points: usize) -> Result<Self, CurveError> {
        if points == 0 || points > self.x.len() {
            return Err(CurveError::PointCount {
                points,
                len: self.x.len(),
            });
        }
        self.points = points;
        Ok(self)
    }

    /// Interpolated value at `query` over the effective points
    pub fn value_at(&self, query: f64) -> f64 {
        interpolate(query, &self.x, &self.y, self.points)
    }

    /// First tabulated X value
    ///
    /// For S-N curves this is the lowest stress that consumes life.
    pub fn first_x(&self) -> f64 {
        self.x[0]
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn points(&self) -> usize {
        self.points
    }
}

/// Piecewise-linear lookup over the first `points` entries of a table
///
/// * `points == 0` or `points` larger than the table returns `0.0`, which
///   callers must read as "no data".
/// * A query below `x[0]` returns `y[0]`.
/// * A query at or above `x[points - 1]` returns `y[points - 1]`.
/// * Otherwise the bracketing interval `[x[i-1], x[i])` is found scanning from
///   the low end and the value is interpolated linearly.
pub fn interpolate(query: f64, x: &[f64], y: &[f64], points: usize) -> f64 {
    if points == 0 || points > x.len() || points > y.len() {
        return 0.0;
    }

    if query < x[0] {
        return y[0];
    }
    if query >= x[points - 1] {
        return y[points - 1];
    }

    for i in 1..points {
        if query < x[i] {
            return y[i - 1] + (y[i] - y[i - 1]) * (query - x[i - 1]) / (x[i] - x[i - 1]);
        }
    }

    // NaN queries fall through every comparison
    0.0
}
