// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Thermal stress at the outer surface and at the bore

use crate::parameters::RotorParameters;

/// Thermal stress state of one step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThermalStress {
    /// Stress at the outer surface
    pub surface: f64,
    /// Stress at the central bore
    pub center: f64,
    /// Larger of the two magnitudes
    pub combined: f64,
    /// Remaining margin against the reference stress, in percent
    pub margin: f64,
}

impl ThermalStress {
    /// Evaluate stresses from the average field temperature and the two
    /// boundary temperatures
    ///
    /// Material properties are interpolated at `average`.
    pub fn evaluate(
        params: &RotorParameters,
        average: f64,
        surface_temperature: f64,
        bore_temperature: f64,
    ) -> Self {
        let modulus = params.elastic_modulus.value_at(average);
        let poisson = params.poisson_ratio.value_at(average);
        let expansion = params.linear_expansion.value_at(average);

        let stress = |factor: f64, point: f64| {
            factor * modulus * expansion * (average - point) / 1000.0 / (1.0 - poisson)
        };

        let surface = stress(params.surface_factor, surface_temperature);
        let center = stress(params.center_factor, bore_temperature);
        let combined = surface.abs().max(center.abs());
        let margin = 100.0 * (1.0 - combined / params.free_factor);

        Self {
            surface,
            center,
            combined,
            margin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{parse_record, tests::sample_record};
    use approx::assert_relative_eq;

    #[test]
    fn test_no_gradient_means_no_stress() {
        let record = parse_record("A", &sample_record()).unwrap();
        let stress = ThermalStress::evaluate(&record.parameters, 200.0, 200.0, 200.0);
        assert_eq!(stress.surface, 0.0);
        assert_eq!(stress.center, 0.0);
        assert_eq!(stress.combined, 0.0);
        assert_relative_eq!(stress.margin, 100.0);
    }

    #[test]
    fn test_hot_surface_gives_compressive_surface_stress() {
        let record = parse_record("A", &sample_record()).unwrap();
        let p = &record.parameters;
        let stress = ThermalStress::evaluate(p, 200.0, 300.0, 180.0);

        // At 200: E = 198, alpha = 12.3, nu = 0.29 + 0.02 / 3
        let nu = 0.29 + 0.02 * 200.0 / 600.0;
        let expected_surface = 198.0 * 12.3 * (200.0 - 300.0) / 1000.0 / (1.0 - nu);
        let expected_center = 198.0 * 12.3 * (200.0 - 180.0) / 1000.0 / (1.0 - nu);

        assert_relative_eq!(stress.surface, expected_surface, epsilon = 1e-9);
        assert_relative_eq!(stress.center, expected_center, epsilon = 1e-9);
        assert_relative_eq!(stress.combined, expected_surface.abs(), epsilon = 1e-9);
        assert_relative_eq!(
            stress.margin,
            100.0 * (1.0 - expected_surface.abs() / 500.0),
            epsilon = 1e-9
        );
    }
}
