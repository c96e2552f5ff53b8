// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Radial temperature field of a rotor
//!
//! The rotor cross-section is sampled at [`NODE_COUNT`] radial nodes, node 0
//! sitting next to the outer surface and node 19 next to the central bore.
//! Every step advances each node with an explicit finite-difference update
//! driven by the node's own previous temperature and those of its radial
//! neighbours. The outer surface reading is the boundary condition of node 0
//! and the bore temperature, extrapolated from the two innermost nodes, is the
//! boundary of node 19.

use log::warn;

use crate::parameters::RotorParameters;

/// Number of radial nodes of the finite-difference model
pub const NODE_COUNT: usize = 20;

/// Length of the decimated radial series published as telemetry
pub const SERIES_LEN: usize = NODE_COUNT / 2;

/// A temperature tracked across one step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TempPoint {
    /// Value the current step reads from
    pub last: f64,
    /// Value produced by the current step
    pub current: f64,
}

impl TempPoint {
    pub fn uniform(temperature: f64) -> Self {
        Self {
            last: temperature,
            current: temperature,
        }
    }

    fn commit(&mut self) {
        self.last = self.current;
    }
}

/// State of the radial temperature field
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalField {
    nodes: [TempPoint; NODE_COUNT],
    bore: TempPoint,
    surface: TempPoint,
    average: f64,
    series: [f64; SERIES_LEN],
}

impl ThermalField {
    /// A field at rest: every node, the bore and the surface at `temperature`
    pub fn uniform(temperature: f64) -> Self {
        Self {
            nodes: [TempPoint::uniform(temperature); NODE_COUNT],
            bore: TempPoint::uniform(temperature),
            surface: TempPoint::uniform(temperature),
            average: temperature,
            series: [temperature; SERIES_LEN],
        }
    }

    /// Record a new outer surface reading, used as boundary on the next step
    pub fn set_surface_reading(&mut self, temperature: f64) {
        self.surface.current = temperature;
    }

    /// Advance the field by one time step
    ///
    /// Computes the new node temperatures and the bore temperature, the
    /// area-weighted average and the decimated series, then commits every
    /// current value into its `last` slot.
    pub fn advance(&mut self, params: &RotorParameters) {
        self.compute_nodes(params);
        self.compute_average(params);
        self.commit();
    }

    fn compute_nodes(&mut self, params: &RotorParameters) {
        let dr = params.delta_r;

        for i in 0..NODE_COUNT {
            let previous = self.nodes[i].last;
            let tc = params.thermal_conductivity.value_at(previous);
            let sh = params.specific_heat.value_at(previous);
            let ri = params.node_radius(i);

            // Weights of each branch sum to zero so a uniform field stays uniform
            let (outer, own, inner) = if i == 0 {
                (
                    2.0 * (ri - dr / 4.0) * self.surface.current,
                    3.0 * (ri - dr / 2.0) * previous,
                    (ri - dr) * self.nodes[i + 1].last,
                )
            } else if i == NODE_COUNT - 1 {
                (
                    ri * self.nodes[i - 1].last,
                    3.0 * (ri - dr / 2.0) * previous,
                    2.0 * (ri - 3.0 * dr / 4.0) * self.bore.last,
                )
            } else {
                (
                    ri * self.nodes[i - 1].last,
                    (2.0 * ri - dr) * previous,
                    (ri - dr) * self.nodes[i + 1].last,
                )
            };

            let numerator = 2.0 * tc * params.scan_cycle;
            let denominator = (2.0 * ri - dr) * params.density * sh * dr * dr * 1000.0;
            let next = previous + numerator * (outer - own + inner) / denominator;

            self.nodes[i].current = if next.is_finite() {
                next
            } else {
                warn!(
                    "Node {} produced a non-finite temperature (tc={}, sh={}), keeping {}",
                    i, tc, sh, previous
                );
                previous
            };
        }

        self.bore.current =
            (3.0 * self.nodes[NODE_COUNT - 1].current - self.nodes[NODE_COUNT - 2].current) / 2.0;
    }

    fn compute_average(&mut self, params: &RotorParameters) {
        let dr = params.delta_r;
        let mut weighted_sum = 0.0;
        let mut weight_sum = 0.0;

        for (pair, chunk) in self.nodes.chunks_exact(2).enumerate() {
            let mut pair_sum = 0.0;
            let mut pair_weight = 0.0;
            for (offset, node) in chunk.iter().enumerate() {
                let ri = params.node_radius(pair * 2 + offset);
                let weight = 2.0 * ri * dr - dr * dr;
                pair_sum += weight * node.current;
                pair_weight += weight;
            }
            self.series[pair] = pair_sum / pair_weight;
            weighted_sum += pair_sum;
            weight_sum += pair_weight;
        }

        self.average = weighted_sum / weight_sum;
    }

    fn commit(&mut self) {
        for node in self.nodes.iter_mut() {
            node.commit();
        }
        self.bore.commit();
        self.surface.commit();
    }

    pub fn nodes(&self) -> &[TempPoint; NODE_COUNT] {
        &self.nodes
    }

    pub fn bore(&self) -> TempPoint {
        self.bore
    }

    pub fn surface(&self) -> TempPoint {
        self.surface
    }

    /// Area-weighted average temperature of the last step
    pub fn average(&self) -> f64 {
        self.average
    }

    /// Decimated radial series of the last step, outer pair first
    pub fn series(&self) -> &[f64; SERIES_LEN] {
        &self.series
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{parse_record, tests::sample_record};
    use approx::assert_relative_eq;

    fn params() -> RotorParameters {
        (*parse_record("A", &sample_record()).unwrap().parameters).clone()
    }

    #[test]
    fn test_uniform_field_stays_uniform() {
        let params = params();
        let mut field = ThermalField::uniform(312.5);
        for _ in 0..5 {
            field.advance(&params);
        }
        assert_relative_eq!(field.average(), 312.5, epsilon = 1e-9);
        assert_relative_eq!(field.bore().current, 312.5, epsilon = 1e-9);
        for node in field.nodes() {
            assert_relative_eq!(node.current, 312.5, epsilon = 1e-9);
            assert_eq!(node.last, node.current);
        }
        for value in field.series() {
            assert_relative_eq!(*value, 312.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_surface_heating_propagates_inwards() {
        let params = params();
        let mut field = ThermalField::uniform(100.0);
        field.set_surface_reading(400.0);
        field.advance(&params);

        let nodes = field.nodes();
        assert!(nodes[0].current > 100.0);
        // Only the outer node sees the boundary on the first step
        assert_relative_eq!(nodes[1].current, 100.0, epsilon = 1e-9);
        assert!(field.average() > 100.0);
        assert!(field.series()[0] > field.series()[SERIES_LEN - 1]);

        field.advance(&params);
        assert!(field.nodes()[1].current > 100.0);
        assert_eq!(field.surface().last, 400.0);
    }

    #[test]
    fn test_bore_is_extrapolated_from_innermost_nodes() {
        let params = params();
        let mut field = ThermalField::uniform(50.0);
        field.nodes[NODE_COUNT - 2].last = 60.0;
        field.advance(&params);
        let n = field.nodes();
        assert_relative_eq!(
            field.bore().current,
            (3.0 * n[NODE_COUNT - 1].current - n[NODE_COUNT - 2].current) / 2.0
        );
    }
}
