// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Fatigue life consumption
//!
//! Life is consumed with a single-threshold hysteresis counter: while the
//! combined thermal stress stays at or above the active S-N threshold the
//! tracker records the peak; once the stress falls back below the threshold
//! the peak is turned into one load/unload cycle, the S-N curve gives the
//! cycles to failure at that peak and `1 / cycles` is added to both life
//! ratios. Only one peak is tracked at a time.

use crate::parameters::RotorParameters;
use crate::physics::interpolation::MaterialCurve;

/// Default stress concentration multiplier applied to the peak
pub const DEFAULT_STRESS_CONCENTRATION: f64 = 1.0;

/// Temperature band selecting one of the three S-N curves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureBand {
    Low,
    Middle,
    High,
}

impl TemperatureBand {
    /// Band of `average` given the two configured boundaries
    pub fn of(average: f64, boundaries: [f64; 2]) -> Self {
        if average < boundaries[0] {
            TemperatureBand::Low
        } else if average > boundaries[1] {
            TemperatureBand::High
        } else {
            TemperatureBand::Middle
        }
    }

    pub fn curve(self, params: &RotorParameters) -> &MaterialCurve {
        match self {
            TemperatureBand::Low => &params.sn_curves[0],
            TemperatureBand::Middle => &params.sn_curves[1],
            TemperatureBand::High => &params.sn_curves[2],
        }
    }
}

/// What one fatigue update did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FatigueEvent {
    /// Stress below the threshold with no pending peak
    Idle,
    /// Stress at or above the threshold, peak updated if exceeded
    Loading { peak: f64 },
    /// A full cycle was closed and life consumed
    Consumed {
        peak: f64,
        cycles_to_failure: f64,
        increment: f64,
    },
    /// A cycle was closed but the S-N curve gave no usable cycle count
    Discarded { peak: f64, cycles_to_failure: f64 },
}

/// Peak stress tracker of one rotor
#[derive(Debug, Clone, PartialEq)]
pub struct FatigueTracker {
    peak: f64,
    stress_concentration: f64,
}

impl Default for FatigueTracker {
    fn default() -> Self {
        Self::new(DEFAULT_STRESS_CONCENTRATION)
    }
}

impl FatigueTracker {
    pub fn new(stress_concentration: f64) -> Self {
        Self {
            peak: 0.0,
            stress_concentration,
        }
    }

    /// Running peak stress since the last consumption
    pub fn peak(&self) -> f64 {
        self.peak
    }

    /// Feed the combined stress of one step
    pub fn update(
        &mut self,
        params: &RotorParameters,
        combined_stress: f64,
        average_temperature: f64,
    ) -> FatigueEvent {
        let curve = TemperatureBand::of(average_temperature, params.sn_band).curve(params);
        let threshold = curve.first_x().abs();

        if combined_stress.abs() >= threshold {
            if combined_stress > self.peak {
                self.peak = combined_stress;
            }
            return FatigueEvent::Loading { peak: self.peak };
        }

        if self.peak <= threshold {
            return FatigueEvent::Idle;
        }

        let peak = self.peak;
        self.peak = 0.0;

        let cycles_to_failure = curve.value_at(self.stress_concentration * peak);
        if cycles_to_failure > 0.0 && cycles_to_failure.is_finite() {
            FatigueEvent::Consumed {
                peak,
                cycles_to_failure,
                increment: 1.0 / cycles_to_failure,
            }
        } else {
            FatigueEvent::Discarded {
                peak,
                cycles_to_failure,
            }
        }
    }
}

/// Operator reset bits read from the control word
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetRequest {
    /// Bit 0: reset the life ratio
    pub life: bool,
    /// Bit 1: reset the overhaul life ratio
    pub overhaul_life: bool,
}

impl ResetRequest {
    pub fn from_control_word(word: u16) -> Self {
        Self {
            life: word & 0x1 != 0,
            overhaul_life: word & 0x2 != 0,
        }
    }

    pub fn any(&self) -> bool {
        self.life || self.overhaul_life
    }
}

/// The two cumulative fatigue ratios of a rotor
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LifeRatios {
    pub life: f64,
    pub overhaul_life: f64,
}

impl LifeRatios {
    /// Zero the ratios selected by `reset`
    pub fn apply_reset(&mut self, reset: ResetRequest) {
        if reset.life {
            self.life = 0.0;
        }
        if reset.overhaul_life {
            self.overhaul_life = 0.0;
        }
    }

    /// Add one consumption increment
    ///
    /// A ratio reset during the same cycle stays at zero.
    pub fn consume(&mut self, increment: f64, reset: ResetRequest) {
        if !reset.life {
            self.life += increment;
        }
        if !reset.overhaul_life {
            self.overhaul_life += increment;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{parse_record, tests::sample_record};
    use approx::assert_relative_eq;
    use serde_json::json;

    fn params() -> RotorParameters {
        let mut record = sample_record();
        record["SN1"] = json!({ "X": [100, 200], "Y": [1.0e6, 1.0e4] });
        record["SN2"] = json!({ "X": [100, 200], "Y": [1.0e6, 1.0e4] });
        record["SN3"] = json!({ "X": [100, 200], "Y": [1.0e6, 1.0e4] });
        (*parse_record("A", &record).unwrap().parameters).clone()
    }

    #[test]
    fn test_band_selection() {
        assert_eq!(TemperatureBand::of(100.0, [250.0, 450.0]), TemperatureBand::Low);
        assert_eq!(TemperatureBand::of(250.0, [250.0, 450.0]), TemperatureBand::Middle);
        assert_eq!(TemperatureBand::of(450.0, [250.0, 450.0]), TemperatureBand::Middle);
        assert_eq!(TemperatureBand::of(451.0, [250.0, 450.0]), TemperatureBand::High);
    }

    #[test]
    fn test_single_cycle_consumes_once_at_peak() {
        let params = params();
        let mut tracker = FatigueTracker::default();

        assert_eq!(tracker.update(&params, 120.0, 20.0), FatigueEvent::Loading { peak: 120.0 });
        assert_eq!(tracker.update(&params, 150.0, 20.0), FatigueEvent::Loading { peak: 150.0 });

        match tracker.update(&params, 50.0, 20.0) {
            FatigueEvent::Consumed {
                peak,
                cycles_to_failure,
                increment,
            } => {
                assert_eq!(peak, 150.0);
                assert_relative_eq!(cycles_to_failure, 505_000.0);
                assert_relative_eq!(increment, 1.0 / 505_000.0);
            }
            other => panic!("expected consumption, got {:?}", other),
        }
        assert_eq!(tracker.peak(), 0.0);

        // Nothing left to consume
        assert_eq!(tracker.update(&params, 40.0, 20.0), FatigueEvent::Idle);
        assert_eq!(tracker.peak(), 0.0);
    }

    #[test]
    fn test_stress_concentration_scales_lookup() {
        let params = params();
        let mut tracker = FatigueTracker::new(2.0);
        tracker.update(&params, 100.0, 20.0);
        match tracker.update(&params, 10.0, 20.0) {
            // Peak equals the threshold so no full cycle is detected
            FatigueEvent::Idle => {}
            other => panic!("unexpected {:?}", other),
        }
        tracker.update(&params, 110.0, 20.0);
        match tracker.update(&params, 10.0, 20.0) {
            FatigueEvent::Consumed {
                cycles_to_failure, ..
            } => assert_relative_eq!(cycles_to_failure, 1.0e4),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ratios_reset_wins_over_same_cycle_consumption() {
        let mut ratios = LifeRatios {
            life: 0.5,
            overhaul_life: 0.02,
        };
        let reset = ResetRequest::from_control_word(0b01);
        ratios.apply_reset(reset);
        ratios.consume(0.001, reset);
        assert_eq!(ratios.life, 0.0);
        assert_relative_eq!(ratios.overhaul_life, 0.021);

        ratios.consume(0.001, ResetRequest::default());
        assert_relative_eq!(ratios.life, 0.001);
        assert_relative_eq!(ratios.overhaul_life, 0.022);
    }

    #[test]
    fn test_control_word_bits() {
        assert_eq!(ResetRequest::from_control_word(0), ResetRequest::default());
        let both = ResetRequest::from_control_word(0xFF03);
        assert!(both.life && both.overhaul_life);
        assert!(!ResetRequest::from_control_word(0x4).any());
    }
}
