// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Stateful simulation of one rotor
//!
//! A [`RotorSimulator`] owns the rotor's thermal field, stress state, fatigue
//! tracker and life ratios together with its own field-bus reader. Each call
//! to [`RotorSimulator::step`] runs one cycle in a fixed order:
//!
//! 1. read the control word and apply the requested counter resets
//! 2. advance the radial temperature field
//! 3. evaluate the thermal stresses
//! 4. update the fatigue tracker and persist any life consumption
//! 5. read the surface temperature used as boundary of the next cycle
//!
//! Field-bus and store failures are logged and never abort a step.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use super::snapshot::{AlertThresholds, RotorSnapshot};
use crate::modbus::register_map::registers_to_f32;
use crate::modbus::RegisterReader;
use crate::parameters::{RotorParameters, RotorRecord};
use crate::physics::fatigue::{
    FatigueEvent, FatigueTracker, LifeRatios, ResetRequest, DEFAULT_STRESS_CONCENTRATION,
};
use crate::physics::stress::ThermalStress;
use crate::physics::thermal::ThermalField;
use crate::storage::LifeCounters;

/// Tunables shared by every rotor of a unit
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    /// Multiplier applied to the peak stress before the S-N lookup
    pub stress_concentration: f64,
    /// Lowest plausible surface temperature reading
    pub surface_temp_min: f64,
    /// Highest plausible surface temperature reading
    pub surface_temp_max: f64,
    /// Initial temperature when no valid reading is available at startup
    pub fallback_temperature: f64,
    pub alerts: AlertThresholds,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            stress_concentration: DEFAULT_STRESS_CONCENTRATION,
            surface_temp_min: 0.0,
            surface_temp_max: 600.0,
            fallback_temperature: 20.0,
            alerts: AlertThresholds::default(),
        }
    }
}

/// What happened during one step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub reset: ResetRequest,
    pub fatigue: FatigueEvent,
    pub average_temperature: f64,
    pub combined_stress: f64,
}

pub struct RotorSimulator {
    record: RotorRecord,
    reader: Box<dyn RegisterReader>,
    counters: LifeCounters,
    settings: SimulationSettings,
    field: ThermalField,
    stress: ThermalStress,
    fatigue: FatigueTracker,
    ratios: LifeRatios,
    surface_temperature: f64,
}

impl RotorSimulator {
    /// Build a simulator and restore its durable state
    ///
    /// The life ratios are loaded from the counter store and the field is
    /// seeded uniformly from the first valid surface temperature reading, or
    /// from the fallback temperature.
    ///
    /// # Errors
    ///
    /// Fails when the stored life counters cannot be read.
    pub async fn new(
        record: RotorRecord,
        reader: Box<dyn RegisterReader>,
        counters: LifeCounters,
        settings: SimulationSettings,
    ) -> Result<Self> {
        let ratios = counters
            .load()
            .await
            .with_context(|| format!("Failed to restore life counters of rotor {}", record.name))?;

        let mut simulator = Self {
            field: ThermalField::uniform(settings.fallback_temperature),
            stress: ThermalStress::default(),
            fatigue: FatigueTracker::new(settings.stress_concentration),
            surface_temperature: settings.fallback_temperature,
            record,
            reader,
            counters,
            settings,
            ratios,
        };

        match simulator.read_surface_temperature().await {
            Some(temperature) => simulator.surface_temperature = temperature,
            None => warn!(
                "Rotor {}: no surface temperature at startup, starting at {}",
                simulator.record.name, simulator.surface_temperature
            ),
        }
        simulator.field = ThermalField::uniform(simulator.surface_temperature);
        simulator.stress = ThermalStress::evaluate(
            &simulator.record.parameters,
            simulator.surface_temperature,
            simulator.surface_temperature,
            simulator.surface_temperature,
        );

        info!(
            "Rotor {} ready: slave {}, life {}, overhaul life {}, initial temperature {}",
            simulator.record.name,
            simulator.record.slave_id,
            simulator.ratios.life,
            simulator.ratios.overhaul_life,
            simulator.surface_temperature
        );
        Ok(simulator)
    }

    /// Run one simulation cycle
    pub async fn step(&mut self) -> StepReport {
        let params = Arc::clone(&self.record.parameters);

        let reset = self.read_control_word().await;
        if reset.any() {
            self.apply_reset(reset).await;
        }

        self.field.advance(&params);
        let average = self.field.average();

        self.stress = ThermalStress::evaluate(
            &params,
            average,
            self.field.surface().last,
            self.field.bore().last,
        );

        let fatigue = self.update_fatigue(&params, average, reset).await;

        if let Some(temperature) = self.read_surface_temperature().await {
            self.surface_temperature = temperature;
        }
        self.field.set_surface_reading(self.surface_temperature);

        debug!(
            "Rotor {}: average {:.3}, stress {:.3}, margin {:.2}%",
            self.record.name, average, self.stress.combined, self.stress.margin
        );

        StepReport {
            reset,
            fatigue,
            average_temperature: average,
            combined_stress: self.stress.combined,
        }
    }

    async fn read_control_word(&mut self) -> ResetRequest {
        let words = self
            .reader
            .read_registers(self.record.control_word, 1)
            .await;
        match words.first() {
            Some(&word) => ResetRequest::from_control_word(word),
            None => {
                debug!(
                    "Rotor {}: no control word this cycle",
                    self.record.name
                );
                ResetRequest::default()
            }
        }
    }

    async fn apply_reset(&mut self, reset: ResetRequest) {
        self.ratios.apply_reset(reset);
        if reset.life {
            info!("Rotor {}: life ratio reset requested", self.record.name);
            if let Err(e) = self.counters.write_life(0.0).await {
                warn!("Rotor {}: failed to store life reset: {:#}", self.record.name, e);
            }
        }
        if reset.overhaul_life {
            info!("Rotor {}: overhaul life ratio reset requested", self.record.name);
            if let Err(e) = self.counters.write_overhaul_life(0.0).await {
                warn!(
                    "Rotor {}: failed to store overhaul life reset: {:#}",
                    self.record.name, e
                );
            }
        }
    }

    async fn update_fatigue(
        &mut self,
        params: &RotorParameters,
        average: f64,
        reset: ResetRequest,
    ) -> FatigueEvent {
        let event = self.fatigue.update(params, self.stress.combined, average);
        match event {
            FatigueEvent::Consumed {
                peak,
                cycles_to_failure,
                increment,
            } => {
                self.ratios.consume(increment, reset);
                info!(
                    "Rotor {}: load cycle peak {:.3}, {:.1} cycles to failure, life {}, overhaul life {}",
                    self.record.name, peak, cycles_to_failure, self.ratios.life, self.ratios.overhaul_life
                );
                persist_ratios(&self.counters, &self.record.name, self.ratios).await;
            }
            FatigueEvent::Discarded {
                peak,
                cycles_to_failure,
            } => {
                warn!(
                    "Rotor {}: S-N curve gives {} cycles at peak {:.3}, cycle ignored",
                    self.record.name, cycles_to_failure, peak
                );
            }
            FatigueEvent::Idle | FatigueEvent::Loading { .. } => {}
        }
        event
    }

    async fn read_surface_temperature(&mut self) -> Option<f64> {
        let words = self
            .reader
            .read_registers(self.record.surface_temp_register, 2)
            .await;
        if words.len() < 2 {
            return None;
        }
        let temperature = f64::from(registers_to_f32([words[0], words[1]]));
        if !temperature.is_finite()
            || temperature < self.settings.surface_temp_min
            || temperature > self.settings.surface_temp_max
        {
            warn!(
                "Rotor {}: surface temperature {} rejected, keeping {}",
                self.record.name, temperature, self.surface_temperature
            );
            return None;
        }
        Some(temperature)
    }

    /// Current results, ready for publication
    pub fn snapshot(&self) -> RotorSnapshot {
        RotorSnapshot {
            life_ratio: self.ratios.life,
            overhaul_life_ratio: self.ratios.overhaul_life,
            alert: self.settings.alerts.evaluate(self.ratios),
            surface_temperature: self.surface_temperature,
            temperature: *self.field.series(),
            bore_temperature: self.field.bore().last,
            center_thermal_stress: self.stress.center,
            surface_thermal_stress: self.stress.surface,
            thermal_stress: self.stress.combined,
            thermal_stress_margin: self.stress.margin,
        }
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn record(&self) -> &RotorRecord {
        &self.record
    }

    pub fn ratios(&self) -> LifeRatios {
        self.ratios
    }

    pub fn field(&self) -> &ThermalField {
        &self.field
    }

    pub fn stress(&self) -> ThermalStress {
        self.stress
    }

    /// Running peak stress of the fatigue tracker
    pub fn peak_stress(&self) -> f64 {
        self.fatigue.peak()
    }

    /// Latest accepted surface temperature reading
    pub fn surface_temperature(&self) -> f64 {
        self.surface_temperature
    }
}

/// Store both ratios, then read them back to catch a store that lost the write
async fn persist_ratios(counters: &LifeCounters, rotor: &str, ratios: LifeRatios) {
    if let Err(e) = counters.persist(ratios).await {
        warn!("Rotor {}: failed to store life ratios: {:#}", rotor, e);
        return;
    }
    match counters.load().await {
        Ok(stored) if stored == ratios => {}
        Ok(stored) => warn!(
            "Rotor {}: stored ratios {:?} differ from computed {:?}",
            rotor, stored, ratios
        ),
        Err(e) => warn!("Rotor {}: failed to read back life ratios: {:#}", rotor, e),
    }
}
