// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-rotor simulation state and its published results

pub mod simulator;
pub mod snapshot;

pub use simulator::{RotorSimulator, SimulationSettings, StepReport};
pub use snapshot::{Alert, AlertThresholds, RotorSnapshot};
