// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust rotor monitor library
//!
//! Thermal stress and fatigue life monitoring of turbine rotors. Each rotor is
//! simulated from its surface temperature, read over Modbus TCP, and its
//! results are published as telemetry and as a Modbus holding register map.

pub mod config;
pub mod daemon;
pub mod modbus;
pub mod parameters;
pub mod physics;
pub mod rotor;
pub mod scheduler;
pub mod storage;
pub mod telemetry;
