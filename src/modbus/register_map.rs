// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Holding register layout of the rotor blocks
//!
//! Every rotor owns [`ROTOR_BLOCK_STRIDE`] consecutive holding registers
//! starting at `ROTOR_BLOCK_STRIDE * rotor_index`. Floats are IEEE-754 single
//! precision split over two registers, low 16 bits first.
//!
//! | Offset | Registers | Content |
//! |--------|-----------|---------|
//! | 0 | 1 | Alert code (0 none, 1 overhaul, 2 scrap) |
//! | 1 | 2 | Center thermal stress |
//! | 3 | 2 | Life ratio |
//! | 5 | 2 | Overhaul life ratio |
//! | 7 | 2 | Surface thermal stress |
//! | 9 | 2 | Bore temperature |
//! | 11 | 2 | Combined thermal stress |
//! | 13 | 2 | Thermal stress margin |
//! | 15 | 2 | Surface temperature |
//! | 17 | 20 | Radial temperature series, 10 floats |
//!
//! This layout is read by downstream equipment and must stay stable.

use crate::physics::thermal::SERIES_LEN;
use crate::rotor::{Alert, RotorSnapshot};

/// Number of float metrics stored after the alert register
pub const METRIC_COUNT: usize = 8;

/// Registers reserved for one rotor
pub const ROTOR_BLOCK_STRIDE: usize = 1 + METRIC_COUNT * 2 + SERIES_LEN * 2;

/// Split a float into two registers, low word first
pub fn f32_to_registers(value: f32) -> [u16; 2] {
    let bits = value.to_bits();
    [(bits & 0xFFFF) as u16, (bits >> 16) as u16]
}

/// Rebuild a float from two registers, low word first
pub fn registers_to_f32(words: [u16; 2]) -> f32 {
    f32::from_bits(u32::from(words[0]) | (u32::from(words[1]) << 16))
}

/// First holding register of a rotor block
pub fn block_offset(rotor_index: usize) -> usize {
    ROTOR_BLOCK_STRIDE * rotor_index
}

fn metrics(snapshot: &RotorSnapshot) -> [f64; METRIC_COUNT] {
    [
        snapshot.center_thermal_stress,
        snapshot.life_ratio,
        snapshot.overhaul_life_ratio,
        snapshot.surface_thermal_stress,
        snapshot.bore_temperature,
        snapshot.thermal_stress,
        snapshot.thermal_stress_margin,
        snapshot.surface_temperature,
    ]
}

/// Encode a snapshot into its register block
pub fn encode_rotor_block(snapshot: &RotorSnapshot) -> [u16; ROTOR_BLOCK_STRIDE] {
    let mut block = [0u16; ROTOR_BLOCK_STRIDE];
    block[0] = snapshot.alert.code();

    let floats = metrics(snapshot)
        .into_iter()
        .chain(snapshot.temperature.iter().copied());
    for (i, value) in floats.enumerate() {
        let words = f32_to_registers(value as f32);
        block[1 + i * 2] = words[0];
        block[2 + i * 2] = words[1];
    }
    block
}

/// Decode a register block, `None` when the length or the alert code is invalid
///
/// Values go through single precision, so they compare to the encoded
/// snapshot only up to `f32` rounding.
pub fn decode_rotor_block(block: &[u16]) -> Option<RotorSnapshot> {
    if block.len() != ROTOR_BLOCK_STRIDE {
        return None;
    }
    let alert = Alert::from_code(block[0])?;
    let float_at = |i: usize| f64::from(registers_to_f32([block[1 + i * 2], block[2 + i * 2]]));

    let mut temperature = [0.0; SERIES_LEN];
    for (i, slot) in temperature.iter_mut().enumerate() {
        *slot = float_at(METRIC_COUNT + i);
    }

    Some(RotorSnapshot {
        center_thermal_stress: float_at(0),
        life_ratio: float_at(1),
        overhaul_life_ratio: float_at(2),
        surface_thermal_stress: float_at(3),
        bore_temperature: float_at(4),
        thermal_stress: float_at(5),
        thermal_stress_margin: float_at(6),
        surface_temperature: float_at(7),
        alert,
        temperature,
    })
}
