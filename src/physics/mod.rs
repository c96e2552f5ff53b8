// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Numerical rotor model
//!
//! - [`interpolation`]: temperature dependent material tables
//! - [`thermal`]: radial finite-difference temperature field
//! - [`stress`]: surface and bore thermal stress
//! - [`fatigue`]: peak counter and cumulative life ratios

pub mod fatigue;
pub mod interpolation;
pub mod stress;
pub mod thermal;
