// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! Two sides of the field bus live here:
//!
//! - [`FieldBusClient`]: polls the remote rotor controller for the control
//!   word and the surface temperature, one client per rotor.
//! - [`RotorModbusServer`]: exposes the computed rotor results as a holding
//!   register map to external equipment.
//!
//! ## Register Map
//!
//! Each rotor owns a 37 register block of holding registers at
//! `37 * rotor_index`, rotors being indexed in name order. The layout is
//! documented in [`register_map`].
//!
//! ## Usage
//!
//! ```no_run
//! use rust_rotor_monitor::modbus::RotorModbusServer;
//! use tokio::net::TcpListener;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let server = RotorModbusServer::new();
//! let listener = TcpListener::bind("127.0.0.1:5020").await?;
//! let handle = server.clone();
//! tokio::spawn(async move { handle.serve(listener).await });
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod modbus_server;
pub mod register_map;

pub use client::{
    ConnectionState, FieldBusClient, FieldBusError, FieldBusSettings, RegisterReader,
    MAX_REGISTERS_PER_READ,
};
pub use modbus_server::{RegisterTable, RotorModbusServer, SnapshotWriteError};
pub use register_map::ROTOR_BLOCK_STRIDE;
