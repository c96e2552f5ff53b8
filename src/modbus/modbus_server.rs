// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus server exposing the rotor results
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The server is the device that provides data,
//! while the client is the device that requests data.
//!
//! The server owns a fixed-size register table. The scheduler pushes each
//! rotor's computed results into its holding register block through
//! [`RotorModbusServer::write_snapshot`] and external equipment reads them
//! back over Modbus TCP. See [`crate::modbus::register_map`] for the block
//! layout.
//!
//! Only one peer is served at a time. A second peer is accepted by the
//! operating system but waits until the current session ends.

use std::{
    future,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_modbus::{prelude::*, server::tcp::Server};

use super::register_map::{block_offset, encode_rotor_block, ROTOR_BLOCK_STRIDE};
use crate::rotor::RotorSnapshot;

pub const COIL_COUNT: usize = 100;
pub const DISCRETE_INPUT_COUNT: usize = 10_000;
pub const INPUT_REGISTER_COUNT: usize = 10_000;
pub const HOLDING_REGISTER_COUNT: usize = 10_000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SnapshotWriteError {
    #[error("Rotor {rotor_index} block ends at register {end}, beyond the {len} holding registers")]
    BlockOutOfRange {
        rotor_index: usize,
        end: usize,
        len: usize,
    },
}

/// The four Modbus data tables, zero-initialised
#[derive(Debug, Clone)]
pub struct RegisterTable {
    pub coils: Vec<bool>,
    pub discrete_inputs: Vec<bool>,
    pub input_registers: Vec<u16>,
    pub holding_registers: Vec<u16>,
}

impl Default for RegisterTable {
    fn default() -> Self {
        Self {
            coils: vec![false; COIL_COUNT],
            discrete_inputs: vec![false; DISCRETE_INPUT_COUNT],
            input_registers: vec![0; INPUT_REGISTER_COUNT],
            holding_registers: vec![0; HOLDING_REGISTER_COUNT],
        }
    }
}

/// Register table plus the single-peer gate
///
/// Cloning is cheap and every clone shares the same table.
#[derive(Clone)]
pub struct RotorModbusServer {
    table: Arc<Mutex<RegisterTable>>,
    peer: Arc<Semaphore>,
}

impl Default for RotorModbusServer {
    fn default() -> Self {
        Self::new()
    }
}

// A poisoned lock still holds plain register values
fn lock_table(table: &Mutex<RegisterTable>) -> MutexGuard<'_, RegisterTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RotorModbusServer {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(RegisterTable::default())),
            peer: Arc::new(Semaphore::new(1)),
        }
    }

    /// Store a rotor snapshot in its holding register block
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotWriteError::BlockOutOfRange`] when the block of
    /// `rotor_index` does not fit in the holding register table.
    pub fn write_snapshot(
        &self,
        rotor_index: usize,
        snapshot: &RotorSnapshot,
    ) -> Result<(), SnapshotWriteError> {
        let start = block_offset(rotor_index);
        let end = start + ROTOR_BLOCK_STRIDE;
        let mut table = lock_table(&self.table);
        let len = table.holding_registers.len();
        if end > len {
            return Err(SnapshotWriteError::BlockOutOfRange {
                rotor_index,
                end,
                len,
            });
        }
        table.holding_registers[start..end].copy_from_slice(&encode_rotor_block(snapshot));
        debug!(
            "Rotor {} snapshot written to holding registers {}..{}",
            rotor_index, start, end
        );
        Ok(())
    }

    /// Copy of `count` holding registers starting at `start`
    pub fn holding_registers(&self, start: usize, count: usize) -> Option<Vec<u16>> {
        let table = lock_table(&self.table);
        table
            .holding_registers
            .get(start..start.checked_add(count)?)
            .map(<[u16]>::to_vec)
    }

    /// Accept peers on `listener` and serve them one at a time
    ///
    /// A session that fails is logged and the next peer is accepted, the
    /// server itself only returns on a listener error.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        if let Ok(local) = listener.local_addr() {
            info!("Modbus server listening on {}", local);
        }
        let server = Server::new(listener);

        let on_connected = |stream, socket_addr| {
            let this = self.clone();
            async move { this.accept(stream, socket_addr).await }
        };
        let on_process_error = |err| {
            warn!("Modbus session ended with an error: {err}");
        };

        server.serve(&on_connected, on_process_error).await?;
        Ok(())
    }

    async fn accept(
        &self,
        stream: TcpStream,
        socket_addr: SocketAddr,
    ) -> std::io::Result<Option<(RotorModbusSession, TcpStream)>> {
        if self.peer.available_permits() == 0 {
            info!("Modbus peer {} waiting for the current session to end", socket_addr);
        }
        let permit = match self.peer.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return Ok(None),
        };
        info!("Modbus peer {} connected", socket_addr);

        let session = RotorModbusSession {
            table: self.table.clone(),
            _permit: permit,
        };
        Ok(Some((session, stream)))
    }
}

/// Service of one connected peer, releases the peer slot when dropped
pub struct RotorModbusSession {
    table: Arc<Mutex<RegisterTable>>,
    _permit: OwnedSemaphorePermit,
}

impl tokio_modbus::server::Service for RotorModbusSession {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Received Modbus request: {:?}", req);
        let mut table = lock_table(&self.table);

        let res = match req {
            Request::ReadCoils(addr, cnt) => {
                register_read(&table.coils, addr, cnt).map(Response::ReadCoils)
            }
            Request::ReadDiscreteInputs(addr, cnt) => {
                register_read(&table.discrete_inputs, addr, cnt).map(Response::ReadDiscreteInputs)
            }
            Request::WriteSingleCoil(addr, value) => {
                register_write(&mut table.coils, addr, std::slice::from_ref(&value))
                    .map(|_| Response::WriteSingleCoil(addr, value))
            }
            Request::WriteMultipleCoils(addr, values) => {
                register_write(&mut table.coils, addr, &values)
                    .map(|_| Response::WriteMultipleCoils(addr, values.len() as u16))
            }
            Request::ReadInputRegisters(addr, cnt) => {
                register_read(&table.input_registers, addr, cnt).map(Response::ReadInputRegisters)
            }
            Request::ReadHoldingRegisters(addr, cnt) => {
                register_read(&table.holding_registers, addr, cnt)
                    .map(Response::ReadHoldingRegisters)
            }
            Request::WriteSingleRegister(addr, value) => register_write(
                &mut table.holding_registers,
                addr,
                std::slice::from_ref(&value),
            )
            .map(|_| Response::WriteSingleRegister(addr, value)),
            Request::WriteMultipleRegisters(addr, values) => {
                register_write(&mut table.holding_registers, addr, &values)
                    .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16))
            }
            Request::ReadWriteMultipleRegisters(read_addr, cnt, write_addr, values) => {
                register_write(&mut table.holding_registers, write_addr, &values).and_then(|_| {
                    register_read(&table.holding_registers, read_addr, cnt)
                        .map(Response::ReadWriteMultipleRegisters)
                })
            }
            _ => {
                error!(
                    "Exception::IllegalFunction - Unimplemented function code in request: {req:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        };

        if let Err(e) = &res {
            debug!("Modbus request answered with exception {:?}", e);
        }
        future::ready(res)
    }
}

/// Read `cnt` consecutive entries of a table
///
/// Returns `ExceptionCode::IllegalDataAddress` when any of them lies outside
/// the table.
fn register_read<T: Copy>(table: &[T], addr: u16, cnt: u16) -> Result<Vec<T>, ExceptionCode> {
    let start = usize::from(addr);
    let end = start + usize::from(cnt);
    match table.get(start..end) {
        Some(values) => Ok(values.to_vec()),
        None => {
            error!(
                "Exception::IllegalDataAddress - Read of {} entries at {} beyond table size {}",
                cnt,
                addr,
                table.len()
            );
            Err(ExceptionCode::IllegalDataAddress)
        }
    }
}

/// Write consecutive entries of a table, nothing is written on failure
fn register_write<T: Copy>(table: &mut [T], addr: u16, values: &[T]) -> Result<(), ExceptionCode> {
    let start = usize::from(addr);
    let end = start + values.len();
    let len = table.len();
    match table.get_mut(start..end) {
        Some(slots) => {
            slots.copy_from_slice(values);
            Ok(())
        }
        None => {
            error!(
                "Exception::IllegalDataAddress - Write of {} entries at {} beyond table size {}",
                values.len(),
                addr,
                len
            );
            Err(ExceptionCode::IllegalDataAddress)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::register_map::registers_to_f32;
    use crate::physics::thermal::SERIES_LEN;
    use crate::rotor::Alert;

    fn snapshot() -> RotorSnapshot {
        RotorSnapshot {
            life_ratio: 0.25,
            overhaul_life_ratio: 0.125,
            alert: Alert::Scrap,
            surface_temperature: 500.0,
            temperature: [450.0; SERIES_LEN],
            bore_temperature: 400.0,
            center_thermal_stress: 10.0,
            surface_thermal_stress: -20.0,
            thermal_stress: 20.0,
            thermal_stress_margin: 96.0,
        }
    }

    #[test]
    fn test_write_snapshot_places_block_at_stride() {
        let server = RotorModbusServer::new();
        server.write_snapshot(1, &snapshot()).unwrap();

        let untouched = server.holding_registers(0, ROTOR_BLOCK_STRIDE).unwrap();
        assert!(untouched.iter().all(|&r| r == 0));

        let block = server.holding_registers(37, ROTOR_BLOCK_STRIDE).unwrap();
        assert_eq!(block[0], 2);
        assert_eq!(registers_to_f32([block[3], block[4]]), 0.25);
    }

    #[test]
    fn test_write_snapshot_rejects_out_of_range_rotor() {
        let server = RotorModbusServer::new();
        let last = HOLDING_REGISTER_COUNT / ROTOR_BLOCK_STRIDE;
        assert!(server.write_snapshot(last - 1, &snapshot()).is_ok());
        assert!(matches!(
            server.write_snapshot(last, &snapshot()),
            Err(SnapshotWriteError::BlockOutOfRange { .. })
        ));
    }

    #[test]
    fn test_register_helpers() {
        let mut table = vec![0u16; 4];
        assert_eq!(register_write(&mut table, 2, &[7, 8]), Ok(()));
        assert_eq!(register_read(&table, 1, 3), Ok(vec![0, 7, 8]));
        assert_eq!(
            register_write(&mut table, 3, &[1, 2]),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(table, vec![0, 0, 7, 8]);
        assert_eq!(register_read(&table, 4, 1), Err(ExceptionCode::IllegalDataAddress));
    }
}
