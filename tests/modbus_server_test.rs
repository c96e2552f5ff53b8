// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tests for the RotorModbusServer implementation
//!
//! These tests start a server instance on an ephemeral port and talk to it
//! through a regular Modbus TCP client.

use approx::assert_relative_eq;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time;
use tokio_modbus::prelude::*;

use rust_rotor_monitor::modbus::register_map::decode_rotor_block;
use rust_rotor_monitor::modbus::{RotorModbusServer, ROTOR_BLOCK_STRIDE};
use rust_rotor_monitor::rotor::{Alert, RotorSnapshot};

/// Start a Modbus server in the background
async fn start_test_server(
) -> Result<(SocketAddr, RotorModbusServer, tokio::task::JoinHandle<()>), Box<dyn std::error::Error>>
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let socket_addr = listener.local_addr()?;

    let server = RotorModbusServer::new();
    let serving = server.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = serving.serve(listener).await {
            eprintln!("Server error: {}", e);
        }
    });

    // Give the server a moment to start
    time::sleep(Duration::from_millis(50)).await;

    Ok((socket_addr, server, handle))
}

fn snapshot() -> RotorSnapshot {
    RotorSnapshot {
        life_ratio: 0.8,
        overhaul_life_ratio: 0.01,
        alert: Alert::Overhaul,
        surface_temperature: 412.5,
        temperature: [
            410.0, 405.0, 400.0, 395.0, 390.0, 385.0, 380.0, 375.0, 370.0, 365.0,
        ],
        bore_temperature: 362.5,
        center_thermal_stress: -45.25,
        surface_thermal_stress: 60.5,
        thermal_stress: 60.5,
        thermal_stress_margin: 239.5,
    }
}

#[tokio::test]
async fn test_read_rotor_block() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, server, _server_handle) = start_test_server().await?;
    server.write_snapshot(1, &snapshot())?;

    let mut ctx = tcp::connect(socket_addr).await?;
    let data = ctx
        .read_holding_registers(ROTOR_BLOCK_STRIDE as u16, ROTOR_BLOCK_STRIDE as u16)
        .await??;
    assert_eq!(data.len(), ROTOR_BLOCK_STRIDE);

    let decoded = decode_rotor_block(&data).expect("a complete block");
    let expected = snapshot();
    assert_eq!(decoded.alert, Alert::Overhaul);
    assert_relative_eq!(decoded.life_ratio, expected.life_ratio, max_relative = 1e-6);
    assert_relative_eq!(
        decoded.surface_temperature,
        expected.surface_temperature,
        max_relative = 1e-6
    );
    assert_relative_eq!(decoded.temperature[9], 365.0, max_relative = 1e-6);

    // Rotor 0 was never written
    let first = ctx.read_holding_registers(0, ROTOR_BLOCK_STRIDE as u16).await??;
    assert!(first.iter().all(|word| *word == 0));

    Ok(())
}

#[tokio::test]
async fn test_write_single_register() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, server, _server_handle) = start_test_server().await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    ctx.write_single_register(2, 999).await??;
    let data = ctx.read_holding_registers(2, 1).await??;
    assert_eq!(data, vec![999]);
    assert_eq!(server.holding_registers(2, 1), Some(vec![999]));

    Ok(())
}

#[tokio::test]
async fn test_write_multiple_registers() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _server, _server_handle) = start_test_server().await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    ctx.write_multiple_registers(100, &[1, 2, 3]).await??;
    let data = ctx.read_holding_registers(99, 5).await??;
    assert_eq!(data, vec![0, 1, 2, 3, 0]);

    let data = ctx
        .read_write_multiple_registers(100, 2, 200, &[7, 8])
        .await??;
    assert_eq!(data, vec![1, 2]);
    assert_eq!(ctx.read_holding_registers(200, 2).await??, vec![7, 8]);

    Ok(())
}

#[tokio::test]
async fn test_coils_and_input_tables() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _server, _server_handle) = start_test_server().await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    ctx.write_single_coil(3, true).await??;
    assert_eq!(
        ctx.read_coils(2, 3).await??,
        vec![false, true, false]
    );
    assert_eq!(ctx.read_input_registers(0, 4).await??, vec![0; 4]);
    assert_eq!(ctx.read_discrete_inputs(0, 2).await??, vec![false; 2]);

    Ok(())
}

#[tokio::test]
async fn test_out_of_range_addresses() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _server, _server_handle) = start_test_server().await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    let response = ctx.read_holding_registers(9_998, 5).await?;
    assert_eq!(response, Err(ExceptionCode::IllegalDataAddress));

    let response = ctx.read_coils(99, 2).await?;
    assert_eq!(response, Err(ExceptionCode::IllegalDataAddress));

    let response = ctx.write_single_register(10_000, 1).await?;
    assert_eq!(response, Err(ExceptionCode::IllegalDataAddress));

    // The session survives an exception
    assert_eq!(ctx.read_holding_registers(0, 1).await??, vec![0]);

    Ok(())
}

#[tokio::test]
async fn test_single_peer_at_a_time() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _server, _server_handle) = start_test_server().await?;

    let mut first = tcp::connect(socket_addr).await?;
    first.write_single_register(0, 42).await??;

    let mut second_task = tokio::spawn(async move {
        let mut second = tcp::connect(socket_addr).await?;
        let data = second.read_holding_registers(0, 1).await??;
        Ok::<_, Box<dyn std::error::Error + Send + Sync>>(data)
    });

    // The second peer waits while the first one is connected
    assert!(time::timeout(Duration::from_millis(300), &mut second_task)
        .await
        .is_err());
    assert_eq!(first.read_holding_registers(0, 1).await??, vec![42]);

    drop(first);
    let data = time::timeout(Duration::from_secs(2), second_task)
        .await?
        .expect("second peer task")
        .expect("second peer read");
    assert_eq!(data, vec![42]);

    Ok(())
}
