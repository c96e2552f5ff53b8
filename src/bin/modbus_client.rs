// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use clap::Parser;
use rust_rotor_monitor::modbus::register_map::{block_offset, decode_rotor_block};
use rust_rotor_monitor::modbus::ROTOR_BLOCK_STRIDE;
use std::error::Error;
use tokio::time::Duration;
use tokio_modbus::prelude::*;

/// Modbus client reading one rotor block from a running rotor monitor
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Modbus server address
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Modbus server port
    #[clap(long, default_value = "5020")]
    port: u16,

    /// Rotor index, rotors being numbered in name order from 0
    #[clap(long, default_value = "0")]
    rotor: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();

    let socket_addr: std::net::SocketAddr = format!("{}:{}", args.address, args.port).parse()?;
    println!("Connecting to Modbus server at {}", socket_addr);

    let mut ctx = tcp::connect_slave(socket_addr, Slave(1)).await?;

    let start = u16::try_from(block_offset(args.rotor))?;
    let quantity = ROTOR_BLOCK_STRIDE as u16;
    println!(
        "Reading {} holding registers starting at address {}",
        quantity, start
    );
    let response = tokio::time::timeout(
        Duration::from_secs(1),
        ctx.read_holding_registers(start, quantity),
    )
    .await???;

    println!("Raw register values: {:?}", response);

    let Some(snapshot) = decode_rotor_block(&response) else {
        return Err("Unexpected register block length".into());
    };

    match snapshot.alert.message() {
        Some(message) => println!("Alert: {}", message),
        None => println!("Alert: none"),
    }
    println!("Life ratio:            {:.6e}", snapshot.life_ratio);
    println!("Overhaul life ratio:   {:.6e}", snapshot.overhaul_life_ratio);
    println!("Surface temperature:   {:.2}", snapshot.surface_temperature);
    println!("Bore temperature:      {:.2}", snapshot.bore_temperature);
    println!("Surface stress:        {:.3}", snapshot.surface_thermal_stress);
    println!("Center stress:         {:.3}", snapshot.center_thermal_stress);
    println!("Combined stress:       {:.3}", snapshot.thermal_stress);
    println!("Stress margin:         {:.3}", snapshot.thermal_stress_margin);
    for (i, t) in snapshot.temperature.iter().enumerate() {
        println!("Temperature[{}]:        {:.2}", i, t);
    }

    Ok(())
}
