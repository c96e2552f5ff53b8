// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the turbine rotor monitor
use anyhow::Result;
use clap::Parser;
use log::{error, info};
use rust_rotor_monitor::config::{self, Config};
use rust_rotor_monitor::daemon::Daemon;

use std::path::PathBuf;
use tokio::signal;

/// Turbine rotor thermal stress and fatigue life monitor
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address of the remote controller polled for rotor inputs
    #[arg(long, env = "MODBUS_CLIENT_IP")]
    client_address: Option<String>,

    /// Port of the remote controller
    #[arg(long, env = "MODBUS_CLIENT_PORT")]
    client_port: Option<u16>,

    /// Modbus server address
    #[arg(long, env = "MODBUS_SERVER_IP")]
    modbus_address: Option<String>,

    /// Modbus server port
    #[arg(long, env = "MODBUS_SERVER_PORT")]
    modbus_port: Option<u16>,

    /// Key/value store URL
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Turbine unit identifier
    #[arg(long, env = "ROTOR_UNIT")]
    unit: Option<String>,

    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }

        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    config.apply_args(
        args.client_address.clone(),
        args.client_port,
        args.modbus_address.clone(),
        args.modbus_port,
        args.redis_url.clone(),
        args.unit.clone(),
    );
    config::utils::validate_specific_rules(&config)?;

    info!("Starting rotor monitor for unit {}", config.unit);
    let mut daemon = Daemon::new();
    if let Err(e) = daemon.launch(&config).await {
        error!("Startup failed: {:#}", e);
        daemon.shutdown();
        daemon.join().await?;
        return Err(e);
    }

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal, terminating daemon");
        }
        Err(err) => {
            error!("Error waiting for shutdown signal: {}", err);
        }
    }
    daemon.shutdown();
    daemon.join().await?;

    Ok(())
}
