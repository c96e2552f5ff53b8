// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Management Module
//!
//! Startup, supervision and shutdown of the monitor's background tasks:
//!
//! - Modbus TCP server exposing the rotor register map
//! - Scheduler stepping every rotor simulator once per period
//! - System health monitoring (heartbeat)
//!
//! Startup is all or nothing. Any of the following aborts [`Daemon::launch`]
//! before the scheduler starts: an unreachable key/value store or telemetry
//! broker, an invalid parameter record, an unreadable life counter, a Modbus
//! bind failure.
//!
//! ## Usage
//!
//! ```no_run
//! use rust_rotor_monitor::{config::Config, daemon::launch_daemon::Daemon};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(&config).await?;
//!
//!     // Later, trigger a graceful shutdown
//!     daemon.shutdown();
//!     daemon.join().await?;
//!
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use futures::future::try_join_all;
use log::{debug, error, info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::{Config, ParameterSource, TelemetryTransport};
use crate::modbus::modbus_server::HOLDING_REGISTER_COUNT;
use crate::modbus::{FieldBusClient, RotorModbusServer, ROTOR_BLOCK_STRIDE};
use crate::parameters::RotorRegistry;
use crate::rotor::RotorSimulator;
use crate::scheduler::{sleep_while_running, PublishSinks, Scheduler};
use crate::storage::{
    parameter_hash, CounterStore, LifeCounterKeys, LifeCounters, RedisConnection,
    RedisCounterStore,
};
use crate::telemetry::{MqttTelemetryPublisher, RedisTelemetryPublisher, TelemetryPublisher};

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(60);
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Coordinates the background tasks of one monitored unit
///
/// The `running` flag is shared with every task. Each task checks it
/// periodically and terminates once it is cleared by [`Daemon::shutdown`].
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    modbus_server: Option<RotorModbusServer>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

/// Load the parameter registry from the configured origin
pub async fn load_registry(config: &Config, store: &dyn CounterStore) -> Result<RotorRegistry> {
    let registry = match config.parameters.source {
        ParameterSource::File => RotorRegistry::from_file(&config.parameters.path)
            .with_context(|| {
                format!(
                    "Failed to load rotor parameters from {:?}",
                    config.parameters.path
                )
            })?,
        ParameterSource::Redis => {
            let key = parameter_hash(&config.unit);
            let hash = store
                .hgetall(&key)
                .await
                .with_context(|| format!("Failed to read rotor parameters from {}", key))?;
            RotorRegistry::from_hash(&hash)
                .with_context(|| format!("Invalid rotor parameters in {}", key))?
        }
    };
    info!(
        "Monitoring {} rotor(s) of unit {}: {}",
        registry.len(),
        config.unit,
        registry.names().collect::<Vec<_>>().join(", ")
    );
    Ok(registry)
}

/// Build one simulator per rotor, each with its own field-bus client
///
/// Simulators come back in registry order, which is the register block order.
pub async fn build_rotors(
    config: &Config,
    registry: &RotorRegistry,
    store: Arc<dyn CounterStore>,
) -> Result<Vec<RotorSimulator>> {
    let settings = config.simulation.settings(&config.alerts);
    let rotors = registry.iter().map(|record| {
        let settings = settings.clone();
        let counters = LifeCounters::new(
            store.clone(),
            LifeCounterKeys::for_rotor(&config.unit, &record.name),
        );
        let client_settings = config.field_bus_client.settings_for(record.slave_id);
        async move {
            let client = FieldBusClient::connect(client_settings?).await;
            RotorSimulator::new(record.clone(), Box::new(client), counters, settings).await
        }
    });
    try_join_all(rotors).await
}

impl Daemon {
    /// Create a new daemon instance with no task and the running flag set
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            modbus_server: None,
        }
    }

    /// The Modbus server, once launched
    pub fn modbus_server(&self) -> Option<&RotorModbusServer> {
        self.modbus_server.as_ref()
    }

    /// Connect the key/value store and launch every configured task
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        let redis = Arc::new(
            RedisConnection::connect(&config.redis.url)
                .await
                .context("The key/value store is required at startup")?,
        );
        let store: Arc<dyn CounterStore> = Arc::new(RedisCounterStore::new(redis.clone()));
        let telemetry: Option<Arc<dyn TelemetryPublisher>> = if !config.telemetry.enabled {
            info!("Telemetry disabled");
            None
        } else {
            let publisher: Arc<dyn TelemetryPublisher> = match config.telemetry.transport {
                TelemetryTransport::Mqtt => Arc::new(
                    MqttTelemetryPublisher::connect(
                        &config.mqtt,
                        config.telemetry.publish_timeout(),
                    )
                    .await
                    .context("The telemetry broker is required at startup")?,
                ),
                TelemetryTransport::Redis => Arc::new(RedisTelemetryPublisher::new(
                    redis,
                    config.telemetry.publish_timeout(),
                )),
            };
            Some(publisher)
        };

        let registry = load_registry(config, store.as_ref()).await?;
        self.launch_with(config, registry, store, telemetry).await
    }

    /// Launch the tasks on top of already opened collaborators
    pub async fn launch_with(
        &mut self,
        config: &Config,
        registry: RotorRegistry,
        store: Arc<dyn CounterStore>,
        telemetry: Option<Arc<dyn TelemetryPublisher>>,
    ) -> Result<()> {
        if config.modbus.enabled {
            let needed = registry.len() * ROTOR_BLOCK_STRIDE;
            if needed > HOLDING_REGISTER_COUNT {
                anyhow::bail!(
                    "{} rotors need {} holding registers, the server only has {}",
                    registry.len(),
                    needed,
                    HOLDING_REGISTER_COUNT
                );
            }
            self.start_modbus_server(config).await?;
        }

        let rotors = build_rotors(config, &registry, store.clone()).await?;
        let sinks = PublishSinks {
            telemetry,
            store: Some(store),
            modbus: self.modbus_server.clone(),
        };
        self.start_scheduler(config, rotors, sinks)?;

        self.start_heartbeat()?;
        Ok(())
    }

    /// Bind the Modbus listener and serve it in the background
    ///
    /// Binding happens before this returns, a bind failure is a startup error.
    async fn start_modbus_server(&mut self, config: &Config) -> Result<()> {
        info!(
            "Starting modbus server on {}:{}",
            config.modbus.address, config.modbus.port
        );
        let socket_addr = config.modbus.socket_addr()?;
        let listener = TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("Cannot bind the Modbus server on {}", socket_addr))?;

        let server = RotorModbusServer::new();
        self.modbus_server = Some(server.clone());
        let running = self.running.clone();

        let task = tokio::spawn(async move {
            let server_handle = tokio::spawn(async move {
                if let Err(e) = server.serve(listener).await {
                    error!("Modbus server error: {}", e);
                }
            });

            while running.load(Ordering::SeqCst) {
                time::sleep(Duration::from_secs(1)).await;
            }

            info!("Shutting down Modbus server...");
            server_handle.abort();
            match time::timeout(JOIN_TIMEOUT, server_handle).await {
                Ok(_) => info!("Modbus server shut down successfully"),
                Err(_) => warn!("Modbus server shutdown timed out, forcing termination"),
            }
            Ok(())
        });

        self.tasks.push(task);
        info!("Modbus server started");
        Ok(())
    }

    fn start_scheduler(
        &mut self,
        config: &Config,
        rotors: Vec<RotorSimulator>,
        sinks: PublishSinks,
    ) -> Result<()> {
        let mut scheduler = Scheduler::new(config.scheduler.settings(&config.unit), rotors, sinks);
        let running = self.running.clone();
        let task = tokio::spawn(async move {
            scheduler.run(running).await;
            Ok(())
        });
        self.tasks.push(task);
        Ok(())
    }

    /// Start a heartbeat task that logs system status periodically
    fn start_heartbeat(&mut self) -> Result<()> {
        info!("Starting heartbeat monitor");

        let running = self.running.clone();
        let task = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                debug!("Daemon heartbeat: running");
                sleep_while_running(HEARTBEAT_PERIOD, &running).await;
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Signal every task to stop
    ///
    /// The scheduler completes the round in progress before exiting.
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Wait for all tasks to complete, at most five seconds each
    ///
    /// Task errors and panics are logged, they do not fail the join.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match time::timeout(JOIN_TIMEOUT, task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => error!("Task failed: {:#}", e),
                Ok(Err(e)) => error!("Task panicked: {}", e),
                Err(_) => warn!("Task did not complete within timeout period, may be hung"),
            }
        }
        Ok(())
    }
}
