// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Fixed-period round runner
//!
//! One round steps every rotor in its own task and waits for all of them. Every
//! `publish_every` rounds the snapshots are published to telemetry, written
//! to the snapshot hash and pushed into the Modbus server register map.
//!
//! Rounds start `period` apart. A round that overruns the period is followed
//! immediately by the next one, missed periods are not caught up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio::task::JoinSet;
use tokio::time::{self, Instant};

use crate::modbus::RotorModbusServer;
use crate::rotor::{RotorSimulator, RotorSnapshot};
use crate::storage::{snapshot_hash, CounterStore};
use crate::telemetry::{rotor_topic, TelemetryPublisher};

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_PUBLISH_EVERY: u64 = 20;

/// Longest uninterrupted sleep, bounds how long a shutdown waits
const SHUTDOWN_POLL: Duration = Duration::from_secs(1);

/// Sleep for `duration`, returning early once `running` is cleared
pub async fn sleep_while_running(duration: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        time::sleep((deadline - now).min(SHUTDOWN_POLL)).await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub unit: String,
    pub period: Duration,
    pub publish_every: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            unit: "1".to_string(),
            period: DEFAULT_PERIOD,
            publish_every: DEFAULT_PUBLISH_EVERY,
        }
    }
}

/// Where snapshots go on a publish round, every sink is optional
#[derive(Clone, Default)]
pub struct PublishSinks {
    pub telemetry: Option<Arc<dyn TelemetryPublisher>>,
    pub store: Option<Arc<dyn CounterStore>>,
    pub modbus: Option<RotorModbusServer>,
}

/// Drives all rotor simulators of a unit
pub struct Scheduler {
    settings: SchedulerSettings,
    rotors: Vec<RotorSimulator>,
    /// Register block index of each rotor, parallel to `rotors`
    blocks: Vec<usize>,
    sinks: PublishSinks,
    round: u64,
}

impl Scheduler {
    /// Rotors are expected in index order, the index selects the register block
    pub fn new(settings: SchedulerSettings, rotors: Vec<RotorSimulator>, sinks: PublishSinks) -> Self {
        Self {
            settings,
            blocks: (0..rotors.len()).collect(),
            rotors,
            sinks,
            round: 0,
        }
    }

    pub fn rotors(&self) -> &[RotorSimulator] {
        &self.rotors
    }

    /// Number of rounds completed so far
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Whether round `round` (0-based) publishes
    ///
    /// The first publish happens on round 1 and then every `publish_every`
    /// rounds. With `publish_every == 1` every round publishes.
    pub fn should_publish(&self, round: u64) -> bool {
        let every = self.settings.publish_every.max(1);
        round % every == 1 % every
    }

    /// Step every rotor once, then publish if this round is due
    ///
    /// Each rotor is moved into its own task for the step, so the rotors of a
    /// round run on the runtime's worker threads in parallel. A rotor whose
    /// task panics is dropped from the schedule, the others keep their block.
    pub async fn run_round(&mut self) {
        let round = self.round;
        self.step_rotors().await;

        if self.should_publish(round) {
            self.publish_snapshots().await;
        }
        self.round += 1;
    }

    async fn step_rotors(&mut self) {
        let mut steps = JoinSet::new();
        let mut names = HashMap::new();
        for (slot, mut rotor) in self.rotors.drain(..).enumerate() {
            let name = rotor.name().to_string();
            let handle = steps.spawn(async move {
                rotor.step().await;
                (slot, rotor)
            });
            names.insert(handle.id(), name);
        }

        let mut stepped = Vec::with_capacity(names.len());
        while let Some(joined) = steps.join_next().await {
            match joined {
                Ok(done) => stepped.push(done),
                Err(e) => error!(
                    "Rotor {} step failed, removed from the schedule: {}",
                    names.get(&e.id()).map(String::as_str).unwrap_or("?"),
                    e
                ),
            }
        }

        stepped.sort_by_key(|(slot, _)| *slot);
        let blocks = std::mem::take(&mut self.blocks);
        for (slot, rotor) in stepped {
            self.blocks.push(blocks[slot]);
            self.rotors.push(rotor);
        }
    }

    /// Send every rotor's snapshot to the configured sinks
    pub async fn publish_snapshots(&mut self) {
        let snapshots: Vec<(usize, String, RotorSnapshot)> = self
            .rotors
            .iter()
            .zip(self.blocks.iter())
            .map(|(rotor, block)| (*block, rotor.name().to_string(), rotor.snapshot()))
            .collect();

        let sinks = &self.sinks;
        let unit = self.settings.unit.as_str();
        let publications = snapshots
            .iter()
            .map(|(index, name, snapshot)| publish_one(sinks, unit, *index, name, snapshot));
        join_all(publications).await;
    }

    /// Run rounds until `running` is cleared
    ///
    /// The flag is checked between rounds, a round in progress always completes.
    pub async fn run(&mut self, running: Arc<AtomicBool>) {
        info!(
            "Scheduler started: {} rotor(s), period {:?}, publishing every {} round(s)",
            self.rotors.len(),
            self.settings.period,
            self.settings.publish_every
        );

        while running.load(Ordering::SeqCst) {
            let started = Instant::now();
            self.run_round().await;
            let elapsed = started.elapsed();

            if elapsed < self.settings.period {
                info!("Round {} completed in {:?}", self.round, elapsed);
                sleep_while_running(self.settings.period - elapsed, &running).await;
            } else {
                warn!(
                    "Round {} took {:?}, longer than the {:?} period",
                    self.round, elapsed, self.settings.period
                );
            }
        }
        info!("Scheduler stopped after {} round(s)", self.round);
    }
}

async fn publish_one(
    sinks: &PublishSinks,
    unit: &str,
    index: usize,
    name: &str,
    snapshot: &RotorSnapshot,
) {
    if let Some(modbus) = &sinks.modbus {
        if let Err(e) = modbus.write_snapshot(index, snapshot) {
            warn!("Rotor {}: {}", name, e);
        }
    }

    let payload = match serde_json::to_string(snapshot) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Rotor {}: snapshot serialization failed: {}", name, e);
            return;
        }
    };

    if let Some(telemetry) = &sinks.telemetry {
        if let Err(e) = telemetry.publish(&rotor_topic(unit, name), &payload).await {
            warn!("Rotor {}: telemetry not delivered: {:#}", name, e);
        }
    }

    if let Some(store) = &sinks.store {
        if let Err(e) = store.hset(&snapshot_hash(unit), name, &payload).await {
            warn!("Rotor {}: snapshot hand-off failed: {:#}", name, e);
        }
    }
    debug!("Rotor {}: snapshot published", name);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(publish_every: u64) -> Scheduler {
        Scheduler::new(
            SchedulerSettings {
                publish_every,
                ..SchedulerSettings::default()
            },
            Vec::new(),
            PublishSinks::default(),
        )
    }

    #[test]
    fn test_publish_cadence() {
        let s = scheduler(20);
        let published: Vec<u64> = (0..45).filter(|r| s.should_publish(*r)).collect();
        assert_eq!(published, vec![1, 21, 41]);

        let every_round = scheduler(1);
        assert!((0..5).all(|r| every_round.should_publish(r)));
    }

    #[tokio::test]
    async fn test_empty_round_advances_counter() {
        let mut s = scheduler(20);
        s.run_round().await;
        s.run_round().await;
        assert_eq!(s.round(), 2);
    }

    #[tokio::test]
    async fn test_sleep_ends_on_shutdown() {
        let running = AtomicBool::new(false);
        let started = Instant::now();
        sleep_while_running(Duration::from_secs(30), &running).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_run_stops_when_flag_cleared() {
        let mut s = Scheduler::new(
            SchedulerSettings {
                period: Duration::from_millis(10),
                ..SchedulerSettings::default()
            },
            Vec::new(),
            PublishSinks::default(),
        );
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(50)).await;
            flag.store(false, Ordering::SeqCst);
        });
        time::timeout(Duration::from_secs(2), s.run(running))
            .await
            .unwrap();
        assert!(s.round() >= 1);
    }
}
