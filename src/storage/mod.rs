// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Durable key/value storage
//!
//! The monitor keeps three hashes per unit:
//!
//! | Key | Field | Value |
//! |-----|-------|-------|
//! | `TS{unit}:Mechanism:RotorLife` | `life{rotor}` / `overhaulLife{rotor}` | cumulative ratios |
//! | `TS{unit}:Mechanism:SendMessage` | `{rotor}` | latest snapshot JSON |
//! | `TS{unit}:Mechanism:RotorParams` | `{rotor}` | parameter record JSON |
//!
//! The store is shared by every rotor and must accept concurrent calls.

pub mod redis;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use tokio::sync::Mutex;

use crate::physics::fatigue::LifeRatios;

pub use self::redis::{RedisConnection, RedisCounterStore};

/// Hash-oriented key/value store
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;
}

pub fn life_hash(unit: &str) -> String {
    format!("TS{}:Mechanism:RotorLife", unit)
}

pub fn snapshot_hash(unit: &str) -> String {
    format!("TS{}:Mechanism:SendMessage", unit)
}

pub fn parameter_hash(unit: &str) -> String {
    format!("TS{}:Mechanism:RotorParams", unit)
}

/// Location of the two life counters of one rotor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifeCounterKeys {
    pub hash: String,
    pub life_field: String,
    pub overhaul_life_field: String,
}

impl LifeCounterKeys {
    pub fn for_rotor(unit: &str, rotor: &str) -> Self {
        Self {
            hash: life_hash(unit),
            life_field: format!("life{}", rotor),
            overhaul_life_field: format!("overhaulLife{}", rotor),
        }
    }
}

/// The durable life counters of one rotor
#[derive(Clone)]
pub struct LifeCounters {
    store: Arc<dyn CounterStore>,
    keys: LifeCounterKeys,
}

impl LifeCounters {
    pub fn new(store: Arc<dyn CounterStore>, keys: LifeCounterKeys) -> Self {
        Self { store, keys }
    }

    pub fn keys(&self) -> &LifeCounterKeys {
        &self.keys
    }

    /// Read both counters, a missing field counts as zero
    ///
    /// # Errors
    ///
    /// Store failures and stored values that are not finite numbers.
    pub async fn load(&self) -> Result<LifeRatios> {
        Ok(LifeRatios {
            life: self.read(&self.keys.life_field).await?,
            overhaul_life: self.read(&self.keys.overhaul_life_field).await?,
        })
    }

    async fn read(&self, field: &str) -> Result<f64> {
        let raw = self.store.hget(&self.keys.hash, field).await?;
        let Some(raw) = raw else {
            debug!("{} {} not stored yet, starting from 0", self.keys.hash, field);
            return Ok(0.0);
        };
        let value: f64 = raw
            .trim()
            .parse()
            .with_context(|| format!("{} {} holds '{}'", self.keys.hash, field, raw))?;
        if !value.is_finite() {
            anyhow::bail!("{} {} holds non-finite value {}", self.keys.hash, field, raw);
        }
        Ok(value)
    }

    pub async fn write_life(&self, value: f64) -> Result<()> {
        self.store
            .hset(&self.keys.hash, &self.keys.life_field, &value.to_string())
            .await
    }

    pub async fn write_overhaul_life(&self, value: f64) -> Result<()> {
        self.store
            .hset(&self.keys.hash, &self.keys.overhaul_life_field, &value.to_string())
            .await
    }

    pub async fn persist(&self, ratios: LifeRatios) -> Result<()> {
        self.write_life(ratios.life).await?;
        self.write_overhaul_life(ratios.overhaul_life).await
    }
}

/// Process-local store used when no external store is configured and in tests
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
    failing: AtomicBool,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail until cleared
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("memory store unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.check()?;
        let hashes = self.hashes.lock().await;
        Ok(hashes.get(key).and_then(|hash| hash.get(field)).cloned())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.check()?;
        let mut hashes = self.hashes.lock().await;
        hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.check()?;
        let hashes = self.hashes.lock().await;
        Ok(hashes.get(key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        let keys = LifeCounterKeys::for_rotor("3", "HP");
        assert_eq!(keys.hash, "TS3:Mechanism:RotorLife");
        assert_eq!(keys.life_field, "lifeHP");
        assert_eq!(keys.overhaul_life_field, "overhaulLifeHP");
        assert_eq!(snapshot_hash("3"), "TS3:Mechanism:SendMessage");
        assert_eq!(parameter_hash("3"), "TS3:Mechanism:RotorParams");
    }

    #[tokio::test]
    async fn test_life_counters_round_trip() {
        let store = Arc::new(MemoryCounterStore::new());
        let counters = LifeCounters::new(store.clone(), LifeCounterKeys::for_rotor("1", "A"));

        assert_eq!(counters.load().await.unwrap(), LifeRatios::default());

        let ratios = LifeRatios {
            life: 0.123_456_789_012,
            overhaul_life: 1.0e-9,
        };
        counters.persist(ratios).await.unwrap();
        assert_eq!(counters.load().await.unwrap(), ratios);
        assert_eq!(
            store.hget("TS1:Mechanism:RotorLife", "lifeA").await.unwrap(),
            Some("0.123456789012".to_string())
        );
    }

    #[tokio::test]
    async fn test_garbage_counter_is_an_error() {
        let store = Arc::new(MemoryCounterStore::new());
        store
            .hset("TS1:Mechanism:RotorLife", "lifeA", "not a number")
            .await
            .unwrap();
        let counters = LifeCounters::new(store, LifeCounterKeys::for_rotor("1", "A"));
        assert!(counters.load().await.is_err());
    }

    #[tokio::test]
    async fn test_failing_store() {
        let store = MemoryCounterStore::new();
        store.set_failing(true);
        assert!(store.hset("k", "f", "v").await.is_err());
        store.set_failing(false);
        assert!(store.hset("k", "f", "v").await.is_ok());
        assert_eq!(store.hgetall("k").await.unwrap().len(), 1);
    }
}
