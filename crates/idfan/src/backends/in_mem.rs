//! # Previously, on idfan...
//!
//! 🎬 The ids were trapped in a database nobody was allowed to touch in tests.
//! The ages were trapped behind an API that rate-limits you for looking at it.
//! Someone had to stand in for both. Someone had to live entirely in RAM,
//! gone the moment you blink.
//!
//! That someone was this module.
//!
//! `in_mem` provides an in-memory [`IdSource`] and [`Lookup`] for tests, benches,
//! and local poking around. The source hands out a fixed list of ids (and can be
//! told to fall over after `m` of them). The lookup answers from a fixed table and
//! says 404 for everything else. 🦆
//!
//! ✅ No network calls. No disk I/O. Just vibes and heap memory.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;

use crate::backends::{IdSource, Lookup};
use crate::common::{ItemId, ItemValue, LookupError};

// -- 📋 Config lives next to the backend that reads it. One backend, one config, one file.

/// 📋 `[source_config.InMemory]` — the ids, spelled out in the TOML like it's 1999.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InMemorySourceConfig {
    #[serde(default)]
    pub ids: Vec<ItemId>,
}

/// 📋 `[lookup_config.InMemory]` — an id → value table plus optional fake latency.
///
/// TOML keys are strings, so the table is keyed by strings here and parsed into
/// ids when the lookup is built.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InMemoryLookupConfig {
    #[serde(default)]
    pub values: HashMap<String, ItemValue>,
    #[serde(default)]
    pub latency_ms: u64,
}

/// 📦 The world's most predictable id source.
///
/// Hands out its ids front to back, then says `None` forever. Optionally
/// collapses with an error after `fail_after` ids, for people who want to watch
/// the producer handle a source failure without installing a flaky database.
#[derive(Debug, Default)]
pub struct InMemorySource {
    ids: VecDeque<ItemId>,
    fail_after: Option<usize>,
    emitted: usize,
}

impl InMemorySource {
    /// 🚀 A source that yields `ids` in order and then EOF.
    pub fn new(ids: impl IntoIterator<Item = ItemId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            fail_after: None,
            emitted: 0,
        }
    }

    /// 💀 A source that yields the first `emit` ids and then returns an error.
    pub fn failing_after(ids: impl IntoIterator<Item = ItemId>, emit: usize) -> Self {
        Self {
            fail_after: Some(emit),
            ..Self::new(ids)
        }
    }

    pub fn from_config(config: &InMemorySourceConfig) -> Self {
        Self::new(config.ids.iter().copied())
    }
}

#[async_trait]
impl IdSource for InMemorySource {
    async fn next_id(&mut self) -> Result<Option<ItemId>> {
        if self.fail_after.is_some_and(|limit| self.emitted >= limit) {
            bail!(
                "💀 in-memory source was told to collapse after {} ids, and it is a source of its word",
                self.emitted
            );
        }
        let next = self.ids.pop_front();
        if next.is_some() {
            self.emitted += 1;
        }
        Ok(next)
    }
}

/// 🔎 A lookup that answers from a table. Unknown ids get a 404, like real life.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLookup {
    values: HashMap<ItemId, ItemValue>,
    latency: Duration,
}

impl InMemoryLookup {
    pub fn new(values: HashMap<ItemId, ItemValue>) -> Self {
        Self {
            values,
            latency: Duration::ZERO,
        }
    }

    /// 🐌 Sleep this long before every answer. Pretend there's a network.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// 🏗️ Parse the stringly-keyed TOML table into ids. A non-numeric key is a config error.
    pub fn from_config(config: &InMemoryLookupConfig) -> Result<Self> {
        let values = config
            .values
            .iter()
            .map(|(key, value)| {
                key.trim()
                    .parse::<ItemId>()
                    .map(|id| (id, *value))
                    .with_context(|| {
                        format!("💀 In-memory lookup key '{key}' is not an id. Ids are integers. We checked.")
                    })
            })
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self::new(values).with_latency(Duration::from_millis(config.latency_ms)))
    }
}

#[async_trait]
impl Lookup for InMemoryLookup {
    async fn lookup(&self, id: ItemId) -> Result<ItemValue, LookupError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.values
            .get(&id)
            .copied()
            .ok_or(LookupError::Status { id, status: 404 })
    }
}
