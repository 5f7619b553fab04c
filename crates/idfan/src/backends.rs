//! 🔌 Backends — where the real I/O happens.
//!
//! 🚰 Id sources pour identifiers in, lookups turn them into values.
//! And in between, we panic! (kidding, we use anyhow)
//!
//! 🎭 This module is the casting agency. Need ids from a flat file? From the
//! in-memory void? Need ages from an HTTP service that may or may not be up?
//! We've got a backend for that.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use anyhow::Result;
use async_trait::async_trait;

use crate::app_config::{LookupConfig, SourceConfig};
use crate::common::{ItemId, ItemValue, LookupError};

pub mod file;
pub mod http;
pub mod in_mem;

// 🎯 Re-export backend-specific configs so callers can do `backends::FileSourceConfig`
// instead of spelunking into `backends::file::FileSourceConfig`.
pub use file::{FileSource, FileSourceConfig};
pub use http::{HttpLookup, HttpLookupConfig};
pub use in_mem::{InMemoryLookup, InMemoryLookupConfig, InMemorySource, InMemorySourceConfig};

// ===== Source Trait and Backend Enum =====

/// 🚰 A source that produces identifiers, one per call.
///
/// # Contract 📜
/// - `Ok(Some(id))` while ids flow, in the order the source wants them consumed.
/// - `Ok(None)` = EOF. The well is dry. The golden retriever goes home. 🐕
/// - `Err(...)` = the well collapsed. The producer logs it, stops asking, and
///   still completes the channel. Nobody downstream waits forever.
/// - `&mut self` because sources have state. And feelings. Mostly state.
#[async_trait]
pub trait IdSource: std::fmt::Debug + Send {
    /// 🔑 Fetch the next identifier.
    async fn next_id(&mut self) -> Result<Option<ItemId>>;
}

/// 🎭 The many faces of a Source — a polymorphic casting call for id origins.
///
/// Callers built from config never need to know whether the ids came from RAM
/// or disk. Ancient proverb: "He who hardcodes the backend, migrates only once."
#[derive(Debug)]
pub enum SourceBackend {
    InMemory(InMemorySource),
    File(FileSource),
}

impl SourceBackend {
    /// 🏗️ Build the configured source. A file that won't open fails here, before the run.
    pub async fn from_config(config: &SourceConfig) -> Result<Self> {
        Ok(match config {
            SourceConfig::InMemory(c) => SourceBackend::InMemory(InMemorySource::from_config(c)),
            SourceConfig::File(c) => SourceBackend::File(FileSource::new(c.clone()).await?),
        })
    }
}

#[async_trait]
impl IdSource for SourceBackend {
    async fn next_id(&mut self) -> Result<Option<ItemId>> {
        match self {
            SourceBackend::InMemory(s) => s.next_id().await,
            SourceBackend::File(s) => s.next_id().await,
        }
    }
}

// ===== Lookup Trait and Backend Enum =====

/// 🔎 The external per-id lookup. Given an id, hand back a value or a reason why not.
///
/// # Contract 📜
/// - Shared across every worker (`&self`), so implementations must be `Sync`.
/// - Every failure is per-item: a non-success answer, an unparsable payload, or a
///   request that never completed. The worker records it and moves on.
/// - Timeouts and retries are the implementation's business, not the pipeline's.
#[async_trait]
pub trait Lookup: std::fmt::Debug + Send + Sync {
    /// 🔎 Look up one id.
    async fn lookup(&self, id: ItemId) -> Result<ItemValue, LookupError>;
}

/// 🎭 Mirror of [`SourceBackend`] on the other end of the pipeline.
#[derive(Debug)]
pub enum LookupBackend {
    InMemory(InMemoryLookup),
    Http(HttpLookup),
}

impl LookupBackend {
    /// 🏗️ Build the configured lookup. Bad table keys or an unbuildable client fail here.
    pub fn from_config(config: &LookupConfig) -> Result<Self> {
        Ok(match config {
            LookupConfig::InMemory(c) => LookupBackend::InMemory(InMemoryLookup::from_config(c)?),
            LookupConfig::Http(c) => LookupBackend::Http(HttpLookup::new(c.clone())?),
        })
    }
}

#[async_trait]
impl Lookup for LookupBackend {
    async fn lookup(&self, id: ItemId) -> Result<ItemValue, LookupError> {
        match self {
            LookupBackend::InMemory(l) => l.lookup(id).await,
            LookupBackend::Http(l) => l.lookup(id).await,
        }
    }
}
