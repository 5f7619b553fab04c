//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.

use anyhow::{Context, ensure};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::backends::{
    FileSourceConfig, HttpLookupConfig, InMemoryLookupConfig, InMemorySourceConfig,
};

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🚰 Where the ids come from.
    pub source_config: SourceConfig,
    /// 🔎 Where the values come from.
    pub lookup_config: LookupConfig,
    #[serde(default, alias = "supervisor_config")]
    pub runtime: RuntimeConfig,
}

/// 🚰 `[source_config.<Variant>]` — pick exactly one.
#[derive(Debug, Deserialize, Clone)]
pub enum SourceConfig {
    InMemory(InMemorySourceConfig),
    File(FileSourceConfig),
}

/// 🔎 `[lookup_config.<Variant>]` — pick exactly one.
#[derive(Debug, Deserialize, Clone)]
pub enum LookupConfig {
    InMemory(InMemoryLookupConfig),
    Http(HttpLookupConfig),
}

/// 🎛️ The knobs that shape a run: how big the channel is, how many workers
/// drain it, and how slowly the producer fills it.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// 📬 Channel capacity. A full channel makes the producer wait. That's backpressure.
    #[serde(default = "default_queue_capacity", alias = "channel_size")]
    pub queue_capacity: usize,
    /// 🧵 Worker count, which is also the cap on lookups in flight.
    #[serde(default = "default_worker_count", alias = "num_workers")]
    pub worker_count: usize,
    /// 🐌 Delay the producer takes after every id, in milliseconds. 0 = full speed.
    #[serde(default)]
    pub pacing_ms: u64,
    /// 📊 Draw the progress bar. Off by default so tests and pipes stay quiet.
    #[serde(default)]
    pub show_progress: bool,
}

fn default_queue_capacity() -> usize {
    64
}

fn default_worker_count() -> usize {
    5
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            worker_count: default_worker_count(),
            pacing_ms: 0,
            show_progress: false,
        }
    }
}

impl RuntimeConfig {
    /// 🔒 Zero workers never finish. A zero-capacity channel never accepts. Neither ships.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.worker_count > 0,
            "💀 runtime.worker_count is 0. Zero workers drain zero ids, forever. Pick at least 1."
        );
        ensure!(
            self.queue_capacity > 0,
            "💀 runtime.queue_capacity is 0. A channel that holds nothing delivers nothing. Pick at least 1."
        );
        Ok(())
    }
}

/// 🚀 Load the config — from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (`IDFAN_*`, `__` splits nested keys) with an
/// optional TOML file. TOML wins on conflicts.
///   - `config_file_name` is None  → env vars only.
///   - `config_file_name` is Some  → env vars + TOML file, merged.
///
/// 💀 Returns an error if config is unparseable or the runtime knobs are nonsense.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("IDFAN_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (IDFAN_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (IDFAN_*). \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config
        .runtime
        .validate()
        .context("💀 The config parsed, but the runtime section would deadlock or do nothing.")?;
    Ok(app_config)
}
