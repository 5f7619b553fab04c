//! 🚀 idfan — fan a stream of ids out to a bounded pool of lookup workers and
//! collect what comes back.
//!
//! ```text
//! IdSource → SourceWorker → bounded channel → LookupWorker × N → ResultStore → FetchReport
//! ```
//!
//! The run never fails once it has started: source failures, per-id lookup
//! failures, and dead tasks all end up in the [`FetchReport`] next to whatever
//! values did make it. Only setup (config, opening the source, building the
//! client) can return `Err`. 🦆

pub mod app_config;
pub mod backends;
pub mod common;
pub mod progress;
mod supervisors;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::app_config::{AppConfig, RuntimeConfig};
use crate::backends::{IdSource, Lookup, LookupBackend, SourceBackend};
use crate::supervisors::Supervisor;

pub use crate::common::{
    FetchReport, ItemId, ItemValue, LookupError, PipelineFailure, ResultStore, SourceFailure,
    WorkerSummary,
};
pub use tokio_util::sync::CancellationToken;

/// 🚀 Build the configured source and lookup, then run the fan-out to completion.
pub async fn run(app_config: AppConfig) -> Result<FetchReport> {
    run_with_cancellation(app_config, CancellationToken::new()).await
}

/// 🛑 [`run`], but stoppable: cancel `cancel` and the producer stops, in-flight
/// lookups finish, and whatever was still buffered comes back as unattempted.
pub async fn run_with_cancellation(
    app_config: AppConfig,
    cancel: CancellationToken,
) -> Result<FetchReport> {
    let source = SourceBackend::from_config(&app_config.source_config)
        .await
        .context("💀 Could not build the id source. No ids, no fan-out.")?;
    let lookup = LookupBackend::from_config(&app_config.lookup_config)
        .context("💀 Could not build the lookup backend. Nobody to ask, nothing to collect.")?;
    fetch_all_with_cancellation(&app_config.runtime, source, lookup, cancel).await
}

/// 🧵 Run the fan-out over any source and lookup.
///
/// `Err` only for an invalid `runtime`; everything that goes wrong during the
/// run is in the report.
pub async fn fetch_all<S, L>(runtime: &RuntimeConfig, source: S, lookup: L) -> Result<FetchReport>
where
    S: IdSource + 'static,
    L: Lookup + 'static,
{
    fetch_all_with_cancellation(runtime, source, lookup, CancellationToken::new()).await
}

/// 🛑 [`fetch_all`] with a cancellation token.
pub async fn fetch_all_with_cancellation<S, L>(
    runtime: &RuntimeConfig,
    source: S,
    lookup: L,
    cancel: CancellationToken,
) -> Result<FetchReport>
where
    S: IdSource + 'static,
    L: Lookup + 'static,
{
    let supervisor = Supervisor::new(runtime.clone())
        .context("💀 The runtime config would never finish a run.")?;
    Ok(supervisor.run(source, Arc::new(lookup), cancel).await)
}
