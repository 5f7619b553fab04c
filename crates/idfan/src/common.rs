//! 📦 Common data structures — the building blocks of idfan
//!
//! 🎬 COLD OPEN — INT. DATA CENTER — 3:47 AM
//!
//! Five workers stand around a channel. Ids trickle in. Somewhere upstream, a
//! database is being slow on purpose. Somewhere downstream, an API is returning
//! 503s because it can. Every id that makes it through lands here, in the
//! [`ResultStore`]. Every id that doesn't also lands here, with a note
//! explaining what went wrong. Nobody gets lost. That's the deal. 🦆
//!
//! This module holds the ids, the values, the three tiers of failure, and the
//! [`FetchReport`] the caller walks away with.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

/// 🔑 A work item. An integer. It has no opinions. It just wants its age looked up.
pub type ItemId = i64;

/// 🎂 The enriched value for an id ("age" in the only domain that ever mattered).
pub type ItemValue = i64;

// ============================================================
// 💀 The three tiers of failure
// ============================================================

/// 💀 Per-item lookup failure. Recovered by the worker, recorded, never fatal.
///
/// The id rides along in every variant so the report can say *which* id
/// failed, not just that "something, somewhere, was sad".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// 📡 The service answered, but not with a 2xx.
    #[error("💀 lookup for id {id} answered with non-success status {status}")]
    Status { id: ItemId, status: u16 },
    /// 🧻 The service answered with something we could not turn into a value.
    #[error("💀 lookup for id {id} returned a payload we could not parse: {reason}")]
    Payload { id: ItemId, reason: String },
    /// 🔌 The request never made it there, or the answer never made it back.
    #[error("💀 lookup for id {id} never completed: {reason}")]
    Transport { id: ItemId, reason: String },
    /// 🧨 The lookup itself panicked. The worker caught it and kept its shift going.
    #[error("💀 lookup for id {id} panicked: {reason}")]
    Panicked { id: ItemId, reason: String },
}

impl LookupError {
    /// 🔑 Which id was this about, again?
    pub fn id(&self) -> ItemId {
        match self {
            LookupError::Status { id, .. }
            | LookupError::Payload { id, .. }
            | LookupError::Transport { id, .. }
            | LookupError::Panicked { id, .. } => *id,
        }
    }
}

/// 🚰 Source-level failure. Recovered by the producer, which still completes the channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("💀 id source gave out after emitting {emitted} ids: {reason}")]
pub struct SourceFailure {
    /// 📊 How many ids made it into the channel before the well collapsed.
    pub emitted: u64,
    pub reason: String,
}

/// 🏚️ Orchestration-level failure. Recovered by the coordinator, which still
/// hands back whatever partial result exists.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineFailure {
    /// 🚰 The producer task died instead of returning. The channel was completed anyway.
    #[error("💀 producer task did not join cleanly: {0}")]
    Producer(String),
    /// 🧵 A worker task died instead of returning. Its in-flight id is unaccounted for.
    #[error("💀 worker {worker_id} did not join cleanly: {reason}")]
    Worker { worker_id: usize, reason: String },
    /// 📪 Every receiver was gone, so the producer had nobody to hand `id` to.
    #[error("💀 channel closed from the receiving side before id {id} could be delivered")]
    ChannelClosed { id: ItemId },
}

/// 🧅 Dig the message out of a panic payload. `panic!` hands over a `&str` or a `String`.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================
// 🗄️ The result store
// ============================================================

#[derive(Debug, Default)]
struct StoreInner {
    values: HashMap<ItemId, ItemValue>,
    failed: HashMap<ItemId, LookupError>,
    unattempted: BTreeSet<ItemId>,
}

/// 🗄️ Shared, lock-guarded home for every outcome of a run.
///
/// Cloning hands out another handle to the same maps. Workers write through
/// their handles concurrently; the coordinator reads once, after everyone has
/// gone home. The `Mutex` is the whole concurrency story and it is enough:
/// critical sections are a single map insert.
///
/// Three disjoint buckets:
/// - `values`: looked up, got an answer
/// - `failed`: looked up, got a [`LookupError`]
/// - `unattempted`: pulled off the channel after cancellation, never looked up
#[derive(Debug, Default, Clone)]
pub struct ResultStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// ✅ Record a successful lookup.
    pub async fn record_value(&self, id: ItemId, value: ItemValue) {
        let mut inner = self.inner.lock().await;
        if let Some(previous) = inner.values.insert(id, value) {
            // 🐛 an id must be produced once and consumed once; two writes means upstream duplicated it
            warn!(id, previous, value, "⚠️ id was recorded twice, last writer wins");
        }
    }

    /// 💀 Record a failed lookup.
    pub async fn record_failure(&self, error: LookupError) {
        let mut inner = self.inner.lock().await;
        let id = error.id();
        if inner.failed.insert(id, error).is_some() {
            warn!(id, "⚠️ id failed twice, keeping the latest failure");
        }
    }

    /// 💤 Record an id that was drained after cancellation without a lookup.
    pub async fn record_unattempted(&self, id: ItemId) {
        self.inner.lock().await.unattempted.insert(id);
    }

    /// 📊 How many values are in. Cheap-ish, takes the lock.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.values.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 📸 Copy everything out. Called once by the coordinator after all tasks finish.
    pub(crate) async fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.lock().await;
        StoreSnapshot {
            values: inner.values.clone(),
            failed: inner.failed.clone(),
            unattempted: inner.unattempted.iter().copied().collect(),
        }
    }
}

/// 📸 A point-in-time copy of the three buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct StoreSnapshot {
    pub(crate) values: HashMap<ItemId, ItemValue>,
    pub(crate) failed: HashMap<ItemId, LookupError>,
    pub(crate) unattempted: Vec<ItemId>,
}

// ============================================================
// 📋 The report
// ============================================================

/// 🧵 What one worker got up to before it clocked out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub worker_id: usize,
    /// 📥 Ids this worker pulled off the channel and looked up.
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// 💤 Ids this worker drained after cancellation without looking up.
    pub drained: u64,
}

/// 📋 Everything a run produced. Best effort, possibly incomplete, never a lie.
///
/// ⚠️ Callers must treat `values` as "what we got", not "everything there was".
/// [`FetchReport::is_complete`] is the only thing that says the latter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// ✅ id → value for every successful lookup.
    pub values: HashMap<ItemId, ItemValue>,
    /// 💀 id → why, for every lookup that was attempted and failed.
    pub failed: HashMap<ItemId, LookupError>,
    /// 💤 Ids that reached the channel but were never looked up (cancellation), ascending.
    pub unattempted: Vec<ItemId>,
    /// 📊 How many ids the producer put into the channel.
    pub produced: u64,
    /// 🚰 Set when the source gave out before it was exhausted.
    pub source_failure: Option<SourceFailure>,
    /// 🏚️ Orchestration failures the coordinator swallowed on your behalf.
    pub pipeline_failures: Vec<PipelineFailure>,
    /// 🛑 The cancellation token fired at some point during the run. The source
    /// may or may not have been exhausted by then; whatever was still buffered
    /// was drained into `unattempted`.
    pub cancelled: bool,
    /// 🧵 One entry per worker that joined cleanly, ordered by worker id.
    pub workers: Vec<WorkerSummary>,
}

impl FetchReport {
    /// ✅ True only when every produced id has a value and nothing went sideways.
    pub fn is_complete(&self) -> bool {
        !self.cancelled
            && self.source_failure.is_none()
            && self.pipeline_failures.is_empty()
            && self.failed.is_empty()
            && self.unattempted.is_empty()
            && self.values.len() as u64 == self.produced
    }

    /// 🔢 Successful ids in ascending order. HashMap iteration order is a mood, this is not.
    pub fn sorted_values(&self) -> Vec<(ItemId, ItemValue)> {
        let mut sorted: Vec<_> = self.values.iter().map(|(k, v)| (*k, *v)).collect();
        sorted.sort_unstable();
        sorted
    }
}
