//! 🔎 The LookupWorker — patient, tireless, and deeply unbothered by the chaos
//! happening upstream. It receives ids. It looks them up. It writes down the
//! answer, or writes down why there wasn't one. It asks no questions.
//!
//! ⚠️ When the singularity occurs, the LookupWorker will still be draining the
//! channel. It will not notice. It does not notice things. Except cancellation.
//! It notices cancellation.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_channel::Receiver;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::Worker;
use crate::backends::Lookup;
use crate::common::{panic_message, ItemId, LookupError, ResultStore, WorkerSummary};
use crate::progress::PipelineProgress;

#[derive(Debug)]
pub(crate) struct LookupWorker<L: ?Sized> {
    worker_id: usize,
    rx: Receiver<ItemId>,
    lookup: Arc<L>,
    store: ResultStore,
    cancel: CancellationToken,
    progress: PipelineProgress,
}

impl<L: Lookup + ?Sized + 'static> LookupWorker<L> {
    pub(crate) fn new(
        worker_id: usize,
        rx: Receiver<ItemId>,
        lookup: Arc<L>,
        store: ResultStore,
        cancel: CancellationToken,
        progress: PipelineProgress,
    ) -> Self {
        Self {
            worker_id,
            rx,
            lookup,
            store,
            cancel,
            progress,
        }
    }

    /// 🔎 One id in, one outcome recorded. A failure here stays here, and so
    /// does a panic: it becomes [`LookupError::Panicked`] for this id only.
    async fn process(&self, id: ItemId, summary: &mut WorkerSummary) {
        summary.processed += 1;
        let outcome = AssertUnwindSafe(self.lookup.lookup(id))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(LookupError::Panicked {
                    id,
                    reason: panic_message(payload.as_ref()),
                })
            });
        match outcome {
            Ok(value) => {
                trace!(worker_id = self.worker_id, id, value, "✅ lookup ok");
                self.store.record_value(id, value).await;
                summary.succeeded += 1;
                self.progress.record_success();
            }
            Err(err) => {
                warn!(worker_id = self.worker_id, id, error = %err, "⚠️ lookup failed, skipping id");
                self.store.record_failure(err).await;
                summary.failed += 1;
                self.progress.record_failure();
            }
        }
    }

    /// 💤 After cancellation: keep receiving until the producer completes the
    /// channel, so nothing that made it in goes unaccounted for.
    async fn drain(&self, summary: &mut WorkerSummary) {
        while let Ok(id) = self.rx.recv().await {
            self.store.record_unattempted(id).await;
            summary.drained += 1;
        }
    }
}

impl<L: Lookup + ?Sized + 'static> Worker for LookupWorker<L> {
    type Output = WorkerSummary;

    fn start(self) -> JoinHandle<WorkerSummary> {
        tokio::spawn(async move {
            let mut summary = WorkerSummary {
                worker_id: self.worker_id,
                ..Default::default()
            };
            debug!(worker_id = self.worker_id, "📥 LookupWorker started draining channel...");

            loop {
                let received = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        debug!(worker_id = self.worker_id, "🛑 LookupWorker: cancelled, draining the rest unattempted");
                        self.drain(&mut summary).await;
                        break;
                    }
                    received = self.rx.recv() => received,
                };

                match received {
                    Ok(id) => self.process(id, &mut summary).await,
                    Err(_) => {
                        // 🏁 completed and empty
                        debug!(worker_id = self.worker_id, processed = summary.processed, "🏁 LookupWorker: channel drained. Shutting down.");
                        break;
                    }
                }
            }

            summary
        })
    }
}
