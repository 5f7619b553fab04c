//! 🚰 The SourceWorker — the producer end of the fan-out.
//!
//! It asks the source for an id, puts the id in the channel, and repeats until
//! the source says "that's all", the source falls over, or someone hits cancel.
//! Then it completes the channel. That last step is the whole job, really:
//! forget it and every worker waits on `recv()` until the heat death of the
//! universe. 💀

use std::time::Duration;

use async_channel::Sender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::Worker;
use crate::backends::IdSource;
use crate::common::{ItemId, SourceFailure};
use crate::progress::PipelineProgress;

/// 📋 How the producer's shift went.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct SourceReport {
    pub(crate) emitted: u64,
    pub(crate) cancelled: bool,
    pub(crate) failure: Option<SourceFailure>,
    /// 📪 The id in hand when the channel turned out to have no receivers left.
    pub(crate) undelivered: Option<ItemId>,
}

#[derive(Debug)]
pub(crate) struct SourceWorker<S> {
    source: S,
    tx: Sender<ItemId>,
    pacing: Duration,
    cancel: CancellationToken,
    progress: PipelineProgress,
}

impl<S: IdSource + 'static> SourceWorker<S> {
    pub(crate) fn new(
        source: S,
        tx: Sender<ItemId>,
        pacing: Duration,
        cancel: CancellationToken,
        progress: PipelineProgress,
    ) -> Self {
        Self {
            source,
            tx,
            pacing,
            cancel,
            progress,
        }
    }

    async fn pump(&mut self) -> SourceReport {
        let mut report = SourceReport::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                next = self.source.next_id() => next,
            };

            let id = match next {
                Ok(Some(id)) => id,
                Ok(None) => {
                    debug!(emitted = report.emitted, "🏁 SourceWorker: source exhausted");
                    break;
                }
                Err(err) => {
                    let failure = SourceFailure {
                        emitted: report.emitted,
                        reason: format!("{err:#}"),
                    };
                    error!(emitted = report.emitted, error = %failure, "💀 SourceWorker: source failed, completing channel early");
                    report.failure = Some(failure);
                    break;
                }
            };

            // 🚧 a full channel parks us here; that's the backpressure
            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                sent = self.tx.send(id) => sent,
            };
            if sent.is_err() {
                warn!(id, "📪 SourceWorker: no receivers left, stopping");
                report.undelivered = Some(id);
                break;
            }
            report.emitted += 1;
            self.progress.record_produced();
            trace!(id, "📤 SourceWorker sent id");

            if !self.pacing.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        report.cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.pacing) => {}
                }
            }
        }

        if report.cancelled {
            debug!(emitted = report.emitted, "🛑 SourceWorker: cancelled");
        }
        report
    }
}

impl<S: IdSource + 'static> Worker for SourceWorker<S> {
    type Output = SourceReport;

    fn start(mut self) -> JoinHandle<SourceReport> {
        tokio::spawn(async move {
            debug!("🚰 SourceWorker started filling channel...");
            let report = self.pump().await;
            // 🔒 every non-panicking exit completes the channel here; a panic drops `tx` on unwind, which completes it too
            self.tx.close();
            report
        })
    }
}
