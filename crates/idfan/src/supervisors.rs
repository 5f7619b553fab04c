//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where five workers share one channel..."
//! 🎬 "One supervisor dared to wait for all of them."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor module — part middle manager, part helicopter parent.
//! It starts the producer, starts exactly `N` lookup workers on the same
//! channel and the same result store, waits for the producer, waits for the
//! workers at one join point, and hands back a [`FetchReport`].
//!
//! It never hands back an error for the run itself. Tasks that die are written
//! up as [`PipelineFailure`]s and the partial result goes out the door anyway.
//!
//! ⚠️ DO NOT MAKE THIS PUB EVER
//! 💀 WORKERS ARE SUPERVISORS PRIVATE LITTLE MINIONS WHOM THE WORLD FORGOT ABOUT

mod workers;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::app_config::RuntimeConfig;
use crate::backends::{IdSource, Lookup};
use crate::common::{panic_message, FetchReport, PipelineFailure, ResultStore};
use crate::progress::PipelineProgress;
use workers::{LookupWorker, SourceWorker, Worker};

/// 📦 The Supervisor: because even async tasks need someone hovering over them
/// asking "is it done yet?".
#[derive(Debug)]
pub(crate) struct Supervisor {
    runtime: RuntimeConfig,
}

impl Supervisor {
    pub(crate) fn new(runtime: RuntimeConfig) -> Result<Self> {
        runtime.validate()?;
        Ok(Self { runtime })
    }

    /// 🧵 One full run. Channel and store are born here and die here.
    pub(crate) async fn run<S, L>(
        &self,
        source: S,
        lookup: Arc<L>,
        cancel: CancellationToken,
    ) -> FetchReport
    where
        S: IdSource + 'static,
        L: Lookup + ?Sized + 'static,
    {
        info!(
            workers = self.runtime.worker_count,
            queue_capacity = self.runtime.queue_capacity,
            pacing_ms = self.runtime.pacing_ms,
            "🚀 Starting fan-out"
        );

        let (tx, rx) = async_channel::bounded(self.runtime.queue_capacity);
        let store = ResultStore::new();
        let progress = PipelineProgress::new(self.runtime.show_progress);
        let mut report = FetchReport::default();

        let producer = SourceWorker::new(
            source,
            tx,
            Duration::from_millis(self.runtime.pacing_ms),
            cancel.clone(),
            progress.clone(),
        )
        .start();

        let workers: Vec<_> = (0..self.runtime.worker_count)
            .map(|worker_id| {
                LookupWorker::new(
                    worker_id,
                    rx.clone(),
                    Arc::clone(&lookup),
                    store.clone(),
                    cancel.clone(),
                    progress.clone(),
                )
                .start()
            })
            .collect();
        // 📪 the supervisor keeps no receiver: once every worker is gone, the producer's send fails instead of parking forever
        drop(rx);

        match producer.await {
            Ok(source_report) => {
                report.cancelled = source_report.cancelled;
                report.source_failure = source_report.failure;
                if let Some(id) = source_report.undelivered {
                    report
                        .pipeline_failures
                        .push(PipelineFailure::ChannelClosed { id });
                }
            }
            Err(join_err) => {
                // 🔒 the sender died with the task, so the channel is already completed
                let reason = describe_join_error(join_err);
                error!(%reason, "💀 producer task died; workers will drain what it sent");
                report
                    .pipeline_failures
                    .push(PipelineFailure::Producer(reason));
            }
        }

        let joined = futures::future::join_all(workers).await;
        for (worker_id, outcome) in joined.into_iter().enumerate() {
            match outcome {
                Ok(summary) => report.workers.push(summary),
                Err(join_err) => {
                    let reason = describe_join_error(join_err);
                    error!(worker_id, %reason, "💀 worker task died; its in-flight id is lost");
                    report
                        .pipeline_failures
                        .push(PipelineFailure::Worker { worker_id, reason });
                }
            }
        }

        progress.finish();
        let snapshot = store.snapshot().await;
        report.values = snapshot.values;
        report.failed = snapshot.failed;
        report.unattempted = snapshot.unattempted;
        report.produced = progress.produced();
        report.cancelled |= cancel.is_cancelled();

        info!(
            produced = report.produced,
            succeeded = report.values.len(),
            failed = report.failed.len(),
            unattempted = report.unattempted.len(),
            pipeline_failures = report.pipeline_failures.len(),
            source_failed = report.source_failure.is_some(),
            cancelled = report.cancelled,
            "🏁 Fan-out finished"
        );
        report
    }
}

/// 🧅 Turn a join error into something a human can read, panic payload included.
fn describe_join_error(join_err: JoinError) -> String {
    if join_err.is_panic() {
        format!("panicked: {}", panic_message(join_err.into_panic().as_ref()))
    } else {
        join_err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{InMemoryLookup, InMemorySource};
    use crate::common::{ItemId, ItemValue, LookupError};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    fn runtime(worker_count: usize, queue_capacity: usize) -> RuntimeConfig {
        RuntimeConfig {
            worker_count,
            queue_capacity,
            ..RuntimeConfig::default()
        }
    }

    fn age_of(id: ItemId) -> ItemValue {
        id * 3 + 1
    }

    fn table_for(ids: impl IntoIterator<Item = ItemId>) -> InMemoryLookup {
        InMemoryLookup::new(ids.into_iter().map(|id| (id, age_of(id))).collect())
    }

    async fn run_with<S, L>(runtime: RuntimeConfig, source: S, lookup: L) -> FetchReport
    where
        S: IdSource + 'static,
        L: Lookup + 'static,
    {
        Supervisor::new(runtime)
            .expect("💀 test runtime should validate")
            .run(source, Arc::new(lookup), CancellationToken::new())
            .await
    }

    /// 🧾 Writes down every id it was asked about. Answers `id * 2`.
    #[derive(Debug, Clone, Default)]
    struct RecordingLookup {
        calls: Arc<Mutex<Vec<ItemId>>>,
    }

    #[async_trait]
    impl Lookup for RecordingLookup {
        async fn lookup(&self, id: ItemId) -> Result<ItemValue, LookupError> {
            // 🎲 yield so workers actually interleave
            tokio::task::yield_now().await;
            self.calls
                .lock()
                .expect("💀 recording mutex poisoned")
                .push(id);
            Ok(id * 2)
        }
    }

    /// 💀 Answers 500 for every id in `broken`, `age_of(id)` for the rest.
    #[derive(Debug)]
    struct FlakyLookup {
        broken: HashSet<ItemId>,
    }

    #[async_trait]
    impl Lookup for FlakyLookup {
        async fn lookup(&self, id: ItemId) -> Result<ItemValue, LookupError> {
            tokio::task::yield_now().await;
            if self.broken.contains(&id) {
                Err(LookupError::Status { id, status: 500 })
            } else {
                Ok(age_of(id))
            }
        }
    }

    /// 🧨 Panics for every id in `cursed`, answers `age_of(id)` for the rest.
    #[derive(Debug)]
    struct PanickyLookup {
        cursed: HashSet<ItemId>,
    }

    #[async_trait]
    impl Lookup for PanickyLookup {
        async fn lookup(&self, id: ItemId) -> Result<ItemValue, LookupError> {
            tokio::task::yield_now().await;
            if self.cursed.contains(&id) {
                panic!("id {id} is cursed");
            }
            Ok(age_of(id))
        }
    }

    /// 🚦 Every lookup parks until `open` fires. Nobody gets an answer before then.
    #[derive(Debug, Clone, Default)]
    struct GatedLookup {
        open: CancellationToken,
    }

    #[async_trait]
    impl Lookup for GatedLookup {
        async fn lookup(&self, id: ItemId) -> Result<ItemValue, LookupError> {
            self.open.cancelled().await;
            Ok(age_of(id))
        }
    }

    /// 🧮 Wraps a source and counts every id it hands to the producer.
    #[derive(Debug)]
    struct CountingSource {
        inner: InMemorySource,
        pulled: Arc<AtomicU64>,
    }

    impl CountingSource {
        fn new(ids: impl IntoIterator<Item = ItemId>) -> (Self, Arc<AtomicU64>) {
            let pulled = Arc::new(AtomicU64::new(0));
            let source = Self {
                inner: InMemorySource::new(ids),
                pulled: Arc::clone(&pulled),
            };
            (source, pulled)
        }
    }

    #[async_trait]
    impl IdSource for CountingSource {
        async fn next_id(&mut self) -> Result<Option<ItemId>> {
            let next = self.inner.next_id().await?;
            if next.is_some() {
                self.pulled.fetch_add(1, Ordering::SeqCst);
            }
            Ok(next)
        }
    }

    /// 🚰 Yields `before_panic` ids, then panics mid-enumeration.
    #[derive(Debug)]
    struct PanickySource {
        next: ItemId,
        before_panic: ItemId,
    }

    #[async_trait]
    impl IdSource for PanickySource {
        async fn next_id(&mut self) -> Result<Option<ItemId>> {
            if self.next > self.before_panic {
                panic!("source imploded");
            }
            self.next += 1;
            Ok(Some(self.next - 1))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn the_one_where_every_id_gets_its_age() {
        let report = run_with(runtime(5, 16), InMemorySource::new(1..=100), table_for(1..=100)).await;

        assert_eq!(report.values.len(), 100);
        assert!(report.values.iter().all(|(id, age)| *age == age_of(*id)));
        assert_eq!(report.produced, 100);
        assert_eq!(report.workers.len(), 5);
        assert!(report.is_complete());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn the_one_where_each_id_is_looked_up_exactly_once() {
        let lookup = RecordingLookup::default();
        let calls = Arc::clone(&lookup.calls);

        let report = run_with(runtime(5, 4), InMemorySource::new(1..=50), lookup).await;

        let mut seen = calls.lock().expect("💀 recording mutex poisoned").clone();
        seen.sort_unstable();
        assert_eq!(seen, (1..=50).collect::<Vec<_>>(), "no id lost, no id repeated");
        let processed: u64 = report.workers.iter().map(|w| w.processed).sum();
        assert_eq!(processed, 50);
        assert_eq!(report.values.len(), 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn the_one_where_more_workers_only_changes_the_vibes_not_the_answer() {
        let broken: HashSet<ItemId> = [4, 9, 16].into_iter().collect();
        let mut reports = Vec::new();
        for worker_count in [1, 2, 5, 16] {
            let report = run_with(
                runtime(worker_count, 8),
                InMemorySource::new(1..=60),
                FlakyLookup {
                    broken: broken.clone(),
                },
            )
            .await;
            assert_eq!(report.workers.len(), worker_count);
            reports.push(report);
        }

        let first = &reports[0];
        for report in &reports[1..] {
            assert_eq!(report.values, first.values);
            assert_eq!(report.failed, first.failed);
        }
    }

    #[tokio::test]
    async fn the_one_where_id_two_fails_and_id_three_does_not_care() {
        let report = run_with(
            runtime(5, 8),
            InMemorySource::new([1, 2, 3]),
            FlakyLookup {
                broken: [2].into_iter().collect(),
            },
        )
        .await;

        assert_eq!(report.values, HashMap::from([(1, age_of(1)), (3, age_of(3))]));
        assert_eq!(
            report.failed.get(&2),
            Some(&LookupError::Status { id: 2, status: 500 })
        );
        assert!(report.pipeline_failures.is_empty());
        assert!(!report.is_complete());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn the_one_where_the_source_collapses_but_the_survivors_still_get_processed() {
        let report = run_with(
            runtime(5, 2),
            InMemorySource::failing_after(1..=100, 7),
            table_for(1..=100),
        )
        .await;

        let failure = report
            .source_failure
            .as_ref()
            .expect("💀 the source failure should be reported");
        assert_eq!(failure.emitted, 7);
        assert_eq!(report.produced, 7);
        assert_eq!(
            report.sorted_values(),
            (1..=7).map(|id| (id, age_of(id))).collect::<Vec<_>>()
        );
        assert!(report.pipeline_failures.is_empty());
        assert!(!report.is_complete());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn the_one_where_five_hundred_ids_race_twenty_times_and_nobody_flakes() {
        let broken: HashSet<ItemId> = (1..=500).filter(|id| id % 7 == 0).collect();
        for _ in 0..20 {
            let report = run_with(
                runtime(5, 32),
                InMemorySource::new(1..=500),
                FlakyLookup {
                    broken: broken.clone(),
                },
            )
            .await;
            assert_eq!(report.values.len(), 500 - broken.len());
            assert_eq!(report.failed.len(), broken.len());
            assert!(report.values.keys().all(|id| !broken.contains(id)));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn the_one_where_running_it_twice_gives_the_same_answer_twice() {
        let broken: HashSet<ItemId> = [5, 10].into_iter().collect();
        let first = run_with(
            runtime(5, 8),
            InMemorySource::new(1..=40),
            FlakyLookup {
                broken: broken.clone(),
            },
        )
        .await;
        let second = run_with(
            runtime(5, 8),
            InMemorySource::new(1..=40),
            FlakyLookup { broken },
        )
        .await;

        assert_eq!(first.values, second.values);
        assert_eq!(first.failed, second.failed);
        assert_eq!(first.produced, second.produced);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn the_one_where_a_slow_producer_and_a_tiny_channel_still_finish() {
        let report = run_with(
            RuntimeConfig {
                worker_count: 3,
                queue_capacity: 1,
                pacing_ms: 2,
                show_progress: false,
            },
            InMemorySource::new(1..=20),
            table_for(1..=20),
        )
        .await;

        assert_eq!(report.values.len(), 20);
        assert!(report.is_complete());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn the_one_where_a_worker_panics_and_the_rest_finish_the_shift() {
        let report = run_with(
            runtime(3, 4),
            InMemorySource::new(1..=20),
            PanickyLookup {
                cursed: [7].into_iter().collect(),
            },
        )
        .await;

        assert_eq!(report.values.len(), 19);
        assert!(!report.values.contains_key(&7));
        match report.failed.get(&7) {
            Some(LookupError::Panicked { id: 7, reason }) => assert!(reason.contains("cursed")),
            other => panic!("💀 expected id 7 to be recorded as panicked, got {:?}", other),
        }
        assert_eq!(report.workers.len(), 3);
        assert!(report.pipeline_failures.is_empty());
        let processed: u64 = report.workers.iter().map(|w| w.processed).sum();
        assert_eq!(processed, 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn the_one_where_every_worker_trips_once_and_nobody_leaves() {
        // 🧨 five workers, five cursed ids at the front of the line
        let report = run_with(
            runtime(5, 8),
            InMemorySource::new(1..=50),
            PanickyLookup {
                cursed: (1..=5).collect(),
            },
        )
        .await;

        assert_eq!(report.values.len(), 45);
        assert_eq!(
            report.sorted_values(),
            (6..=50).map(|id| (id, age_of(id))).collect::<Vec<_>>()
        );
        assert_eq!(report.failed.len(), 5);
        assert!(report
            .failed
            .values()
            .all(|err| matches!(err, LookupError::Panicked { .. })));
        assert_eq!(report.produced, 50);
        assert_eq!(report.workers.len(), 5);
        assert!(report.pipeline_failures.is_empty());
        assert!(report.unattempted.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn the_one_where_stalled_workers_push_back_on_the_producer() {
        let (worker_count, queue_capacity) = (2, 4);
        let (source, pulled) = CountingSource::new(1..=100);
        let lookup = GatedLookup::default();
        let open = lookup.open.clone();

        let run = tokio::spawn(async move {
            Supervisor::new(runtime(worker_count, queue_capacity))
                .expect("💀 runtime should validate")
                .run(source, Arc::new(lookup), CancellationToken::new())
                .await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        // 🧱 one id parked in each worker, a full channel, and one in the producer's hand
        let in_flight = pulled.load(Ordering::SeqCst);
        assert_eq!(in_flight, (queue_capacity + worker_count + 1) as u64);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pulled.load(Ordering::SeqCst), in_flight, "the producer kept going while blocked");

        open.cancel();
        let report = run.await.expect("💀 supervisor task panicked");
        assert_eq!(report.values.len(), 100);
        assert_eq!(pulled.load(Ordering::SeqCst), 100);
        assert!(report.is_complete());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn the_one_where_workers_keep_eating_while_the_producer_naps() {
        let (source, pulled) = CountingSource::new(1..=3);
        let lookup = RecordingLookup::default();
        let calls = Arc::clone(&lookup.calls);

        let run = tokio::spawn(async move {
            Supervisor::new(RuntimeConfig {
                worker_count: 2,
                queue_capacity: 4,
                pacing_ms: 300,
                show_progress: false,
            })
            .expect("💀 runtime should validate")
            .run(source, Arc::new(lookup), CancellationToken::new())
            .await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        // 😴 the producer is asleep after its first id; that id is already looked up
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
        assert_eq!(
            calls.lock().expect("💀 recording mutex poisoned").as_slice(),
            &[1]
        );
        assert!(!run.is_finished());

        let report = run.await.expect("💀 supervisor task panicked");
        assert_eq!(report.sorted_values(), vec![(1, 2), (2, 4), (3, 6)]);
        assert!(report.is_complete());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn the_one_where_the_producer_panics_and_the_channel_still_completes() {
        let report = run_with(
            runtime(4, 8),
            PanickySource {
                next: 1,
                before_panic: 3,
            },
            table_for(1..=10),
        )
        .await;

        assert_eq!(
            report.sorted_values(),
            vec![(1, age_of(1)), (2, age_of(2)), (3, age_of(3))]
        );
        assert_eq!(report.produced, 3);
        assert!(matches!(
            report.pipeline_failures.as_slice(),
            [PipelineFailure::Producer(_)]
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn the_one_where_someone_hits_cancel_and_every_id_is_still_accounted_for() {
        let cancel = CancellationToken::new();
        let lookup = table_for(1..=10_000).with_latency(Duration::from_millis(2));
        let supervisor = Supervisor::new(runtime(2, 8)).expect("💀 runtime should validate");

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = supervisor
            .run(InMemorySource::new(1..=10_000), Arc::new(lookup), cancel)
            .await;

        assert!(report.cancelled);
        assert!(report.produced < 10_000);
        let accounted = report.values.len() + report.failed.len() + report.unattempted.len();
        assert_eq!(accounted as u64, report.produced);
        assert!(report.unattempted.iter().all(|id| !report.values.contains_key(id)));
        let drained: u64 = report.workers.iter().map(|w| w.drained).sum();
        assert_eq!(drained as usize, report.unattempted.len());
        assert!(!report.is_complete());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn the_one_where_cancel_lands_after_the_source_already_ran_dry() {
        let (source, pulled) = CountingSource::new(1..=3);
        let lookup = GatedLookup::default();
        let open = lookup.open.clone();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let run = tokio::spawn(async move {
            Supervisor::new(runtime(2, 4))
                .expect("💀 runtime should validate")
                .run(source, Arc::new(lookup), cancel)
                .await
        });

        // 🏁 all three ids are out of the source; two are parked in lookups, one is buffered
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pulled.load(Ordering::SeqCst), 3);
        trigger.cancel();
        open.cancel();

        let report = run.await.expect("💀 supervisor task panicked");
        assert!(report.cancelled);
        assert!(report.source_failure.is_none());
        assert_eq!(report.produced, 3);
        assert_eq!(report.values.len(), 2);
        assert_eq!(report.unattempted.len(), 1);
        assert!(report.unattempted.iter().all(|id| !report.values.contains_key(id)));
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn the_one_where_cancel_was_pressed_before_anyone_showed_up() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = Supervisor::new(runtime(5, 8))
            .expect("💀 runtime should validate")
            .run(InMemorySource::new(1..=10), Arc::new(table_for(1..=10)), cancel)
            .await;

        assert!(report.cancelled);
        assert_eq!(report.produced, 0);
        assert!(report.values.is_empty());
        assert_eq!(report.workers.len(), 5);
    }

    #[tokio::test]
    async fn the_one_where_an_empty_source_is_a_complete_success() {
        let report = run_with(runtime(5, 8), InMemorySource::new([]), table_for([])).await;
        assert!(report.values.is_empty());
        assert_eq!(report.produced, 0);
        assert!(report.is_complete());
    }

    #[test]
    fn the_one_where_zero_workers_never_gets_hired() {
        assert!(Supervisor::new(runtime(0, 8)).is_err());
    }
}
