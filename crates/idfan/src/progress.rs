//! 📊 Progress — because "it's running" is not a status update.
//!
//! 🎬 *[a progress bar appears. it does not move. nobody breathes.]*
//! *[then: "1,204 ids/s". the room exhales.]*
//!
//! [`PipelineProgress`] is a bundle of atomic counters shared by the producer and
//! every worker, plus an indicatif bar whose message is a little comfy-table
//! summary. When `show_progress` is off the bar is hidden and the counters keep
//! counting anyway, because the coordinator reads them for the report. 🦆

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

#[derive(Debug, Default)]
struct Counters {
    produced: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// 📊 Shared run counters with an optional spinner on top. Clone freely; it's an `Arc` inside.
#[derive(Clone)]
pub struct PipelineProgress {
    counters: Arc<Counters>,
    progress_bar: ProgressBar,
    start_time: Instant,
}

impl std::fmt::Debug for PipelineProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineProgress")
            .field("counters", &self.counters)
            .finish() // 🚀 progress bar omitted — it's in there, trust us, no cap
    }
}

impl PipelineProgress {
    pub fn new(visible: bool) -> Self {
        let progress_bar = if visible {
            let bar = ProgressBar::new_spinner();
            // -- 🐛 a hardcoded template only fails if we typo it, and then we'd rather have no style than no run
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        } else {
            ProgressBar::hidden()
        };

        Self {
            counters: Arc::new(Counters::default()),
            progress_bar,
            start_time: Instant::now(),
        }
    }

    pub(crate) fn record_produced(&self) {
        self.counters.produced.fetch_add(1, Ordering::Relaxed);
        self.render();
    }

    pub(crate) fn record_success(&self) {
        self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
        self.render();
    }

    pub(crate) fn record_failure(&self) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        self.render();
    }

    pub fn produced(&self) -> u64 {
        self.counters.produced.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.counters.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    pub(crate) fn finish(&self) {
        self.render();
        self.progress_bar.finish();
    }

    fn render(&self) {
        if self.progress_bar.is_hidden() {
            return;
        }

        let elapsed = self.start_time.elapsed();
        let done = self.succeeded() + self.failed();
        let rate = if elapsed.as_secs_f64() > 0.0 {
            done as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let in_flight_or_buffered = self.produced().saturating_sub(done);

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} ids/s", format_number(rate as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} produced", format_number(self.produced())))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} ok", format_number(self.succeeded())))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} failed", format_number(self.failed())))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} pending", format_number(in_flight_or_buffered)))
                .set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar.set_message(format!("fan-out\n{}", table));
    }
}
