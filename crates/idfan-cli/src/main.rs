//! 🚀 idfan-cli — the front door, the bouncer, the maitre d' of idfan.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Thin CLI wrapper: loads config, sets up logging, wires Ctrl-C to
//! cancellation, runs the fan-out, prints what came back. Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Cell, CellAlignment, Table, presets::UTF8_FULL};
use idfan::{CancellationToken, FetchReport};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// 🎛️ Fan ids out to a pool of lookup workers and print what came back.
#[derive(Debug, Parser)]
#[command(name = "idfan", version, about)]
struct Args {
    /// 📋 TOML config file. Defaults to ./idfan.toml when present, env vars (IDFAN_*) otherwise.
    config: Option<PathBuf>,

    /// 🧵 Override runtime.worker_count.
    #[arg(long, env = "IDFAN_WORKERS")]
    workers: Option<usize>,

    /// 📬 Override runtime.queue_capacity.
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// 🐌 Override runtime.pacing_ms.
    #[arg(long)]
    pacing_ms: Option<u64>,

    /// 📊 Draw the live progress spinner.
    #[arg(long)]
    progress: bool,

    /// 🦆 Print values as a JSON object instead of a table.
    #[arg(long)]
    json: bool,
}

/// 🚀 main() — where it all begins. The "I pressed F5 and held my breath" moment.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args
/// 3. Load config, apply overrides
/// 4. Run the thing, with Ctrl-C wired to cancellation
/// 5. Print the report (partial or not)
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(err) = run(args).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let config_path = match args.config {
        Some(path) => {
            // 🔒 an explicit path that isn't there is a typo, not a request for env-only config
            let exists = path.try_exists().with_context(|| {
                format!("💀 Couldn't check whether '{}' exists.", path.display())
            })?;
            anyhow::ensure!(
                exists,
                "💀 Configuration file '{}' does not exist. If it's a relative path, check your cwd.",
                path.display()
            );
            Some(path)
        }
        None => {
            let fallback = PathBuf::from("idfan.toml");
            fallback.is_file().then_some(fallback)
        }
    };

    let mut app_config = idfan::app_config::load_config(config_path.as_deref())
        .context("💀 In idfan-cli, we couldn't load the config. Take a look at the file and the IDFAN_* env vars.")?;

    if let Some(workers) = args.workers {
        app_config.runtime.worker_count = workers;
    }
    if let Some(queue_capacity) = args.queue_capacity {
        app_config.runtime.queue_capacity = queue_capacity;
    }
    if let Some(pacing_ms) = args.pacing_ms {
        app_config.runtime.pacing_ms = pacing_ms;
    }
    app_config.runtime.show_progress |= args.progress;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl-C: finishing in-flight lookups, skipping the rest");
            ctrl_c_cancel.cancel();
        }
    });

    let report = idfan::run_with_cancellation(app_config, cancel).await?;

    if args.json {
        print_json(&report)?;
    } else {
        print_table(&report);
    }

    if report.is_complete() {
        info!("✅ every id accounted for");
    } else {
        warn!(
            "⚠️ partial result: {} ok, {} failed, {} unattempted, {} pipeline failures{}",
            report.values.len(),
            report.failed.len(),
            report.unattempted.len(),
            report.pipeline_failures.len(),
            report
                .source_failure
                .as_ref()
                .map(|f| format!(", {f}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn print_json(report: &FetchReport) -> Result<()> {
    let values: serde_json::Map<String, serde_json::Value> = report
        .sorted_values()
        .into_iter()
        .map(|(id, value)| (id.to_string(), value.into()))
        .collect();
    let rendered =
        serde_json::to_string_pretty(&values).context("💀 Could not render the values as JSON")?;
    println!("{rendered}");
    Ok(())
}

fn print_table(report: &FetchReport) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["id", "value", "status"]);

    let mut rows: Vec<(i64, String, String)> = report
        .values
        .iter()
        .map(|(id, value)| (*id, value.to_string(), "ok".to_string()))
        .chain(
            report
                .failed
                .iter()
                .map(|(id, err)| (*id, "-".to_string(), err.to_string())),
        )
        .chain(
            report
                .unattempted
                .iter()
                .map(|id| (*id, "-".to_string(), "unattempted".to_string())),
        )
        .collect();
    rows.sort_by_key(|(id, _, _)| *id);

    for (id, value, status) in rows {
        table.add_row(vec![
            Cell::new(id).set_alignment(CellAlignment::Right),
            Cell::new(value).set_alignment(CellAlignment::Right),
            Cell::new(status),
        ]);
    }
    println!("{table}");

    let mut summary = Table::new();
    summary.load_preset(UTF8_FULL);
    summary.set_header(vec!["worker", "processed", "ok", "failed", "drained"]);
    for worker in &report.workers {
        summary.add_row(vec![
            worker.worker_id.to_string(),
            worker.processed.to_string(),
            worker.succeeded.to_string(),
            worker.failed.to_string(),
            worker.drained.to_string(),
        ]);
    }
    println!("{summary}");

    for failure in &report.pipeline_failures {
        println!("{failure}");
    }
}
