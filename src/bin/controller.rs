//! The controller turns one Common Crawl snapshot into a partitioned work
//! plan and drives one worker job per shard until every shard is terminal.
//!
//! It only ever touches index files — the cluster.idx file named on the
//! command line and the cdx chunks it range-fetches from the data endpoint.
//! The actual page content is fetched by the workers. For a given crawl there
//! are hundreds of cdx chunks; the controller streams them one at a time,
//! keeps the records whose host matches the locale pattern and cuts the
//! stream into fixed-size shards persisted under `<output>/plan/`.
//!
//! The run ends successfully only if every shard succeeded; otherwise the
//! terminally failed shard ids are enumerated and the exit status is
//! non-zero. Re-running against the same root is safe and cheap: workers skip
//! every record whose key is already in the dedup ledger.
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use buenarda::controller::{self, ControllerConfig, ProcessOrchestrator};
use buenarda::fetch::{self, HttpFetcher};
use buenarda::layout::StorageLayout;
use buenarda::locale::{self, LocaleFilter};
use buenarda::observability::{setup_tracing, spawn_metrics_server};
use buenarda::shard;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Local copy of the snapshot's cluster.idx file. It is downloaded up
    /// front because every run reads it start to finish.
    #[arg(short('i'), long("index"), default_value = "cluster.idx")]
    cluster_idx: PathBuf,

    /// The snapshot to process; the index file must belong to the same
    /// snapshot or the byte ranges will not line up.
    #[arg(short('s'), long("snapshot"), default_value = "CC-MAIN-2024-30")]
    snapshot: String,

    /// Glob over record hosts selecting the target locale.
    #[arg(short('p'), long("pattern"), default_value = locale::DEFAULT_PATTERN)]
    pattern: String,

    /// Root of the shared volume holding plan, ledger, corpus and reports.
    #[arg(short('o'), long("output"), default_value = "/data")]
    output: PathBuf,

    /// Maximum number of concurrently running worker jobs.
    #[arg(short('w'), long("workers"), default_value_t = 10)]
    workers: usize,

    /// Records per shard.
    #[arg(long("shard-size"), default_value_t = shard::DEFAULT_SHARD_SIZE)]
    shard_size: usize,

    /// Total submissions a shard gets before it is terminally failed.
    #[arg(long("max-attempts"), default_value_t = 4)]
    max_attempts: u32,

    /// Wall-clock budget per shard execution, in seconds.
    #[arg(long("shard-timeout"), default_value_t = 3600)]
    shard_timeout_secs: u64,

    /// Worker executable submitted for each shard.
    #[arg(long("worker-bin"), default_value = "worker")]
    worker_bin: PathBuf,

    /// Submit exactly one shard end-to-end to validate the environment
    /// before committing to a full run.
    #[arg(long("test-mode"), default_value_t = false)]
    test_mode: bool,

    /// Data endpoint serving index chunks and archive segments.
    #[arg(long("base-url"), default_value = fetch::DATA_BASE_URL)]
    base_url: String,
}

#[tokio::main]
async fn main() {
    let run_result = run(Args::parse()).await;
    if let Err(e) = run_result {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    setup_tracing();
    spawn_metrics_server(9000);

    let layout = StorageLayout::new(&args.output);
    layout
        .ensure()
        .with_context(|| format!("Cannot prepare storage root {}", args.output.display()))?;

    let fetcher = HttpFetcher::new(&args.base_url);
    let filter = LocaleFilter::new(&args.pattern);
    let mut shard_ids = controller::plan_snapshot(
        &fetcher,
        &layout,
        &args.snapshot,
        &args.cluster_idx,
        &filter,
        args.shard_size,
    )
    .await?;
    if shard_ids.is_empty() {
        tracing::info!("No records match pattern {}, nothing to do", args.pattern);
        return Ok(());
    }
    if args.test_mode {
        tracing::info!("Test mode: submitting 1 of {} planned shards", shard_ids.len());
        shard_ids.truncate(1);
    }

    let config = ControllerConfig {
        max_workers: args.workers.max(1),
        max_attempts: args.max_attempts.max(1),
        shard_timeout: std::time::Duration::from_secs(args.shard_timeout_secs),
        ..ControllerConfig::default()
    };
    let mut orchestrator = ProcessOrchestrator::new(&args.worker_bin, &args.base_url);
    let report =
        controller::run_shards(&mut orchestrator, &layout, &args.snapshot, &shard_ids, &config)
            .await?;

    for shard_report in &report.shard_reports {
        tracing::info!(
            "Shard {}: {} fetched, {} extracted, {} written, {} duplicate-skips, {} failures",
            shard_report.shard_id,
            shard_report.fetched,
            shard_report.extracted,
            shard_report.written,
            shard_report.duplicates,
            shard_report.failures
        );
    }
    let written: u64 = report.shard_reports.iter().map(|r| r.written).sum();
    let duplicates: u64 = report.shard_reports.iter().map(|r| r.duplicates).sum();
    let failures: u64 = report.shard_reports.iter().map(|r| r.failures).sum();
    tracing::info!(
        "Run finished: {} shard(s) succeeded, {} written, {} duplicate-skips, {} record failures",
        report.succeeded.len(),
        written,
        duplicates,
        failures
    );
    if !report.is_success() {
        bail!(
            "{} shard(s) terminally failed: {}",
            report.failed.len(),
            report.failed.join(", ")
        );
    }
    Ok(())
}
