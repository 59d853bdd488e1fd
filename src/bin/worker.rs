//! The worker executes exactly one shard: it loads its assignment from the
//! plan directory, downloads each record's byte range from the archive,
//! decompresses and parses the WARC payload, extracts the body text with the
//! trafilatura Python package and appends unique records to the shard's
//! corpus file.
//!
//! A record that fails to fetch, decode or extract is counted and skipped;
//! the shard still succeeds if the record list was traversed. The process
//! exits non-zero only when the shard itself cannot run — no assignment, or
//! the shared volume is unreachable — which is what makes a non-zero exit a
//! meaningful retry signal for the controller.
use std::path::PathBuf;

use anyhow::Result;
use buenarda::fetch::{self, HttpFetcher};
use buenarda::layout::StorageLayout;
use buenarda::observability::{setup_tracing, spawn_metrics_server};
use buenarda::trafilatura::Trafilatura;
use buenarda::worker::WorkerEngine;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Id of the shard to execute, as planned by the controller.
    #[arg(long("shard"))]
    shard: String,

    /// Root of the shared volume holding plan, ledger, corpus and reports.
    #[arg(short('o'), long("output"), default_value = "/data")]
    output: PathBuf,

    /// Data endpoint serving archive segments.
    #[arg(long("base-url"), default_value = fetch::DATA_BASE_URL)]
    base_url: String,

    /// Port for this worker's metrics endpoint.
    #[arg(long("metrics-port"), default_value_t = 9001)]
    metrics_port: u16,
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
    spawn_metrics_server(args.metrics_port);

    let engine = WorkerEngine::new(
        HttpFetcher::new(&args.base_url),
        Trafilatura,
        StorageLayout::new(&args.output),
    );
    let report = engine.run_shard(&args.shard).await?;
    tracing::info!(
        "Worker done: {}/{} records written, {} duplicates, {} failures",
        report.written,
        report.records,
        report.duplicates,
        report.failures
    );
    Ok(())
}
