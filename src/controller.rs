//! Shard planning and job orchestration.
//!
//! The controller is single-threaded logic driving an external orchestration
//! API through the [`Orchestrator`] trait: it scans and partitions the
//! snapshot index once, then admits shards into a bounded pool of jobs,
//! polling their status and retrying failed shards whole until every shard is
//! terminal.
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::Serialize;

use crate::commoncrawl::IndexScan;
use crate::fetch::HttpFetcher;
use crate::layout::StorageLayout;
use crate::locale::LocaleFilter;
use crate::shard::{self, ShardPlanner};
use crate::worker::ShardReport;

/// Job status as reported by the orchestration platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// One job submission: a shard to execute against a snapshot and storage
/// root.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub shard_id: String,
    pub snapshot: String,
    pub root: PathBuf,
}

pub type JobId = String;

/// The orchestration platform's interface, as far as the controller is
/// concerned. The platform itself (Kubernetes in the original deployment)
/// stays behind this seam; [`ProcessOrchestrator`] runs jobs as local child
/// processes.
pub trait Orchestrator {
    fn submit(&mut self, spec: &JobSpec) -> impl Future<Output = anyhow::Result<JobId>> + Send;
    fn status(&mut self, id: &JobId) -> impl Future<Output = anyhow::Result<JobStatus>> + Send;
    fn terminate(&mut self, id: &JobId) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Runs each shard as a `worker` child process on the local host. Job
/// success is the worker's exit status.
pub struct ProcessOrchestrator {
    worker_bin: PathBuf,
    base_url: String,
    next_job: u64,
    children: HashMap<JobId, tokio::process::Child>,
}

impl ProcessOrchestrator {
    pub fn new(worker_bin: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            worker_bin: worker_bin.into(),
            base_url: base_url.to_string(),
            next_job: 0,
            children: HashMap::new(),
        }
    }
}

impl Orchestrator for ProcessOrchestrator {
    async fn submit(&mut self, spec: &JobSpec) -> anyhow::Result<JobId> {
        let child = tokio::process::Command::new(&self.worker_bin)
            .arg("--shard")
            .arg(&spec.shard_id)
            .arg("--output")
            .arg(&spec.root)
            .arg("--base-url")
            .arg(&self.base_url)
            .spawn()
            .with_context(|| {
                format!("Failed to spawn worker {}", self.worker_bin.display())
            })?;
        let id = format!("{}-job-{}", spec.shard_id, self.next_job);
        self.next_job += 1;
        self.children.insert(id.clone(), child);
        Ok(id)
    }

    async fn status(&mut self, id: &JobId) -> anyhow::Result<JobStatus> {
        let child = self
            .children
            .get_mut(id)
            .with_context(|| format!("Unknown job {id}"))?;
        match child.try_wait()? {
            None => Ok(JobStatus::Running),
            Some(status) if status.success() => Ok(JobStatus::Succeeded),
            Some(_) => Ok(JobStatus::Failed),
        }
    }

    async fn terminate(&mut self, id: &JobId) -> anyhow::Result<()> {
        if let Some(child) = self.children.get_mut(id) {
            child.kill().await?;
        }
        Ok(())
    }
}

/// Tuning knobs for the admission loop. None of these are
/// correctness-critical.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Cap on concurrently submitted/running shards.
    pub max_workers: usize,
    /// Total submissions a shard gets before it is terminally failed.
    pub max_attempts: u32,
    pub poll_interval: Duration,
    /// Wall-clock budget per shard execution.
    pub shard_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            max_attempts: 4,
            poll_interval: Duration::from_secs(2),
            shard_timeout: Duration::from_secs(3600),
        }
    }
}

/// Final outcome of a controller run. Terminally failed shards are always
/// enumerated, never dropped.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub snapshot: String,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub shard_reports: Vec<ShardReport>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Scans the snapshot index, applies the locale filter and persists the shard
/// plan. Returns the shard ids in deterministic scan order.
pub async fn plan_snapshot(
    fetcher: &HttpFetcher,
    layout: &StorageLayout,
    snapshot: &str,
    cluster_idx: &Path,
    filter: &LocaleFilter,
    shard_size: usize,
) -> anyhow::Result<Vec<String>> {
    let mut scan = IndexScan::open(fetcher, snapshot, cluster_idx)
        .with_context(|| format!("Failed to open index {}", cluster_idx.display()))?;
    let mut planner = ShardPlanner::new(snapshot, shard_size);
    let mut shard_ids = Vec::new();
    let mut scanned = 0u64;
    let mut matched = 0u64;
    while let Some(entries) = scan.next_chunk().await? {
        for entry in entries {
            scanned += 1;
            if entry.metadata.status != 200 || !filter.matches_record(&entry) {
                continue;
            }
            matched += 1;
            if let Some(full) = planner.push(entry) {
                shard::write_shard_spec(layout, &full)?;
                shard_ids.push(full.id);
            }
        }
    }
    if let Some(last) = planner.finish() {
        shard::write_shard_spec(layout, &last)?;
        shard_ids.push(last.id);
    }
    tracing::info!(
        "Planned {} shard(s) from {} matching of {} scanned records ({} malformed lines skipped)",
        shard_ids.len(),
        matched,
        scanned,
        scan.malformed_lines()
    );
    Ok(shard_ids)
}

#[derive(Debug, PartialEq, Eq)]
enum ShardState {
    Pending,
    Submitted,
    Running,
    Succeeded,
    Failed,
}

struct Slot {
    shard_id: String,
    state: ShardState,
    attempts: u32,
    job: Option<(JobId, Instant)>,
}

impl Slot {
    fn active(&self) -> bool {
        matches!(self.state, ShardState::Submitted | ShardState::Running)
    }

    fn terminal(&self) -> bool {
        matches!(self.state, ShardState::Succeeded | ShardState::Failed)
    }
}

/// Drives every shard to a terminal state and aggregates the worker reports.
pub async fn run_shards<O: Orchestrator>(
    orchestrator: &mut O,
    layout: &StorageLayout,
    snapshot: &str,
    shard_ids: &[String],
    config: &ControllerConfig,
) -> anyhow::Result<RunReport> {
    let mut slots: Vec<Slot> = shard_ids
        .iter()
        .map(|id| Slot {
            shard_id: id.clone(),
            state: ShardState::Pending,
            attempts: 0,
            job: None,
        })
        .collect();

    while slots.iter().any(|s| !s.terminal()) {
        admit_pending(orchestrator, &mut slots, snapshot, layout, config).await;
        poll_active(orchestrator, &mut slots, config).await;
        if slots.iter().any(|s| !s.terminal()) {
            tokio::time::sleep(config.poll_interval).await;
        }
    }

    let mut report = RunReport {
        snapshot: snapshot.to_string(),
        succeeded: Vec::new(),
        failed: Vec::new(),
        shard_reports: Vec::new(),
    };
    for slot in &slots {
        match slot.state {
            ShardState::Succeeded => {
                report.succeeded.push(slot.shard_id.clone());
                match load_shard_report(layout, &slot.shard_id) {
                    Ok(shard_report) => report.shard_reports.push(shard_report),
                    Err(e) => tracing::warn!("No report for shard {}: {}", slot.shard_id, e),
                }
            }
            _ => report.failed.push(slot.shard_id.clone()),
        }
    }
    Ok(report)
}

async fn admit_pending<O: Orchestrator>(
    orchestrator: &mut O,
    slots: &mut [Slot],
    snapshot: &str,
    layout: &StorageLayout,
    config: &ControllerConfig,
) {
    let mut active = slots.iter().filter(|s| s.active()).count();
    for slot in slots.iter_mut() {
        if active >= config.max_workers {
            break;
        }
        if slot.state != ShardState::Pending {
            continue;
        }
        let spec = JobSpec {
            shard_id: slot.shard_id.clone(),
            snapshot: snapshot.to_string(),
            root: layout.root().to_path_buf(),
        };
        slot.attempts += 1;
        match orchestrator.submit(&spec).await {
            Ok(job_id) => {
                tracing::info!(
                    "Submitted shard {} (attempt {}/{})",
                    slot.shard_id,
                    slot.attempts,
                    config.max_attempts
                );
                slot.job = Some((job_id, Instant::now()));
                slot.state = ShardState::Submitted;
                active += 1;
            }
            Err(e) => {
                tracing::warn!("Submission of shard {} failed: {}", slot.shard_id, e);
                fail_attempt(slot, config);
            }
        }
    }
}

async fn poll_active<O: Orchestrator>(
    orchestrator: &mut O,
    slots: &mut [Slot],
    config: &ControllerConfig,
) {
    for slot in slots.iter_mut() {
        if !slot.active() {
            continue;
        }
        let Some((job_id, submitted_at)) = slot.job.clone() else {
            continue;
        };
        if submitted_at.elapsed() > config.shard_timeout {
            tracing::warn!(
                "Shard {} exceeded its {}s budget, terminating",
                slot.shard_id,
                config.shard_timeout.as_secs()
            );
            if let Err(e) = orchestrator.terminate(&job_id).await {
                tracing::warn!("Failed to terminate job {}: {}", job_id, e);
            }
            fail_attempt(slot, config);
            continue;
        }
        match orchestrator.status(&job_id).await {
            Ok(JobStatus::Pending) => {}
            Ok(JobStatus::Running) => slot.state = ShardState::Running,
            Ok(JobStatus::Succeeded) => {
                tracing::info!("Shard {} succeeded", slot.shard_id);
                slot.state = ShardState::Succeeded;
                slot.job = None;
            }
            Ok(JobStatus::Failed) => {
                tracing::warn!("Shard {} failed (attempt {})", slot.shard_id, slot.attempts);
                fail_attempt(slot, config);
            }
            // A status poll can fail transiently without implying anything
            // about the job itself.
            Err(e) => tracing::warn!("Status poll for {} failed: {}", job_id, e),
        }
    }
}

fn fail_attempt(slot: &mut Slot, config: &ControllerConfig) {
    slot.job = None;
    if slot.attempts >= config.max_attempts {
        tracing::error!(
            "Shard {} terminally failed after {} attempts",
            slot.shard_id,
            slot.attempts
        );
        slot.state = ShardState::Failed;
    } else {
        slot.state = ShardState::Pending;
    }
}

fn load_shard_report(layout: &StorageLayout, shard_id: &str) -> anyhow::Result<ShardReport> {
    let path = layout.shard_report(shard_id);
    let json = std::fs::read(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&json)
        .with_context(|| format!("Report {} is not valid JSON", path.display()))
}
