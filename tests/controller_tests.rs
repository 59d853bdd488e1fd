//! Controller state-machine tests over a scripted orchestrator.
use std::collections::HashMap;
use std::time::Duration;

use buenarda::controller::{
    run_shards, ControllerConfig, JobId, JobSpec, JobStatus, Orchestrator,
};
use buenarda::layout::StorageLayout;

/// Orchestrator whose jobs land in a scripted terminal state per attempt;
/// unscripted attempts succeed.
#[derive(Default)]
struct MockOrchestrator {
    outcomes: HashMap<String, Vec<JobStatus>>,
    submissions: Vec<String>,
    terminations: Vec<JobId>,
    jobs: HashMap<JobId, JobStatus>,
    next_job: u64,
}

impl MockOrchestrator {
    fn script(mut self, shard_id: &str, outcomes: &[JobStatus]) -> Self {
        self.outcomes
            .insert(shard_id.to_string(), outcomes.to_vec());
        self
    }

    fn attempts_for(&self, shard_id: &str) -> usize {
        self.submissions.iter().filter(|s| *s == shard_id).count()
    }
}

impl Orchestrator for MockOrchestrator {
    async fn submit(&mut self, spec: &JobSpec) -> anyhow::Result<JobId> {
        let attempt = self.attempts_for(&spec.shard_id);
        self.submissions.push(spec.shard_id.clone());
        let outcome = self
            .outcomes
            .get(&spec.shard_id)
            .and_then(|o| o.get(attempt))
            .copied()
            .unwrap_or(JobStatus::Succeeded);
        let id = format!("job-{}", self.next_job);
        self.next_job += 1;
        self.jobs.insert(id.clone(), outcome);
        Ok(id)
    }

    async fn status(&mut self, id: &JobId) -> anyhow::Result<JobStatus> {
        Ok(self.jobs[id])
    }

    async fn terminate(&mut self, id: &JobId) -> anyhow::Result<()> {
        self.terminations.push(id.clone());
        Ok(())
    }
}

fn fast_config() -> ControllerConfig {
    ControllerConfig {
        max_workers: 2,
        max_attempts: 4,
        poll_interval: Duration::from_millis(10),
        shard_timeout: Duration::from_secs(60),
    }
}

fn shard_ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("snap-{i:05}")).collect()
}

#[tokio::test]
async fn all_shards_reach_succeeded() {
    let root = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(root.path());
    let mut orch = MockOrchestrator::default();
    let ids = shard_ids(3);
    let report = run_shards(&mut orch, &layout, "snap", &ids, &fast_config())
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(report.succeeded, ids);
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn failed_shard_is_resubmitted_whole_until_it_succeeds() {
    let root = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(root.path());
    let mut orch = MockOrchestrator::default().script(
        "snap-00001",
        &[JobStatus::Failed, JobStatus::Failed, JobStatus::Succeeded],
    );
    let ids = shard_ids(3);
    let report = run_shards(&mut orch, &layout, "snap", &ids, &fast_config())
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(orch.attempts_for("snap-00001"), 3);
    assert_eq!(orch.attempts_for("snap-00000"), 1);
}

#[tokio::test]
async fn exhausted_retries_are_reported_not_dropped() {
    let root = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(root.path());
    let mut orch = MockOrchestrator::default().script("snap-00000", &[JobStatus::Failed; 4]);
    let ids = shard_ids(2);
    let report = run_shards(&mut orch, &layout, "snap", &ids, &fast_config())
        .await
        .unwrap();
    assert!(!report.is_success());
    assert_eq!(report.failed, vec!["snap-00000".to_string()]);
    assert_eq!(report.succeeded, vec!["snap-00001".to_string()]);
    assert_eq!(orch.attempts_for("snap-00000"), 4);
}

#[tokio::test]
async fn shard_exceeding_wall_clock_budget_is_terminated_and_failed() {
    let root = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(root.path());
    // A job that never terminates on its own.
    let mut orch = MockOrchestrator::default().script(
        "snap-00000",
        &[JobStatus::Running, JobStatus::Running, JobStatus::Running, JobStatus::Running],
    );
    let config = ControllerConfig {
        max_attempts: 2,
        shard_timeout: Duration::from_millis(30),
        ..fast_config()
    };
    let report = run_shards(&mut orch, &layout, "snap", &shard_ids(1), &config)
        .await
        .unwrap();
    assert!(!report.is_success());
    assert_eq!(report.failed, vec!["snap-00000".to_string()]);
    assert_eq!(orch.terminations.len(), 2);
}
