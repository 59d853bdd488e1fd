//! Directory layout of the shared volume.
//!
//! Everything the run persists lives under a single root: the shard plan, the
//! dedup ledger, the per-shard corpus files and the per-shard worker reports.
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the full directory tree under the root.
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [
            self.plan_dir(),
            self.ledger_dir(),
            self.output_dir(),
            self.reports_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn plan_dir(&self) -> PathBuf {
        self.root.join("plan")
    }

    pub fn ledger_dir(&self) -> PathBuf {
        self.root.join("ledger")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    pub fn shard_spec(&self, shard_id: &str) -> PathBuf {
        self.plan_dir().join(format!("{shard_id}.json"))
    }

    pub fn shard_output(&self, shard_id: &str) -> PathBuf {
        self.output_dir().join(format!("{shard_id}.jsonl"))
    }

    pub fn shard_report(&self, shard_id: &str) -> PathBuf {
        self.reports_dir().join(format!("{shard_id}.json"))
    }
}
