//! Per-shard corpus files.
//!
//! Each shard appends to its own JSONL file, so workers never contend on a
//! shared file; the corpus is the union of all shard files. A line is only
//! allowed to persist if its dedup key made it into the ledger, which
//! `reconcile` re-establishes after a crash.
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::ledger::{DedupKey, DedupLedger};

/// One accepted text record. Appended exactly once per dedup key, never
/// updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRecord {
    pub url: String,
    pub host: String,
    pub text: String,
    pub digest: Option<String>,
    pub shard_id: String,
}

impl OutputRecord {
    pub fn new(url: &str, text: String, digest: Option<String>, shard_id: &str) -> Self {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            url: url.to_string(),
            host,
            text,
            digest,
            shard_id: shard_id.to_string(),
        }
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(self.digest.as_deref(), &self.url)
    }
}

/// Append handle for one shard's output file, exclusively owned by the worker
/// executing that shard.
pub struct ShardOutput {
    file: File,
}

impl ShardOutput {
    /// Opens the shard file for appending, first dropping any orphan lines
    /// left by a previous attempt that was killed between its append and its
    /// ledger record.
    pub fn open(path: &Path, ledger: &DedupLedger) -> io::Result<Self> {
        reconcile(path, ledger)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }

    /// Appends one record and returns the file length before the append, so
    /// the caller can roll back if it loses the ledger claim.
    pub fn append(&mut self, record: &OutputRecord) -> io::Result<u64> {
        let offset = self.file.seek(SeekFrom::End(0))?;
        let mut line = serde_json::to_vec(record).map_err(io::Error::other)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;
        Ok(offset)
    }

    /// Undoes an append that lost the race for its key.
    pub fn rollback(&mut self, offset: u64) -> io::Result<()> {
        self.file.set_len(offset)?;
        self.file.seek(SeekFrom::End(0))?;
        Ok(())
    }
}

/// Rewrites the shard file keeping only lines whose key is ledgered.
///
/// Runs before processing starts, so a retried shard converges to one line
/// per ledgered key no matter where the previous attempt died.
fn reconcile(path: &Path, ledger: &DedupLedger) -> io::Result<()> {
    if !path.try_exists()? {
        return Ok(());
    }
    let mut kept: Vec<String> = Vec::new();
    let mut dropped = 0usize;
    for line in BufReader::new(File::open(path)?).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let ledgered = match serde_json::from_str::<OutputRecord>(&line) {
            Ok(record) => ledger.seen(&record.dedup_key())?,
            Err(_) => false,
        };
        if ledgered {
            kept.push(line);
        } else {
            dropped += 1;
        }
    }
    if dropped == 0 {
        return Ok(());
    }
    tracing::warn!(
        "Dropping {} orphan line(s) from {} during reconciliation",
        dropped,
        path.display()
    );
    let tmp = tmp_path(path);
    let mut out = File::create(&tmp)?;
    for line in &kept {
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".reconcile");
    PathBuf::from(name)
}
