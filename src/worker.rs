//! Per-shard execution: the fetch → decompress → extract → dedup → write
//! loop.
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::archive;
use crate::commoncrawl::CdxEntry;
use crate::extract::TextExtractor;
use crate::fetch::RecordFetcher;
use crate::layout::StorageLayout;
use crate::ledger::{Claim, DedupKey, DedupLedger};
use crate::output::{OutputRecord, ShardOutput};
use crate::shard::{self, Shard};

/// Conditions that abort a whole shard. Everything else is contained as a
/// per-record failure, so one bad record never takes down the remaining
/// records in its shard.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("cannot obtain shard assignment for {shard_id}: {cause}")]
    ShardUnavailable {
        shard_id: String,
        cause: anyhow::Error,
    },
    #[error("shared storage unavailable at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Per-shard outcome counts, written to the reports directory for the
/// controller to aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardReport {
    pub shard_id: String,
    pub records: u64,
    pub fetched: u64,
    pub extracted: u64,
    pub written: u64,
    pub duplicates: u64,
    pub failures: u64,
    pub finished_at: DateTime<Utc>,
}

/// Drives one shard through the pipeline.
///
/// The engine is generic over its two collaborator seams: the range-read
/// client and the text extractor.
pub struct WorkerEngine<F, E> {
    fetcher: F,
    extractor: E,
    layout: StorageLayout,
}

enum RecordOutcome {
    Written,
    Duplicate,
    /// No response record or no extractable body; a normal skip.
    Empty,
    Failed,
}

impl<F: RecordFetcher, E: TextExtractor> WorkerEngine<F, E> {
    pub fn new(fetcher: F, extractor: E, layout: StorageLayout) -> Self {
        Self {
            fetcher,
            extractor,
            layout,
        }
    }

    /// Executes the shard with the given id from start to finish.
    ///
    /// Succeeds whenever the record list was traversed, regardless of how
    /// many individual records failed; per-record failures only show up in
    /// the report counts.
    pub async fn run_shard(&self, shard_id: &str) -> Result<ShardReport, WorkerError> {
        let shard = shard::load_shard_spec(&self.layout, shard_id).map_err(|cause| {
            WorkerError::ShardUnavailable {
                shard_id: shard_id.to_string(),
                cause,
            }
        })?;
        let ledger_dir = self.layout.ledger_dir();
        let ledger = DedupLedger::open(&ledger_dir).map_err(|source| WorkerError::Storage {
            path: ledger_dir,
            source,
        })?;
        let output_path = self.layout.shard_output(shard_id);
        let mut output =
            ShardOutput::open(&output_path, &ledger).map_err(|source| WorkerError::Storage {
                path: output_path.clone(),
                source,
            })?;

        let mut report = ShardReport {
            shard_id: shard_id.to_string(),
            records: shard.records.len() as u64,
            fetched: 0,
            extracted: 0,
            written: 0,
            duplicates: 0,
            failures: 0,
            finished_at: Utc::now(),
        };
        for entry in &shard.records {
            match self
                .process_record(&shard, entry, &ledger, &mut output)
                .await
            {
                RecordOutcome::Written => {
                    report.fetched += 1;
                    report.extracted += 1;
                    report.written += 1;
                }
                RecordOutcome::Duplicate => {
                    report.fetched += 1;
                    report.extracted += 1;
                    report.duplicates += 1;
                }
                RecordOutcome::Empty => report.fetched += 1,
                RecordOutcome::Failed => report.failures += 1,
            }
        }
        report.finished_at = Utc::now();
        self.write_report(&report)?;
        tracing::info!(
            "Shard {} done: {} records, {} written, {} duplicates, {} failures",
            shard_id,
            report.records,
            report.written,
            report.duplicates,
            report.failures
        );
        Ok(report)
    }

    async fn process_record(
        &self,
        shard: &Shard,
        entry: &CdxEntry,
        ledger: &DedupLedger,
        output: &mut ShardOutput,
    ) -> RecordOutcome {
        let url = &entry.metadata.url;
        let raw = match self
            .fetcher
            .fetch(
                &entry.metadata.filename,
                entry.metadata.offset,
                entry.metadata.length,
            )
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Fetch failed for {}: {}", url, e);
                return RecordOutcome::Failed;
            }
        };
        let record_bytes = match archive::gunzip(&raw) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Decode failed for {}: {}", url, e);
                return RecordOutcome::Failed;
            }
        };
        let response = match archive::response_body(&record_bytes) {
            Ok(Some(response)) => response,
            Ok(None) => return RecordOutcome::Empty,
            Err(e) => {
                tracing::warn!("Decode failed for {}: {}", url, e);
                return RecordOutcome::Failed;
            }
        };
        let text = match self.extractor.extract(&response.html) {
            Ok(Some(text)) => text,
            Ok(None) => return RecordOutcome::Empty,
            Err(e) => {
                tracing::warn!("Extraction failed for {}: {}", url, e);
                return RecordOutcome::Failed;
            }
        };

        let key = DedupKey::new(entry.metadata.digest.as_deref(), url);
        match ledger.seen(&key) {
            Ok(true) => return RecordOutcome::Duplicate,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Ledger check failed for {}: {}", url, e);
                return RecordOutcome::Failed;
            }
        }
        let record = OutputRecord::new(url, text, entry.metadata.digest.clone(), &shard.id);
        // Append first, claim second: the ledger must never get ahead of a
        // write that has not been confirmed. A lost claim rolls the
        // exclusively-owned append back.
        let offset = match output.append(&record) {
            Ok(offset) => offset,
            Err(e) => {
                tracing::warn!("Output write failed for {}: {}", url, e);
                return RecordOutcome::Failed;
            }
        };
        match ledger.record(&key, &shard.id) {
            Ok(Claim::Recorded) => RecordOutcome::Written,
            Ok(Claim::Conflict) => match output.rollback(offset) {
                Ok(()) => RecordOutcome::Duplicate,
                Err(e) => {
                    tracing::warn!("Rollback failed for {}: {}", url, e);
                    RecordOutcome::Failed
                }
            },
            Err(e) => {
                tracing::warn!("Ledger record failed for {}: {}", url, e);
                let _ = output.rollback(offset);
                RecordOutcome::Failed
            }
        }
    }

    fn write_report(&self, report: &ShardReport) -> Result<(), WorkerError> {
        let path = self.layout.shard_report(&report.shard_id);
        let json = serde_json::to_vec(report).map_err(io::Error::other);
        json.and_then(|json| std::fs::write(&path, json))
            .map_err(|source| WorkerError::Storage {
                path: path.clone(),
                source,
            })
    }
}
