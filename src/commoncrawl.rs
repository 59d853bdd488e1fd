//! This module contains helper functions and structs for de-serializing
//! CommonCrawl-specific index structures, plus the chunked index scan used by
//! the controller to enumerate a snapshot's records.
use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_aux::prelude::deserialize_number_from_string;
use thiserror::Error;

use crate::archive::{self, DecodeError};
use crate::fetch::{FetchError, HttpFetcher};

/// Metadata for a crawled URL.
/// The controller uses this metadata to filter records before sharding them
/// out to the worker(s).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CdxMetadata {
    pub url: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub status: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub length: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub offset: u64,
    pub filename: String,
    pub digest: Option<String>,
    pub languages: Option<String>,
}

/// Represents a line in a cdx index file: a pointer to one archived page.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CdxEntry {
    pub surt_url: String,
    pub timestamp: String,
    pub metadata: CdxMetadata,
}

/// De-serializes an index file row into a [CdxEntry].
/// Returns `None` on malformed lines; the caller counts and skips them.
pub fn parse_cdx_line(line: &str) -> Option<CdxEntry> {
    let mut parts = line.splitn(3, ' ');
    let surt_url = parts.next()?.to_string();
    let timestamp = parts.next()?.to_string();
    let metadata = serde_json::from_str(parts.next()?).ok()?;
    Some(CdxEntry {
        surt_url,
        timestamp,
        metadata,
    })
}

/// Represents a line in a cluster.idx file.
/// We only care about the cdx filename and offset/length pair into that file.
pub struct ClusterIdxEntry {
    pub cdx_filename: String,
    pub cdx_offset: u64,
    pub cdx_length: u64,
}

/// De-serializes a cluster.idx file line into a [ClusterIdxEntry].
/// Returns `None` if there are missing or unparseable elements in the line.
pub fn parse_cluster_idx(line: &str) -> Option<ClusterIdxEntry> {
    let mut idx = line.split_whitespace();
    let _surt_url = idx.next()?;
    let _timestamp = idx.next()?;
    Some(ClusterIdxEntry {
        cdx_filename: idx.next()?.to_string(),
        cdx_offset: idx.next()?.parse().ok()?,
        cdx_length: idx.next()?.parse().ok()?,
    })
}

/// Failures while streaming a snapshot's index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to read cluster.idx: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A lazy scan over a snapshot's cdx index.
///
/// Reads the cluster.idx file line by line and range-fetches one compressed
/// cdx chunk at a time, so memory stays bounded by a single chunk no matter
/// how large the snapshot is. The scan is restartable by calling [`open`]
/// again; it is not resumable mid-stream.
///
/// [`open`]: IndexScan::open
pub struct IndexScan<'a> {
    fetcher: &'a HttpFetcher,
    snapshot: String,
    lines: Lines<BufReader<File>>,
    malformed: u64,
}

impl<'a> IndexScan<'a> {
    pub fn open(
        fetcher: &'a HttpFetcher,
        snapshot: &str,
        cluster_idx: &Path,
    ) -> io::Result<Self> {
        let file = File::open(cluster_idx)?;
        Ok(Self {
            fetcher,
            snapshot: snapshot.to_string(),
            lines: BufReader::new(file).lines(),
            malformed: 0,
        })
    }

    /// Fetches and parses the next cdx chunk, or `None` once the cluster.idx
    /// file is exhausted. Malformed cluster.idx or cdx lines are skipped and
    /// counted, never fatal.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<CdxEntry>>, IndexError> {
        loop {
            let Some(line) = self.lines.next() else {
                return Ok(None);
            };
            let line = line?;
            let Some(chunk) = parse_cluster_idx(&line) else {
                self.malformed += 1;
                tracing::warn!("Skipping malformed cluster.idx line: {}", line);
                continue;
            };
            let path = format!(
                "cc-index/collections/{}/indexes/{}",
                self.snapshot, chunk.cdx_filename
            );
            let raw = self
                .fetcher
                .fetch(&path, chunk.cdx_offset, chunk.cdx_length)
                .await?;
            let bytes = archive::gunzip(&raw)?;
            let text = String::from_utf8_lossy(&bytes);
            let mut entries = Vec::new();
            for cdx_line in text.lines() {
                match parse_cdx_line(cdx_line) {
                    Some(entry) => entries.push(entry),
                    None => {
                        self.malformed += 1;
                        tracing::warn!("Skipping malformed cdx line in {}", chunk.cdx_filename);
                    }
                }
            }
            return Ok(Some(entries));
        }
    }

    /// Number of malformed index lines skipped so far.
    pub fn malformed_lines(&self) -> u64 {
        self.malformed
    }
}
