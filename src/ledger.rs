//! Durable, concurrency-safe record of which content has already been
//! ingested.
//!
//! The ledger is the only coordination channel between worker processes: one
//! marker file per dedup key, claimed with an atomic create. A key is in the
//! corpus iff its marker exists, which is what makes incremental re-runs
//! produce zero duplicate output.
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// Identity of one logical content item.
///
/// Derived from the crawl's payload digest when the index supplies one, and
/// from the normalized URL otherwise; the prefix records which policy
/// produced the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(digest: Option<&str>, url: &str) -> Self {
        match digest {
            Some(d) if !d.is_empty() => Self(format!("sha1:{d}")),
            _ => Self(format!("url:{}", normalize_url(url))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe marker name for this key.
    fn marker_name(&self) -> String {
        format!("{:x}", Sha256::digest(self.0.as_bytes()))
    }
}

/// Canonical URL form used when no content digest is available: lowercased
/// host, no scheme, no fragment, no trailing slash; the query survives since
/// it usually selects distinct content.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => {
            let host = url.host_str().unwrap_or("").to_ascii_lowercase();
            let path = url.path().trim_end_matches('/');
            match url.query() {
                Some(query) => format!("{host}{path}?{query}"),
                None => format!("{host}{path}"),
            }
        }
        Err(_) => raw.trim().to_ascii_lowercase(),
    }
}

/// What a marker file records about a successful write.
#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub key: String,
    pub shard_id: String,
    pub recorded_at: DateTime<Utc>,
}

/// Outcome of a claim attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Claim {
    /// This caller owns the key and its write stands.
    Recorded,
    /// Another writer claimed the key first; skip without error.
    Conflict,
}

/// Marker-file ledger on the shared volume.
#[derive(Debug, Clone)]
pub struct DedupLedger {
    dir: PathBuf,
}

impl DedupLedger {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn seen(&self, key: &DedupKey) -> io::Result<bool> {
        self.marker_path(key).try_exists()
    }

    /// The linearization point for a key: the first caller to create the
    /// marker wins, every other concurrent caller observes `Conflict`.
    pub fn record(&self, key: &DedupKey, shard_id: &str) -> io::Result<Claim> {
        let path = self.marker_path(key);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(Claim::Conflict),
            Err(e) => return Err(e),
        };
        let entry = LedgerEntry {
            key: key.as_str().to_string(),
            shard_id: shard_id.to_string(),
            recorded_at: Utc::now(),
        };
        let json = serde_json::to_vec(&entry).map_err(io::Error::other)?;
        if let Err(e) = file.write_all(&json).and_then(|_| file.flush()) {
            // The claim must not stand if its entry could not be persisted.
            let _ = fs::remove_file(&path);
            return Err(e);
        }
        Ok(Claim::Recorded)
    }

    /// Number of entries in the ledger. Linear scan, used for reporting and
    /// tests, not on the record path.
    pub fn entries(&self) -> io::Result<usize> {
        Ok(fs::read_dir(&self.dir)?.count())
    }

    fn marker_path(&self, key: &DedupKey) -> PathBuf {
        self.dir.join(key.marker_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_key_preferred_over_url() {
        let with_digest = DedupKey::new(Some("ABCDEF"), "https://example.ar/a");
        let without = DedupKey::new(None, "https://example.ar/a");
        assert_eq!(with_digest.as_str(), "sha1:ABCDEF");
        assert_eq!(without.as_str(), "url:example.ar/a");
        assert_ne!(with_digest, without);
    }

    #[test]
    fn url_normalization_canonicalizes_equivalent_forms() {
        assert_eq!(
            normalize_url("HTTPS://Example.AR/path/"),
            normalize_url("https://example.ar/path")
        );
        assert_eq!(
            normalize_url("https://example.ar/p#frag"),
            normalize_url("https://example.ar/p")
        );
        assert_ne!(
            normalize_url("https://example.ar/p?q=1"),
            normalize_url("https://example.ar/p?q=2")
        );
    }
}
