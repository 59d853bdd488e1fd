//! Byte-range reads against the crawl archive's object storage.
use std::future::Future;
use std::time::Duration;

use autometrics::autometrics;
use thiserror::Error;

/// Public Common Crawl data endpoint; both index chunks and archive segments
/// hang off this root.
pub const DATA_BASE_URL: &str = "https://data.commoncrawl.org";

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Failure modes of a range read.
///
/// `Transient` is only surfaced once the retry budget is spent; `Fatal`
/// failures (missing object, permission denied, ignored or malformed range)
/// are never retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transient fetch failure for {file} after {attempts} attempts: {reason}")]
    Transient {
        file: String,
        attempts: u32,
        reason: String,
    },
    #[error("fetch failed for {file}: {reason}")]
    Fatal { file: String, reason: String },
}

/// The fetch capability the worker pipeline is written against. Production
/// code uses [`HttpFetcher`]; tests substitute canned responses.
pub trait RecordFetcher {
    fn fetch(
        &self,
        file: &str,
        offset: u64,
        length: u64,
    ) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// Range-read client over HTTP object storage with bounded exponential
/// backoff on transient failures.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFetcher {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetches exactly the declared byte range of `file`.
    #[autometrics]
    pub async fn fetch(&self, file: &str, offset: u64, length: u64) -> Result<Vec<u8>, FetchError> {
        if length == 0 {
            return Err(FetchError::Fatal {
                file: file.to_string(),
                reason: "malformed range: zero length".to_string(),
            });
        }
        let url = format!("{}/{}", self.base_url, file);
        let range = format!("bytes={}-{}", offset, offset + length - 1);
        let mut last_reason = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match self.fetch_once(&url, &range).await {
                Ok(body) => {
                    tracing::debug!(
                        "Fetched {} bytes {}-{} on attempt {}",
                        file,
                        offset,
                        offset + length - 1,
                        attempt
                    );
                    return Ok(body);
                }
                Err(Retry::Fatal(reason)) => {
                    return Err(FetchError::Fatal {
                        file: file.to_string(),
                        reason,
                    });
                }
                Err(Retry::Transient(reason)) => {
                    tracing::warn!(
                        "Transient fetch failure for {} (attempt {}/{}): {}",
                        file,
                        attempt,
                        MAX_ATTEMPTS,
                        reason
                    );
                    last_reason = reason;
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(backoff(attempt)).await;
                    }
                }
            }
        }
        Err(FetchError::Transient {
            file: file.to_string(),
            attempts: MAX_ATTEMPTS,
            reason: last_reason,
        })
    }

    async fn fetch_once(&self, url: &str, range: &str) -> Result<Vec<u8>, Retry> {
        let request = self.client.get(url).header("Range", range).send();
        let res = tokio::time::timeout(FETCH_TIMEOUT, request)
            .await
            .map_err(|_| Retry::Transient("request timed out".to_string()))?
            .map_err(classify_reqwest_error)?;
        match res.status() {
            reqwest::StatusCode::PARTIAL_CONTENT => {
                let body = res
                    .bytes()
                    .await
                    .map_err(|e| Retry::Transient(format!("body read failed: {e}")))?;
                Ok(body.to_vec())
            }
            status if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                Err(Retry::Transient(format!("status {status}")))
            }
            // Anything else means the range itself is wrong or the object is
            // gone; retrying cannot help.
            status => Err(Retry::Fatal(format!("status {status}"))),
        }
    }
}

impl RecordFetcher for HttpFetcher {
    async fn fetch(&self, file: &str, offset: u64, length: u64) -> Result<Vec<u8>, FetchError> {
        HttpFetcher::fetch(self, file, offset, length).await
    }
}

enum Retry {
    Transient(String),
    Fatal(String),
}

fn classify_reqwest_error(e: reqwest::Error) -> Retry {
    // Errors out of `send()` are network-level (timeouts, resets, refused
    // connections) and worth retrying; a builder error means the request
    // itself is malformed.
    if e.is_builder() {
        Retry::Fatal(e.to_string())
    } else {
        Retry::Transient(e.to_string())
    }
}

fn backoff(attempt: u32) -> Duration {
    BACKOFF_BASE
        .saturating_mul(2u32.saturating_pow(attempt - 1))
        .min(BACKOFF_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(2), Duration::from_secs(2));
        assert_eq!(backoff(3), Duration::from_secs(4));
        assert_eq!(backoff(10), Duration::from_secs(30));
    }
}
