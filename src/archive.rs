//! Reconstitution of archived records: gzip member decoding and WARC
//! response parsing.
use std::io::{self, Read};

use thiserror::Error;
use warc::WarcHeader;

/// Corrupt or truncated record data. Treated by the worker exactly like a
/// fetch failure: the record is skipped, the shard continues.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("gzip decode failed: {0}")]
    Gzip(#[from] io::Error),
    #[error("malformed WARC record: {0}")]
    Warc(String),
}

/// Decompresses one gzip member into the raw record bytes.
/// Does not interpret the output as UTF-8 because the `warc` crate wants
/// plain bytes.
pub fn gunzip(raw: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = flate2::read::GzDecoder::new(raw);
    let mut buffer = Vec::new();
    decoder.read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// The part of a WARC response record the extractor cares about.
#[derive(Debug)]
pub struct ResponseRecord {
    pub url: String,
    pub html: String,
}

/// Pulls the first response-type record out of a decompressed WARC slice and
/// strips the embedded HTTP headers from its body.
///
/// `Ok(None)` means the slice held no response record (request or metadata
/// records share the same archive files) or the body carried no payload
/// after its headers; both are normal skips, not errors.
pub fn response_body(record_bytes: &[u8]) -> Result<Option<ResponseRecord>, DecodeError> {
    for warc_entry in warc::WarcReader::new(record_bytes).iter_records() {
        let warc_entry = warc_entry.map_err(|e| DecodeError::Warc(e.to_string()))?;
        if warc_entry.header(WarcHeader::WarcType).as_deref() != Some("response") {
            continue;
        }
        let url = warc_entry
            .header(WarcHeader::TargetURI)
            .map(|uri| uri.to_string())
            .unwrap_or_default();
        let raw_content = String::from_utf8_lossy(warc_entry.body());
        // The record body is an HTTP response; the payload starts after the
        // first blank line.
        let Some(html) = split_http_payload(&raw_content) else {
            tracing::warn!("No HTTP payload in WARC response for {}", url);
            return Ok(None);
        };
        return Ok(Some(ResponseRecord {
            url,
            html: html.to_string(),
        }));
    }
    Ok(None)
}

fn split_http_payload(raw: &str) -> Option<&str> {
    if let Some(idx) = raw.find("\r\n\r\n") {
        return Some(&raw[idx + 4..]);
    }
    raw.find("\n\n").map(|idx| &raw[idx + 2..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gunzip_rejects_garbage() {
        assert!(gunzip(b"definitely not gzip").is_err());
    }

    #[test]
    fn payload_split_handles_both_line_endings() {
        assert_eq!(
            split_http_payload("HTTP/1.1 200 OK\r\nA: b\r\n\r\n<html>"),
            Some("<html>")
        );
        assert_eq!(
            split_http_payload("HTTP/1.1 200 OK\nA: b\n\n<html>"),
            Some("<html>")
        );
        assert_eq!(split_http_payload("no blank line"), None);
    }
}
