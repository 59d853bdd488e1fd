//! Extraction of a locale-filtered, deduplicated text corpus from Common Crawl
//! snapshots.
//!
//! The crate consists of two binaries, called [controller](../controller/index.html)
//! and [worker](../worker/index.html). The controller scans a snapshot's index,
//! partitions the matching records into shards and drives one worker job per
//! shard. Each worker fetches its records by byte range, decompresses and
//! parses the WARC payloads, extracts body text and appends unique records to
//! the shared corpus, coordinating with other workers only through the
//! deduplication ledger on the shared volume.
pub mod archive;
pub mod commoncrawl;
pub mod controller;
pub mod extract;
pub mod fetch;
pub mod layout;
pub mod ledger;
pub mod locale;
pub mod observability;
pub mod output;
pub mod shard;
pub mod trafilatura;
pub mod worker;
