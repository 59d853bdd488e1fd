//! The content-extraction capability the worker pipeline delegates to.

/// Strips boilerplate from an HTML document and returns the body text.
///
/// `Ok(None)` is a normal outcome — the page had no extractable body — and
/// causes the record to be skipped without a ledger entry or output write.
/// The production implementation is [`crate::trafilatura::Trafilatura`];
/// swapping in a different extraction library only touches this seam.
pub trait TextExtractor {
    fn extract(&self, html: &str) -> Result<Option<String>, anyhow::Error>;
}
