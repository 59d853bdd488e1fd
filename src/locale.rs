//! Host-based locale filtering applied during the index scan.
use url::Url;

use crate::commoncrawl::CdxEntry;

/// Default locale pattern: Argentina's ccTLD.
pub const DEFAULT_PATTERN: &str = "*.ar";

/// Glob predicate over an index record's host.
///
/// Patterns use `*` as the only wildcard and compare case-insensitively, so
/// `*.ar` selects every host under the Argentinian ccTLD.
#[derive(Debug, Clone)]
pub struct LocaleFilter {
    pattern: String,
}

impl LocaleFilter {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_ascii_lowercase(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches_host(&self, host: &str) -> bool {
        glob_match(self.pattern.as_bytes(), host.to_ascii_lowercase().as_bytes())
    }

    /// Applies the filter to an index record. The host is taken from the
    /// record's URL; records without a parseable host never match.
    pub fn matches_record(&self, entry: &CdxEntry) -> bool {
        match Url::parse(&entry.metadata.url) {
            Ok(url) => url
                .host_str()
                .map(|host| self.matches_host(host))
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}

impl Default for LocaleFilter {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN)
    }
}

/// Iterative `*`-wildcard match with backtracking over the last star.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cctld_pattern_matches_hosts_under_it() {
        let filter = LocaleFilter::default();
        assert!(filter.matches_host("example.com.ar"));
        assert!(filter.matches_host("lanacion.ar"));
        assert!(!filter.matches_host("example.com"));
        assert!(!filter.matches_host("example.arpa"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let filter = LocaleFilter::new("*.AR");
        assert!(filter.matches_host("Example.Com.ar"));
    }

    #[test]
    fn star_matches_infixes_and_empty() {
        assert!(glob_match(b"*", b"anything"));
        assert!(glob_match(b"a*c", b"abc"));
        assert!(glob_match(b"a*c", b"ac"));
        assert!(glob_match(b"*.gov.ar", b"mendoza.gov.ar"));
        assert!(!glob_match(b"a*c", b"abd"));
        assert!(!glob_match(b"", b"a"));
    }
}
