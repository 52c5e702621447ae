//! Extracts and validates email addresses from raw SERP HTML.

use crate::config::Config;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
        .expect("Failed to compile email regex pattern. This should not happen.")
});

/// Escaped-character sequences the upstream proxy leaves behind in raw HTML.
/// Replaced with spaces before scanning so they don't glue tokens together.
const ENTITY_REMNANTS: [&str; 6] = ["&lt;", "&gt;", "&quot;", "&amp;", "\\u003c", "\\u003e"];

/// Markers of an incompletely decoded character inside a matched token.
const ENCODED_MARKERS: [&str; 2] = ["u003", "&#"];

/// Scans text for email-like tokens and filters out the noise a search
/// engine's result snippets are known to contain: percent-encoded fragments,
/// truncated tokens, query echoes and placeholder addresses from ads and
/// examples. The filter lists come from [`Config`] so they can be extended as
/// new noise shapes show up.
#[derive(Debug, Clone)]
pub(crate) struct EmailExtractor {
    placeholder_locals: Vec<String>,
    public_email_domains: Vec<String>,
    search_engine_domain: String,
}

impl EmailExtractor {
    pub(crate) fn from_config(config: &Config) -> Self {
        Self {
            placeholder_locals: config
                .placeholder_locals
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            public_email_domains: config
                .public_email_domains
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            search_engine_domain: config.search_engine_domain.to_lowercase(),
        }
    }

    /// Extracts the deduplicated, filtered email addresses from one page of
    /// raw HTML, in first-occurrence order. Casing of the matched tokens is
    /// preserved; deduplication is exact-string.
    pub(crate) fn extract(&self, html: &str) -> Vec<String> {
        let cleaned = strip_entity_remnants(html);

        let mut seen: HashSet<String> = HashSet::new();
        let mut emails = Vec::new();
        for m in EMAIL_REGEX.find_iter(&cleaned) {
            let candidate = m.as_str();
            if !self.is_acceptable(candidate) {
                continue;
            }
            if seen.insert(candidate.to_string()) {
                emails.push(candidate.to_string());
            }
        }

        tracing::debug!(
            target: "extract_task",
            "Extracted {} unique valid emails from {} bytes of HTML.",
            emails.len(),
            html.len()
        );
        emails
    }

    /// Re-applies the full dedup + rejection pass over an already-collected
    /// list, preserving first-occurrence order. Idempotent: running it twice
    /// removes nothing more. The orchestrator uses this as a second pass over
    /// accumulated per-page results.
    pub(crate) fn filter_unique<I>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut emails = Vec::new();
        for candidate in candidates {
            if !self.is_acceptable(&candidate) {
                continue;
            }
            if seen.insert(candidate.clone()) {
                emails.push(candidate);
            }
        }
        emails
    }

    /// Applies the rejection filters to one matched token, in order:
    /// encoded-character residue, truncation markers, query echoes,
    /// placeholder shapes, and minimum local-part/domain lengths.
    pub(crate) fn is_acceptable(&self, email: &str) -> bool {
        let lowered = email.to_lowercase();

        if email.contains('%')
            || email.contains('+')
            || ENCODED_MARKERS.iter().any(|m| lowered.contains(m))
        {
            return false;
        }

        if email.contains("...") {
            return false;
        }

        if lowered.contains(&self.search_engine_domain) || lowered.contains("site:") {
            return false;
        }

        let Some((local, domain)) = lowered.rsplit_once('@') else {
            return false;
        };

        if self.is_placeholder(local, domain) {
            return false;
        }

        if local.len() <= 1 || domain.len() <= 3 {
            return false;
        }

        true
    }

    /// Recognizes placeholder shapes tuned against observed snippet noise:
    /// purely numeric local-parts, generic words optionally followed by
    /// digits, and `x<digits>` paired with a common public mail provider.
    fn is_placeholder(&self, local: &str, domain: &str) -> bool {
        if !local.is_empty() && local.chars().all(|c| c.is_ascii_digit()) {
            return true;
        }

        let stem = local.trim_end_matches(|c: char| c.is_ascii_digit());
        if self.placeholder_locals.iter().any(|p| p == stem) {
            return true;
        }

        if let Some(digits) = local.strip_prefix('x') {
            if !digits.is_empty()
                && digits.chars().all(|c| c.is_ascii_digit())
                && self.public_email_domains.iter().any(|d| d == domain)
            {
                return true;
            }
        }

        false
    }
}

fn strip_entity_remnants(html: &str) -> String {
    let mut cleaned = html.to_string();
    for remnant in ENTITY_REMNANTS {
        if cleaned.contains(remnant) {
            cleaned = cleaned.replace(remnant, " ");
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> EmailExtractor {
        EmailExtractor::from_config(&Config::default())
    }

    #[test]
    fn test_extract_rejects_every_noise_category() {
        let html = "<div>jane.doe@realty.com x22@gmail.com 50%off@deals.com test1@example.com</div>";
        assert_eq!(extractor().extract(html), vec!["jane.doe@realty.com"]);
    }

    #[test]
    fn test_extract_preserves_first_occurrence_order_and_dedups() {
        let html = "bob@realty.com amy@homes.net bob@realty.com cal@agency.org amy@homes.net";
        assert_eq!(
            extractor().extract(html),
            vec!["bob@realty.com", "amy@homes.net", "cal@agency.org"]
        );
    }

    #[test]
    fn test_extract_is_case_sensitive_on_dedup() {
        let html = "Jane@realty.com jane@realty.com";
        assert_eq!(
            extractor().extract(html),
            vec!["Jane@realty.com", "jane@realty.com"]
        );
    }

    #[test]
    fn test_extract_strips_entity_remnants() {
        let html = "&lt;td&gt;agent@homes.net&lt;/td&gt; \\u003cb\\u003eother@agency.org";
        assert_eq!(
            extractor().extract(html),
            vec!["agent@homes.net", "other@agency.org"]
        );
    }

    #[test]
    fn test_rejects_truncated_tokens() {
        assert!(!extractor().is_acceptable("jane...doe@realty.com"));
    }

    #[test]
    fn test_rejects_engine_echoes() {
        let e = extractor();
        assert!(!e.is_acceptable("noreply@google.com"));
        assert!(!e.is_acceptable("foo@mail.google.com"));
    }

    #[test]
    fn test_rejects_placeholder_shapes() {
        let e = extractor();
        assert!(!e.is_acceptable("12345@realty.com"));
        assert!(!e.is_acceptable("admin@realty.com"));
        assert!(!e.is_acceptable("sample42@realty.com"));
        assert!(!e.is_acceptable("x123@gmail.com"));
        assert!(!e.is_acceptable("x9@yahoo.com"));
        // x<digits> only counts against common public providers.
        assert!(e.is_acceptable("x123@smallbiz.net"));
        // A real name that merely starts with a placeholder word is kept.
        assert!(e.is_acceptable("userton.smith@realty.com"));
    }

    #[test]
    fn test_rejects_short_local_and_domain() {
        let e = extractor();
        assert!(!e.is_acceptable("j@realty.com"));
        assert!(!e.is_acceptable("jane@a.b"));
        assert!(e.is_acceptable("jo@realty.com"));
    }

    #[test]
    fn test_filter_unique_is_idempotent() {
        let e = extractor();
        let raw = vec![
            "jane.doe@realty.com".to_string(),
            "x22@gmail.com".to_string(),
            "jane.doe@realty.com".to_string(),
            "agent@homes.net".to_string(),
        ];
        let once = e.filter_unique(raw);
        let twice = e.filter_unique(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once, vec!["jane.doe@realty.com", "agent@homes.net"]);
    }

    #[test]
    fn test_filter_lists_are_configurable() {
        let config = Config {
            placeholder_locals: vec!["demo".to_string()],
            ..Config::default()
        };
        let e = EmailExtractor::from_config(&config);
        assert!(!e.is_acceptable("demo7@realty.com"));
        // The default list no longer applies once replaced.
        assert!(e.is_acceptable("admin@realty.com"));
    }
}
