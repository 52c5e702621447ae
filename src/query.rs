//! Builds search-engine query strings from structured criteria.
//!
//! Everything here is pure and deterministic: the same criteria always yield a
//! byte-identical query string. Empty fields are skipped entirely, so an empty
//! site list simply means an unrestricted search.

use crate::models::SearchCriteria;

/// Canonicalizes a free-text site entry into the engine's `site:` token.
///
/// Lower-cases and trims, strips a leading `http(s)://` and `www.`, drops any
/// path remainder, appends `.com` when no dot is present and prefixes `site:`
/// unless the input already carries it. Empty input maps to empty output.
pub(crate) fn normalize_site(raw: &str) -> String {
    let mut site = raw.trim().to_lowercase();
    if site.is_empty() || site.starts_with("site:") {
        return site;
    }

    site = site
        .strip_prefix("https://")
        .or_else(|| site.strip_prefix("http://"))
        .unwrap_or(&site)
        .to_string();
    site = site.strip_prefix("www.").unwrap_or(&site).to_string();

    if let Some(slash) = site.find('/') {
        site.truncate(slash);
    }

    if !site.contains('.') {
        site.push_str(".com");
    }

    format!("site:{}", site)
}

/// Canonicalizes a free-text email-domain entry into an `@domain.tld` token.
///
/// Lower-cases and trims, prefixes `@` when missing and appends `.com` when no
/// dot is present. Empty input maps to empty output.
pub(crate) fn normalize_email_domain(raw: &str) -> String {
    let mut domain = raw.trim().to_lowercase();
    if domain.is_empty() {
        return domain;
    }

    if !domain.starts_with('@') {
        domain.insert(0, '@');
    }
    if !domain.contains('.') {
        domain.push_str(".com");
    }

    domain
}

fn quoted(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("\"{}\"", trimmed))
    }
}

/// Builds the full search query for one SearchCriteria.
///
/// Normalized sites are joined with `OR`; normalized email domains are quoted
/// and joined with the criteria's logic operator; profession, city and state
/// are quoted verbatim. The non-empty parts are concatenated in the fixed
/// order [sites, state, city, profession, emails] separated by single spaces.
pub(crate) fn build_query(criteria: &SearchCriteria) -> String {
    let sites: Vec<String> = criteria
        .sites
        .iter()
        .map(|s| normalize_site(s))
        .filter(|s| !s.is_empty())
        .collect();
    let site_part = sites.join(" OR ");

    let domains: Vec<String> = criteria
        .email_domains
        .iter()
        .map(|d| normalize_email_domain(d))
        .filter(|d| !d.is_empty())
        .map(|d| format!("\"{}\"", d))
        .collect();
    let email_part = domains.join(criteria.logic.separator());

    let mut parts: Vec<String> = Vec::with_capacity(5);
    if !site_part.is_empty() {
        parts.push(site_part);
    }
    if let Some(state) = quoted(&criteria.state) {
        parts.push(state);
    }
    if let Some(city) = quoted(&criteria.city) {
        parts.push(city);
    }
    if let Some(profession) = quoted(&criteria.profession) {
        parts.push(profession);
    }
    if !email_part.is_empty() {
        parts.push(email_part);
    }

    parts.join(" ")
}
