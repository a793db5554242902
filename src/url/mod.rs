//! URL handling module for Scrapeflow
//!
//! This module provides the pre-flight URL check used by the fetch worker,
//! blocked-domain matching, and the normalization used to de-duplicate
//! submissions.

mod matcher;
mod normalize;

use crate::{UrlError, UrlResult};
use url::Url;

// Re-export main functions
pub use matcher::{matches_wildcard, DomainBlocklist};
pub use normalize::{dedup_key, normalize_url};

/// Extracts the lowercase host of a URL
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Checks that `raw` is a fetchable URL before any I/O happens
///
/// # Returns
///
/// * `Ok(Url)` - An absolute http(s) URL whose host is not blocked
/// * `Err(UrlError)` - The URL is malformed, uses another scheme, has no host,
///   or points at a blocked domain
///
/// # Examples
///
/// ```
/// use scrapeflow::url::{check_url, DomainBlocklist};
///
/// let blocklist = DomainBlocklist::new(["*.ads.example"]).unwrap();
/// assert!(check_url("https://example.com/", &blocklist).is_ok());
/// assert!(check_url("https://cdn.ads.example/x", &blocklist).is_err());
/// assert!(check_url("mailto:someone@example.com", &blocklist).is_err());
/// ```
pub fn check_url(raw: &str, blocklist: &DomainBlocklist) -> UrlResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(format!("{raw}: {e}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::UnsupportedScheme(url.scheme().to_string()));
    }

    let domain = extract_domain(&url)
        .filter(|d| !d.is_empty())
        .ok_or(UrlError::MissingHost)?;

    if let Some(pattern) = blocklist.matching_pattern(&domain) {
        return Err(UrlError::Blocked(format!("{domain} (matches {pattern})")));
    }

    Ok(url)
}
