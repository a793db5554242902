use crate::config::validate_domain_pattern;
use crate::ConfigError;

/// Checks if a domain matches a wildcard pattern
///
/// Two kinds of patterns are supported:
/// 1. Exact match: "example.com" matches only "example.com"
/// 2. Wildcard match: "*.example.com" matches the bare domain and any subdomain
///
/// # Examples
///
/// ```
/// use scrapeflow::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "notexample.com"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        None => candidate == pattern,
    }
}

/// Set of domain patterns whose hosts must never be fetched
#[derive(Debug, Clone, Default)]
pub struct DomainBlocklist {
    patterns: Vec<String>,
}

impl DomainBlocklist {
    /// Builds a blocklist, rejecting malformed patterns
    pub fn new<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim().to_lowercase();
            validate_domain_pattern(&pattern)?;
            normalized.push(pattern);
        }
        Ok(Self {
            patterns: normalized,
        })
    }

    /// Returns the first pattern matching `host`, if any
    pub fn matching_pattern(&self, host: &str) -> Option<&str> {
        let host = host.to_lowercase();
        self.patterns
            .iter()
            .find(|pattern| matches_wildcard(pattern, &host))
            .map(String::as_str)
    }

    pub fn is_blocked(&self, host: &str) -> bool {
        self.matching_pattern(host).is_some()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
