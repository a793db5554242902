//! Keyword expansion: turning search keywords into work items
//!
//! Each keyword is substituted into the configured search URL template, the
//! result page is fetched, and result links are harvested from it.

use crate::config::SearchSettings;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::parser::extract_links_from_html;
use crate::output::KeywordFailure;
use crate::state::WorkItem;
use crate::url::dedup_key;
use crate::{UrlError, UrlResult};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::form_urlencoded;
use url::Url;

/// Placeholder replaced by the encoded keyword in the search template
pub const QUERY_PLACEHOLDER: &str = "{query}";

/// Query parameter search engines use to wrap the real result URL
const REDIRECT_PARAM: &str = "uddg";

/// Expands keywords into URLs through a search results page
pub struct KeywordExpander {
    fetcher: Arc<dyn Fetcher>,
    template: String,
    max_results: usize,
    timeout: Duration,
}

impl KeywordExpander {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        template: impl Into<String>,
        max_results: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            template: template.into(),
            max_results,
            timeout,
        }
    }

    pub fn from_settings(fetcher: Arc<dyn Fetcher>, settings: &SearchSettings, timeout: Duration) -> Self {
        Self::new(fetcher, settings.url_template.clone(), settings.max_results, timeout)
    }

    /// Builds the search URL for a keyword
    ///
    /// # Example
    ///
    /// ```
    /// use scrapeflow::crawler::{HttpFetcher, KeywordExpander};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let fetcher = Arc::new(HttpFetcher::new(reqwest::Client::new()));
    /// let expander = KeywordExpander::new(fetcher, "https://search.test/?q={query}", 5, Duration::from_secs(5));
    /// let url = expander.search_url("rust async").unwrap();
    /// assert_eq!(url.as_str(), "https://search.test/?q=rust+async");
    /// ```
    pub fn search_url(&self, keyword: &str) -> UrlResult<Url> {
        let encoded: String = form_urlencoded::byte_serialize(keyword.trim().as_bytes()).collect();
        let raw = self.template.replace(QUERY_PLACEHOLDER, &encoded);
        Url::parse(&raw).map_err(|e| UrlError::Parse(format!("{raw}: {e}")))
    }

    /// Fetches the results page for one keyword and returns its result URLs
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<String>)` - At least one result URL, at most `max_results`
    /// * `Err(String)` - The search failed or found nothing
    pub async fn expand_keyword(&self, keyword: &str) -> Result<Vec<String>, String> {
        let search_url = self.search_url(keyword).map_err(|e| e.to_string())?;
        debug!(keyword, url = %search_url, "Searching");

        let page = self
            .fetcher
            .get(&search_url, self.timeout)
            .await
            .map_err(|e| e.to_string())?;
        if !page.is_success() {
            return Err(format!("search returned HTTP {}", page.status));
        }

        let urls = harvest_results(&page.body, &search_url, self.max_results);
        if urls.is_empty() {
            return Err("No URLs found".to_string());
        }
        Ok(urls)
    }

    /// Expands every keyword, tagging each produced item with its keyword
    ///
    /// Blank keywords are skipped. Keywords that fail or yield nothing are
    /// returned as `KeywordFailure`s instead of items.
    pub async fn expand<I, S>(&self, keywords: I) -> (Vec<WorkItem>, Vec<KeywordFailure>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.expand_until(keywords, &CancellationToken::new()).await
    }

    /// Like [`expand`](Self::expand), but stops searching once `cancel` fires
    ///
    /// The keyword being searched at that moment and every keyword after it
    /// become `KeywordFailure`s with the error `"cancelled"`, so the run report
    /// still accounts for them.
    pub async fn expand_until<I, S>(
        &self,
        keywords: I,
        cancel: &CancellationToken,
    ) -> (Vec<WorkItem>, Vec<KeywordFailure>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut items = Vec::new();
        let mut failures = Vec::new();

        for keyword in keywords {
            let keyword = keyword.as_ref().trim();
            if keyword.is_empty() {
                continue;
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err("cancelled".to_string()),
                result = self.expand_keyword(keyword) => result,
            };

            match result {
                Ok(urls) => {
                    info!(keyword, results = urls.len(), "Keyword expanded");
                    items.extend(urls.into_iter().map(|url| WorkItem::new(url).with_keyword(keyword)));
                }
                Err(error) => {
                    warn!(keyword, %error, "Keyword produced no URLs");
                    failures.push(KeywordFailure::new(keyword, error));
                }
            }
        }

        (items, failures)
    }
}

/// Harvests result links from a search results page
///
/// - Redirect wrappers carrying a `uddg` target are unwrapped
/// - Links back to the search host are skipped
/// - Results are de-duplicated and capped at `max_results`
pub fn harvest_results(html: &str, search_url: &Url, max_results: usize) -> Vec<String> {
    let search_host = search_url.host_str().map(str::to_lowercase);
    let mut seen = HashSet::new();

    extract_links_from_html(html, search_url)
        .into_iter()
        .filter_map(|link| Url::parse(&link).ok())
        .map(unwrap_redirect)
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .filter(|url| url.host_str().map(str::to_lowercase) != search_host)
        .map(String::from)
        .filter(|url| seen.insert(dedup_key(url)))
        .take(max_results)
        .collect()
}

fn unwrap_redirect(url: Url) -> Url {
    url.query_pairs()
        .find(|(key, _)| key == REDIRECT_PARAM)
        .and_then(|(_, target)| Url::parse(&target).ok())
        .unwrap_or(url)
}
