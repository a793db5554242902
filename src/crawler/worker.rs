//! Execution of a single fetch-and-extract attempt

use crate::crawler::fetcher::{FetchError, Fetcher, Renderer};
use crate::crawler::parser::Extractor;
use crate::state::{FailureKind, Outcome, Success, WorkItem};
use crate::url::{check_url, DomainBlocklist};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Something the scheduler can dispatch work items to
///
/// Implementations must turn every problem into a classified
/// [`Outcome::Failure`]; they never return errors.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    async fn execute(&self, item: &WorkItem) -> Outcome;
}

/// Fetches one URL, extracts its content and classifies the result
///
/// 1. Check the URL (syntax, scheme, host, blocklist); failures are `Validation`
/// 2. Render or fetch it within the timeout; `Timeout` or `Network` on failure
/// 3. Non-2xx responses are `Network`
/// 4. Extract a record; nothing usable is `Validation`
///
/// The worker never writes files; it only produces outcomes.
pub struct FetchWorker {
    fetcher: Arc<dyn Fetcher>,
    renderer: Option<Arc<dyn Renderer>>,
    extractor: Arc<dyn Extractor>,
    blocklist: DomainBlocklist,
    timeout: Duration,
}

impl FetchWorker {
    pub fn new(fetcher: Arc<dyn Fetcher>, extractor: Arc<dyn Extractor>, timeout: Duration) -> Self {
        Self {
            fetcher,
            renderer: None,
            extractor,
            blocklist: DomainBlocklist::default(),
            timeout,
        }
    }

    /// Loads pages through `renderer` instead of the plain fetcher
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_blocklist(mut self, blocklist: DomainBlocklist) -> Self {
        self.blocklist = blocklist;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Retrieves the page HTML, bounding the collaborator call by the timeout
    async fn load(&self, url: &Url) -> Result<String, (FailureKind, String)> {
        let result = match &self.renderer {
            Some(renderer) => {
                tokio::time::timeout(self.timeout, renderer.render(url, self.timeout))
                    .await
                    .map_err(|_| FetchError::Timeout)
                    .and_then(|rendered| rendered)
            }
            None => tokio::time::timeout(self.timeout, self.fetcher.get(url, self.timeout))
                .await
                .map_err(|_| FetchError::Timeout)
                .and_then(|fetched| fetched)
                .and_then(|page| {
                    if page.is_success() {
                        Ok(page.body)
                    } else {
                        Err(FetchError::Network(format!("HTTP {}", page.status)))
                    }
                }),
        };

        result.map_err(|e| {
            let kind = match e {
                FetchError::Timeout => FailureKind::Timeout,
                FetchError::Network(_) | FetchError::Driver(_) => FailureKind::Network,
            };
            (kind, e.to_string())
        })
    }
}

#[async_trait]
impl Worker for FetchWorker {
    async fn execute(&self, item: &WorkItem) -> Outcome {
        let started = Instant::now();

        let url = match check_url(item.payload(), &self.blocklist) {
            Ok(url) => url,
            Err(e) => return Outcome::failure(item, FailureKind::Validation, e.to_string()),
        };

        let html = match self.load(&url).await {
            Ok(html) => html,
            Err((kind, message)) => {
                debug!(item = %item.id(), attempt = item.attempt(), %kind, %message, "Fetch failed");
                return Outcome::failure(item, kind, message);
            }
        };

        let mut record = match self.extractor.extract(&html, &url) {
            Some(record) if record.is_valid() => record,
            _ => {
                return Outcome::failure(
                    item,
                    FailureKind::Validation,
                    "no title or text content extracted",
                )
            }
        };
        record.keyword = item.keyword().map(str::to_string);

        Outcome::Success(Success {
            item_id: item.id().clone(),
            data: record,
            duration: started.elapsed(),
        })
    }
}
