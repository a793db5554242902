//! Page retrieval: the `Fetcher` and `Renderer` seams plus the reqwest-backed fetcher
//!
//! This module handles:
//! - Building the HTTP client with browser-like headers and timeouts
//! - GET requests returning status and body
//! - Classifying transport errors into timeout vs. network failures

use crate::config::NetworkSettings;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors raised by fetch and render collaborators
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    /// Failure inside a rendering backend (browser crashed, protocol error, ...)
    #[error("render driver error: {0}")]
    Driver(String),
}

/// A fetched page, whatever its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Plain HTTP retrieval
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &Url, timeout: Duration) -> Result<FetchedPage, FetchError>;
}

/// Dynamic rendering (e.g. a headless browser) returning the final HTML
///
/// No renderer ships with the crate; callers plug one into
/// [`FetchWorker::with_renderer`](crate::crawler::FetchWorker::with_renderer).
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &Url, timeout: Duration) -> Result<String, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - Network settings (user agent, timeouts, redirect limit)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use scrapeflow::config::NetworkSettings;
/// use scrapeflow::crawler::build_http_client;
///
/// let client = build_http_client(&NetworkSettings::default()).unwrap();
/// ```
pub fn build_http_client(config: &NetworkSettings) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    if let Ok(language) = HeaderValue::from_str(&config.accept_language) {
        headers.insert(ACCEPT_LANGUAGE, language);
    }

    Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(config.read_timeout())
        .connect_timeout(config.connect_timeout())
        .redirect(Policy::limited(config.max_redirects))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `Fetcher` backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_settings(config: &NetworkSettings) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &Url, timeout: Duration) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_error)?;

        Ok(FetchedPage { status, body })
    }
}

fn classify_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::Network(format!("connection failed: {e}"))
    } else if e.is_redirect() {
        FetchError::Network(format!("redirect limit exceeded: {e}"))
    } else {
        FetchError::Network(e.to_string())
    }
}
