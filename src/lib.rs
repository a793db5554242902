//! Scrapeflow: a bounded-concurrency scraping pipeline
//!
//! This crate fetches batches of URLs (given directly or discovered from
//! search keywords) under a concurrency cap, retries transient failures with
//! linear backoff, throttles admission under memory/CPU/connection pressure,
//! and aggregates every item into exactly one terminal outcome.

pub mod config;
pub mod crawler;
pub mod output;
pub mod resources;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for run-level failures
///
/// Per-item problems never surface here; they become a classified
/// [`state::Failure`] inside the report instead.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The scheduler lost track of an item. The partial report is attached
    /// so the caller can flush it before giving up.
    #[error("Scheduler bookkeeping fault: {message}")]
    Bookkeeping {
        message: String,
        partial: Box<output::RunReport>,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Domain is blocked: {0}")]
    Blocked(String),
}

/// Result type alias for run-level operations
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{FetchWorker, RetryDecision, RetryPolicy, Scheduler};
pub use output::{ResultAggregator, RunReport};
pub use resources::{ResourceGuard, ResourceSnapshot};
pub use state::{Failure, FailureKind, Outcome, Success, WorkItem};
