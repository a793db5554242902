//! Crawler module for fetching pages and scheduling work
//!
//! This module contains the pipeline's moving parts:
//! - Retry decisions with linear backoff
//! - HTTP fetching behind the `Fetcher`/`Renderer` seams
//! - HTML extraction into page records
//! - Single-attempt execution (`FetchWorker`)
//! - Admission, dispatch and retry scheduling (`Scheduler`)
//! - Keyword expansion into work items

mod fetcher;
mod keywords;
mod parser;
mod retry;
mod scheduler;
mod worker;

pub use fetcher::{build_http_client, FetchError, FetchedPage, Fetcher, HttpFetcher, Renderer};
pub use keywords::{harvest_results, KeywordExpander, QUERY_PLACEHOLDER};
pub use parser::{extract_links, extract_links_from_html, Extractor, HtmlExtractor};
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use worker::{FetchWorker, Worker};
