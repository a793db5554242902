//! Terminal outcomes and the records they carry

use crate::state::{ItemId, WorkItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Classification of a failed attempt
///
/// Drives both retry eligibility and report grouping. Platform-specific
/// detail stays in the failure message, never in the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transport error or non-2xx response
    Network,
    /// The fetch or render did not finish within its time budget
    Timeout,
    /// Admission was refused for too long under resource pressure
    ResourceExceeded,
    /// Malformed URL, blocked domain, or empty extracted content
    Validation,
    /// Anything else, including worker panics and cancellation
    Unknown,
}

impl FailureKind {
    /// Returns true if another attempt could plausibly succeed
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::ResourceExceeded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::ResourceExceeded => "resource_exceeded",
            Self::Validation => "validation",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "network" => Some(Self::Network),
            "timeout" => Some(Self::Timeout),
            "resource_exceeded" => Some(Self::ResourceExceeded),
            "validation" => Some(Self::Validation),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn all() -> [Self; 5] {
        [
            Self::Network,
            Self::Timeout,
            Self::ResourceExceeded,
            Self::Validation,
            Self::Unknown,
        ]
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An image reference found on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub src: String,
    pub alt: String,
}

/// Structured content extracted from one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub keyword: Option<String>,
    pub title: String,
    /// Paragraph text joined with blank lines
    pub text_content: String,
    /// Heading texts keyed by tag name (`h1`..`h6`)
    pub headings: BTreeMap<String, Vec<String>>,
    pub internal_links: Vec<String>,
    pub images: Vec<ImageRef>,
    /// One entry per table, one string per row with cells joined by " | "
    pub tables: Vec<Vec<String>>,
    pub fetched_at: DateTime<Utc>,
}

impl PageRecord {
    /// A record with neither a title nor any text carries nothing worth keeping
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty() || !self.text_content.trim().is_empty()
    }
}

/// A successfully processed item
#[derive(Debug, Clone, Serialize)]
pub struct Success {
    pub item_id: ItemId,
    pub data: PageRecord,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

/// A classified failure for one attempt of an item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub item_id: ItemId,
    /// The URL that was attempted
    pub url: String,
    pub keyword: Option<String>,
    pub kind: FailureKind,
    pub message: String,
    /// Zero-based attempt index at which this failure happened
    pub attempt: u32,
    pub retriable: bool,
    pub failed_at: DateTime<Utc>,
}

impl Failure {
    /// Builds a failure for the item's current attempt; retriability follows the kind
    pub fn new(item: &WorkItem, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            item_id: item.id().clone(),
            url: item.payload().to_string(),
            keyword: item.keyword().map(str::to_string),
            kind,
            message: message.into(),
            attempt: item.attempt(),
            retriable: kind.is_retriable(),
            failed_at: Utc::now(),
        }
    }

    /// The failure recorded for items still pending when a run is cancelled
    pub fn cancelled(item: &WorkItem) -> Self {
        let mut failure = Self::new(item, FailureKind::Unknown, "cancelled");
        failure.retriable = false;
        failure
    }
}

/// Result of executing one work item
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(Success),
    Failure(Failure),
}

impl Outcome {
    pub fn item_id(&self) -> &ItemId {
        match self {
            Self::Success(success) => &success.item_id,
            Self::Failure(failure) => &failure.item_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Shorthand for a failure outcome on the item's current attempt
    pub fn failure(item: &WorkItem, kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure(Failure::new(item, kind, message))
    }
}

fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}
