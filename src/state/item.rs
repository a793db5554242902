//! Work items and their scheduling states

use crate::url::dedup_key;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Opaque key identifying one submitted item (the URL as submitted)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One unit of scheduled fetch work
///
/// Immutable apart from the attempt counter, which only the scheduler
/// advances when it re-queues the item for another try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    id: ItemId,
    payload: String,
    attempt: u32,
    keyword: Option<String>,
}

impl WorkItem {
    /// Creates an item for `url` at attempt 0
    pub fn new(url: impl Into<String>) -> Self {
        let payload = url.into().trim().to_string();
        Self {
            id: ItemId::new(payload.clone()),
            payload,
            attempt: 0,
            keyword: None,
        }
    }

    /// Tags the item with the search keyword that produced it
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    /// The URL to fetch
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Zero-based index of the current attempt
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn keyword(&self) -> Option<&str> {
        self.keyword.as_deref()
    }

    pub(crate) fn advance_attempt(&mut self) {
        self.attempt += 1;
    }
}

/// Represents where an item is in the scheduling lifecycle
///
/// `Queued -> InFlight -> {Succeeded | AwaitingRetry | GivenUp}` and
/// `AwaitingRetry -> Queued` once the backoff elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    /// Waiting in the FIFO queue (or in a wave that has not been released)
    Queued,

    /// Dispatched to a worker
    InFlight,

    /// Failed retriably; waiting out its backoff delay
    AwaitingRetry,

    /// Terminal: produced a Success outcome
    Succeeded,

    /// Terminal: produced a Failure outcome
    GivenUp,
}

impl ItemState {
    /// Returns true if no further processing will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::GivenUp)
    }

    /// Returns true if `next` is a legal successor of this state
    ///
    /// Any non-terminal state may jump to `GivenUp`, which covers cancellation
    /// and the admission stall bound.
    pub fn can_transition_to(&self, next: ItemState) -> bool {
        use ItemState::*;
        match (self, next) {
            (Queued, InFlight) => true,
            (InFlight, Succeeded | AwaitingRetry) => true,
            (AwaitingRetry, Queued) => true,
            (Queued, AwaitingRetry) => true,
            (state, GivenUp) => !state.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InFlight => "in_flight",
            Self::AwaitingRetry => "awaiting_retry",
            Self::Succeeded => "succeeded",
            Self::GivenUp => "given_up",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A de-duplicated set of work items ready for submission
///
/// Duplicate URLs (compared after normalization) are dropped, keeping the
/// first occurrence, so every item id in a batch is unique.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    items: Vec<WorkItem>,
    duplicates: usize,
}

impl Batch {
    pub fn new(items: impl IntoIterator<Item = WorkItem>) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        let mut duplicates = 0;

        for item in items {
            if seen.insert(dedup_key(item.payload())) {
                kept.push(item);
            } else {
                tracing::debug!(item = %item.id(), "Dropping duplicate URL from batch");
                duplicates += 1;
            }
        }

        Self {
            items: kept,
            duplicates,
        }
    }

    /// Builds a batch from plain URL strings
    pub fn from_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(urls.into_iter().map(WorkItem::new))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items dropped as duplicates
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<WorkItem> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_item_starts_at_attempt_zero() {
        let item = WorkItem::new("  https://example.com/a ");
        assert_eq!(item.payload(), "https://example.com/a");
        assert_eq!(item.id().as_str(), "https://example.com/a");
        assert_eq!(item.attempt(), 0);
        assert!(item.keyword().is_none());
    }

    #[test]
    fn test_advance_attempt() {
        let mut item = WorkItem::new("https://example.com/").with_keyword("rust");
        item.advance_attempt();
        item.advance_attempt();
        assert_eq!(item.attempt(), 2);
        assert_eq!(item.keyword(), Some("rust"));
    }

    #[test]
    fn test_is_terminal() {
        assert!(!ItemState::Queued.is_terminal());
        assert!(!ItemState::InFlight.is_terminal());
        assert!(!ItemState::AwaitingRetry.is_terminal());
        assert!(ItemState::Succeeded.is_terminal());
        assert!(ItemState::GivenUp.is_terminal());
    }

    #[test]
    fn test_legal_transitions() {
        assert!(ItemState::Queued.can_transition_to(ItemState::InFlight));
        assert!(ItemState::InFlight.can_transition_to(ItemState::Succeeded));
        assert!(ItemState::InFlight.can_transition_to(ItemState::AwaitingRetry));
        assert!(ItemState::InFlight.can_transition_to(ItemState::GivenUp));
        assert!(ItemState::AwaitingRetry.can_transition_to(ItemState::Queued));
        assert!(ItemState::AwaitingRetry.can_transition_to(ItemState::GivenUp));
        assert!(ItemState::Queued.can_transition_to(ItemState::GivenUp));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!ItemState::Queued.can_transition_to(ItemState::Succeeded));
        assert!(!ItemState::Succeeded.can_transition_to(ItemState::GivenUp));
        assert!(!ItemState::GivenUp.can_transition_to(ItemState::Queued));
        assert!(!ItemState::AwaitingRetry.can_transition_to(ItemState::InFlight));
        assert!(!ItemState::InFlight.can_transition_to(ItemState::InFlight));
    }

    #[test]
    fn test_batch_drops_duplicates() {
        let batch = Batch::from_urls([
            "https://example.com/a",
            "https://EXAMPLE.com/a#top",
            "https://example.com/b",
            "https://example.com/a",
        ]);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.duplicates(), 2);
        assert_eq!(batch.items()[0].payload(), "https://example.com/a");
        assert_eq!(batch.items()[1].payload(), "https://example.com/b");
    }

    #[test]
    fn test_batch_keeps_malformed_urls() {
        let batch = Batch::from_urls(["not a url", "https://example.com/"]);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(ItemState::AwaitingRetry.to_string(), "awaiting_retry");
        assert_eq!(ItemId::from("https://x.test/").to_string(), "https://x.test/");
    }
}
