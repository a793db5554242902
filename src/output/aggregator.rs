//! Accumulation of terminal outcomes into a run report

use crate::output::{KeywordFailure, RunReport};
use crate::state::{Failure, ItemId, Outcome, Success};
use crate::storage::RunStatus;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::warn;

/// Collects exactly one terminal outcome per submitted item
///
/// Owned by the scheduler's coordinating loop, so recording needs no locking.
/// [`finalize`](Self::finalize) consumes the aggregator, which is what keeps
/// the resulting report immutable.
///
/// # Example
///
/// ```
/// use scrapeflow::output::ResultAggregator;
/// use scrapeflow::state::{FailureKind, Outcome, WorkItem};
/// use scrapeflow::storage::RunStatus;
///
/// let item = WorkItem::new("https://example.com/");
/// let mut aggregator = ResultAggregator::new(1);
/// assert!(aggregator.record(Outcome::failure(&item, FailureKind::Validation, "empty")));
/// assert!(!aggregator.record(Outcome::failure(&item, FailureKind::Validation, "empty")));
///
/// let report = aggregator.finalize(RunStatus::Completed);
/// assert_eq!(report.failed().len(), 1);
/// assert_eq!(report.success_rate(), 0.0);
/// ```
#[derive(Debug)]
pub struct ResultAggregator {
    start_time: DateTime<Utc>,
    total_submitted: usize,
    seen: HashSet<ItemId>,
    succeeded: Vec<Success>,
    failed: Vec<Failure>,
    keyword_failures: Vec<KeywordFailure>,
}

impl ResultAggregator {
    /// Starts the run clock for `total_submitted` items
    pub fn new(total_submitted: usize) -> Self {
        Self {
            start_time: Utc::now(),
            total_submitted,
            seen: HashSet::with_capacity(total_submitted),
            succeeded: Vec::new(),
            failed: Vec::new(),
            keyword_failures: Vec::new(),
        }
    }

    /// Records a terminal outcome
    ///
    /// # Returns
    ///
    /// `false` if an outcome for the same item was already recorded. That is
    /// a programming error; it is logged and the second outcome is dropped.
    pub fn record(&mut self, outcome: Outcome) -> bool {
        if !self.seen.insert(outcome.item_id().clone()) {
            warn!(item = %outcome.item_id(), "Outcome already recorded; ignoring duplicate");
            return false;
        }

        match outcome {
            Outcome::Success(success) => self.succeeded.push(success),
            Outcome::Failure(failure) => self.failed.push(failure),
        }
        true
    }

    pub fn record_keyword_failure(&mut self, failure: KeywordFailure) {
        self.keyword_failures.push(failure);
    }

    pub fn has_recorded(&self, id: &ItemId) -> bool {
        self.seen.contains(id)
    }

    pub fn recorded(&self) -> usize {
        self.seen.len()
    }

    pub fn total_submitted(&self) -> usize {
        self.total_submitted
    }

    /// Items still without a terminal outcome
    pub fn pending(&self) -> usize {
        self.total_submitted.saturating_sub(self.recorded())
    }

    pub fn is_complete(&self) -> bool {
        self.pending() == 0
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Freezes the accumulated outcomes into a report
    pub fn finalize(self, status: RunStatus) -> RunReport {
        RunReport::new(
            self.start_time,
            self.total_submitted,
            self.succeeded,
            self.failed,
            status,
            self.keyword_failures,
        )
    }
}
