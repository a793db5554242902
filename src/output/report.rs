//! The finalized run report

use crate::state::{Failure, FailureKind, Success};
use crate::storage::RunStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// A search keyword that produced no work items
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordFailure {
    pub keyword: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl KeywordFailure {
    pub fn new(keyword: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Immutable snapshot of a finished run
///
/// Built only by [`ResultAggregator::finalize`](crate::output::ResultAggregator::finalize).
/// `succeeded` and `failed` are in completion order, not submission order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    run_id: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    total_submitted: usize,
    succeeded: Vec<Success>,
    failed: Vec<Failure>,
    success_rate: f64,
    status: RunStatus,
    keyword_failures: Vec<KeywordFailure>,
}

/// Counts-only view of a report, written as `summary.json`
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub total_submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub failures_by_kind: BTreeMap<FailureKind, usize>,
    pub keyword_failures: Vec<KeywordFailure>,
}

impl RunReport {
    pub(crate) fn new(
        start_time: DateTime<Utc>,
        total_submitted: usize,
        succeeded: Vec<Success>,
        failed: Vec<Failure>,
        status: RunStatus,
        keyword_failures: Vec<KeywordFailure>,
    ) -> Self {
        let success_rate = if total_submitted == 0 {
            0.0
        } else {
            succeeded.len() as f64 / total_submitted as f64
        };

        Self {
            run_id: start_time.format("%Y%m%d_%H%M%S_%3f").to_string(),
            start_time,
            end_time: Utc::now(),
            total_submitted,
            succeeded,
            failed,
            success_rate,
            status,
            keyword_failures,
        }
    }

    /// Timestamp-derived identifier, also used as the report directory name
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    /// Wall-clock duration of the run in seconds
    pub fn elapsed_secs(&self) -> f64 {
        (self.end_time - self.start_time).num_milliseconds().max(0) as f64 / 1000.0
    }

    pub fn total_submitted(&self) -> usize {
        self.total_submitted
    }

    pub fn succeeded(&self) -> &[Success] {
        &self.succeeded
    }

    pub fn failed(&self) -> &[Failure] {
        &self.failed
    }

    /// Fraction of submitted items that succeeded, in `[0, 1]`
    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn keyword_failures(&self) -> &[KeywordFailure] {
        &self.keyword_failures
    }

    /// Returns true if every submitted item has exactly one terminal outcome
    pub fn is_conserved(&self) -> bool {
        self.succeeded.len() + self.failed.len() == self.total_submitted
    }

    pub fn failures_by_kind(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failed {
            *counts.entry(failure.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            run_id: self.run_id.clone(),
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
            elapsed_secs: self.elapsed_secs(),
            total_submitted: self.total_submitted,
            succeeded: self.succeeded.len(),
            failed: self.failed.len(),
            success_rate: self.success_rate,
            failures_by_kind: self.failures_by_kind(),
            keyword_failures: self.keyword_failures.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::WorkItem;

    #[test]
    fn test_empty_report_has_zero_rate() {
        let report = RunReport::new(Utc::now(), 0, vec![], vec![], RunStatus::Completed, vec![]);
        assert_eq!(report.success_rate(), 0.0);
        assert!(report.is_conserved());
    }

    #[test]
    fn test_run_id_from_start_time() {
        let start = DateTime::parse_from_rfc3339("2024-03-05T07:08:09.123Z")
            .unwrap()
            .with_timezone(&Utc);
        let report = RunReport::new(start, 0, vec![], vec![], RunStatus::Completed, vec![]);
        assert_eq!(report.run_id(), "20240305_070809_123");
    }

    #[test]
    fn test_failures_by_kind() {
        let failed = vec![
            Failure::new(&WorkItem::new("https://a.com/"), FailureKind::Network, "x"),
            Failure::new(&WorkItem::new("https://b.com/"), FailureKind::Network, "y"),
            Failure::new(&WorkItem::new("https://c.com/"), FailureKind::Validation, "z"),
        ];
        let report = RunReport::new(Utc::now(), 3, vec![], failed, RunStatus::Completed, vec![]);

        let counts = report.failures_by_kind();
        assert_eq!(counts[&FailureKind::Network], 2);
        assert_eq!(counts[&FailureKind::Validation], 1);
        assert!(!counts.contains_key(&FailureKind::Timeout));

        let summary = report.summary();
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.succeeded, 0);
    }
}
