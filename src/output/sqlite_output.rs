//! SQLite-based report sink
//!
//! This module provides a sink that records finished runs and their
//! per-item outcomes in the run-history database.

use crate::output::traits::{OutputError, OutputResult, ReportFormat, ReportSink};
use crate::output::RunReport;
use crate::storage::{SqliteStorage, Storage};
use std::sync::Mutex;

/// SQLite-based report sink
///
/// Writes are upserts keyed by the run id, so a report saved twice leaves
/// one run row behind.
pub struct SqliteSink {
    storage: Mutex<SqliteStorage>,
    config_hash: String,
}

impl SqliteSink {
    /// Creates a new SQLite sink
    ///
    /// # Arguments
    ///
    /// * `storage` - The opened history database
    /// * `config_hash` - Hash of the configuration, stored with each run
    pub fn new(storage: SqliteStorage, config_hash: impl Into<String>) -> Self {
        Self {
            storage: Mutex::new(storage),
            config_hash: config_hash.into(),
        }
    }

    /// Gives the storage back, e.g. to query statistics after writing
    pub fn into_storage(self) -> OutputResult<SqliteStorage> {
        self.storage
            .into_inner()
            .map_err(|e| OutputError::Storage(format!("Failed to unlock storage: {}", e)))
    }
}

impl ReportSink for SqliteSink {
    fn supports(&self, format: ReportFormat) -> bool {
        format == ReportFormat::Sqlite
    }

    fn write(&self, report: &RunReport, format: ReportFormat) -> OutputResult<()> {
        if !self.supports(format) {
            return Err(OutputError::Format(format!(
                "sqlite sink cannot write {} reports",
                format
            )));
        }

        let mut storage = self
            .storage
            .lock()
            .map_err(|e| OutputError::Storage(format!("Failed to lock storage: {}", e)))?;

        storage
            .save_report(report, &self.config_hash)
            .map_err(|e| OutputError::Storage(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ResultAggregator;
    use crate::state::{FailureKind, Outcome, WorkItem};
    use crate::storage::RunStatus;

    fn report() -> RunReport {
        let mut aggregator = ResultAggregator::new(1);
        aggregator.record(Outcome::failure(
            &WorkItem::new("https://a.com/"),
            FailureKind::Timeout,
            "timed out",
        ));
        aggregator.finalize(RunStatus::Completed)
    }

    #[test]
    fn test_write_saves_run() {
        let sink = SqliteSink::new(SqliteStorage::new_in_memory().unwrap(), "abc");
        let report = report();
        sink.write(&report, ReportFormat::Sqlite).unwrap();
        sink.write(&report, ReportFormat::Sqlite).unwrap();

        let storage = sink.into_storage().unwrap();
        assert_eq!(storage.count_runs().unwrap(), 1);
        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.config_hash, "abc");
        assert_eq!(run.failed, 1);
    }

    #[test]
    fn test_rejects_other_formats() {
        let sink = SqliteSink::new(SqliteStorage::new_in_memory().unwrap(), "abc");
        assert!(!sink.supports(ReportFormat::Json));
        assert!(matches!(
            sink.write(&report(), ReportFormat::Json),
            Err(OutputError::Format(_))
        ));
    }
}
