//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::output::RunReport;
use crate::state::FailureKind;
use crate::storage::RunRecord;
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for run-history backends
///
/// Saving is an upsert keyed by the report's run id, so writing the same
/// report twice never fails on duplicate keys.
pub trait Storage {
    // ===== Run Management =====

    /// Saves a finished run and all of its outcomes
    ///
    /// # Arguments
    ///
    /// * `report` - The finalized report
    /// * `config_hash` - Hash of the configuration the run used
    ///
    /// # Returns
    ///
    /// The database ID of the run row
    fn save_report(&mut self, report: &RunReport, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Gets up to `limit` runs, newest first
    fn list_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>>;

    // ===== Statistics =====

    fn count_runs(&self) -> StorageResult<u64>;

    /// Counts outcomes across all runs
    fn count_outcomes(&self) -> StorageResult<u64>;

    /// Counts successful outcomes across all runs
    fn count_successes(&self) -> StorageResult<u64>;

    /// Counts failed outcomes by kind across all runs
    fn failures_by_kind(&self) -> StorageResult<HashMap<FailureKind, u64>>;
}
