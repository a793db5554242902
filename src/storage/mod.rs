//! Storage module for persisting run history
//!
//! This module handles all database operations for the pipeline, including:
//! - SQLite database initialization and schema management
//! - Recording each finished run and its per-item outcomes
//! - Aggregate queries for `--stats`

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::ScrapeError;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(ScrapeError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, ScrapeError> {
    SqliteStorage::new(path)
}

/// Represents a stored run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub run_key: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub total_submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub keyword_failures: u64,
    pub success_rate: f64,
    pub status: RunStatus,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every item reached a terminal outcome on its own
    Completed,
    /// Cancellation was requested; pending items were failed as cancelled
    Cancelled,
    /// The scheduler hit a bookkeeping fault; the report is incomplete
    Partial,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Partial => "partial",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "partial" => Some(Self::Partial),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[RunStatus::Completed, RunStatus::Cancelled, RunStatus::Partial] {
            let db_str = status.to_db_string();
            let parsed = RunStatus::from_db_string(db_str);
            assert_eq!(Some(*status), parsed);
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("running"), None);
    }

    #[test]
    fn test_run_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }
}
