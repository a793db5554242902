//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::output::RunReport;
use crate::state::FailureKind;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageResult};
use crate::storage::{RunRecord, RunStatus, StorageError};
use crate::ScrapeError;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const RUN_COLUMNS: &str = "id, run_key, started_at, finished_at, config_hash, total_submitted, \
                           succeeded, failed, keyword_failures, success_rate, status";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// The parent directory is created if it does not exist yet.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(ScrapeError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, ScrapeError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(StorageError::from)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )
        .map_err(StorageError::from)?;

        initialize_schema(&conn).map_err(StorageError::from)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        run_key: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        config_hash: row.get(4)?,
        total_submitted: row.get::<_, i64>(5)?.max(0) as u64,
        succeeded: row.get::<_, i64>(6)?.max(0) as u64,
        failed: row.get::<_, i64>(7)?.max(0) as u64,
        keyword_failures: row.get::<_, i64>(8)?.max(0) as u64,
        success_rate: row.get(9)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(10)?)
            .unwrap_or(RunStatus::Partial),
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn save_report(&mut self, report: &RunReport, config_hash: &str) -> StorageResult<i64> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO runs (run_key, started_at, finished_at, config_hash, total_submitted,
                               succeeded, failed, keyword_failures, success_rate, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(run_key) DO UPDATE SET
                finished_at = excluded.finished_at,
                config_hash = excluded.config_hash,
                total_submitted = excluded.total_submitted,
                succeeded = excluded.succeeded,
                failed = excluded.failed,
                keyword_failures = excluded.keyword_failures,
                success_rate = excluded.success_rate,
                status = excluded.status",
            params![
                report.run_id(),
                report.start_time().to_rfc3339(),
                report.end_time().to_rfc3339(),
                config_hash,
                report.total_submitted() as i64,
                report.succeeded().len() as i64,
                report.failed().len() as i64,
                report.keyword_failures().len() as i64,
                report.success_rate(),
                report.status().to_db_string(),
            ],
        )?;

        let run_id: i64 = tx.query_row(
            "SELECT id FROM runs WHERE run_key = ?1",
            params![report.run_id()],
            |row| row.get(0),
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO outcomes (run_id, item_id, keyword, status, kind, message, attempt,
                                       title, duration_ms, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(run_id, item_id) DO UPDATE SET
                    keyword = excluded.keyword,
                    status = excluded.status,
                    kind = excluded.kind,
                    message = excluded.message,
                    attempt = excluded.attempt,
                    title = excluded.title,
                    duration_ms = excluded.duration_ms,
                    recorded_at = excluded.recorded_at",
            )?;

            for success in report.succeeded() {
                stmt.execute(params![
                    run_id,
                    success.item_id.as_str(),
                    success.data.keyword,
                    "succeeded",
                    Option::<String>::None,
                    Option::<String>::None,
                    Option::<i64>::None,
                    success.data.title,
                    success.duration.as_millis() as i64,
                    success.data.fetched_at.to_rfc3339(),
                ])?;
            }

            for failure in report.failed() {
                stmt.execute(params![
                    run_id,
                    failure.item_id.as_str(),
                    failure.keyword,
                    "failed",
                    failure.kind.as_str(),
                    failure.message,
                    failure.attempt as i64,
                    Option::<String>::None,
                    Option::<i64>::None,
                    failure.failed_at.to_rfc3339(),
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!(run_id, run_key = report.run_id(), "Saved run history");
        Ok(run_id)
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY id DESC LIMIT 1"),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn list_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs ORDER BY id DESC LIMIT ?1"
        ))?;
        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    // ===== Statistics =====

    fn count_runs(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM runs")
    }

    fn count_outcomes(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM outcomes")
    }

    fn count_successes(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM outcomes WHERE status = 'succeeded'")
    }

    fn failures_by_kind(&self) -> StorageResult<HashMap<FailureKind, u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, COUNT(*) FROM outcomes WHERE status = 'failed' GROUP BY kind",
        )?;

        let mut summary = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (kind, count) = row?;
            match FailureKind::from_db_string(&kind) {
                Some(kind) => {
                    summary.insert(kind, count.max(0) as u64);
                }
                None => {
                    return Err(StorageError::Database(format!(
                        "unknown failure kind in history: {kind}"
                    )))
                }
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ResultAggregator;
    use crate::state::{ItemId, Outcome, PageRecord, Success, WorkItem};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tempfile::TempDir;

    fn report() -> RunReport {
        let mut aggregator = ResultAggregator::new(3);
        aggregator.record(Outcome::Success(Success {
            item_id: ItemId::from("https://a.com/"),
            data: PageRecord {
                url: "https://a.com/".to_string(),
                keyword: Some("alpha".to_string()),
                title: "A".to_string(),
                text_content: "text".to_string(),
                headings: BTreeMap::new(),
                internal_links: vec![],
                images: vec![],
                tables: vec![],
                fetched_at: Utc::now(),
            },
            duration: Duration::from_millis(42),
        }));
        aggregator.record(Outcome::failure(
            &WorkItem::new("https://b.com/"),
            FailureKind::Network,
            "HTTP 502",
        ));
        aggregator.record(Outcome::failure(
            &WorkItem::new("https://c.com/"),
            FailureKind::Validation,
            "empty",
        ));
        aggregator.finalize(RunStatus::Completed)
    }

    #[test]
    fn test_create_in_memory() {
        assert!(SqliteStorage::new_in_memory().is_ok());
    }

    #[test]
    fn test_new_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/history.db");
        assert!(SqliteStorage::new(&path).is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_save_report() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let report = report();
        let run_id = storage.save_report(&report, "hash").unwrap();
        assert!(run_id > 0);

        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.run_key, report.run_id());
        assert_eq!(run.total_submitted, 3);
        assert_eq!(run.succeeded, 1);
        assert_eq!(run.failed, 2);
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.config_hash, "hash");

        assert_eq!(storage.count_outcomes().unwrap(), 3);
        assert_eq!(storage.count_successes().unwrap(), 1);
    }

    #[test]
    fn test_saving_twice_upserts() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let report = report();

        let first = storage.save_report(&report, "hash").unwrap();
        let second = storage.save_report(&report, "other").unwrap();

        assert_eq!(first, second);
        assert_eq!(storage.count_runs().unwrap(), 1);
        assert_eq!(storage.count_outcomes().unwrap(), 3);
        assert_eq!(storage.get_run(first).unwrap().config_hash, "other");
    }

    #[test]
    fn test_failures_by_kind() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.save_report(&report(), "hash").unwrap();

        let summary = storage.failures_by_kind().unwrap();
        assert_eq!(summary.get(&FailureKind::Network), Some(&1));
        assert_eq!(summary.get(&FailureKind::Validation), Some(&1));
        assert_eq!(summary.get(&FailureKind::Timeout), None);
    }

    #[test]
    fn test_latest_and_missing_runs() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.get_latest_run().unwrap().is_none());
        assert!(matches!(
            storage.get_run(99),
            Err(StorageError::RunNotFound(99))
        ));

        let run_id = storage.save_report(&report(), "hash").unwrap();
        assert_eq!(storage.get_latest_run().unwrap().map(|r| r.id), Some(run_id));
        assert_eq!(storage.list_runs(10).unwrap().len(), 1);
    }
}
