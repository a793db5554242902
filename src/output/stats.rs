//! Statistics generation from the run-history database
//!
//! This module provides functionality for extracting and displaying
//! statistics across past runs for `--stats`.

use crate::state::FailureKind;
use crate::storage::{RunRecord, Storage};
use crate::ScrapeError;
use std::collections::HashMap;

/// How many recent runs `--stats` lists
const RECENT_RUNS: usize = 10;

/// History statistics summary
#[derive(Debug, Clone)]
pub struct RunStatistics {
    /// Total number of recorded runs
    pub total_runs: u64,

    /// Total number of per-item outcomes across all runs
    pub total_outcomes: u64,

    /// Outcomes that succeeded
    pub successes: u64,

    /// Failed outcomes grouped by kind
    pub failures_by_kind: HashMap<FailureKind, u64>,

    /// Newest runs first
    pub recent_runs: Vec<RunRecord>,
}

impl RunStatistics {
    /// Fraction of all recorded outcomes that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.total_outcomes == 0 {
            0.0
        } else {
            self.successes as f64 / self.total_outcomes as f64
        }
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(RunStatistics)` - Successfully loaded statistics
/// * `Err(ScrapeError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<RunStatistics, ScrapeError> {
    Ok(RunStatistics {
        total_runs: storage.count_runs()?,
        total_outcomes: storage.count_outcomes()?,
        successes: storage.count_successes()?,
        failures_by_kind: storage.failures_by_kind()?,
        recent_runs: storage.list_runs(RECENT_RUNS)?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &RunStatistics) {
    println!("=== Run History ===\n");

    println!("Overview:");
    println!("  Runs recorded: {}", stats.total_runs);
    println!("  Items processed: {}", stats.total_outcomes);
    println!(
        "  Success rate: {:.1}% ({} / {})",
        stats.success_rate() * 100.0,
        stats.successes,
        stats.total_outcomes
    );
    println!();

    if !stats.failures_by_kind.is_empty() {
        println!("Failures by Kind:");
        let mut kind_counts: Vec<_> = stats.failures_by_kind.iter().collect();
        kind_counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

        for (kind, count) in kind_counts {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    if !stats.recent_runs.is_empty() {
        println!("Recent Runs:");
        for run in &stats.recent_runs {
            println!(
                "  {} [{}] {}/{} succeeded ({:.1}%)",
                run.run_key,
                run.status,
                run.succeeded,
                run.total_submitted,
                run.success_rate * 100.0
            );
        }
    }
}
