//! Output module for aggregating outcomes and persisting run reports
//!
//! This module handles:
//! - Collecting terminal outcomes into an immutable run report
//! - Writing reports as JSON, CSV spreadsheets and markdown
//! - Recording runs in the SQLite history database
//! - Retrying failed report writes and falling back to a plain JSON dump

mod aggregator;
mod files;
mod markdown;
mod report;
mod sqlite_output;
pub mod stats;
mod traits;

pub use aggregator::ResultAggregator;
pub use files::{write_fallback_report, FileSink};
pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use report::{KeywordFailure, ReportSummary, RunReport};
pub use sqlite_output::SqliteSink;
pub use stats::{load_statistics, print_statistics, RunStatistics};
pub use traits::{OutputError, OutputResult, ReportFormat, ReportSink};

use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

/// Writes a finished report through every requested format
///
/// Each format goes to the first sink that supports it. A failed write is
/// retried once after `retry_delay`; if it fails again the whole report is
/// dumped as JSON into `fallback_dir` and the error is returned. Formats
/// after a failed one are still attempted.
///
/// # Arguments
///
/// * `sinks` - Available report sinks
/// * `report` - The finalized run report
/// * `formats` - Formats to write
/// * `retry_delay` - Pause before the single retry
/// * `fallback_dir` - Directory for the last-resort JSON dump
///
/// # Returns
///
/// * `Ok(())` - Every format was written
/// * `Err(OutputError)` - The first format that could not be written
pub async fn persist_report(
    sinks: &[&dyn ReportSink],
    report: &RunReport,
    formats: &[ReportFormat],
    retry_delay: Duration,
    fallback_dir: &Path,
) -> OutputResult<()> {
    let mut first_error = None;

    for &format in formats {
        let Some(sink) = sinks.iter().find(|sink| sink.supports(format)) else {
            warn!(format = %format, "No sink configured for report format");
            first_error.get_or_insert(OutputError::Format(format!(
                "no sink configured for {}",
                format
            )));
            continue;
        };

        let result = match sink.write(report, format) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(format = %format, error = %e, "Report write failed, retrying once");
                tokio::time::sleep(retry_delay).await;
                sink.write(report, format)
            }
        };

        match result {
            Ok(()) => info!(format = %format, run_id = report.run_id(), "Report written"),
            Err(e) => {
                error!(format = %format, error = %e, "Report write failed after retry");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        None => Ok(()),
        Some(e) => {
            match write_fallback_report(fallback_dir, report) {
                Ok(path) => warn!(path = %path.display(), "Wrote fallback report"),
                Err(fallback) => error!(error = %fallback, "Fallback report write failed"),
            }
            Err(e)
        }
    }
}
