//! Markdown summary generation
//!
//! This module generates human-readable markdown summaries of a run,
//! including statistics, failure breakdowns and keyword problems.

use crate::output::traits::OutputResult;
use crate::output::RunReport;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown summary of the report to `output_path`
///
/// # Arguments
///
/// * `report` - The finalized run report
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(report: &RunReport, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(report);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run report as markdown
///
/// # Arguments
///
/// * `report` - The finalized run report
///
/// # Returns
///
/// A formatted markdown string
pub fn format_markdown_summary(report: &RunReport) -> String {
    let mut md = String::new();

    // Title
    md.push_str("# Scrapeflow Run Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", report.run_id()));
    md.push_str(&format!("- **Started**: {}\n", report.start_time().to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", report.end_time().to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        report.elapsed_secs()
    ));
    md.push_str(&format!("- **Status**: {}\n\n", report.status()));

    // Overall statistics
    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!(
        "- **Items Submitted**: {}\n",
        report.total_submitted()
    ));
    md.push_str(&format!("- **Succeeded**: {}\n", report.succeeded().len()));
    md.push_str(&format!("- **Failed**: {}\n", report.failed().len()));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        report.success_rate() * 100.0
    ));

    // Failure breakdown
    let by_kind = report.failures_by_kind();
    if !by_kind.is_empty() {
        md.push_str("## Failures by Kind\n\n");
        md.push_str("| Kind | Count |\n");
        md.push_str("|------|-------|\n");
        for (kind, count) in &by_kind {
            md.push_str(&format!("| {} | {} |\n", kind, count));
        }
        md.push('\n');

        md.push_str("## Failed Items\n\n");
        md.push_str("| URL | Kind | Attempt | Message |\n");
        md.push_str("|-----|------|---------|---------|\n");
        for failure in report.failed() {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                escape_cell(&failure.url),
                failure.kind,
                failure.attempt,
                escape_cell(&failure.message)
            ));
        }
        md.push('\n');
    }

    if !report.succeeded().is_empty() {
        md.push_str("## Succeeded Items\n\n");
        md.push_str("| URL | Title | Duration (ms) |\n");
        md.push_str("|-----|-------|---------------|\n");
        for success in report.succeeded() {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                escape_cell(&success.data.url),
                escape_cell(&success.data.title),
                success.duration.as_millis()
            ));
        }
        md.push('\n');
    }

    if !report.keyword_failures().is_empty() {
        md.push_str("## Keyword Failures\n\n");
        for failure in report.keyword_failures() {
            md.push_str(&format!("- **{}**: {}\n", failure.keyword, failure.error));
        }
        md.push('\n');
    }

    md
}

/// Keeps table cells on one line and stops `|` from splitting them
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{KeywordFailure, ResultAggregator};
    use crate::state::{FailureKind, Outcome, WorkItem};
    use crate::storage::RunStatus;
    use tempfile::TempDir;

    fn report() -> RunReport {
        let mut aggregator = ResultAggregator::new(1);
        aggregator.record(Outcome::failure(
            &WorkItem::new("https://example.com/a|b"),
            FailureKind::Timeout,
            "timed out\nafter 30s",
        ));
        aggregator.record_keyword_failure(KeywordFailure::new("nothing", "No URLs found"));
        aggregator.finalize(RunStatus::Cancelled)
    }

    #[test]
    fn test_format_sections() {
        let md = format_markdown_summary(&report());

        assert!(md.starts_with("# Scrapeflow Run Summary"));
        assert!(md.contains("- **Status**: cancelled"));
        assert!(md.contains("- **Success Rate**: 0.00%"));
        assert!(md.contains("| timeout | 1 |"));
        assert!(md.contains("- **nothing**: No URLs found"));
        assert!(!md.contains("## Succeeded Items"));
    }

    #[test]
    fn test_cells_are_escaped() {
        let md = format_markdown_summary(&report());
        assert!(md.contains("https://example.com/a\\|b"));
        assert!(md.contains("timed out after 30s"));
    }

    #[test]
    fn test_generate_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.md");
        generate_markdown_summary(&report(), &path).unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("## Run Information"));
    }
}
