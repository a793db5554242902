//! File-based report sink (JSON, CSV spreadsheet, markdown)
//!
//! Every run gets its own directory, `<root>/reports/<run-id>/`, so reports
//! from different runs never collide and rewriting one run's report simply
//! overwrites its files.

use crate::output::markdown::generate_markdown_summary;
use crate::output::traits::{OutputError, OutputResult, ReportFormat, ReportSink};
use crate::output::RunReport;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const SUCCESS_HEADERS: [&str; 10] = [
    "url",
    "keyword",
    "title",
    "text_content",
    "headings",
    "internal_links",
    "images",
    "tables",
    "fetched_at",
    "duration_ms",
];

const FAILURE_HEADERS: [&str; 8] = [
    "item_id",
    "url",
    "keyword",
    "kind",
    "message",
    "attempt",
    "retriable",
    "failed_at",
];

/// Writes reports as files under a root directory
#[derive(Debug, Clone)]
pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the files for one run
    pub fn report_dir(&self, report: &RunReport) -> PathBuf {
        self.root.join("reports").join(report.run_id())
    }

    fn prepare_dir(&self, report: &RunReport) -> OutputResult<PathBuf> {
        let dir = self.report_dir(report);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn write_json(&self, report: &RunReport) -> OutputResult<()> {
        let dir = self.prepare_dir(report)?;
        write_json_file(&dir.join("successful_results.json"), report.succeeded())?;
        write_json_file(&dir.join("failed_items.json"), report.failed())?;
        write_json_file(&dir.join("summary.json"), &report.summary())?;
        debug!(dir = %dir.display(), "Wrote JSON report");
        Ok(())
    }

    fn write_spreadsheet(&self, report: &RunReport) -> OutputResult<()> {
        let dir = self.prepare_dir(report)?;

        let rows: Vec<Vec<String>> = report
            .succeeded()
            .iter()
            .map(|success| {
                let page = &success.data;
                vec![
                    page.url.clone(),
                    page.keyword.clone().unwrap_or_default(),
                    page.title.clone(),
                    page.text_content.clone(),
                    page.headings
                        .iter()
                        .flat_map(|(tag, texts)| texts.iter().map(move |t| format!("{tag}: {t}")))
                        .collect::<Vec<_>>()
                        .join("\n"),
                    page.internal_links.join("\n"),
                    page.images
                        .iter()
                        .map(|image| image.src.as_str())
                        .collect::<Vec<_>>()
                        .join("\n"),
                    page.tables
                        .iter()
                        .map(|rows| rows.join("\n"))
                        .collect::<Vec<_>>()
                        .join("\n\n"),
                    page.fetched_at.to_rfc3339(),
                    success.duration.as_millis().to_string(),
                ]
            })
            .collect();
        write_csv_file(&dir.join("successful_results.csv"), &SUCCESS_HEADERS, &rows)?;

        let rows: Vec<Vec<String>> = report
            .failed()
            .iter()
            .map(|failure| {
                vec![
                    failure.item_id.to_string(),
                    failure.url.clone(),
                    failure.keyword.clone().unwrap_or_default(),
                    failure.kind.to_string(),
                    failure.message.clone(),
                    failure.attempt.to_string(),
                    failure.retriable.to_string(),
                    failure.failed_at.to_rfc3339(),
                ]
            })
            .collect();
        write_csv_file(&dir.join("failed_items.csv"), &FAILURE_HEADERS, &rows)?;

        debug!(dir = %dir.display(), "Wrote spreadsheet report");
        Ok(())
    }
}

impl ReportSink for FileSink {
    fn supports(&self, format: ReportFormat) -> bool {
        !matches!(format, ReportFormat::Sqlite)
    }

    fn write(&self, report: &RunReport, format: ReportFormat) -> OutputResult<()> {
        match format {
            ReportFormat::Json => self.write_json(report),
            ReportFormat::Spreadsheet => self.write_spreadsheet(report),
            ReportFormat::Markdown => {
                let dir = self.prepare_dir(report)?;
                generate_markdown_summary(report, &dir.join("summary.md"))
            }
            ReportFormat::Sqlite => Err(OutputError::Format(
                "file sink cannot write sqlite reports".to_string(),
            )),
        }
    }
}

/// Dumps the whole report as a single JSON file in `dir`
///
/// Used as the last-resort fallback when the configured sinks fail.
pub fn write_fallback_report(dir: &Path, report: &RunReport) -> OutputResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("report_{}.json", report.run_id()));
    write_json_file(&path, report)?;
    Ok(path)
}

fn write_json_file<T: Serialize + ?Sized>(path: &Path, value: &T) -> OutputResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn write_csv_file(path: &Path, headers: &[&str], rows: &[Vec<String>]) -> OutputResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    write_row(&mut writer, &headers)?;
    for row in rows {
        write_row(&mut writer, row)?;
    }
    writer.flush()?;
    Ok(())
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Writes one CSV row, quoting fields that need it
fn write_row<W: Write>(mut w: W, row: &[String]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ResultAggregator;
    use crate::state::{FailureKind, ItemId, Outcome, PageRecord, Success, WorkItem};
    use crate::storage::RunStatus;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tempfile::TempDir;

    fn report() -> RunReport {
        let mut aggregator = ResultAggregator::new(2);
        aggregator.record(Outcome::Success(Success {
            item_id: ItemId::from("https://a.com/"),
            data: PageRecord {
                url: "https://a.com/".to_string(),
                keyword: Some("alpha".to_string()),
                title: "Hello, \"world\"".to_string(),
                text_content: "one\n\ntwo".to_string(),
                headings: BTreeMap::from([("h1".to_string(), vec!["Top".to_string()])]),
                internal_links: vec!["https://a.com/x".to_string()],
                images: vec![],
                tables: vec![],
                fetched_at: Utc::now(),
            },
            duration: Duration::from_millis(5),
        }));
        aggregator.record(Outcome::failure(
            &WorkItem::new("https://b.com/"),
            FailureKind::Validation,
            "empty",
        ));
        aggregator.finalize(RunStatus::Completed)
    }

    #[test]
    fn test_write_row_quotes_when_needed() {
        let mut buf = Vec::new();
        let row = vec![
            "plain".to_string(),
            "a,b".to_string(),
            "say \"hi\"".to_string(),
            "line\nbreak".to_string(),
        ];
        write_row(&mut buf, &row).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "plain,\"a,b\",\"say \"\"hi\"\"\",\"line\nbreak\"\r\n"
        );
    }

    #[test]
    fn test_json_files_written() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink::new(dir.path());
        let report = report();
        sink.write(&report, ReportFormat::Json).unwrap();

        let out = sink.report_dir(&report);
        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary["total_submitted"], 2);
        assert_eq!(summary["succeeded"], 1);
        assert_eq!(summary["status"], "completed");
        assert_eq!(summary["failures_by_kind"]["validation"], 1);

        let failed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join("failed_items.json")).unwrap())
                .unwrap();
        assert_eq!(failed[0]["kind"], "validation");
        assert_eq!(failed[0]["attempt"], 0);

        let succeeded: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(out.join("successful_results.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(succeeded[0]["duration_ms"], 5);
        assert_eq!(succeeded[0]["data"]["keyword"], "alpha");
    }

    #[test]
    fn test_spreadsheet_files_written() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink::new(dir.path());
        let report = report();
        sink.write(&report, ReportFormat::Spreadsheet).unwrap();

        let out = sink.report_dir(&report);
        let successes = fs::read_to_string(out.join("successful_results.csv")).unwrap();
        assert!(successes.starts_with("url,keyword,title,"));
        assert!(successes.contains("\"Hello, \"\"world\"\"\""));

        let failures = fs::read_to_string(out.join("failed_items.csv")).unwrap();
        assert!(failures.contains("https://b.com/,https://b.com/,,validation,empty,0,false,"));
    }

    #[test]
    fn test_rewrite_overwrites() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink::new(dir.path());
        let report = report();
        sink.write(&report, ReportFormat::Markdown).unwrap();
        sink.write(&report, ReportFormat::Markdown).unwrap();
        assert!(sink.report_dir(&report).join("summary.md").exists());
    }

    #[test]
    fn test_sqlite_not_supported() {
        let sink = FileSink::new("unused");
        assert!(!sink.supports(ReportFormat::Sqlite));
        assert!(sink.supports(ReportFormat::Json));
    }

    #[test]
    fn test_fallback_report() {
        let dir = TempDir::new().unwrap();
        let report = report();
        let path = write_fallback_report(&dir.path().join("failed"), &report).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["run_id"], report.run_id());
        assert_eq!(value["failed"].as_array().unwrap().len(), 1);
    }
}
