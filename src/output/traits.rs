//! Report sink traits and types
//!
//! This module defines the trait interface for report sinks and the
//! formats a finished run can be written in.

use crate::output::RunReport;
use std::fmt;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// A format a run report can be written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportFormat {
    /// `successful_results.json`, `failed_items.json`, `summary.json`
    Json,
    /// `successful_results.csv`, `failed_items.csv`
    Spreadsheet,
    /// `summary.md`
    Markdown,
    /// Run-history database
    Sqlite,
}

impl ReportFormat {
    /// Parses a format name as used in config and on the command line
    ///
    /// # Example
    ///
    /// ```
    /// use scrapeflow::output::ReportFormat;
    ///
    /// assert_eq!(ReportFormat::parse("JSON"), Some(ReportFormat::Json));
    /// assert_eq!(ReportFormat::parse("csv"), Some(ReportFormat::Spreadsheet));
    /// assert_eq!(ReportFormat::parse("xlsx"), None);
    /// ```
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "spreadsheet" | "csv" => Some(Self::Spreadsheet),
            "markdown" | "md" => Some(Self::Markdown),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Spreadsheet => "spreadsheet",
            Self::Markdown => "markdown",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for report sinks
///
/// Sinks are only invoked after the report is finalized, outside the
/// concurrent part of a run. Writing the same report twice must not fail on
/// duplicate keys; later writes overwrite earlier ones.
pub trait ReportSink {
    /// Returns true if this sink can write `format`
    fn supports(&self, format: ReportFormat) -> bool;

    /// Writes the report in the given format
    ///
    /// # Arguments
    ///
    /// * `report` - The finalized run report
    /// * `format` - One of the formats this sink supports
    fn write(&self, report: &RunReport, format: ReportFormat) -> OutputResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names_roundtrip() {
        for format in [
            ReportFormat::Json,
            ReportFormat::Spreadsheet,
            ReportFormat::Markdown,
            ReportFormat::Sqlite,
        ] {
            assert_eq!(ReportFormat::parse(format.as_str()), Some(format));
        }
    }

    #[test]
    fn test_format_parse_aliases() {
        assert_eq!(ReportFormat::parse(" md "), Some(ReportFormat::Markdown));
        assert_eq!(ReportFormat::parse(""), None);
    }
}
