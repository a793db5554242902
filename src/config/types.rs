use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Browser-like user agent sent by default; some sites refuse obvious bots.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Main configuration structure for Scrapeflow
///
/// Every section is optional; missing keys fall back to the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerSettings,
    pub retry: RetrySettings,
    pub resources: ResourceSettings,
    pub network: NetworkSettings,
    pub security: SecuritySettings,
    pub search: SearchSettings,
    pub output: OutputSettings,
    pub logging: LoggingSettings,
}

/// How queued items are released to the workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingMode {
    /// One global FIFO queue
    #[default]
    Queue,
    /// `batch-size` items at a time; the next wave starts once the current one is terminal
    Waves,
}

/// Scheduler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Maximum number of items in flight at once
    #[serde(rename = "concurrency-cap")]
    pub concurrency_cap: usize,

    /// Items per wave when `mode = "waves"`
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    pub mode: SchedulingMode,

    /// Admission re-check period, also the retry delay for resource pressure
    #[serde(rename = "sample-interval-secs")]
    pub sample_interval_secs: f64,

    /// How long admission may stay denied with nothing in flight
    #[serde(rename = "admission-timeout-secs")]
    pub admission_timeout_secs: f64,

    /// Time in-flight work gets to finish after cancellation
    #[serde(rename = "cancel-grace-secs")]
    pub cancel_grace_secs: f64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            concurrency_cap: 5,
            batch_size: 10,
            mode: SchedulingMode::Queue,
            sample_interval_secs: 10.0,
            admission_timeout_secs: 120.0,
            cancel_grace_secs: 10.0,
        }
    }
}

impl SchedulerSettings {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs_f64(self.sample_interval_secs)
    }

    pub fn admission_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.admission_timeout_secs)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_secs_f64(self.cancel_grace_secs)
    }
}

/// Retry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts after which an item is given up
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Base of the linear backoff schedule
    #[serde(rename = "retry-delay-secs")]
    pub retry_delay_secs: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_secs: 5.0,
        }
    }
}

impl RetrySettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay_secs)
    }
}

/// Resource pressure limits used for admission control
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResourceSettings {
    #[serde(rename = "max-memory-percent")]
    pub max_memory_percent: f64,

    #[serde(rename = "max-cpu-percent")]
    pub max_cpu_percent: f64,

    #[serde(rename = "max-connections")]
    pub max_connections: usize,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            max_memory_percent: 75.0,
            max_cpu_percent: 85.0,
            max_connections: 100,
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    #[serde(rename = "accept-language")]
    pub accept_language: String,

    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: f64,

    /// Read timeout; also the per-item fetch timeout
    #[serde(rename = "read-timeout-secs")]
    pub read_timeout_secs: f64,

    #[serde(rename = "max-redirects")]
    pub max_redirects: usize,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            connect_timeout_secs: 10.0,
            read_timeout_secs: 30.0,
            max_redirects: 5,
        }
    }
}

impl NetworkSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.read_timeout_secs)
    }
}

/// Domain restrictions
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// Exact hosts or `*.example.com` wildcards that must never be fetched
    #[serde(rename = "blocked-domains")]
    pub blocked_domains: Vec<String>,
}

/// Keyword search configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Search page URL; `{query}` is replaced with the encoded keyword
    #[serde(rename = "url-template")]
    pub url_template: String,

    /// Maximum URLs harvested per keyword
    #[serde(rename = "max-results")]
    pub max_results: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            url_template: "https://html.duckduckgo.com/html/?q={query}".to_string(),
            max_results: 10,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Root directory for per-run report folders
    pub directory: PathBuf,

    /// Report formats written after each run
    pub formats: Vec<String>,

    /// Path to the SQLite run-history database
    #[serde(rename = "database-path")]
    pub database_path: PathBuf,

    /// Pause before the single retry of a failed report write
    #[serde(rename = "save-retry-delay-secs")]
    pub save_retry_delay_secs: f64,

    /// Where reports go when a sink stays unwritable
    #[serde(rename = "fallback-directory")]
    pub fallback_directory: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./output"),
            formats: vec!["json".to_string(), "spreadsheet".to_string()],
            database_path: PathBuf::from("./output/scrapeflow.db"),
            save_retry_delay_secs: 2.0,
            fallback_directory: PathBuf::from("./output/failed"),
        }
    }
}

impl OutputSettings {
    pub fn save_retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.save_retry_delay_secs)
    }
}

/// Log file configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Directory for daily-rotated log files; unset disables file logging
    pub directory: Option<PathBuf>,
}
