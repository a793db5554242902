//! Scrapeflow main entry point
//!
//! This is the command-line interface for the Scrapeflow scraping pipeline.

use anyhow::{bail, Context};
use clap::Parser;
use scrapeflow::config::{load_config_or_default, Config};
use scrapeflow::crawler::{
    Fetcher, FetchWorker, HtmlExtractor, HttpFetcher, KeywordExpander, RetryPolicy, Scheduler,
    SchedulerConfig,
};
use scrapeflow::output::{
    load_statistics, persist_report, print_statistics, FileSink, ReportFormat, ReportSink,
    RunReport, SqliteSink,
};
use scrapeflow::resources::{ProcProbe, ResourceGuard, ResourceLimits};
use scrapeflow::state::Batch;
use scrapeflow::storage::open_storage;
use scrapeflow::url::{check_url, DomainBlocklist};
use scrapeflow::ScrapeError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Scrapeflow: a bounded-concurrency scraping pipeline
///
/// Scrapeflow fetches a list of URLs (or the results of search keywords)
/// with a concurrency cap, retries transient failures, backs off under
/// resource pressure and writes a report of every item's outcome.
#[derive(Parser, Debug)]
#[command(name = "scrapeflow")]
#[command(version = "1.0.0")]
#[command(about = "A bounded-concurrency scraping pipeline", long_about = None)]
struct Cli {
    /// JSON file holding an array of URLs to fetch
    #[arg(long, value_name = "FILE", conflicts_with = "keywords")]
    #[arg(required_unless_present_any = ["keywords", "stats"])]
    urls: Option<PathBuf>,

    /// JSON file holding an array of search keywords
    #[arg(long, value_name = "FILE")]
    keywords: Option<PathBuf>,

    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and input and show what would be fetched without fetching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the run-history database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Report format to write; repeat to write several (overrides the config)
    #[arg(long = "format", value_name = "FORMAT", value_parser = parse_format)]
    formats: Vec<ReportFormat>,

    /// Root directory for reports (overrides the config)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,
}

/// What the run was asked to process
#[derive(Debug)]
enum Input {
    Urls(Vec<String>),
    Keywords(Vec<String>),
}

fn parse_format(name: &str) -> Result<ReportFormat, String> {
    ReportFormat::parse(name).ok_or_else(|| {
        format!("unknown format '{name}' (expected json, spreadsheet, markdown or sqlite)")
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, config_hash) = load_config_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(dir) = &cli.output {
        config.output.directory = dir.clone();
    }

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = setup_logging(cli.verbose, cli.quiet, config.logging.directory.as_deref())?;

    match &cli.config {
        Some(path) => tracing::info!(
            "Configuration loaded from {} (hash: {})",
            path.display(),
            config_hash
        ),
        None => tracing::info!("No configuration file given, using defaults"),
    }

    let formats = if cli.formats.is_empty() {
        config
            .output
            .formats
            .iter()
            .filter_map(|name| ReportFormat::parse(name))
            .collect()
    } else {
        cli.formats.clone()
    };

    if cli.stats {
        return handle_stats(&config);
    }

    let input = read_input(&cli)?;

    if cli.dry_run {
        handle_dry_run(&config, &input, &formats)
    } else {
        handle_run(config, config_hash, input, formats).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` wins over the verbosity flags when set. When `log_dir` is
/// given, logs are also written to a daily-rotated file there.
fn setup_logging(
    verbose: u8,
    quiet: bool,
    log_dir: Option<&Path>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let default_filter = if quiet {
        // Only show errors
        "error"
    } else {
        match verbose {
            0 => "scrapeflow=info,warn",
            1 => "scrapeflow=debug,info",
            2 => "scrapeflow=trace,debug",
            _ => "trace",
        }
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "scrapeflow.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Reads the `--urls` or `--keywords` file
fn read_input(cli: &Cli) -> anyhow::Result<Input> {
    match (&cli.urls, &cli.keywords) {
        (Some(path), _) => Ok(Input::Urls(read_string_list(path)?)),
        (None, Some(path)) => Ok(Input::Keywords(read_string_list(path)?)),
        (None, None) => bail!("either --urls or --keywords is required"),
    }
}

fn read_string_list(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let list: Vec<String> = serde_json::from_str(&content)
        .with_context(|| format!("{} must be a JSON array of strings", path.display()))?;
    Ok(list)
}

/// Handles the --dry-run mode: validates config and input and shows the plan
fn handle_dry_run(config: &Config, input: &Input, formats: &[ReportFormat]) -> anyhow::Result<()> {
    println!("=== Scrapeflow Dry Run ===\n");

    println!("Scheduler Configuration:");
    println!("  Concurrency cap: {}", config.scheduler.concurrency_cap);
    println!("  Mode: {:?}", config.scheduler.mode);
    println!("  Batch size: {}", config.scheduler.batch_size);
    println!(
        "  Sample interval: {:.1}s",
        config.scheduler.sample_interval_secs
    );

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_retries);
    println!("  Base delay: {:.1}s", config.retry.retry_delay_secs);

    println!("\nResource Limits:");
    println!("  Memory: {:.1}%", config.resources.max_memory_percent);
    println!("  CPU: {:.1}%", config.resources.max_cpu_percent);
    println!("  Connections: {}", config.resources.max_connections);

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory.display());
    println!(
        "  Formats: {}",
        formats
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Database: {}", config.output.database_path.display());

    let blocklist = DomainBlocklist::new(&config.security.blocked_domains)?;

    match input {
        Input::Urls(urls) => {
            let batch = Batch::from_urls(urls.iter().map(String::as_str));
            println!(
                "\nURLs ({} unique, {} duplicates dropped):",
                batch.len(),
                batch.duplicates()
            );
            let mut valid = 0;
            for item in batch.items() {
                match check_url(item.payload(), &blocklist) {
                    Ok(_) => {
                        valid += 1;
                        println!("  ✓ {}", item.payload());
                    }
                    Err(e) => println!("  ✗ {} ({})", item.payload(), e),
                }
            }
            println!("\n✓ Configuration is valid");
            println!("✓ Would fetch {} of {} URLs", valid, batch.len());
        }
        Input::Keywords(keywords) => {
            println!("\nKeywords ({}):", keywords.len());
            for keyword in keywords {
                println!("  - {}", keyword);
            }
            println!("\nSearch template: {}", config.search.url_template);
            println!("\n✓ Configuration is valid");
            println!(
                "✓ Would search {} keywords for up to {} results each",
                keywords.len(),
                config.search.max_results
            );
        }
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path.display());

    let storage = open_storage(&config.output.database_path)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main run: expand input, schedule, persist
async fn handle_run(
    config: Config,
    config_hash: String,
    input: Input,
    formats: Vec<ReportFormat>,
) -> anyhow::Result<()> {
    let fetcher: Arc<dyn Fetcher> = Arc::new(
        HttpFetcher::from_settings(&config.network).context("Failed to build HTTP client")?,
    );
    let timeout = config.network.read_timeout();

    // Installed before keyword expansion so an early interrupt still yields a report
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            interrupt.cancel();
        }
    });

    let (batch, keyword_failures) = match input {
        Input::Urls(urls) => (Batch::from_urls(urls), Vec::new()),
        Input::Keywords(keywords) => {
            tracing::info!("Expanding {} keywords", keywords.len());
            let expander = KeywordExpander::from_settings(fetcher.clone(), &config.search, timeout);
            let (items, failures) = expander.expand_until(&keywords, &cancel).await;
            (Batch::new(items), failures)
        }
    };

    if batch.duplicates() > 0 {
        tracing::info!("Dropped {} duplicate URLs", batch.duplicates());
    }
    tracing::info!(
        "Submitting {} items (concurrency cap {})",
        batch.len(),
        config.scheduler.concurrency_cap
    );

    let blocklist = DomainBlocklist::new(&config.security.blocked_domains)?;
    let worker = FetchWorker::new(fetcher, Arc::new(HtmlExtractor::new()), timeout)
        .with_blocklist(blocklist);
    let guard = ResourceGuard::new(
        ResourceLimits::from(&config.resources),
        Box::new(ProcProbe::new()),
    );

    let scheduler = Scheduler::new(
        Arc::new(worker),
        RetryPolicy::from_settings(&config.retry, &config.scheduler),
        guard,
        SchedulerConfig::from(&config.scheduler),
    )
    .with_keyword_failures(keyword_failures)
    .with_cancellation(cancel);

    let report = match scheduler.run(batch).await {
        Ok(report) => report,
        Err(ScrapeError::Bookkeeping { message, partial }) => {
            tracing::error!("Scheduler fault: {}; saving partial report", message);
            if let Err(e) = persist(&config, &config_hash, &formats, &partial).await {
                tracing::error!("Failed to save partial report: {}", e);
            }
            bail!("scheduler bookkeeping fault: {message}");
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        "Run {} finished: {} succeeded, {} failed, status {}",
        report.run_id(),
        report.succeeded().len(),
        report.failed().len(),
        report.status()
    );

    persist(&config, &config_hash, &formats, &report).await?;
    print_summary(&config, &report);

    Ok(())
}

/// Writes the report through a file sink and, if requested, the history database
async fn persist(
    config: &Config,
    config_hash: &str,
    formats: &[ReportFormat],
    report: &RunReport,
) -> anyhow::Result<()> {
    let file_sink = FileSink::new(&config.output.directory);

    // An unopenable database leaves the sqlite format without a sink, which
    // persist_report turns into a fallback dump
    let sqlite_sink = if formats.contains(&ReportFormat::Sqlite) {
        match open_storage(&config.output.database_path) {
            Ok(storage) => Some(SqliteSink::new(storage, config_hash)),
            Err(e) => {
                tracing::error!("Failed to open history database: {}", e);
                None
            }
        }
    } else {
        None
    };

    let mut sinks: Vec<&dyn ReportSink> = vec![&file_sink];
    if let Some(sink) = &sqlite_sink {
        sinks.push(sink);
    }

    persist_report(
        &sinks,
        report,
        formats,
        config.output.save_retry_delay(),
        &config.output.fallback_directory,
    )
    .await?;

    Ok(())
}

fn print_summary(config: &Config, report: &RunReport) {
    println!("\n=== Run Summary ===\n");
    println!("Run ID: {}", report.run_id());
    println!("Status: {}", report.status());
    println!("Duration: {:.1}s", report.elapsed_secs());
    println!("Submitted: {}", report.total_submitted());
    println!("Succeeded: {}", report.succeeded().len());
    println!("Failed: {}", report.failed().len());
    println!("Success rate: {:.1}%", report.success_rate() * 100.0);

    let by_kind = report.failures_by_kind();
    if !by_kind.is_empty() {
        println!("\nFailures by Kind:");
        for (kind, count) in &by_kind {
            println!("  {}: {}", kind, count);
        }
    }

    if !report.keyword_failures().is_empty() {
        println!("\nKeywords without results: {}", report.keyword_failures().len());
    }

    println!(
        "\n✓ Reports written to: {}",
        config.output.directory.join("reports").join(report.run_id()).display()
    );
}
