//! Integration tests for the scheduling pipeline
//!
//! These tests drive the public `Scheduler` with scripted workers and
//! probes, plus one end-to-end run against a wiremock server.

use async_trait::async_trait;
use chrono::Utc;
use scrapeflow::config::SchedulingMode;
use scrapeflow::crawler::{
    FetchError, FetchWorker, FetchedPage, Fetcher, HtmlExtractor, HttpFetcher, Scheduler,
    SchedulerConfig, Worker,
};
use scrapeflow::output::{FileSink, ReportFormat, ReportSink, ResultAggregator};
use scrapeflow::resources::{ProbeError, ResourceGuard, ResourceLimits, ResourceProbe};
use scrapeflow::state::{Batch, FailureKind, Outcome, PageRecord, Success, WorkItem};
use scrapeflow::storage::RunStatus;
use scrapeflow::url::DomainBlocklist;
use scrapeflow::{ResourceSnapshot, RetryPolicy};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct IdleProbe;

impl ResourceProbe for IdleProbe {
    fn sample(&mut self) -> Result<ResourceSnapshot, ProbeError> {
        Ok(ResourceSnapshot::new(5.0, 5.0, 0))
    }
}

struct SaturatedProbe;

impl ResourceProbe for SaturatedProbe {
    fn sample(&mut self) -> Result<ResourceSnapshot, ProbeError> {
        Ok(ResourceSnapshot::new(99.0, 99.0, 0))
    }
}

fn config(cap: usize) -> SchedulerConfig {
    SchedulerConfig {
        concurrency_cap: cap,
        mode: SchedulingMode::Queue,
        batch_size: 10,
        sample_interval: Duration::from_millis(50),
        admission_timeout: Duration::from_millis(200),
        cancel_grace: Duration::from_millis(100),
    }
}

fn policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(50))
}

fn idle_guard() -> ResourceGuard {
    ResourceGuard::new(ResourceLimits::default(), Box::new(IdleProbe))
}

fn urls(n: usize) -> Batch {
    Batch::from_urls((0..n).map(|i| format!("https://host{i}.example/")))
}

fn success(item: &WorkItem) -> Outcome {
    Outcome::Success(Success {
        item_id: item.id().clone(),
        data: PageRecord {
            url: item.payload().to_string(),
            keyword: item.keyword().map(str::to_string),
            title: "page".to_string(),
            text_content: "body".to_string(),
            headings: BTreeMap::new(),
            internal_links: vec![],
            images: vec![],
            tables: vec![],
            fetched_at: Utc::now(),
        },
        duration: Duration::from_millis(1),
    })
}

/// Tracks how many executions overlap
#[derive(Default)]
struct CountingWorker {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Worker for CountingWorker {
    async fn execute(&self, item: &WorkItem) -> Outcome {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        success(item)
    }
}

/// Fails each URL with `Network` for its scripted number of attempts
#[derive(Default)]
struct ScriptedWorker {
    failures: HashMap<String, u32>,
    calls: Mutex<HashMap<String, u32>>,
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn execute(&self, item: &WorkItem) -> Outcome {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(item.payload().to_string())
            .or_insert(0) += 1;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let failures = self.failures.get(item.payload()).copied().unwrap_or(0);
        if item.attempt() < failures {
            Outcome::failure(item, FailureKind::Network, "connection reset")
        } else {
            success(item)
        }
    }
}

struct SlowWorker;

#[async_trait]
impl Worker for SlowWorker {
    async fn execute(&self, item: &WorkItem) -> Outcome {
        tokio::time::sleep(Duration::from_secs(60)).await;
        success(item)
    }
}

/// Serves the same page for every URL and counts requests
struct StaticFetcher {
    body: String,
    calls: AtomicUsize,
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn get(&self, _url: &Url, _timeout: Duration) -> Result<FetchedPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(FetchedPage {
            status: 200,
            body: self.body.clone(),
        })
    }
}

#[tokio::test]
async fn test_every_item_gets_exactly_one_outcome() {
    let worker = Arc::new(ScriptedWorker {
        failures: HashMap::from([
            ("https://host1.example/".to_string(), 1),
            ("https://host3.example/".to_string(), 5),
        ]),
        ..Default::default()
    });
    let report = Scheduler::new(worker, policy(), idle_guard(), config(3))
        .run(urls(6))
        .await
        .unwrap();

    assert!(report.is_conserved());
    assert_eq!(report.total_submitted(), 6);
    assert_eq!(report.succeeded().len(), 5);
    assert_eq!(report.failed().len(), 1);
    assert_eq!(report.failed()[0].url, "https://host3.example/");
    assert_eq!(report.failed()[0].attempt, 2);
    assert_eq!(report.status(), RunStatus::Completed);
}

#[tokio::test]
async fn test_in_flight_never_exceeds_cap() {
    let worker = Arc::new(CountingWorker::default());
    let report = Scheduler::new(worker.clone(), policy(), idle_guard(), config(3))
        .run(urls(12))
        .await
        .unwrap();

    assert_eq!(report.succeeded().len(), 12);
    assert_eq!(worker.peak.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_waves_also_respect_cap() {
    let worker = Arc::new(CountingWorker::default());
    let mut config = config(2);
    config.mode = SchedulingMode::Waves;
    config.batch_size = 3;

    let report = Scheduler::new(worker.clone(), policy(), idle_guard(), config)
        .run(urls(7))
        .await
        .unwrap();

    assert!(report.is_conserved());
    assert_eq!(report.succeeded().len(), 7);
    assert!(worker.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test(start_paused = true)]
async fn test_saturated_resources_still_terminate() {
    let worker = Arc::new(CountingWorker::default());
    let guard = ResourceGuard::new(ResourceLimits::default(), Box::new(SaturatedProbe));

    let report = Scheduler::new(worker.clone(), policy(), guard, config(2))
        .run(urls(3))
        .await
        .unwrap();

    assert_eq!(worker.peak.load(Ordering::SeqCst), 0);
    assert_eq!(report.failed().len(), 3);
    assert!(report
        .failed()
        .iter()
        .all(|f| f.kind == FailureKind::ResourceExceeded));
    assert_eq!(report.success_rate(), 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_records_everything() {
    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(Arc::new(SlowWorker), policy(), idle_guard(), config(2))
        .with_cancellation(cancel.clone());

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let report = scheduler.run(urls(5)).await.unwrap();
    trigger.await.unwrap();

    assert_eq!(report.status(), RunStatus::Cancelled);
    assert!(report.is_conserved());
    assert_eq!(report.failed().len(), 5);
    assert!(report
        .failed()
        .iter()
        .all(|f| f.kind == FailureKind::Unknown && f.message == "cancelled" && !f.retriable));
}

#[tokio::test]
async fn test_transient_failures_recover() {
    let worker = Arc::new(ScriptedWorker {
        failures: HashMap::from([("https://c.example/".to_string(), 2)]),
        ..Default::default()
    });
    let batch = Batch::from_urls(["https://a.example/", "https://b.example/", "https://c.example/"]);

    let report = Scheduler::new(worker.clone(), policy(), idle_guard(), config(2))
        .run(batch)
        .await
        .unwrap();

    assert_eq!(report.succeeded().len(), 3);
    assert!(report.failed().is_empty());
    assert_eq!(report.success_rate(), 1.0);
    assert_eq!(
        worker.calls.lock().unwrap().get("https://c.example/"),
        Some(&3)
    );
}

#[tokio::test]
async fn test_empty_page_is_not_retried() {
    let fetcher = Arc::new(StaticFetcher {
        body: "<html><body></body></html>".to_string(),
        calls: AtomicUsize::new(0),
    });
    let worker = FetchWorker::new(
        fetcher.clone(),
        Arc::new(HtmlExtractor::new()),
        Duration::from_secs(5),
    );

    let report = Scheduler::new(Arc::new(worker), policy(), idle_guard(), config(2))
        .run(Batch::from_urls(["https://x.example/"]))
        .await
        .unwrap();

    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.failed().len(), 1);
    let failure = &report.failed()[0];
    assert_eq!(failure.kind, FailureKind::Validation);
    assert_eq!(failure.attempt, 0);
    assert!(!failure.retriable);
}

#[test]
fn test_duplicate_outcomes_are_ignored() {
    let item = WorkItem::new("https://dup.example/");
    let mut aggregator = ResultAggregator::new(1);

    assert!(aggregator.record(success(&item)));
    assert!(!aggregator.record(Outcome::failure(&item, FailureKind::Network, "late")));

    let report = aggregator.finalize(RunStatus::Completed);
    assert!(report.is_conserved());
    assert_eq!(report.succeeded().len(), 1);
    assert!(report.failed().is_empty());
}

#[tokio::test]
async fn test_end_to_end_against_http_server() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    r#"<html><head><title>Article</title></head><body>
                    <h1>Heading</h1><p>First paragraph.</p>
                    <a href="/other">Other</a>
                    </body></html>"#,
                )
                .insert_header("content-type", "text/html"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/blank"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let worker = FetchWorker::new(
        Arc::new(HttpFetcher::new(reqwest::Client::new())),
        Arc::new(HtmlExtractor::new()),
        Duration::from_secs(5),
    )
    .with_blocklist(DomainBlocklist::new(["blocked.example"]).unwrap());

    let batch = Batch::from_urls([
        format!("{base_url}/article"),
        format!("{base_url}/broken"),
        format!("{base_url}/blank"),
        "https://blocked.example/page".to_string(),
        "ftp://files.example/readme".to_string(),
    ]);

    let report = Scheduler::new(Arc::new(worker), policy(), idle_guard(), config(2))
        .run(batch)
        .await
        .unwrap();

    assert!(report.is_conserved());
    assert_eq!(report.total_submitted(), 5);
    assert_eq!(report.succeeded().len(), 1);

    let page = &report.succeeded()[0].data;
    assert_eq!(page.title, "Article");
    assert!(page.text_content.contains("First paragraph."));
    assert_eq!(page.internal_links, vec![format!("{base_url}/other")]);

    let by_url: HashMap<&str, _> = report
        .failed()
        .iter()
        .map(|f| (f.url.as_str(), f))
        .collect();

    let broken = by_url[format!("{base_url}/broken").as_str()];
    assert_eq!(broken.kind, FailureKind::Network);
    assert_eq!(broken.attempt, 2);
    assert!(broken.message.contains("503"));

    let blank = by_url[format!("{base_url}/blank").as_str()];
    assert_eq!(blank.kind, FailureKind::Validation);

    assert_eq!(
        by_url["https://blocked.example/page"].kind,
        FailureKind::Validation
    );
    assert_eq!(
        by_url["ftp://files.example/readme"].kind,
        FailureKind::Validation
    );

    let dir = tempfile::TempDir::new().unwrap();
    let sink = FileSink::new(dir.path());
    sink.write(&report, ReportFormat::Json).unwrap();
    assert!(sink.report_dir(&report).join("summary.json").exists());
}
