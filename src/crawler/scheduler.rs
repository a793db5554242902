//! Scheduler for admitting, dispatching and retrying work items
//!
//! This module handles:
//! - FIFO admission across fresh items and retry re-queues
//! - Global concurrency limiting (at most `concurrency_cap` in flight)
//! - Resource backpressure through the `ResourceGuard`
//! - Non-blocking retry delays
//! - Cooperative cancellation with a grace period
//!
//! All item state lives on the scheduler's own loop. Workers run as separate
//! tasks and report back over a single channel, so nothing here is locked.

use crate::config::{SchedulerSettings, SchedulingMode};
use crate::crawler::retry::{RetryDecision, RetryPolicy};
use crate::crawler::worker::Worker;
use crate::output::{KeywordFailure, ResultAggregator, RunReport};
use crate::resources::ResourceGuard;
use crate::state::{Batch, Failure, FailureKind, ItemState, Outcome, WorkItem};
use crate::storage::RunStatus;
use crate::ScrapeError;
use std::collections::{HashMap, VecDeque};
use std::future::poll_fn;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{debug, error, info, warn};

/// Scheduler tuning, usually built from [`SchedulerSettings`]
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub concurrency_cap: usize,
    pub mode: SchedulingMode,
    pub batch_size: usize,
    /// How long to wait before re-checking a denied admission
    pub sample_interval: Duration,
    /// How long admission may stay denied with nothing in flight
    pub admission_timeout: Duration,
    /// How long in-flight work may run on after cancellation
    pub cancel_grace: Duration,
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            concurrency_cap: settings.concurrency_cap.max(1),
            mode: settings.mode,
            batch_size: settings.batch_size.max(1),
            sample_interval: settings.sample_interval(),
            admission_timeout: settings.admission_timeout(),
            cancel_grace: settings.cancel_grace(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&SchedulerSettings::default())
    }
}

/// A worker's result travelling back to the scheduler loop
struct Completion {
    index: usize,
    item: WorkItem,
    outcome: Outcome,
}

/// Drives one batch to completion
///
/// The scheduler:
/// 1. Admits queued items while a slot is free and the guard allows it
/// 2. Runs each admitted item on its own task through the `Worker`
/// 3. Routes retriable failures through the `RetryPolicy`, re-queueing at the
///    back of the FIFO once the delay elapses
/// 4. Records every terminal outcome exactly once in a `ResultAggregator`
///
/// # Example
///
/// ```no_run
/// use scrapeflow::crawler::{FetchWorker, HtmlExtractor, HttpFetcher, Scheduler, SchedulerConfig};
/// use scrapeflow::config::NetworkSettings;
/// use scrapeflow::resources::{ProcProbe, ResourceGuard, ResourceLimits};
/// use scrapeflow::state::Batch;
/// use scrapeflow::RetryPolicy;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), scrapeflow::ScrapeError> {
/// let fetcher = HttpFetcher::from_settings(&NetworkSettings::default())?;
/// let worker = FetchWorker::new(Arc::new(fetcher), Arc::new(HtmlExtractor), Duration::from_secs(30));
/// let guard = ResourceGuard::new(ResourceLimits::default(), Box::new(ProcProbe::new()));
///
/// let scheduler = Scheduler::new(Arc::new(worker), RetryPolicy::default(), guard, SchedulerConfig::default());
/// let report = scheduler.run(Batch::from_urls(["https://example.com/"])).await?;
/// println!("{:.0}% succeeded", report.success_rate() * 100.0);
/// # Ok(())
/// # }
/// ```
pub struct Scheduler {
    worker: Arc<dyn Worker>,
    policy: RetryPolicy,
    guard: ResourceGuard,
    config: SchedulerConfig,
    cancel: CancellationToken,
    keyword_failures: Vec<KeywordFailure>,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `worker` - Executes one attempt of an item
    /// * `policy` - Decides retries for failed attempts
    /// * `guard` - Admission control; owned for the lifetime of the run
    /// * `config` - Concurrency cap, scheduling mode and timing
    pub fn new(
        worker: Arc<dyn Worker>,
        policy: RetryPolicy,
        guard: ResourceGuard,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            worker,
            policy,
            guard,
            config,
            cancel: CancellationToken::new(),
            keyword_failures: Vec::new(),
        }
    }

    /// Uses an externally owned token to request cancellation
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Carries keyword expansion failures into the final report
    pub fn with_keyword_failures(mut self, failures: Vec<KeywordFailure>) -> Self {
        self.keyword_failures = failures;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the batch until every item is terminal
    ///
    /// # Returns
    ///
    /// * `Ok(RunReport)` - Every submitted item has exactly one outcome
    /// * `Err(ScrapeError::Bookkeeping)` - The scheduler's own state became
    ///   inconsistent; the error carries the partial report
    pub async fn run(mut self, batch: Batch) -> Result<RunReport, ScrapeError> {
        let items = batch.into_items();
        info!(
            items = items.len(),
            concurrency_cap = self.config.concurrency_cap,
            mode = ?self.config.mode,
            "Starting batch"
        );

        let mut run = RunState::new(items, &self.config);
        for failure in std::mem::take(&mut self.keyword_failures) {
            run.aggregator.record_keyword_failure(failure);
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        match self.drive(&mut run, &tx, &mut rx).await {
            Ok(status) => {
                let report = run.aggregator.finalize(status);
                info!(
                    run_id = report.run_id(),
                    succeeded = report.succeeded().len(),
                    failed = report.failed().len(),
                    success_rate = report.success_rate(),
                    peak_in_flight = run.peak_in_flight,
                    status = %status,
                    "Batch finished"
                );
                Ok(report)
            }
            Err(message) => {
                run.abort_in_flight();
                error!(%message, "Scheduler bookkeeping fault; returning partial report");
                Err(ScrapeError::Bookkeeping {
                    message,
                    partial: Box::new(run.aggregator.finalize(RunStatus::Partial)),
                })
            }
        }
    }

    /// The coordinating loop; a returned `Err` is a bookkeeping fault
    async fn drive(
        &mut self,
        run: &mut RunState,
        tx: &UnboundedSender<Completion>,
        rx: &mut UnboundedReceiver<Completion>,
    ) -> Result<RunStatus, String> {
        let mut stalled_since: Option<Instant> = None;
        let mut grace_deadline: Option<Instant> = None;
        let mut aborted = false;

        loop {
            if grace_deadline.is_none() && self.cancel.is_cancelled() {
                warn!(
                    in_flight = run.in_flight.len(),
                    grace_secs = self.config.cancel_grace.as_secs_f64(),
                    "Cancellation requested; admitting no new work"
                );
                grace_deadline = Some(Instant::now() + self.config.cancel_grace);
                run.cancel_pending()?;
            }

            let mut denied = false;
            if grace_deadline.is_none() {
                run.release_wave(&self.config);
                denied = self.admit_ready(run, tx)?;
            }

            if run.is_drained() {
                break;
            }

            let mut recheck = self.config.sample_interval;
            if denied && run.in_flight.is_empty() {
                let since = *stalled_since.get_or_insert_with(Instant::now);
                let stalled = since.elapsed();
                if stalled >= self.config.admission_timeout {
                    run.fail_stalled_head(&self.policy, stalled)?;
                    // Each stall period charges only the head item
                    stalled_since = Some(Instant::now());
                    continue;
                }
                recheck = recheck.min(self.config.admission_timeout - stalled);
            } else {
                stalled_since = None;
            }

            tokio::select! {
                Some(completion) = rx.recv() => {
                    run.complete(completion, &self.policy, grace_deadline.is_some())?;
                }
                Some(expired) = poll_fn(|cx| run.retries.poll_expired(cx)), if !run.retries.is_empty() => {
                    run.requeue(expired.into_inner())?;
                }
                // Handled at the top of the loop
                _ = self.cancel.cancelled(), if grace_deadline.is_none() => {}
                _ = sleep(recheck), if denied => {}
                _ = sleep_until(grace_deadline.unwrap_or_else(Instant::now)), if grace_deadline.is_some() && !aborted => {
                    warn!(in_flight = run.in_flight.len(), "Grace period over; aborting in-flight work");
                    run.abort_in_flight();
                    aborted = true;
                }
            }
        }

        if !run.aggregator.is_complete() {
            return Err(format!(
                "{} items never reached a terminal outcome",
                run.aggregator.pending()
            ));
        }

        Ok(if grace_deadline.is_some() {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        })
    }

    /// Dispatches queued items into free slots
    ///
    /// Returns true if the guard refused admission while work was waiting.
    fn admit_ready(
        &mut self,
        run: &mut RunState,
        tx: &UnboundedSender<Completion>,
    ) -> Result<bool, String> {
        while run.in_flight.len() < self.config.concurrency_cap && !run.queue.is_empty() {
            if !self.guard.admit(run.in_flight.len()) {
                return Ok(true);
            }
            let Some((index, item)) = run.queue.pop_front() else {
                break;
            };
            run.transition(index, ItemState::InFlight)?;
            run.dispatch(index, item, &self.worker, tx);
        }
        Ok(false)
    }
}

/// Mutable per-run bookkeeping, touched only by the scheduler loop
struct RunState {
    /// Indexed by submission order
    states: Vec<ItemState>,
    queue: VecDeque<(usize, WorkItem)>,
    /// Items not yet released into the queue (waves mode)
    backlog: VecDeque<(usize, WorkItem)>,
    retries: DelayQueue<usize>,
    awaiting_retry: HashMap<usize, WorkItem>,
    in_flight: HashMap<usize, AbortHandle>,
    peak_in_flight: usize,
    aggregator: ResultAggregator,
}

impl RunState {
    fn new(items: Vec<WorkItem>, config: &SchedulerConfig) -> Self {
        let total = items.len();
        let indexed: VecDeque<_> = items.into_iter().enumerate().collect();
        let (queue, backlog) = match config.mode {
            SchedulingMode::Queue => (indexed, VecDeque::new()),
            SchedulingMode::Waves => (VecDeque::new(), indexed),
        };

        Self {
            states: vec![ItemState::Queued; total],
            queue,
            backlog,
            retries: DelayQueue::new(),
            awaiting_retry: HashMap::new(),
            in_flight: HashMap::new(),
            peak_in_flight: 0,
            aggregator: ResultAggregator::new(total),
        }
    }

    fn is_drained(&self) -> bool {
        self.queue.is_empty()
            && self.backlog.is_empty()
            && self.awaiting_retry.is_empty()
            && self.in_flight.is_empty()
    }

    fn transition(&mut self, index: usize, next: ItemState) -> Result<(), String> {
        let current = self
            .states
            .get_mut(index)
            .ok_or_else(|| format!("no item at submission index {index}"))?;
        if !current.can_transition_to(next) {
            return Err(format!(
                "item {index} cannot move from {current} to {next}"
            ));
        }
        *current = next;
        Ok(())
    }

    /// Moves the next wave into the queue once the current one is terminal
    fn release_wave(&mut self, config: &SchedulerConfig) {
        if self.backlog.is_empty()
            || !self.queue.is_empty()
            || !self.in_flight.is_empty()
            || !self.awaiting_retry.is_empty()
        {
            return;
        }

        let size = config.batch_size.min(self.backlog.len());
        self.queue.extend(self.backlog.drain(..size));
        info!(
            wave_size = size,
            remaining = self.backlog.len(),
            "Releasing next wave"
        );
    }

    fn dispatch(
        &mut self,
        index: usize,
        item: WorkItem,
        worker: &Arc<dyn Worker>,
        tx: &UnboundedSender<Completion>,
    ) {
        debug!(item = %item.id(), attempt = item.attempt(), in_flight = self.in_flight.len() + 1, "Dispatching");

        let worker = Arc::clone(worker);
        let task_item = item.clone();
        let handle = tokio::spawn(async move { worker.execute(&task_item).await });
        self.in_flight.insert(index, handle.abort_handle());
        self.peak_in_flight = self.peak_in_flight.max(self.in_flight.len());

        // Supervises the worker task so panics and aborts still produce an outcome
        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => Outcome::Failure(Failure::cancelled(&item)),
                Err(_) => Outcome::failure(&item, FailureKind::Unknown, "worker panicked"),
            };
            let _ = tx.send(Completion {
                index,
                item,
                outcome,
            });
        });
    }

    fn complete(
        &mut self,
        completion: Completion,
        policy: &RetryPolicy,
        cancelling: bool,
    ) -> Result<(), String> {
        let Completion {
            index,
            item,
            outcome,
        } = completion;

        if self.in_flight.remove(&index).is_none() {
            return Err(format!("completion for {} which is not in flight", item.id()));
        }

        let outcome = if outcome.item_id() == item.id() {
            outcome
        } else {
            Outcome::failure(
                &item,
                FailureKind::Unknown,
                format!("worker returned an outcome for {}", outcome.item_id()),
            )
        };

        match outcome {
            Outcome::Success(success) => {
                self.transition(index, ItemState::Succeeded)?;
                debug!(item = %item.id(), attempt = item.attempt(), "Succeeded");
                self.aggregator.record(Outcome::Success(success));
            }
            Outcome::Failure(failure) if !failure.retriable => {
                self.transition(index, ItemState::GivenUp)?;
                warn!(item = %item.id(), kind = %failure.kind, message = %failure.message, "Failed without retry");
                self.aggregator.record(Outcome::Failure(failure));
            }
            Outcome::Failure(_) if cancelling => {
                self.transition(index, ItemState::GivenUp)?;
                self.aggregator
                    .record(Outcome::Failure(Failure::cancelled(&item)));
            }
            Outcome::Failure(failure) => self.retry_or_give_up(index, item, failure, policy)?,
        }
        Ok(())
    }

    fn retry_or_give_up(
        &mut self,
        index: usize,
        mut item: WorkItem,
        failure: Failure,
        policy: &RetryPolicy,
    ) -> Result<(), String> {
        let attempts = failure.attempt + 1;
        match policy.decide(attempts, failure.kind) {
            RetryDecision::Retry(delay) => {
                self.transition(index, ItemState::AwaitingRetry)?;
                info!(
                    item = %item.id(),
                    attempts,
                    kind = %failure.kind,
                    delay_ms = delay.as_millis() as u64,
                    "Retry scheduled"
                );
                item.advance_attempt();
                self.retries.insert(index, delay);
                self.awaiting_retry.insert(index, item);
            }
            RetryDecision::GiveUp => {
                self.transition(index, ItemState::GivenUp)?;
                warn!(
                    item = %item.id(),
                    attempts,
                    kind = %failure.kind,
                    message = %failure.message,
                    "Giving up"
                );
                self.aggregator.record(Outcome::Failure(failure));
            }
        }
        Ok(())
    }

    /// Puts an item whose retry delay elapsed at the back of the queue
    fn requeue(&mut self, index: usize) -> Result<(), String> {
        let item = self
            .awaiting_retry
            .remove(&index)
            .ok_or_else(|| format!("retry fired for item {index} which is not awaiting one"))?;
        self.transition(index, ItemState::Queued)?;
        debug!(item = %item.id(), attempt = item.attempt(), "Re-queued after backoff");
        self.queue.push_back((index, item));
        Ok(())
    }

    /// Fails the head of the queue after admission stayed denied too long
    fn fail_stalled_head(&mut self, policy: &RetryPolicy, stalled: Duration) -> Result<(), String> {
        let Some((index, item)) = self.queue.pop_front() else {
            return Ok(());
        };
        let failure = Failure::new(
            &item,
            FailureKind::ResourceExceeded,
            format!(
                "admission denied for {:.1}s under resource pressure",
                stalled.as_secs_f64()
            ),
        );
        self.retry_or_give_up(index, item, failure, policy)
    }

    /// Resolves everything not in flight as cancelled
    fn cancel_pending(&mut self) -> Result<(), String> {
        self.retries.clear();

        let mut pending: Vec<(usize, WorkItem)> = self
            .queue
            .drain(..)
            .chain(self.backlog.drain(..))
            .chain(self.awaiting_retry.drain())
            .collect();
        pending.sort_by_key(|(index, _)| *index);

        for (index, item) in pending {
            self.transition(index, ItemState::GivenUp)?;
            self.aggregator
                .record(Outcome::Failure(Failure::cancelled(&item)));
        }
        Ok(())
    }

    fn abort_in_flight(&self) {
        for handle in self.in_flight.values() {
            handle.abort();
        }
    }
}
