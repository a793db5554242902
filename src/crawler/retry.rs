//! Retry decisions for failed attempts

use crate::config::{RetrySettings, SchedulerSettings};
use crate::state::FailureKind;
use std::time::Duration;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-queue the item once the delay has elapsed
    Retry(Duration),
    /// Record the failure as terminal
    GiveUp,
}

/// Pure retry policy: linear backoff with a retry cap
///
/// | Condition | Decision |
/// |-----------|----------|
/// | `Validation` | GiveUp, whatever the attempt count |
/// | `Unknown` | GiveUp (not retriable) |
/// | `attempts >= max_retries` | GiveUp |
/// | `ResourceExceeded` | Retry after the fixed resource delay |
/// | `Network`, `Timeout` | Retry after `retry_delay * attempts` |
///
/// The same inputs always give the same decision; there is no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    retry_delay: Duration,
    resource_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration, resource_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
            resource_delay,
        }
    }

    /// Builds the policy from config; the resource delay is the sampling interval
    pub fn from_settings(retry: &RetrySettings, scheduler: &SchedulerSettings) -> Self {
        Self::new(
            retry.max_retries,
            retry.retry_delay(),
            scheduler.sample_interval(),
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Linear backoff for the given number of attempts made so far
    ///
    /// # Example
    ///
    /// ```
    /// use scrapeflow::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(5, Duration::from_secs(5), Duration::from_secs(10));
    /// assert_eq!(policy.backoff(2), Duration::from_secs(10));
    /// ```
    pub fn backoff(&self, attempts: u32) -> Duration {
        self.retry_delay.saturating_mul(attempts.max(1))
    }

    /// Decides whether to retry after `attempts` attempts ended in a `kind` failure
    pub fn decide(&self, attempts: u32, kind: FailureKind) -> RetryDecision {
        if !kind.is_retriable() || attempts >= self.max_retries {
            return RetryDecision::GiveUp;
        }

        match kind {
            FailureKind::ResourceExceeded => RetryDecision::Retry(self.resource_delay),
            _ => RetryDecision::Retry(self.backoff(attempts)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default(), &SchedulerSettings::default())
    }
}
