//! Retry logic with exponential backoff

use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::remote::RemoteError;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first. Zero still makes one attempt.
  pub max_retries: u32,
  /// Delay before the second attempt
  pub base_backoff: Duration,
  /// Upper bound for any single delay
  pub max_backoff: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_backoff: Duration::from_secs(1),
      max_backoff: Duration::from_secs(10),
    }
  }
}

impl RetryPolicy {
  pub fn attempts(&self) -> u32 {
    self.max_retries.max(1)
  }

  /// Doubling schedule from `base_backoff`, capped at `max_backoff`.
  ///
  /// No jitter, and no elapsed-time limit: `max_retries` bounds the loop.
  pub fn schedule(&self) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
      .with_initial_interval(self.base_backoff)
      .with_max_interval(self.max_backoff)
      .with_multiplier(2.0)
      .with_randomization_factor(0.0)
      .with_max_elapsed_time(None)
      .build()
  }

  /// Next delay after a failure with `err`. Rate-limit hints replace the
  /// scheduled delay but are still capped at `max_backoff`.
  fn next_delay(&self, schedule: &mut ExponentialBackoff, err: &RemoteError) -> Duration {
    let scheduled = schedule.next_backoff().unwrap_or(self.max_backoff);
    match err {
      RemoteError::RateLimited {
        retry_after: Some(hint),
        ..
      } => (*hint).min(self.max_backoff),
      _ => scheduled,
    }
  }
}

/// How a retried operation ended.
#[derive(Debug)]
pub enum RetryOutcome<T> {
  Success(T),
  /// The last error and how many attempts were made.
  Failed { error: RemoteError, attempts: u32 },
  Cancelled,
}

/// Execute an async operation with retry logic.
///
/// Non-retryable errors end the loop immediately. Cancellation is observed
/// before each attempt, while an attempt is in flight, and during backoff.
pub async fn with_retry<T, F, Fut>(
  policy: &RetryPolicy,
  cancel: &CancellationToken,
  mut operation: F,
) -> RetryOutcome<T>
where
  F: FnMut(u32) -> Fut,
  Fut: Future<Output = Result<T, RemoteError>>,
{
  let max_attempts = policy.attempts();
  let mut schedule = policy.schedule();
  let mut attempt = 0;

  loop {
    attempt += 1;
    if cancel.is_cancelled() {
      return RetryOutcome::Cancelled;
    }

    let result = tokio::select! {
      biased;
      _ = cancel.cancelled() => return RetryOutcome::Cancelled,
      result = operation(attempt) => result,
    };

    let error = match result {
      Ok(value) => return RetryOutcome::Success(value),
      Err(e) => e,
    };

    if !error.is_retryable() || attempt >= max_attempts {
      return RetryOutcome::Failed {
        error,
        attempts: attempt,
      };
    }

    let delay = policy.next_delay(&mut schedule, &error);
    tracing::warn!(
      attempt,
      max_attempts,
      delay_ms = delay.as_millis() as u64,
      error = %error,
      "remote fetch failed, retrying"
    );

    tokio::select! {
      biased;
      _ = cancel.cancelled() => return RetryOutcome::Cancelled,
      _ = tokio::time::sleep(delay) => {}
    }
  }
}
