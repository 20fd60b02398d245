//! Time source used by the stores and the coordinator.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of "now". Timestamps are truncated to millisecond precision,
/// which is what the stores persist.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
  }
}

/// Manually driven clock for tests and replay.
#[derive(Debug)]
pub struct ManualClock {
  millis: AtomicI64,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self {
      millis: AtomicI64::new(start.timestamp_millis()),
    }
  }

  /// Clock starting at a fixed, arbitrary instant.
  pub fn epoch() -> Self {
    Self::new(from_millis(1_700_000_000_000))
  }

  pub fn set(&self, at: DateTime<Utc>) {
    self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
  }

  pub fn advance(&self, by: chrono::Duration) {
    self
      .millis
      .fetch_add(by.num_milliseconds(), Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    from_millis(self.millis.load(Ordering::SeqCst))
  }
}

/// Convert epoch milliseconds into a UTC timestamp, saturating out-of-range
/// values to the epoch.
pub fn from_millis(ms: i64) -> DateTime<Utc> {
  Utc
    .timestamp_millis_opt(ms)
    .single()
    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
