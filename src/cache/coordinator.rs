//! Fetch coordinator that orchestrates caching logic with remote fetching.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::entry::CacheEntry;
use super::key::derive_key;
use super::retry::{with_retry, RetryOutcome, RetryPolicy};
use super::staleness::{classify, Staleness};
use super::storage::CacheStore;
use super::traits::{CacheResult, FetchOutcome, Payload, Warning};
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::remote::{RemoteDataSource, RemoteError};

/// Explicit configuration for a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
  /// How long a written entry stays fresh
  pub ttl: Duration,
  pub retry: RetryPolicy,
}

impl Default for FetchConfig {
  fn default() -> Self {
    Self {
      ttl: Duration::from_secs(24 * 60 * 60),
      retry: RetryPolicy::default(),
    }
  }
}

impl FetchConfig {
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
  /// Skip the freshness check and always go to the remote
  pub force_refresh: bool,
  /// Abandons the call (remote request or backoff) when cancelled
  pub cancel: CancellationToken,
}

impl FetchOptions {
  pub fn refresh() -> Self {
    Self {
      force_refresh: true,
      ..Self::default()
    }
  }

  pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
    self.cancel = cancel;
    self
  }
}

/// Mediates between callers, a remote source and a cache store.
///
/// The only component allowed to call the remote. Safe to share across tasks;
/// concurrent fetches of the same key are not coalesced and the store's
/// last-writer-wins semantics settle the race.
pub struct FetchCoordinator<S: CacheStore, R: RemoteDataSource> {
  store: Arc<S>,
  remote: Arc<R>,
  clock: Arc<dyn Clock>,
  config: FetchConfig,
}

impl<S: CacheStore, R: RemoteDataSource> FetchCoordinator<S, R> {
  pub fn new(store: S, remote: R, config: FetchConfig) -> Self {
    Self::from_shared(Arc::new(store), Arc::new(remote), config)
  }

  pub fn from_shared(store: Arc<S>, remote: Arc<R>, config: FetchConfig) -> Self {
    Self {
      store,
      remote,
      clock: Arc::new(SystemClock),
      config,
    }
  }

  /// Use `clock` for freshness decisions. Stores keep their own clock.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  /// Fetch with a cache-first strategy.
  ///
  /// 1. Check cache - if fresh, record the hit and return it
  /// 2. If stale/missing (or `force_refresh`), fetch from the remote with retries
  /// 3. On success, write the cache and return the new payload
  /// 4. On retryable failure, serve the previous entry tagged stale, if any
  pub async fn fetch(
    &self,
    scope: &str,
    range_descriptor: &str,
    data_kind: &str,
    options: FetchOptions,
  ) -> Result<FetchOutcome<R::Payload>> {
    let key = derive_key(scope, range_descriptor, data_kind)?;
    let mut warnings = Vec::new();
    let mut previous = None;

    if !options.force_refresh {
      previous = self.read_entry(&key, &mut warnings);
      let verdict = classify(previous.as_ref(), self.clock.now(), self.config.ttl);

      if verdict == Staleness::Fresh {
        if let Some(entry) = &previous {
          match decode::<R::Payload>(entry) {
            Ok(data) => {
              tracing::debug!(key = %key, scope, data_kind, "cache hit");
              if let Err(e) = self.store.touch(&key) {
                tracing::warn!(key = %key, error = %e, "failed to record cache hit");
                warnings.push(Warning::new(e.kind(), e.to_string()));
              }
              return Ok(FetchOutcome::Complete(
                CacheResult::from_cache(data, entry.updated_at).with_warnings(warnings),
              ));
            }
            Err(e) => {
              tracing::warn!(key = %key, error = %e, "cached payload unreadable, refetching");
              warnings.push(Warning::new(e.kind(), e.to_string()));
            }
          }
        }
        // Unreadable entries are no use as a fallback either
        previous = None;
      } else {
        tracing::debug!(key = %key, scope, data_kind, ?verdict, "cache miss");
      }
    }

    let outcome = with_retry(&self.config.retry, &options.cancel, |_attempt| {
      self.remote.fetch(scope, range_descriptor, data_kind)
    })
    .await;

    match outcome {
      RetryOutcome::Success(data) => {
        self.write_back(&key, scope, range_descriptor, &data, &mut warnings);
        Ok(FetchOutcome::Complete(
          CacheResult::from_network(data).with_warnings(warnings),
        ))
      }
      RetryOutcome::Cancelled => {
        tracing::debug!(key = %key, "fetch cancelled");
        Ok(FetchOutcome::Cancelled)
      }
      RetryOutcome::Failed { error, attempts } => {
        if options.force_refresh {
          previous = self.read_entry(&key, &mut warnings);
        }
        self.fail(&key, error, attempts, previous, warnings)
      }
    }
  }

  fn read_entry(&self, key: &str, warnings: &mut Vec<Warning>) -> Option<CacheEntry> {
    match self.store.get(key) {
      Ok(entry) => entry,
      Err(e) => {
        tracing::warn!(key, error = %e, "cache read failed, treating as miss");
        warnings.push(Warning::new(e.kind(), e.to_string()));
        None
      }
    }
  }

  fn write_back(
    &self,
    key: &str,
    scope: &str,
    range_descriptor: &str,
    data: &R::Payload,
    warnings: &mut Vec<Warning>,
  ) {
    let written = serde_json::to_value(data)
      .map_err(Error::from)
      .and_then(|value| {
        self
          .store
          .upsert(key, scope, range_descriptor, value, self.config.ttl)
      });

    match written {
      Ok(entry) => tracing::info!(
        key,
        scope,
        size_bytes = entry.size_bytes,
        access_count = entry.access_count,
        "cache refreshed"
      ),
      Err(e) => {
        tracing::warn!(key, error = %e, "failed to persist fetched payload");
        warnings.push(Warning::new(e.kind(), e.to_string()));
      }
    }
  }

  fn fail(
    &self,
    key: &str,
    error: RemoteError,
    attempts: u32,
    previous: Option<CacheEntry>,
    mut warnings: Vec<Warning>,
  ) -> Result<FetchOutcome<R::Payload>> {
    match error {
      RemoteError::Auth(message) => return Err(Error::AuthError(message)),
      RemoteError::Validation(message) => return Err(Error::ValidationError(message)),
      _ => {}
    }

    if let Some(entry) = previous {
      match decode::<R::Payload>(&entry) {
        Ok(data) => {
          tracing::warn!(key, attempts, error = %error, "remote unavailable, serving stale entry");
          warnings.push(Warning::new(error.kind(), error.to_string()));
          return Ok(FetchOutcome::Complete(
            CacheResult::stale(data, entry.updated_at).with_warnings(warnings),
          ));
        }
        Err(e) => tracing::warn!(key, error = %e, "stale entry unreadable"),
      }
    }

    Err(Error::FetchFailed {
      attempts,
      message: error.to_string(),
    })
  }
}

impl<S: CacheStore, R: RemoteDataSource> Clone for FetchCoordinator<S, R> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      remote: Arc::clone(&self.remote),
      clock: Arc::clone(&self.clock),
      config: self.config,
    }
  }
}

fn decode<T: Payload>(entry: &CacheEntry) -> Result<T> {
  Ok(serde_json::from_value(entry.payload.clone())?)
}
