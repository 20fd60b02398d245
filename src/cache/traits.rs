//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::ErrorKind;

/// Trait for values that can be cached.
///
/// The cache never looks inside a payload; it only serializes it for storage
/// and size/checksum bookkeeping.
pub trait Payload: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Payload for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was last written to the cache (if it came from the cache)
  pub cached_at: Option<DateTime<Utc>>,
  /// Non-fatal problems encountered while producing `data`
  pub warnings: Vec<Warning>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
      warnings: Vec::new(),
    }
  }

  /// Create a new cache result from a fresh cache hit.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
      warnings: Vec::new(),
    }
  }

  /// Create a new cache result serving an out-of-date entry because the
  /// remote could not be reached.
  pub fn stale(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Stale,
      cached_at: Some(cached_at),
      warnings: Vec::new(),
    }
  }

  pub fn with_warnings(mut self, warnings: Vec<Warning>) -> Self {
    self.warnings.extend(warnings);
    self
  }

  pub fn is_stale(&self) -> bool {
    self.source == CacheSource::Stale
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from the remote source
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Data from cache past its expiry, served because the refresh failed
  Stale,
}

impl CacheSource {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Network => "network",
      Self::CacheFresh => "cache",
      Self::Stale => "stale",
    }
  }
}

/// A problem that did not prevent the call from producing data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
  pub kind: ErrorKind,
  pub message: String,
}

impl Warning {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }
}

impl std::fmt::Display for Warning {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "[{}] {}", self.kind, self.message)
  }
}

/// Terminal outcome of a coordinated fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome<T> {
  /// Data was produced, from cache or network
  Complete(CacheResult<T>),
  /// The caller cancelled before a result was committed
  Cancelled,
}

impl<T> FetchOutcome<T> {
  pub fn is_cancelled(&self) -> bool {
    matches!(self, Self::Cancelled)
  }

  /// The completed result, if any.
  pub fn into_result(self) -> Option<CacheResult<T>> {
    match self {
      Self::Complete(result) => Some(result),
      Self::Cancelled => None,
    }
  }
}
