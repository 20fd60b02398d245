//! Cache storage trait and in-process implementations.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::entry::CacheEntry;
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};

/// Trait for cache storage backends.
///
/// Implementations must keep each upsert atomic per key: a concurrent reader
/// sees either the previous record or the new one, never a mix.
pub trait CacheStore: Send + Sync {
  /// Read an entry. No bookkeeping side effects.
  fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

  /// Insert or refresh the entry at `key`, expiring `ttl` from now.
  fn upsert(
    &self,
    key: &str,
    scope: &str,
    range_descriptor: &str,
    payload: Value,
    ttl: Duration,
  ) -> Result<CacheEntry>;

  /// Record a cache hit. A missing key is a no-op.
  fn touch(&self, key: &str) -> Result<()>;

  /// All entries belonging to a scope, most recently written first.
  fn list_scope(&self, scope: &str) -> Result<Vec<CacheEntry>>;

  /// Physically remove expired rows. Returns how many were removed.
  fn purge_expired(&self) -> Result<usize>;
}

impl<S: CacheStore + ?Sized> CacheStore for Arc<S> {
  fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
    (**self).get(key)
  }

  fn upsert(
    &self,
    key: &str,
    scope: &str,
    range_descriptor: &str,
    payload: Value,
    ttl: Duration,
  ) -> Result<CacheEntry> {
    (**self).upsert(key, scope, range_descriptor, payload, ttl)
  }

  fn touch(&self, key: &str) -> Result<()> {
    (**self).touch(key)
  }

  fn list_scope(&self, scope: &str) -> Result<Vec<CacheEntry>> {
    (**self).list_scope(scope)
  }

  fn purge_expired(&self) -> Result<usize> {
    (**self).purge_expired()
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage {
  clock: Arc<dyn Clock>,
}

impl NoopStorage {
  pub fn new() -> Self {
    Self {
      clock: Arc::new(SystemClock),
    }
  }
}

impl Default for NoopStorage {
  fn default() -> Self {
    Self::new()
  }
}

impl CacheStore for NoopStorage {
  fn get(&self, _key: &str) -> Result<Option<CacheEntry>> {
    Ok(None) // Always miss
  }

  fn upsert(
    &self,
    key: &str,
    scope: &str,
    range_descriptor: &str,
    payload: Value,
    ttl: Duration,
  ) -> Result<CacheEntry> {
    // Discard, but report what would have been written
    CacheEntry::new(key, scope, range_descriptor, payload, self.clock.now(), ttl)
  }

  fn touch(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn list_scope(&self, _scope: &str) -> Result<Vec<CacheEntry>> {
    Ok(Vec::new())
  }

  fn purge_expired(&self) -> Result<usize> {
    Ok(0)
  }
}

/// Mutex-guarded in-memory store.
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, CacheEntry>>,
  clock: Arc<dyn Clock>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::with_clock(Arc::new(SystemClock))
  }

  pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      clock,
    }
  }

  /// Number of stored entries, expired ones included.
  pub fn len(&self) -> usize {
    self.entries.lock().map(|e| e.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CacheEntry>>> {
    self
      .entries
      .lock()
      .map_err(|e| Error::storage(format!("lock poisoned: {}", e)))
  }
}

impl Default for MemoryStorage {
  fn default() -> Self {
    Self::new()
  }
}

impl CacheStore for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
    Ok(self.lock()?.get(key).cloned())
  }

  fn upsert(
    &self,
    key: &str,
    scope: &str,
    range_descriptor: &str,
    payload: Value,
    ttl: Duration,
  ) -> Result<CacheEntry> {
    let now = self.clock.now();
    let mut entries = self.lock()?;

    // Build the new record before swapping it in so a failure leaves the old one intact
    let entry = match entries.get(key) {
      Some(existing) => {
        let mut updated = existing.clone();
        updated.refresh(range_descriptor, payload, now, ttl)?;
        updated
      }
      None => CacheEntry::new(key, scope, range_descriptor, payload, now, ttl)?,
    };

    entries.insert(key.to_string(), entry.clone());
    Ok(entry)
  }

  fn touch(&self, key: &str) -> Result<()> {
    let now = self.clock.now();
    if let Some(entry) = self.lock()?.get_mut(key) {
      entry.touch(now);
    }
    Ok(())
  }

  fn list_scope(&self, scope: &str) -> Result<Vec<CacheEntry>> {
    let mut found: Vec<CacheEntry> = self
      .lock()?
      .values()
      .filter(|e| e.scope == scope)
      .cloned()
      .collect();
    found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(found)
  }

  fn purge_expired(&self) -> Result<usize> {
    let now = self.clock.now();
    let mut entries = self.lock()?;
    let before = entries.len();
    entries.retain(|_, e| e.expires_at > now);
    Ok(before - entries.len())
  }
}
