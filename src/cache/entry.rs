//! The persisted cache record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// A cached payload plus its bookkeeping metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
  pub key: String,
  /// Owning account, e.g. `meta:act_1234`
  pub scope: String,
  pub range_descriptor: String,
  pub payload: Value,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub last_accessed_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
  pub access_count: u64,
  pub size_bytes: u64,
  /// SHA-256 hex of the serialized payload
  pub checksum: String,
}

impl CacheEntry {
  /// Build a brand-new entry as written by a first upsert.
  pub fn new(
    key: &str,
    scope: &str,
    range_descriptor: &str,
    payload: Value,
    now: DateTime<Utc>,
    ttl: std::time::Duration,
  ) -> Result<Self> {
    let (size_bytes, checksum) = fingerprint(&payload)?;
    Ok(Self {
      key: key.to_string(),
      scope: scope.to_string(),
      range_descriptor: range_descriptor.to_string(),
      payload,
      created_at: now,
      updated_at: now,
      last_accessed_at: now,
      expires_at: expiry(now, ttl),
      access_count: 1,
      size_bytes,
      checksum,
    })
  }

  /// Apply a refresh write on top of an existing entry. `created_at` is kept.
  pub fn refresh(
    &mut self,
    range_descriptor: &str,
    payload: Value,
    now: DateTime<Utc>,
    ttl: std::time::Duration,
  ) -> Result<()> {
    let (size_bytes, checksum) = fingerprint(&payload)?;
    self.range_descriptor = range_descriptor.to_string();
    self.payload = payload;
    self.size_bytes = size_bytes;
    self.checksum = checksum;
    self.updated_at = now.max(self.created_at);
    self.last_accessed_at = now.max(self.created_at);
    self.expires_at = expiry(now, ttl).max(self.created_at);
    self.access_count = self.access_count.saturating_add(1);
    Ok(())
  }

  /// Record a cache hit.
  pub fn touch(&mut self, now: DateTime<Utc>) {
    self.last_accessed_at = now.max(self.created_at);
    self.access_count = self.access_count.saturating_add(1);
  }

  /// Time since the last write.
  pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
    now - self.updated_at
  }
}

/// Serialized size and checksum of a payload.
pub fn fingerprint(payload: &Value) -> Result<(u64, String)> {
  let bytes = serde_json::to_vec(payload)?;
  let digest = Sha256::digest(&bytes);
  Ok((bytes.len() as u64, hex::encode(digest)))
}

/// `now + ttl`, saturating at the far end of the representable range.
pub fn expiry(now: DateTime<Utc>, ttl: std::time::Duration) -> DateTime<Utc> {
  chrono::Duration::from_std(ttl)
    .ok()
    .and_then(|ttl| now.checked_add_signed(ttl))
    .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::{Clock, ManualClock};
  use serde_json::json;
  use std::time::Duration;

  #[test]
  fn test_new_entry_metadata() {
    let now = ManualClock::epoch().now();
    let payload = json!({"spend": 12.5, "impressions": 1000});
    let entry =
      CacheEntry::new("k", "meta:act_1", "preset:last_7d", payload.clone(), now, Duration::from_secs(60))
        .unwrap();

    assert_eq!(entry.access_count, 1);
    assert_eq!(entry.created_at, now);
    assert_eq!(entry.expires_at - now, chrono::Duration::seconds(60));
    assert_eq!(entry.size_bytes, serde_json::to_vec(&payload).unwrap().len() as u64);
    assert_eq!(entry.checksum.len(), 64);
  }

  #[test]
  fn test_refresh_preserves_created_at() {
    let clock = ManualClock::epoch();
    let created = clock.now();
    let mut entry = CacheEntry::new("k", "s", "r", json!([1]), created, Duration::from_secs(10)).unwrap();
    let old_checksum = entry.checksum.clone();

    clock.advance(chrono::Duration::seconds(30));
    entry
      .refresh("r", json!([1, 2, 3]), clock.now(), Duration::from_secs(10))
      .unwrap();

    assert_eq!(entry.created_at, created);
    assert_eq!(entry.updated_at, clock.now());
    assert_eq!(entry.access_count, 2);
    assert_ne!(entry.checksum, old_checksum);
    assert_eq!(entry.expires_at, clock.now() + chrono::Duration::seconds(10));
  }

  #[test]
  fn test_touch_leaves_payload_alone() {
    let clock = ManualClock::epoch();
    let mut entry = CacheEntry::new("k", "s", "r", json!("x"), clock.now(), Duration::from_secs(10)).unwrap();
    let before = entry.clone();

    clock.advance(chrono::Duration::seconds(1));
    entry.touch(clock.now());

    assert_eq!(entry.payload, before.payload);
    assert_eq!(entry.checksum, before.checksum);
    assert_eq!(entry.access_count, 2);
    assert_eq!(entry.last_accessed_at, clock.now());
  }

  #[test]
  fn test_expiry_saturates() {
    let now = ManualClock::epoch().now();
    assert_eq!(expiry(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
  }
}
