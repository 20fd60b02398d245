//! Freshness classification for cache entries.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::entry::CacheEntry;

/// Verdict on whether a cache entry may be served as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
  /// No entry at this key
  Missing,
  /// Entry can be served without contacting the remote
  Fresh,
  /// Entry exists but must be refreshed; usable only as a fallback
  Expired,
}

/// Classify an entry as of `now`.
///
/// An entry is expired once `now` reaches `expires_at` (the boundary itself
/// is expired), or once it is at least `ttl` old. The second rule lets a
/// shortened TTL apply to rows written under an older, longer one.
pub fn classify(entry: Option<&CacheEntry>, now: DateTime<Utc>, ttl: Duration) -> Staleness {
  let Some(entry) = entry else {
    return Staleness::Missing;
  };

  if now >= entry.expires_at {
    return Staleness::Expired;
  }

  match chrono::Duration::from_std(ttl) {
    Ok(ttl) if entry.age(now) >= ttl => Staleness::Expired,
    _ => Staleness::Fresh,
  }
}
