//! SQLite-backed cache store.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::entry::{expiry, fingerprint, CacheEntry};
use super::storage::CacheStore;
use crate::clock::{from_millis, Clock, SystemClock};
use crate::error::{Error, Result};

/// Schema for the cache table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    scope TEXT NOT NULL,
    range_descriptor TEXT NOT NULL,
    payload BLOB NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    last_accessed_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    access_count INTEGER NOT NULL,
    size_bytes INTEGER NOT NULL,
    checksum TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_scope ON cache_entries(scope);
CREATE INDEX IF NOT EXISTS idx_cache_entries_expires ON cache_entries(expires_at);
"#;

const COLUMNS: &str = "key, scope, range_descriptor, payload, created_at, updated_at, \
  last_accessed_at, expires_at, access_count, size_bytes, checksum";

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
  clock: Arc<dyn Clock>,
}

impl SqliteStorage {
  /// Open the cache database at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the cache database at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        Error::storage(format!(
          "failed to create cache directory {}: {}",
          parent.display(),
          e
        ))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      Error::storage(format!(
        "failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;
    conn.busy_timeout(Duration::from_secs(5))?;

    Self::from_connection(conn)
  }

  /// Private, in-memory database. Used by tests and ephemeral runs.
  pub fn open_in_memory() -> Result<Self> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
      clock: Arc::new(SystemClock),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::storage("could not determine data directory"))?;

    Ok(data_dir.join("adcache").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| Error::storage(format!("failed to run cache migrations: {}", e)))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::storage(format!("lock poisoned: {}", e)))
  }
}

/// Row as stored, before the payload is decoded.
struct RawEntry {
  key: String,
  scope: String,
  range_descriptor: String,
  payload: Vec<u8>,
  created_at: i64,
  updated_at: i64,
  last_accessed_at: i64,
  expires_at: i64,
  access_count: i64,
  size_bytes: i64,
  checksum: String,
}

impl RawEntry {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      key: row.get(0)?,
      scope: row.get(1)?,
      range_descriptor: row.get(2)?,
      payload: row.get(3)?,
      created_at: row.get(4)?,
      updated_at: row.get(5)?,
      last_accessed_at: row.get(6)?,
      expires_at: row.get(7)?,
      access_count: row.get(8)?,
      size_bytes: row.get(9)?,
      checksum: row.get(10)?,
    })
  }

  fn decode(self) -> Result<CacheEntry> {
    let payload: Value = serde_json::from_slice(&self.payload)?;
    Ok(CacheEntry {
      key: self.key,
      scope: self.scope,
      range_descriptor: self.range_descriptor,
      payload,
      created_at: from_millis(self.created_at),
      updated_at: from_millis(self.updated_at),
      last_accessed_at: from_millis(self.last_accessed_at),
      expires_at: from_millis(self.expires_at),
      access_count: self.access_count.max(0) as u64,
      size_bytes: self.size_bytes.max(0) as u64,
      checksum: self.checksum,
    })
  }
}

impl CacheStore for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
    let conn = self.lock()?;
    let raw = conn
      .query_row(
        &format!("SELECT {COLUMNS} FROM cache_entries WHERE key = ?"),
        params![key],
        RawEntry::from_row,
      )
      .optional()?;
    drop(conn);

    raw.map(RawEntry::decode).transpose()
  }

  fn upsert(
    &self,
    key: &str,
    scope: &str,
    range_descriptor: &str,
    payload: Value,
    ttl: Duration,
  ) -> Result<CacheEntry> {
    let data = serde_json::to_vec(&payload)?;
    let (size_bytes, checksum) = fingerprint(&payload)?;
    let now = self.clock.now();
    let expires_at = expiry(now, ttl);

    // One statement, so a concurrent reader sees the old row or the new one.
    let conn = self.lock()?;
    let raw = conn.query_row(
      &format!(
        "INSERT INTO cache_entries ({COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5, ?6, 1, ?7, ?8)
         ON CONFLICT(key) DO UPDATE SET
           range_descriptor = excluded.range_descriptor,
           payload = excluded.payload,
           updated_at = MAX(excluded.updated_at, cache_entries.created_at),
           last_accessed_at = MAX(excluded.last_accessed_at, cache_entries.created_at),
           expires_at = MAX(excluded.expires_at, cache_entries.created_at),
           access_count = cache_entries.access_count + 1,
           size_bytes = excluded.size_bytes,
           checksum = excluded.checksum
         RETURNING {COLUMNS}"
      ),
      params![
        key,
        scope,
        range_descriptor,
        data,
        now.timestamp_millis(),
        expires_at.timestamp_millis(),
        size_bytes as i64,
        checksum,
      ],
      RawEntry::from_row,
    )?;
    drop(conn);

    raw.decode()
  }

  fn touch(&self, key: &str) -> Result<()> {
    let now = self.clock.now().timestamp_millis();
    self.lock()?.execute(
      "UPDATE cache_entries
       SET last_accessed_at = MAX(?1, created_at), access_count = access_count + 1
       WHERE key = ?2",
      params![now, key],
    )?;
    Ok(())
  }

  fn list_scope(&self, scope: &str) -> Result<Vec<CacheEntry>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(&format!(
      "SELECT {COLUMNS} FROM cache_entries WHERE scope = ? ORDER BY updated_at DESC"
    ))?;
    let rows = stmt
      .query_map(params![scope], RawEntry::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);
    drop(conn);

    rows.into_iter().map(RawEntry::decode).collect()
  }

  fn purge_expired(&self) -> Result<usize> {
    let now = self.clock.now().timestamp_millis();
    let removed = self
      .lock()?
      .execute("DELETE FROM cache_entries WHERE expires_at <= ?", params![now])?;
    Ok(removed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use serde_json::json;

  const TTL: Duration = Duration::from_secs(24 * 60 * 60);

  fn store() -> (Arc<ManualClock>, SqliteStorage) {
    let clock = Arc::new(ManualClock::epoch());
    let storage = SqliteStorage::open_in_memory()
      .unwrap()
      .with_clock(clock.clone());
    (clock, storage)
  }

  #[test]
  fn test_upsert_then_get_returns_payload() {
    let (clock, storage) = store();
    let payload = json!({"data": [{"ad_id": "9", "frequency": 3.4, "ctr": 0.008}]});

    let written = storage
      .upsert("k", "meta:act_1", "preset:last_7d", payload.clone(), TTL)
      .unwrap();
    let read = storage.get("k").unwrap().unwrap();

    assert_eq!(read.payload, payload);
    assert_eq!(read, written);
    assert_eq!(read.access_count, 1);
    assert_eq!(read.created_at, clock.now());
    assert_eq!(read.expires_at, clock.now() + chrono::Duration::days(1));
  }

  #[test]
  fn test_get_missing() {
    let (_, storage) = store();
    assert!(storage.get("nope").unwrap().is_none());
  }

  #[test]
  fn test_upsert_existing_preserves_created_at() {
    let (clock, storage) = store();
    let first = storage.upsert("k", "s", "r", json!([1]), TTL).unwrap();

    clock.advance(chrono::Duration::hours(1));
    let second = storage.upsert("k", "s", "r", json!([1, 2]), TTL).unwrap();

    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.updated_at, clock.now());
    assert_eq!(second.last_accessed_at, clock.now());
    assert_eq!(second.expires_at, clock.now() + chrono::Duration::days(1));
    assert_eq!(second.access_count, 2);
    assert_ne!(second.checksum, first.checksum);
    assert_eq!(second.size_bytes, 5);
  }

  #[test]
  fn test_touch() {
    let (clock, storage) = store();
    storage.upsert("k", "s", "r", json!("v"), TTL).unwrap();

    clock.advance(chrono::Duration::minutes(3));
    storage.touch("k").unwrap();
    storage.touch("missing").unwrap();

    let entry = storage.get("k").unwrap().unwrap();
    assert_eq!(entry.access_count, 2);
    assert_eq!(entry.last_accessed_at, clock.now());
    assert_eq!(entry.payload, json!("v"));
  }

  #[test]
  fn test_list_scope_and_purge() {
    let (clock, storage) = store();
    storage
      .upsert("a", "meta:act_1", "preset:today", json!(1), Duration::from_secs(60))
      .unwrap();
    clock.advance(chrono::Duration::seconds(1));
    storage.upsert("b", "meta:act_1", "preset:yesterday", json!(2), TTL).unwrap();
    storage.upsert("c", "google:42", "preset:today", json!(3), TTL).unwrap();

    let listed: Vec<_> = storage
      .list_scope("meta:act_1")
      .unwrap()
      .into_iter()
      .map(|e| e.key)
      .collect();
    assert_eq!(listed, vec!["b", "a"]);

    clock.advance(chrono::Duration::minutes(5));
    assert_eq!(storage.purge_expired().unwrap(), 1);
    assert!(storage.get("a").unwrap().is_none());
    assert_eq!(storage.list_scope("meta:act_1").unwrap().len(), 1);
  }

  #[test]
  fn test_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    {
      let storage = SqliteStorage::open_at(&path).unwrap();
      storage
        .upsert("k", "ecforce:shop", "preset:this_month", json!({"orders": 12}), TTL)
        .unwrap();
    }

    let storage = SqliteStorage::open_at(&path).unwrap();
    let entry = storage.get("k").unwrap().unwrap();
    assert_eq!(entry.payload, json!({"orders": 12}));
    assert_eq!(entry.scope, "ecforce:shop");
  }

  #[test]
  fn test_concurrent_upserts_keep_rows_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(SqliteStorage::open_at(&dir.path().join("cache.db")).unwrap());

    let handles: Vec<_> = (0..8)
      .map(|i| {
        let storage = storage.clone();
        std::thread::spawn(move || {
          let payload = json!({ "writer": i, "rows": vec![i; 64] });
          storage.upsert("shared", "s", "r", payload, TTL).unwrap();
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }

    let entry = storage.get("shared").unwrap().unwrap();
    let (size, checksum) = fingerprint(&entry.payload).unwrap();
    assert_eq!(entry.size_bytes, size);
    assert_eq!(entry.checksum, checksum);
    assert_eq!(entry.access_count, 8);
  }
}
