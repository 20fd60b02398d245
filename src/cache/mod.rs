//! Request-scoped caching layer for remote ads data.
//!
//! This module provides the caching mechanism that:
//! - Derives stable keys from (scope, range, kind)
//! - Persists payloads with expiry and access bookkeeping
//! - Classifies entries as fresh, expired or missing
//! - Refreshes from the remote with retry/backoff, serving stale data when it is down

mod coordinator;
mod entry;
mod key;
mod retry;
mod sqlite;
mod staleness;
mod storage;
mod traits;

pub use coordinator::{FetchConfig, FetchCoordinator, FetchOptions};
pub use entry::CacheEntry;
pub use key::derive_key;
pub use retry::{with_retry, RetryOutcome, RetryPolicy};
pub use sqlite::SqliteStorage;
pub use staleness::{classify, Staleness};
pub use storage::{CacheStore, MemoryStorage, NoopStorage};
pub use traits::{CacheResult, CacheSource, FetchOutcome, Payload, Warning};
