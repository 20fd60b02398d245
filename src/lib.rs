//! Caching and staleness layer for advertising performance data.
//!
//! Callers ask for `(account, date range, data kind)`; the
//! [`cache::FetchCoordinator`] serves fresh cache entries, refreshes expired
//! ones from a rate-limited [`remote::RemoteDataSource`] with retry and
//! backoff, and falls back to stale data when the remote is down.

pub mod ads;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod remote;

pub use error::{Error, ErrorKind, Result};
