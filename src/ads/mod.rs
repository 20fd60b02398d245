//! Ads-platform vocabulary and the cached client built on it.

pub mod cached_client;
pub mod types;

pub use cached_client::CachedAdsClient;
pub use types::{AccountScope, DataKind, DatePreset, DateRange, Platform};
