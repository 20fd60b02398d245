//! Cached ads client that pairs a remote source with a fetch coordinator.

use crate::cache::{
  CacheEntry, CacheStore, FetchCoordinator, FetchOptions, FetchOutcome,
};
use crate::error::Result;
use crate::remote::RemoteDataSource;

use super::types::{AccountScope, DataKind, DateRange};

/// Ads reporting client with transparent caching support.
///
/// Callers speak in accounts, date ranges and data kinds; this turns them
/// into the scope/range/kind strings the cache layer keys on.
pub struct CachedAdsClient<S: CacheStore, R: RemoteDataSource> {
  coordinator: FetchCoordinator<S, R>,
}

impl<S: CacheStore, R: RemoteDataSource> CachedAdsClient<S, R> {
  pub fn new(coordinator: FetchCoordinator<S, R>) -> Self {
    Self { coordinator }
  }

  pub async fn fetch(
    &self,
    account: &AccountScope,
    range: &DateRange,
    kind: DataKind,
    options: FetchOptions,
  ) -> Result<FetchOutcome<R::Payload>> {
    self
      .coordinator
      .fetch(
        &account.to_string(),
        &range.descriptor(),
        kind.as_str(),
        options,
      )
      .await
  }

  /// Performance rows for the account over `range`.
  pub async fn insights(
    &self,
    account: &AccountScope,
    range: &DateRange,
    options: FetchOptions,
  ) -> Result<FetchOutcome<R::Payload>> {
    self.fetch(account, range, DataKind::Insights, options).await
  }

  pub async fn campaigns(
    &self,
    account: &AccountScope,
    range: &DateRange,
    options: FetchOptions,
  ) -> Result<FetchOutcome<R::Payload>> {
    self.fetch(account, range, DataKind::Campaigns, options).await
  }

  /// Cached entries held for an account, most recently written first.
  pub fn inspect(&self, account: &AccountScope) -> Result<Vec<CacheEntry>> {
    self.coordinator.store().list_scope(&account.to_string())
  }
}

impl<S: CacheStore, R: RemoteDataSource> Clone for CachedAdsClient<S, R> {
  fn clone(&self) -> Self {
    Self {
      coordinator: self.coordinator.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ads::types::DatePreset;
  use crate::cache::{CacheSource, FetchConfig, MemoryStorage};
  use crate::remote::RemoteError;
  use async_trait::async_trait;
  use serde_json::{json, Value};

  /// Echoes the request back as the payload.
  #[derive(Default)]
  struct EchoSource;

  #[async_trait]
  impl RemoteDataSource for EchoSource {
    type Payload = Value;

    async fn fetch(&self, scope: &str, range: &str, kind: &str) -> Result<Value, RemoteError> {
      Ok(json!({ "scope": scope, "range": range, "kind": kind }))
    }
  }

  fn client() -> CachedAdsClient<MemoryStorage, EchoSource> {
    CachedAdsClient::new(FetchCoordinator::new(
      MemoryStorage::new(),
      EchoSource,
      FetchConfig::default(),
    ))
  }

  #[tokio::test]
  async fn test_insights_request_shape() {
    let client = client();
    let account: AccountScope = "meta:act_42".parse().unwrap();
    let range = DateRange::Preset(DatePreset::Last14d);

    let result = client
      .insights(&account, &range, FetchOptions::default())
      .await
      .unwrap()
      .into_result()
      .unwrap();

    assert_eq!(
      result.data,
      json!({"scope": "meta:act_42", "range": "preset:last_14d", "kind": "insights"})
    );
  }

  #[tokio::test]
  async fn test_equivalent_account_spellings_share_cache() {
    let client = client();
    let range = DateRange::Preset(DatePreset::Yesterday);
    let dashed: AccountScope = "google:123-456-7890".parse().unwrap();
    let plain: AccountScope = "google:1234567890".parse().unwrap();

    client.campaigns(&dashed, &range, FetchOptions::default()).await.unwrap();
    let second = client
      .campaigns(&plain, &range, FetchOptions::default())
      .await
      .unwrap()
      .into_result()
      .unwrap();

    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(client.inspect(&plain).unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_inspect_lists_account_entries() {
    let client = client();
    let account: AccountScope = "ecforce:shop".parse().unwrap();
    let other: AccountScope = "meta:act_1".parse().unwrap();
    let range = DateRange::Preset(DatePreset::ThisMonth);

    client.fetch(&account, &range, DataKind::Orders, FetchOptions::default()).await.unwrap();
    client.insights(&account, &range, FetchOptions::default()).await.unwrap();
    client.insights(&other, &range, FetchOptions::default()).await.unwrap();

    let entries = client.inspect(&account).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.scope == "ecforce:shop"));
  }
}
