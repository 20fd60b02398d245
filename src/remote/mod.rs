//! Remote data sources the coordinator refreshes from.

pub mod http;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::cache::Payload;
use crate::error::ErrorKind;

pub use http::HttpSource;

/// Failure reported by a remote source.
///
/// Anything not explicitly tagged as an auth or validation problem is
/// treated as transient and retried.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
  #[error("transient remote failure: {0}")]
  Transient(String),

  #[error("rate limited: {message}")]
  RateLimited {
    message: String,
    retry_after: Option<Duration>,
  },

  #[error("authentication rejected: {0}")]
  Auth(String),

  #[error("request invalid: {0}")]
  Validation(String),

  #[error("{0}")]
  Other(String),
}

impl RemoteError {
  pub fn is_retryable(&self) -> bool {
    !matches!(self, Self::Auth(_) | Self::Validation(_))
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Auth(_) => ErrorKind::AuthError,
      Self::Validation(_) => ErrorKind::ValidationError,
      Self::Transient(_) | Self::RateLimited { .. } | Self::Other(_) => ErrorKind::Transient,
    }
  }
}

/// An ads-platform API, or anything else that can produce a payload for a
/// `(scope, range, kind)` request.
#[async_trait]
pub trait RemoteDataSource: Send + Sync {
  type Payload: Payload;

  async fn fetch(
    &self,
    scope: &str,
    range_descriptor: &str,
    data_kind: &str,
  ) -> Result<Self::Payload, RemoteError>;
}

#[async_trait]
impl<R: RemoteDataSource + ?Sized> RemoteDataSource for std::sync::Arc<R> {
  type Payload = R::Payload;

  async fn fetch(
    &self,
    scope: &str,
    range_descriptor: &str,
    data_kind: &str,
  ) -> Result<Self::Payload, RemoteError> {
    (**self).fetch(scope, range_descriptor, data_kind).await
  }
}
