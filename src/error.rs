//! Error taxonomy for the cache layer.

use std::fmt;

use thiserror::Error;

/// Convenience alias used throughout the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the cache layer to its callers.
#[derive(Debug, Error)]
pub enum Error {
  /// Key derivation inputs were malformed. Never retried.
  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  /// The cache store could not be reached or failed mid-operation.
  #[error("cache storage unavailable: {0}")]
  StorageUnavailable(String),

  /// The remote source rejected our credentials.
  #[error("authentication failed: {0}")]
  AuthError(String),

  /// The remote source rejected the request as malformed.
  #[error("request rejected by remote: {0}")]
  ValidationError(String),

  /// Retries were exhausted and there was no cached fallback.
  #[error("fetch failed after {attempts} attempt(s): {message}")]
  FetchFailed { attempts: u32, message: String },

  /// A payload could not be (de)serialized.
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Machine-readable kind, for callers deciding on a retry affordance.
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
      Self::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
      Self::AuthError(_) => ErrorKind::AuthError,
      Self::ValidationError(_) => ErrorKind::ValidationError,
      Self::FetchFailed { .. } => ErrorKind::FetchFailed,
      Self::Serialization(_) => ErrorKind::Serialization,
    }
  }

  pub(crate) fn storage(err: impl fmt::Display) -> Self {
    Self::StorageUnavailable(err.to_string())
  }
}

impl From<rusqlite::Error> for Error {
  fn from(err: rusqlite::Error) -> Self {
    Self::storage(err)
  }
}

/// Flat classification shared by errors and warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  InvalidArgument,
  StorageUnavailable,
  Transient,
  AuthError,
  ValidationError,
  Cancelled,
  FetchFailed,
  Serialization,
}

impl ErrorKind {
  /// Whether asking again later could plausibly succeed.
  pub fn is_retryable(self) -> bool {
    matches!(
      self,
      Self::StorageUnavailable | Self::Transient | Self::FetchFailed | Self::Cancelled
    )
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::InvalidArgument => "invalid_argument",
      Self::StorageUnavailable => "storage_unavailable",
      Self::Transient => "transient",
      Self::AuthError => "auth_error",
      Self::ValidationError => "validation_error",
      Self::Cancelled => "cancelled",
      Self::FetchFailed => "fetch_failed",
      Self::Serialization => "serialization",
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
