//! Deterministic cache key derivation.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Bumped if the key encoding ever changes, so old rows simply stop matching.
const KEY_VERSION: &str = "v1";

/// Derive the cache key for a `(scope, range, kind)` triple.
///
/// Each component is length-prefixed before hashing, so no two distinct
/// triples share a preimage (`("ab", "c")` and `("a", "bc")` stay apart).
/// SHA256 gives stable, fixed-length keys.
pub fn derive_key(scope: &str, range_descriptor: &str, data_kind: &str) -> Result<String> {
  if scope.trim().is_empty() {
    return Err(Error::InvalidArgument(
      "scope must not be empty".to_string(),
    ));
  }

  let mut hasher = Sha256::new();
  hasher.update(KEY_VERSION.as_bytes());
  for part in [scope, range_descriptor, data_kind] {
    hasher.update((part.len() as u64).to_be_bytes());
    hasher.update(part.as_bytes());
  }
  Ok(hex::encode(hasher.finalize()))
}
