//! Record types persisted by the store.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Version stamped on every cache entry at write time.
pub const ENTRY_VERSION: &str = "1";

/// A cached value with expiry metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
  pub key: String,
  pub data: Value,
  /// Unix milliseconds at write time.
  pub timestamp: i64,
  pub version: String,
  /// Time-to-live in milliseconds. `None` means the entry never expires.
  pub ttl_ms: Option<i64>,
}

impl CacheEntry {
  /// Whether the entry is stale at `now` (unix milliseconds).
  ///
  /// A stale entry must never be returned by a read; the read that
  /// discovers it purges it.
  pub fn is_stale_at(&self, now: i64) -> bool {
    match self.ttl_ms {
      Some(ttl) => now - self.timestamp > ttl,
      None => false,
    }
  }
}

/// A queued mutation awaiting replay against the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
  pub id: String,
  pub url: String,
  pub method: String,
  /// JSON request body. Omitted on the wire for GET-like methods.
  pub data: Option<Value>,
  /// Unix milliseconds at enqueue time.
  pub timestamp: i64,
  pub retry_count: u32,
}

impl QueueItem {
  /// The state transition applied after a failed replay attempt.
  pub fn retried(mut self) -> QueueItem {
    self.retry_count += 1;
    self
  }
}

/// Caller-supplied fields for a new queue item. Id, timestamp and
/// retry count are assigned by the store.
#[derive(Debug, Clone)]
pub struct QueueDraft {
  pub url: String,
  pub method: String,
  pub data: Option<Value>,
}

impl QueueDraft {
  pub fn new(url: impl Into<String>, method: impl Into<String>, data: Option<Value>) -> Self {
    Self {
      url: url.into(),
      method: method.into(),
      data,
    }
  }
}

/// The last successful server response for a query. No TTL: a stale
/// research result is still worth serving while offline, so only an
/// explicit clear removes these.
#[derive(Debug, Clone)]
pub struct ResultEntry {
  pub query: String,
  pub data: Value,
  /// Unix milliseconds at write time.
  pub timestamp: i64,
}

/// Current time in unix milliseconds.
pub fn now_ms() -> i64 {
  Utc::now().timestamp_millis()
}

/// Stable key for a result entry: SHA256 of the normalized query.
pub fn query_hash(query: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(query.trim().to_lowercase().as_bytes());
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_entry_without_ttl_never_stale() {
    let entry = CacheEntry {
      key: "k".into(),
      data: Value::Null,
      timestamp: 0,
      version: ENTRY_VERSION.into(),
      ttl_ms: None,
    };
    assert!(!entry.is_stale_at(i64::MAX));
  }

  #[test]
  fn test_entry_stale_only_past_ttl() {
    let entry = CacheEntry {
      key: "k".into(),
      data: Value::Null,
      timestamp: 1000,
      version: ENTRY_VERSION.into(),
      ttl_ms: Some(500),
    };
    // Exactly at the boundary the entry is still valid
    assert!(!entry.is_stale_at(1500));
    assert!(entry.is_stale_at(1501));
  }

  #[test]
  fn test_retried_increments_by_one() {
    let item = QueueItem {
      id: "a".into(),
      url: "/api/x".into(),
      method: "POST".into(),
      data: None,
      timestamp: 0,
      retry_count: 0,
    };
    let item = item.retried();
    assert_eq!(item.retry_count, 1);
    assert_eq!(item.retried().retry_count, 2);
  }

  #[test]
  fn test_query_hash_normalizes() {
    assert_eq!(query_hash("  Transformers  "), query_hash("transformers"));
    assert_ne!(query_hash("transformers"), query_hash("diffusion"));
  }
}
