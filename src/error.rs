//! Error types for the offline engine.

use thiserror::Error;

/// Errors from the transactional store.
#[derive(Debug, Error)]
pub enum StoreError {
  /// The embedded store could not be opened. All store operations
  /// reject with this until an open succeeds; callers at the
  /// application boundary treat it as a permanent cache miss.
  #[error("Storage unavailable: {0}")]
  Unavailable(String),

  /// An individual operation failed after the store was opened
  /// (e.g. disk full). Surfaced to the immediate caller, not retried.
  #[error("Transaction failed: {0}")]
  Transaction(#[from] rusqlite::Error),

  /// A record could not be serialized or deserialized.
  #[error("Failed to encode record: {0}")]
  Codec(#[from] serde_json::Error),
}

/// Errors from requests against the remote API.
///
/// These are handled entirely inside the sync manager's retry/drop
/// logic and only ever reach the user as aggregate counts.
#[derive(Debug, Error)]
pub enum NetworkError {
  /// The request never completed (connection, TLS, timeout).
  #[error("Request failed: {0}")]
  Transport(#[from] reqwest::Error),

  /// The server answered outside the 2xx range.
  #[error("Server returned HTTP {0}")]
  Status(u16),

  /// The queued item could not be turned into a request at all.
  #[error("Invalid request: {0}")]
  BadRequest(String),
}
