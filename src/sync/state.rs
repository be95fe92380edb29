//! Aggregate sync state published for UI binding.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Process-wide snapshot of the engine's state. Not persisted; the
/// sizes are recomputed from the store's collections, so a stale
/// snapshot after a crash corrects itself on the next refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncState {
  pub is_online: bool,
  pub queue_size: u64,
  /// Approximate cache byte count (row count times a fixed constant).
  pub cache_size: u64,
  pub last_sync: Option<DateTime<Utc>>,
  /// True for the entire duration of exactly one replay pass.
  pub sync_in_progress: bool,
}

impl SyncState {
  /// State at process start, before the first stats refresh.
  pub fn initial(is_online: bool) -> Self {
    Self {
      is_online,
      queue_size: 0,
      cache_size: 0,
      last_sync: None,
      sync_in_progress: false,
    }
  }
}
