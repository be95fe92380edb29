//! Notification bridge: projects engine outcomes into user-facing
//! text. Pure presentation; nothing here is data-integrity bearing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};

/// Sink for user-facing notifications.
pub trait Notifier: Send + Sync {
  /// An action was persisted to the offline queue.
  fn action_queued(&self, method: &str, url: &str);

  /// Summary of one completed replay pass. Never called for a pass
  /// with nothing to do.
  fn sync_report(&self, succeeded: u32, failed: u32);

  /// The connectivity status flipped.
  fn connectivity(&self, online: bool);

  fn cache_cleared(&self);

  fn queue_cleared(&self);
}

/// Notifier that renders through `tracing`. Keeps at most one active
/// "you are offline" indicator: a repeated offline edge is not
/// re-announced, and the online edge dismisses it.
#[derive(Default)]
pub struct LogNotifier {
  offline_shown: AtomicBool,
}

impl LogNotifier {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Notifier for LogNotifier {
  fn action_queued(&self, method: &str, url: &str) {
    info!(%method, %url, "Action queued for sync");
  }

  fn sync_report(&self, succeeded: u32, failed: u32) {
    match (succeeded, failed) {
      (0, 0) => {}
      (s, 0) => info!("Synced {} queued action(s)", s),
      (s, f) if s > 0 => info!("Synced {} queued action(s), {} failed", s, f),
      (_, f) => warn!("Sync failed for {} queued action(s)", f),
    }
  }

  fn connectivity(&self, online: bool) {
    if online {
      if self.offline_shown.swap(false, Ordering::SeqCst) {
        info!("Back online");
      }
    } else if !self.offline_shown.swap(true, Ordering::SeqCst) {
      warn!("You are offline. Actions will be queued and synced on reconnect");
    }
  }

  fn cache_cleared(&self) {
    info!("Offline cache cleared");
  }

  fn queue_cleared(&self) {
    info!("Offline queue cleared");
  }
}

/// A notification captured by [`MemoryNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
  ActionQueued { method: String, url: String },
  SyncReport { succeeded: u32, failed: u32 },
  Connectivity { online: bool },
  CacheCleared,
  QueueCleared,
}

/// Notifier that records everything it is told. Used in tests to
/// assert on exactly which notifications a flow produced.
#[derive(Default)]
pub struct MemoryNotifier {
  notices: Mutex<Vec<Notice>>,
}

impl MemoryNotifier {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn notices(&self) -> Vec<Notice> {
    self.notices.lock().unwrap().clone()
  }

  fn push(&self, notice: Notice) {
    self.notices.lock().unwrap().push(notice);
  }
}

impl Notifier for MemoryNotifier {
  fn action_queued(&self, method: &str, url: &str) {
    self.push(Notice::ActionQueued {
      method: method.to_string(),
      url: url.to_string(),
    });
  }

  fn sync_report(&self, succeeded: u32, failed: u32) {
    self.push(Notice::SyncReport { succeeded, failed });
  }

  fn connectivity(&self, online: bool) {
    self.push(Notice::Connectivity { online });
  }

  fn cache_cleared(&self) {
    self.push(Notice::CacheCleared);
  }

  fn queue_cleared(&self) {
    self.push(Notice::QueueCleared);
  }
}
