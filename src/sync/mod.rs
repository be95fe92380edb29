//! Queue replay against the remote API: transport seam, aggregate
//! state, and the single-flight sync manager.

mod manager;
mod state;
mod transport;

pub use manager::{SyncManager, DEFAULT_MAX_RETRIES};
pub use state::SyncState;
pub use transport::{HttpTransport, Transport};

#[cfg(test)]
pub(crate) use transport::testing;

use crate::notify::Notifier;
use std::sync::Arc;
use tokio::sync::watch;

/// React to connectivity transitions: surface them to the user and
/// kick off a replay pass on every offline-to-online edge. This is
/// the only automatic replay trigger; there is no periodic fallback.
pub async fn watch_connectivity<T: Transport, N: Notifier>(
  mut rx: watch::Receiver<bool>,
  manager: Arc<SyncManager<T, N>>,
) {
  while rx.changed().await.is_ok() {
    let online = *rx.borrow_and_update();
    manager.note_connectivity(online);
    manager.notifier().connectivity(online);
    if online {
      manager.sync_queue().await;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::connectivity::ConnectivityMonitor;
  use crate::notify::{MemoryNotifier, Notice};
  use crate::store::Store;
  use crate::sync::testing::ScriptedTransport;
  use std::time::Duration;

  #[tokio::test]
  async fn test_online_edge_triggers_replay() {
    let monitor = Arc::new(ConnectivityMonitor::new(false));
    let manager = Arc::new(SyncManager::new(
      Store::in_memory(),
      monitor.clone(),
      Arc::new(ScriptedTransport::succeeding()),
      MemoryNotifier::new(),
      DEFAULT_MAX_RETRIES,
    ));
    manager.add_to_queue("/api/x", "POST", None).await.unwrap();

    let watcher = {
      let manager = manager.clone();
      tokio::spawn(watch_connectivity(monitor.subscribe(), manager))
    };

    monitor.set_online(true);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(manager.store().queue_len().await.unwrap(), 0);
    assert!(manager.snapshot().is_online);
    assert!(manager
      .notifier()
      .notices()
      .contains(&Notice::Connectivity { online: true }));

    watcher.abort();
  }

  #[tokio::test]
  async fn test_offline_edge_notifies_without_replaying() {
    let monitor = Arc::new(ConnectivityMonitor::new(true));
    let transport = Arc::new(ScriptedTransport::succeeding());
    let manager = Arc::new(SyncManager::new(
      Store::in_memory(),
      monitor.clone(),
      transport.clone(),
      MemoryNotifier::new(),
      DEFAULT_MAX_RETRIES,
    ));
    manager.add_to_queue("/api/x", "POST", None).await.unwrap();

    let watcher = {
      let manager = manager.clone();
      tokio::spawn(watch_connectivity(monitor.subscribe(), manager))
    };

    monitor.set_online(false);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(transport.requests().is_empty());
    assert!(!manager.snapshot().is_online);
    assert!(manager
      .notifier()
      .notices()
      .contains(&Notice::Connectivity { online: false }));

    watcher.abort();
  }
}
