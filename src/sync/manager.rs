//! Sync manager: drains the durable queue against the remote API,
//! exactly one pass at a time.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::error::StoreError;
use crate::notify::Notifier;
use crate::store::{QueueDraft, QueueItem, Store};

use super::state::SyncState;
use super::transport::Transport;

/// How many failed replay attempts a queue item survives before it is
/// dropped for good.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Orchestrates queue replay and owns the in-memory [`SyncState`].
///
/// Persisted entities are only touched through the store's API; the
/// manager never reaches into the storage engine itself.
pub struct SyncManager<T: Transport, N: Notifier> {
  store: Store,
  monitor: Arc<ConnectivityMonitor>,
  transport: Arc<T>,
  notifier: N,
  state: watch::Sender<SyncState>,
  /// Single-flight guard for replay passes. Held for the entire pass;
  /// an overlapping caller finds it taken and returns without doing
  /// anything.
  pass_lock: Mutex<()>,
  max_retries: u32,
}

impl<T: Transport, N: Notifier> SyncManager<T, N> {
  pub fn new(
    store: Store,
    monitor: Arc<ConnectivityMonitor>,
    transport: Arc<T>,
    notifier: N,
    max_retries: u32,
  ) -> Self {
    let initial = SyncState::initial(monitor.is_online());
    let (state, _) = watch::channel(initial);

    Self {
      store,
      monitor,
      transport,
      notifier,
      state,
      pass_lock: Mutex::new(()),
      max_retries,
    }
  }

  /// Reactive state for UI binding.
  pub fn state(&self) -> watch::Receiver<SyncState> {
    self.state.subscribe()
  }

  /// The current state snapshot.
  pub fn snapshot(&self) -> SyncState {
    self.state.borrow().clone()
  }

  pub fn store(&self) -> &Store {
    &self.store
  }

  pub fn notifier(&self) -> &N {
    &self.notifier
  }

  /// Mirror a connectivity transition into the published state.
  pub fn note_connectivity(&self, online: bool) {
    self.state.send_modify(|s| s.is_online = online);
  }

  /// Recompute queue and cache sizes from the store. The collections
  /// are the source of truth; the state is never trusted
  /// incrementally across restarts.
  pub async fn refresh_stats(&self) {
    match (self.store.queue_len().await, self.store.approx_size().await) {
      (Ok(queue_size), Ok(cache_size)) => self.state.send_modify(|s| {
        s.queue_size = queue_size;
        s.cache_size = cache_size;
      }),
      _ => debug!("Stats refresh skipped, store unavailable"),
    }
  }

  /// Queue a mutation for replay and tell the user it was queued.
  pub async fn add_to_queue(
    &self,
    url: &str,
    method: &str,
    data: Option<Value>,
  ) -> Result<QueueItem, StoreError> {
    let item = self
      .store
      .add_to_queue(QueueDraft::new(url, method, data))
      .await?;
    self.notifier.action_queued(&item.method, &item.url);
    self.refresh_stats().await;
    Ok(item)
  }

  /// Run one replay pass. A no-op if a pass is already in flight or
  /// we are offline. Errors never escape: the pass always completes
  /// and the state always returns to idle.
  pub async fn sync_queue(&self) {
    let _guard = match self.pass_lock.try_lock() {
      Ok(guard) => guard,
      Err(_) => return,
    };
    if !self.monitor.is_online() {
      return;
    }

    self.state.send_modify(|s| s.sync_in_progress = true);

    match self.run_pass().await {
      // Nothing to do: no network activity, no notification
      Ok((0, 0)) => {}
      Ok((succeeded, failed)) => {
        self.refresh_stats().await;
        self.state.send_modify(|s| s.last_sync = Some(Utc::now()));
        self.notifier.sync_report(succeeded, failed);
      }
      Err(err) => {
        warn!(error = %err, "Sync pass aborted by store error");
      }
    }

    self.state.send_modify(|s| s.sync_in_progress = false);
  }

  async fn run_pass(&self) -> Result<(u32, u32), StoreError> {
    // Snapshot: items queued during the pass wait for the next one
    let items = self.store.queue().await?;
    if items.is_empty() {
      return Ok((0, 0));
    }

    debug!(count = items.len(), "Replaying offline queue");
    let mut succeeded = 0u32;
    let mut failed = 0u32;

    // Strictly sequential: FIFO ordering and backpressure on the
    // remote API both depend on this
    for item in items {
      match self
        .transport
        .execute(&item.method, &item.url, item.data.as_ref())
        .await
      {
        Ok(()) => {
          self.store.remove_from_queue(&item.id).await?;
          succeeded += 1;
        }
        Err(err) => {
          failed += 1;
          let item = item.retried();
          if item.retry_count >= self.max_retries {
            warn!(
              id = %item.id, method = %item.method, url = %item.url, error = %err,
              "Dropping queued action after {} failed attempts", item.retry_count
            );
            self.store.remove_from_queue(&item.id).await?;
          } else {
            debug!(
              id = %item.id, retry_count = item.retry_count, error = %err,
              "Replay attempt failed, keeping item queued"
            );
            self.store.update_queue_item(&item).await?;
          }
        }
      }
    }

    Ok((succeeded, failed))
  }

  /// Administrative reset of the cache collection.
  pub async fn clear_cache(&self) -> Result<(), StoreError> {
    self.store.clear_cache().await?;
    self.refresh_stats().await;
    self.notifier.cache_cleared();
    Ok(())
  }

  /// Administrative reset of the queue collection.
  pub async fn clear_queue(&self) -> Result<(), StoreError> {
    self.store.clear_queue().await?;
    self.refresh_stats().await;
    self.notifier.queue_cleared();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::notify::{MemoryNotifier, Notice};
  use crate::sync::transport::testing::ScriptedTransport;
  use serde_json::json;
  use std::time::Duration;

  type TestManager = SyncManager<ScriptedTransport, MemoryNotifier>;

  fn manager(transport: ScriptedTransport, online: bool) -> Arc<TestManager> {
    Arc::new(SyncManager::new(
      Store::in_memory(),
      Arc::new(ConnectivityMonitor::new(online)),
      Arc::new(transport),
      MemoryNotifier::new(),
      DEFAULT_MAX_RETRIES,
    ))
  }

  #[tokio::test]
  async fn test_queue_while_offline() {
    let m = manager(ScriptedTransport::succeeding(), false);

    m.add_to_queue("/api/x", "POST", Some(json!({"a": 1})))
      .await
      .unwrap();
    m.add_to_queue("/api/y", "POST", Some(json!({"b": 2})))
      .await
      .unwrap();

    let queue = m.store().queue().await.unwrap();
    assert_eq!(queue.len(), 2);
    assert!(queue.iter().all(|i| i.retry_count == 0));
    assert_eq!(m.snapshot().queue_size, 2);
    assert_eq!(
      m.notifier().notices(),
      vec![
        Notice::ActionQueued {
          method: "POST".into(),
          url: "/api/x".into()
        },
        Notice::ActionQueued {
          method: "POST".into(),
          url: "/api/y".into()
        },
      ]
    );
  }

  #[tokio::test]
  async fn test_sync_drains_queue() {
    let m = manager(ScriptedTransport::succeeding(), true);
    m.add_to_queue("/api/x", "POST", Some(json!({"a": 1})))
      .await
      .unwrap();
    m.add_to_queue("/api/y", "POST", Some(json!({"b": 2})))
      .await
      .unwrap();

    m.sync_queue().await;

    assert_eq!(m.store().queue_len().await.unwrap(), 0);
    let state = m.snapshot();
    assert_eq!(state.queue_size, 0);
    assert!(state.last_sync.is_some());
    assert!(!state.sync_in_progress);
    assert_eq!(
      m.notifier().notices().last(),
      Some(&Notice::SyncReport {
        succeeded: 2,
        failed: 0
      })
    );
  }

  #[tokio::test]
  async fn test_replay_is_fifo() {
    let m = manager(ScriptedTransport::succeeding(), true);
    m.add_to_queue("/api/a", "POST", None).await.unwrap();
    m.add_to_queue("/api/b", "POST", None).await.unwrap();
    m.add_to_queue("/api/c", "POST", None).await.unwrap();

    m.sync_queue().await;

    let urls: Vec<String> = m
      .transport
      .requests()
      .into_iter()
      .map(|(_, url, _)| url)
      .collect();
    assert_eq!(urls, vec!["/api/a", "/api/b", "/api/c"]);
  }

  #[tokio::test]
  async fn test_body_forwarded_to_transport() {
    let m = manager(ScriptedTransport::succeeding(), true);
    m.add_to_queue("/api/favorites", "POST", Some(json!({"paper": "p1"})))
      .await
      .unwrap();

    m.sync_queue().await;

    let requests = m.transport.requests();
    assert_eq!(
      requests,
      vec![(
        "POST".to_string(),
        "/api/favorites".to_string(),
        Some(json!({"paper": "p1"}))
      )]
    );
  }

  #[tokio::test]
  async fn test_bounded_retry_drops_after_three_passes() {
    let m = manager(ScriptedTransport::failing(), true);
    m.add_to_queue("/api/x", "POST", None).await.unwrap();

    m.sync_queue().await;
    assert_eq!(m.store().queue().await.unwrap()[0].retry_count, 1);

    m.sync_queue().await;
    assert_eq!(m.store().queue().await.unwrap()[0].retry_count, 2);

    m.sync_queue().await;
    // Third failure reaches the threshold: dropped for good
    assert_eq!(m.store().queue_len().await.unwrap(), 0);

    let reports: Vec<Notice> = m
      .notifier()
      .notices()
      .into_iter()
      .filter(|n| matches!(n, Notice::SyncReport { .. }))
      .collect();
    assert_eq!(
      reports,
      vec![
        Notice::SyncReport {
          succeeded: 0,
          failed: 1
        };
        3
      ]
    );

    // A subsequent pass finds nothing and stays silent
    m.sync_queue().await;
    assert_eq!(m.transport.requests().len(), 3);
    assert_eq!(m.notifier().notices().len(), reports.len() + 1); // + the original ActionQueued
  }

  #[tokio::test]
  async fn test_partial_failure_reported_in_one_summary() {
    let transport = ScriptedTransport::succeeding();
    transport.fail_url("/api/b");
    let m = manager(transport, true);
    m.add_to_queue("/api/a", "POST", None).await.unwrap();
    m.add_to_queue("/api/b", "POST", None).await.unwrap();

    m.sync_queue().await;

    assert_eq!(
      m.notifier().notices().last(),
      Some(&Notice::SyncReport {
        succeeded: 1,
        failed: 1
      })
    );
    // The failed item stays queued with its retry recorded
    let queue = m.store().queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].url, "/api/b");
    assert_eq!(queue[0].retry_count, 1);
  }

  #[tokio::test]
  async fn test_overlapping_sync_calls_issue_one_request_set() {
    let m = manager(
      ScriptedTransport::succeeding().with_delay(Duration::from_millis(50)),
      true,
    );
    m.add_to_queue("/api/a", "POST", None).await.unwrap();
    m.add_to_queue("/api/b", "POST", None).await.unwrap();

    let first = {
      let m = m.clone();
      tokio::spawn(async move { m.sync_queue().await })
    };
    let second = {
      let m = m.clone();
      tokio::spawn(async move {
        // Land while the first pass is mid-flight
        tokio::time::sleep(Duration::from_millis(10)).await;
        m.sync_queue().await
      })
    };
    first.await.unwrap();
    second.await.unwrap();

    // Requests equal the queue length, not double
    assert_eq!(m.transport.requests().len(), 2);
  }

  #[tokio::test]
  async fn test_sync_while_offline_is_a_noop() {
    let m = manager(ScriptedTransport::succeeding(), false);
    m.add_to_queue("/api/x", "POST", None).await.unwrap();

    m.sync_queue().await;

    assert!(m.transport.requests().is_empty());
    assert_eq!(m.store().queue_len().await.unwrap(), 1);
    assert!(!m.snapshot().sync_in_progress);
    assert!(m.snapshot().last_sync.is_none());
  }

  #[tokio::test]
  async fn test_empty_pass_is_silent() {
    let m = manager(ScriptedTransport::succeeding(), true);

    m.sync_queue().await;

    assert!(m.transport.requests().is_empty());
    assert!(m.notifier().notices().is_empty());
    assert!(m.snapshot().last_sync.is_none());
  }

  #[tokio::test]
  async fn test_items_added_mid_pass_wait_for_the_next_one() {
    let m = manager(
      ScriptedTransport::succeeding().with_delay(Duration::from_millis(30)),
      true,
    );
    m.add_to_queue("/api/a", "POST", None).await.unwrap();

    let pass = {
      let m = m.clone();
      tokio::spawn(async move { m.sync_queue().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    m.add_to_queue("/api/b", "POST", None).await.unwrap();
    pass.await.unwrap();

    // The pass replayed its snapshot only
    let urls: Vec<String> = m
      .transport
      .requests()
      .into_iter()
      .map(|(_, url, _)| url)
      .collect();
    assert_eq!(urls, vec!["/api/a"]);

    // The late item is still queued for a future pass
    let queue = m.store().queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].url, "/api/b");
  }

  #[tokio::test]
  async fn test_clear_cache_leaves_queue_alone() {
    let m = manager(ScriptedTransport::succeeding(), false);
    m.store().set("k1", &json!("a"), None).await.unwrap();
    m.add_to_queue("/api/x", "POST", None).await.unwrap();

    m.clear_cache().await.unwrap();

    assert_eq!(m.store().cache_len().await.unwrap(), 0);
    assert_eq!(m.store().queue_len().await.unwrap(), 1);
    let state = m.snapshot();
    assert_eq!(state.cache_size, 0);
    assert_eq!(state.queue_size, 1);
    assert!(m.notifier().notices().contains(&Notice::CacheCleared));
  }

  #[tokio::test]
  async fn test_clear_queue_leaves_cache_alone() {
    let m = manager(ScriptedTransport::succeeding(), false);
    m.store().set("k1", &json!("a"), None).await.unwrap();
    m.add_to_queue("/api/x", "POST", None).await.unwrap();

    m.clear_queue().await.unwrap();

    assert_eq!(m.store().queue_len().await.unwrap(), 0);
    assert_eq!(m.store().cache_len().await.unwrap(), 1);
    assert!(m.notifier().notices().contains(&Notice::QueueCleared));
  }
}
