//! Connectivity monitor: single source of truth for "are we online".
//!
//! Transitions are edge-triggered over a watch channel; subscribers
//! see each online/offline flip exactly once and must not assume
//! repeated firing while the status is unchanged. The reading is fed
//! by whatever signal the host has, normally the periodic health
//! probe in [`run_probe`]. Rapid flapping is deliberately not
//! debounced.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::sync::Transport;

/// Relative URL probed to decide the current connectivity reading.
pub const HEALTH_ENDPOINT: &str = "/api/health";

/// Observes and publishes the online/offline status.
pub struct ConnectivityMonitor {
  tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
  /// Create a monitor with the runtime's current reading.
  pub fn new(initially_online: bool) -> Self {
    let (tx, _) = watch::channel(initially_online);
    Self { tx }
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Update the status. Subscribers are only notified on an actual
  /// transition, never re-notified at the current level.
  pub fn set_online(&self, online: bool) {
    let changed = self.tx.send_if_modified(|current| {
      if *current != online {
        *current = online;
        true
      } else {
        false
      }
    });
    if changed {
      debug!(online, "connectivity changed");
    }
  }

  /// Subscribe to status transitions.
  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

/// Ask the remote API whether it is reachable right now.
pub async fn probe<T: Transport>(transport: &T) -> bool {
  transport.execute("GET", HEALTH_ENDPOINT, None).await.is_ok()
}

/// Periodically probe the API health endpoint and feed the monitor.
///
/// This only maintains the reading; queue replay is triggered by the
/// offline-to-online edge, never by this timer.
pub async fn run_probe<T: Transport>(
  monitor: Arc<ConnectivityMonitor>,
  transport: Arc<T>,
  interval: Duration,
) {
  let mut ticker = tokio::time::interval(interval);
  ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
  loop {
    ticker.tick().await;
    let online = probe(transport.as_ref()).await;
    monitor.set_online(online);
  }
}
