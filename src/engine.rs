//! Engine facade: wires the store, connectivity monitor, sync manager
//! and research client together for the surrounding application.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use crate::capabilities::{Capability, CAPABILITIES};
use crate::config::Config;
use crate::connectivity::{self, ConnectivityMonitor};
use crate::error::StoreError;
use crate::notify::LogNotifier;
use crate::research::{Fetched, KnowledgeBaseStats, ResearchClient, ResearchResponse};
use crate::store::{QueueItem, Store};
use crate::sync::{watch_connectivity, HttpTransport, SyncManager, SyncState};

/// The assembled offline engine.
pub struct Engine {
  monitor: Arc<ConnectivityMonitor>,
  transport: Arc<HttpTransport>,
  manager: Arc<SyncManager<HttpTransport, LogNotifier>>,
  research: ResearchClient,
  probe_interval: std::time::Duration,
}

impl Engine {
  /// Build the engine from configuration and take the initial
  /// connectivity reading.
  pub async fn connect(config: &Config) -> Result<Self> {
    let base = Url::parse(&config.api.base_url)
      .map_err(|e| eyre!("Invalid api.base_url {}: {}", config.api.base_url, e))?;

    let store = match &config.store.path {
      Some(path) => Store::new(path.clone()),
      None => Store::new(Store::default_path().map_err(|e| eyre!("{}", e))?),
    };

    let transport = Arc::new(HttpTransport::new(base.clone()));
    let online = connectivity::probe(transport.as_ref()).await;
    let monitor = Arc::new(ConnectivityMonitor::new(online));

    let manager = Arc::new(SyncManager::new(
      store.clone(),
      monitor.clone(),
      transport.clone(),
      LogNotifier::new(),
      config.sync.max_retries,
    ));
    // Seed stats from the persisted collections
    manager.refresh_stats().await;

    let research = ResearchClient::new(base, store, monitor.clone(), config.sync.stats_ttl());

    Ok(Self {
      monitor,
      transport,
      manager,
      research,
      probe_interval: config.sync.probe_interval(),
    })
  }

  /// Spawn the long-running tasks: the health probe feeding the
  /// monitor, and the listener that replays the queue on every
  /// offline-to-online edge.
  pub fn run_background(&self) -> (JoinHandle<()>, JoinHandle<()>) {
    let probe = tokio::spawn(connectivity::run_probe(
      self.monitor.clone(),
      self.transport.clone(),
      self.probe_interval,
    ));
    let watcher = tokio::spawn(watch_connectivity(
      self.monitor.subscribe(),
      self.manager.clone(),
    ));
    (probe, watcher)
  }

  pub fn monitor(&self) -> &ConnectivityMonitor {
    &self.monitor
  }

  pub fn store(&self) -> &Store {
    self.manager.store()
  }

  /// Reactive state for UI binding.
  pub fn state(&self) -> watch::Receiver<SyncState> {
    self.manager.state()
  }

  pub fn snapshot(&self) -> SyncState {
    self.manager.snapshot()
  }

  pub async fn add_to_queue(
    &self,
    url: &str,
    method: &str,
    data: Option<Value>,
  ) -> Result<QueueItem, StoreError> {
    self.manager.add_to_queue(url, method, data).await
  }

  pub async fn sync_queue(&self) {
    self.manager.sync_queue().await
  }

  pub async fn clear_cache(&self) -> Result<(), StoreError> {
    self.manager.clear_cache().await
  }

  pub async fn clear_queue(&self) -> Result<(), StoreError> {
    self.manager.clear_queue().await
  }

  pub async fn research(&self, query: &str) -> Result<Fetched<ResearchResponse>> {
    self.research.research(query).await
  }

  pub async fn stats(&self) -> Result<Fetched<KnowledgeBaseStats>> {
    self.research.stats().await
  }

  pub fn capabilities(&self) -> &'static [Capability] {
    CAPABILITIES
  }
}
