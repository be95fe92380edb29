//! Read-through access to the research API.
//!
//! Successful responses land in the store's results collection so the
//! same query can be answered while disconnected. Results carry no
//! TTL: a stale answer is still worth serving offline, and only an
//! explicit clear removes them. Knowledge-base stats go through the
//! TTL cache instead.

use chrono::{DateTime, TimeZone, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::connectivity::ConnectivityMonitor;
use crate::store::Store;

/// Cache key for the knowledge-base stats entry.
const STATS_KEY: &str = "rag:stats";

/// A paper returned by the research API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
  pub title: String,
  #[serde(default)]
  pub authors: Vec<String>,
  #[serde(default)]
  pub summary: String,
  #[serde(default)]
  pub arxiv_id: Option<String>,
  #[serde(default)]
  pub relevance_score: Option<f64>,
  #[serde(default)]
  pub published: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchResults {
  #[serde(default)]
  pub papers: Vec<Paper>,
  #[serde(default)]
  pub total_found: u64,
  #[serde(default)]
  pub search_terms: Vec<String>,
}

/// Response of `POST /api/research`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchResponse {
  pub status: String,
  #[serde(default)]
  pub results: ResearchResults,
  pub query: String,
  #[serde(default)]
  pub timestamp: Option<String>,
}

/// Response of `GET /api/rag/stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBaseStats {
  #[serde(default)]
  pub total_papers: u64,
  #[serde(default)]
  pub total_chunks: u64,
  #[serde(default)]
  pub knowledge_base_size: String,
  #[serde(default)]
  pub last_updated: Option<String>,
}

/// Where a fetched value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
  /// Fresh data from the network
  Network,
  /// Served from local storage, network not attempted
  Cache,
  /// Served from local storage because the network was unavailable
  Offline,
}

/// A fetched value plus metadata about its origin.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
  pub data: T,
  pub source: Source,
  /// When the data was stored locally (if it came from storage).
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> Fetched<T> {
  fn from_network(data: T) -> Self {
    Self {
      data,
      source: Source::Network,
      cached_at: None,
    }
  }

  fn from_cache(data: T, cached_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: Source::Cache,
      cached_at,
    }
  }

  fn offline(data: T, cached_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: Source::Offline,
      cached_at,
    }
  }
}

/// Research API client with offline fallback through the store.
#[derive(Clone)]
pub struct ResearchClient {
  client: reqwest::Client,
  base: Url,
  store: Store,
  monitor: Arc<ConnectivityMonitor>,
  stats_ttl: Duration,
}

impl ResearchClient {
  pub fn new(
    base: Url,
    store: Store,
    monitor: Arc<ConnectivityMonitor>,
    stats_ttl: Duration,
  ) -> Self {
    Self {
      client: reqwest::Client::new(),
      base,
      store,
      monitor,
      stats_ttl,
    }
  }

  /// Run a research query.
  ///
  /// Online: fetch from the API and store the response for this query.
  /// Offline, or when the fetch fails: serve the stored response if
  /// there is one.
  pub async fn research(&self, query: &str) -> Result<Fetched<ResearchResponse>> {
    if !self.monitor.is_online() {
      return self
        .stored(query)
        .await
        .ok_or_else(|| eyre!("Offline and no stored result for \"{}\"", query));
    }

    match self.fetch_research(query).await {
      Ok(response) => {
        if let Err(e) = self.store.put_result(query, &response).await {
          warn!("Failed to store research result: {}", e);
        }
        Ok(Fetched::from_network(response))
      }
      Err(fetch_err) => match self.stored(query).await {
        Some(stored) => {
          warn!("Research fetch failed, serving stored result: {}", fetch_err);
          Ok(stored)
        }
        None => Err(fetch_err),
      },
    }
  }

  /// The stored response for `query`, if any. Store failures degrade
  /// to a miss.
  async fn stored(&self, query: &str) -> Option<Fetched<ResearchResponse>> {
    let entry = match self.store.get_result(query).await {
      Ok(entry) => entry?,
      Err(e) => {
        debug!("Stored result lookup failed: {}", e);
        return None;
      }
    };

    let response: ResearchResponse = serde_json::from_value(entry.data).ok()?;
    let cached_at = Utc.timestamp_millis_opt(entry.timestamp).single();
    Some(Fetched::offline(response, cached_at))
  }

  async fn fetch_research(&self, query: &str) -> Result<ResearchResponse> {
    let url = self
      .base
      .join("/api/research")
      .map_err(|e| eyre!("Invalid research url: {}", e))?;

    let response = self
      .client
      .post(url)
      .json(&json!({ "query": query }))
      .send()
      .await
      .map_err(|e| eyre!("Research request failed: {}", e))?;

    if !response.status().is_success() {
      return Err(eyre!(
        "Research request failed with HTTP {}",
        response.status()
      ));
    }

    response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse research response: {}", e))
  }

  /// Knowledge-base stats, cached with the configured TTL. The TTL
  /// cache handles staleness: an expired entry reads as a miss and is
  /// refetched.
  pub async fn stats(&self) -> Result<Fetched<KnowledgeBaseStats>> {
    // Cache first; a store failure degrades to a miss
    if let Ok(Some(stats)) = self.store.get::<KnowledgeBaseStats>(STATS_KEY).await {
      return Ok(Fetched::from_cache(stats, None));
    }

    if !self.monitor.is_online() {
      return Err(eyre!("Offline and no cached knowledge-base stats"));
    }

    let stats = self.fetch_stats().await?;
    if let Err(e) = self.store.set(STATS_KEY, &stats, Some(self.stats_ttl)).await {
      warn!("Failed to cache knowledge-base stats: {}", e);
    }
    Ok(Fetched::from_network(stats))
  }

  async fn fetch_stats(&self) -> Result<KnowledgeBaseStats> {
    let url = self
      .base
      .join("/api/rag/stats")
      .map_err(|e| eyre!("Invalid stats url: {}", e))?;

    let response = self
      .client
      .get(url)
      .send()
      .await
      .map_err(|e| eyre!("Stats request failed: {}", e))?;

    if !response.status().is_success() {
      return Err(eyre!("Stats request failed with HTTP {}", response.status()));
    }

    response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse stats response: {}", e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// Base url nothing listens on, so online fetches fail fast.
  fn unreachable_base() -> Url {
    Url::parse("http://127.0.0.1:1").unwrap()
  }

  fn client(online: bool) -> ResearchClient {
    ResearchClient::new(
      unreachable_base(),
      Store::in_memory(),
      Arc::new(ConnectivityMonitor::new(online)),
      Duration::from_secs(300),
    )
  }

  fn sample_response(query: &str) -> ResearchResponse {
    ResearchResponse {
      status: "completed".into(),
      results: ResearchResults {
        papers: vec![Paper {
          title: "Attention Is All You Need".into(),
          authors: vec!["Vaswani".into()],
          summary: "Transformers.".into(),
          arxiv_id: Some("1706.03762".into()),
          relevance_score: Some(0.98),
          published: Some("2017-06-12".into()),
        }],
        total_found: 1,
        search_terms: vec![query.into()],
      },
      query: query.into(),
      timestamp: None,
    }
  }

  #[tokio::test]
  async fn test_offline_serves_stored_result() {
    let c = client(false);
    c.store
      .put_result("transformers", &sample_response("transformers"))
      .await
      .unwrap();

    let fetched = c.research("transformers").await.unwrap();
    assert_eq!(fetched.source, Source::Offline);
    assert!(fetched.cached_at.is_some());
    assert_eq!(fetched.data.results.papers.len(), 1);
  }

  #[tokio::test]
  async fn test_offline_miss_is_an_error() {
    let c = client(false);
    assert!(c.research("transformers").await.is_err());
  }

  #[tokio::test]
  async fn test_failed_fetch_falls_back_to_stored_result() {
    // Online per the monitor, but the API is unreachable
    let c = client(true);
    c.store
      .put_result("transformers", &sample_response("transformers"))
      .await
      .unwrap();

    let fetched = c.research("transformers").await.unwrap();
    assert_eq!(fetched.source, Source::Offline);
  }

  #[tokio::test]
  async fn test_failed_fetch_without_stored_result_is_an_error() {
    let c = client(true);
    assert!(c.research("transformers").await.is_err());
  }

  #[tokio::test]
  async fn test_stats_served_from_cache_without_network() {
    let c = client(false);
    let stats = KnowledgeBaseStats {
      total_papers: 12,
      total_chunks: 340,
      knowledge_base_size: "4 MB".into(),
      last_updated: None,
    };
    c.store
      .set(STATS_KEY, &stats, Some(Duration::from_secs(300)))
      .await
      .unwrap();

    let fetched = c.stats().await.unwrap();
    assert_eq!(fetched.source, Source::Cache);
    assert_eq!(fetched.data.total_papers, 12);
  }

  #[tokio::test]
  async fn test_stats_offline_miss_is_an_error() {
    let c = client(false);
    assert!(c.stats().await.is_err());
  }
}
