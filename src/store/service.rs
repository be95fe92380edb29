//! Store service object with lazy, memoized initialization.
//!
//! The underlying SQLite connection is opened on first use and shared
//! for the rest of the process. Concurrent first callers all await the
//! same in-flight open; a failed open is not memoized, so a later call
//! re-attempts it. While the store cannot be opened every operation
//! rejects with [`StoreError::Unavailable`] and callers degrade to
//! cache-miss behavior.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::error::StoreError;

use super::sqlite::SqliteStore;
use super::types::{QueueDraft, QueueItem, ResultEntry};

/// Where the store keeps its database.
#[derive(Debug, Clone)]
enum Location {
  Disk(PathBuf),
  Memory,
}

/// Handle to the transactional store. Cheap to clone; all clones share
/// one lazily-opened connection.
#[derive(Clone)]
pub struct Store {
  location: Location,
  backend: Arc<OnceCell<Arc<SqliteStore>>>,
}

impl Store {
  /// Create a store handle for the database at `path`. Nothing is
  /// opened until the first operation.
  pub fn new(path: PathBuf) -> Self {
    Self {
      location: Location::Disk(path),
      backend: Arc::new(OnceCell::new()),
    }
  }

  /// Create a store handle backed by an in-memory database.
  pub fn in_memory() -> Self {
    Self {
      location: Location::Memory,
      backend: Arc::new(OnceCell::new()),
    }
  }

  /// The default database location under the platform data directory.
  pub fn default_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StoreError::Unavailable("could not determine data directory".into()))?;

    Ok(data_dir.join("carrel").join("offline.db"))
  }

  /// Open the store if it is not open yet. Idempotent; concurrent
  /// callers resolve once the single open completes.
  pub async fn init(&self) -> Result<(), StoreError> {
    self.backend().await.map(|_| ())
  }

  async fn backend(&self) -> Result<&SqliteStore, StoreError> {
    let backend = self
      .backend
      .get_or_try_init(|| async {
        let store = match &self.location {
          Location::Disk(path) => SqliteStore::open(path)?,
          Location::Memory => SqliteStore::open_in_memory()?,
        };
        Ok::<_, StoreError>(Arc::new(store))
      })
      .await?;
    Ok(backend.as_ref())
  }

  // ==========================================================================
  // Cache collection
  // ==========================================================================

  /// Write a cache entry, overwriting any existing entry for `key`.
  pub async fn set<T: Serialize>(
    &self,
    key: &str,
    data: &T,
    ttl: Option<Duration>,
  ) -> Result<(), StoreError> {
    let value = serde_json::to_value(data)?;
    self.backend().await?.put_cache(key, &value, ttl)
  }

  /// Read a cache entry. Returns `None` if absent or stale; a stale
  /// entry is purged by the read that discovers it.
  pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
    match self.backend().await?.get_cache(key)? {
      Some(value) => Ok(Some(serde_json::from_value(value)?)),
      None => Ok(None),
    }
  }

  pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
    self.backend().await?.remove_cache(key)
  }

  pub async fn clear_cache(&self) -> Result<(), StoreError> {
    self.backend().await?.clear_cache()
  }

  pub async fn cache_len(&self) -> Result<u64, StoreError> {
    self.backend().await?.cache_len()
  }

  /// Approximate byte count of the cache collection (row count times a
  /// fixed per-record constant).
  pub async fn approx_size(&self) -> Result<u64, StoreError> {
    self.backend().await?.approx_size()
  }

  // ==========================================================================
  // Queue collection
  // ==========================================================================

  pub async fn add_to_queue(&self, draft: QueueDraft) -> Result<QueueItem, StoreError> {
    self.backend().await?.add_to_queue(draft)
  }

  /// All queued items in insertion order.
  pub async fn queue(&self) -> Result<Vec<QueueItem>, StoreError> {
    self.backend().await?.queue()
  }

  pub async fn queue_len(&self) -> Result<u64, StoreError> {
    self.backend().await?.queue_len()
  }

  pub async fn remove_from_queue(&self, id: &str) -> Result<(), StoreError> {
    self.backend().await?.remove_from_queue(id)
  }

  pub async fn update_queue_item(&self, item: &QueueItem) -> Result<(), StoreError> {
    self.backend().await?.update_queue_item(item)
  }

  pub async fn clear_queue(&self) -> Result<(), StoreError> {
    self.backend().await?.clear_queue()
  }

  // ==========================================================================
  // Results collection
  // ==========================================================================

  pub async fn put_result<T: Serialize>(&self, query: &str, data: &T) -> Result<(), StoreError> {
    let value = serde_json::to_value(data)?;
    self.backend().await?.put_result(query, &value)
  }

  pub async fn get_result(&self, query: &str) -> Result<Option<ResultEntry>, StoreError> {
    self.backend().await?.get_result(query)
  }

  pub async fn clear_results(&self) -> Result<(), StoreError> {
    self.backend().await?.clear_results()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[tokio::test]
  async fn test_init_is_idempotent() {
    let store = Store::in_memory();
    store.init().await.unwrap();
    store.init().await.unwrap();
    store.set("k", &json!(1), None).await.unwrap();
    assert_eq!(store.get::<i64>("k").await.unwrap(), Some(1));
  }

  #[tokio::test]
  async fn test_concurrent_first_use_shares_one_open() {
    let store = Store::in_memory();

    let mut handles = Vec::new();
    for i in 0..8 {
      let store = store.clone();
      handles.push(tokio::spawn(async move {
        store.set(&format!("k{}", i), &json!(i), None).await
      }));
    }
    for handle in handles {
      handle.await.unwrap().unwrap();
    }

    // All writes landed in the same database
    assert_eq!(store.cache_len().await.unwrap(), 8);
  }

  #[tokio::test]
  async fn test_unopenable_store_degrades_per_operation() {
    // /dev/null is a file, so no directory can be created beneath it
    let store = Store::new(PathBuf::from("/dev/null/carrel/offline.db"));

    let err = store.set("k", &json!(1), None).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));

    // Every operation keeps rejecting rather than panicking
    let err = store.get::<i64>("k").await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
    let err = store.queue().await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
  }

  #[tokio::test]
  async fn test_typed_roundtrip() {
    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Favorite {
      id: String,
      title: String,
    }

    let store = Store::in_memory();
    let favorite = Favorite {
      id: "p1".into(),
      title: "Attention Is All You Need".into(),
    };
    store.set("favorite:p1", &favorite, None).await.unwrap();

    let loaded: Option<Favorite> = store.get("favorite:p1").await.unwrap();
    assert_eq!(loaded, Some(favorite));
  }
}
