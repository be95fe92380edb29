//! SQLite backend for the three store collections.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::StoreError;

use super::types::{now_ms, query_hash, CacheEntry, QueueDraft, QueueItem, ResultEntry, ENTRY_VERSION};

/// On-disk schema version, pinned via `PRAGMA user_version`.
const SCHEMA_VERSION: i32 = 1;

/// Per-record size constant used by the byte-count estimate. The
/// estimate is `cache rows * this`; explicitly not a precise
/// accounting mechanism.
pub const APPROX_RECORD_BYTES: u64 = 1024;

/// Schema for the three independent collections. No operation spans
/// more than one of them, so there is no cross-table atomicity to
/// preserve here.
const SCHEMA: &str = r#"
-- TTL-aware key/value cache (stores serialized JSON)
CREATE TABLE IF NOT EXISTS cache (
    key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    timestamp INTEGER NOT NULL,
    version TEXT NOT NULL,
    ttl_ms INTEGER
);

-- Durable action queue. seq carries the FIFO replay order.
CREATE TABLE IF NOT EXISTS queue (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    method TEXT NOT NULL,
    data BLOB,
    timestamp INTEGER NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0
);

-- Last successful server response per query
CREATE TABLE IF NOT EXISTS results (
    query_hash TEXT PRIMARY KEY,
    query TEXT NOT NULL,
    data BLOB NOT NULL,
    timestamp INTEGER NOT NULL
);
"#;

/// SQLite-backed store holding the cache, queue and results
/// collections behind one shared connection.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (creating if absent) the store at `path`.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        StoreError::Unavailable(format!(
          "failed to create store directory {}: {}",
          parent.display(),
          e
        ))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      StoreError::Unavailable(format!("failed to open store at {}: {}", path.display(), e))
    })?;

    Self::from_connection(conn)
  }

  /// Open an in-memory store. Used by tests and callers that want a
  /// process-lifetime scratch store.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    let conn = Connection::open_in_memory()
      .map_err(|e| StoreError::Unavailable(format!("failed to open in-memory store: {}", e)))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self, StoreError> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn run_migrations(&self) -> Result<(), StoreError> {
    let conn = self.lock()?;

    let version: i32 = conn
      .query_row("PRAGMA user_version", [], |row| row.get(0))
      .map_err(|e| StoreError::Unavailable(format!("failed to read schema version: {}", e)))?;

    if version > SCHEMA_VERSION {
      return Err(StoreError::Unavailable(format!(
        "store schema version {} is newer than supported version {}",
        version, SCHEMA_VERSION
      )));
    }

    conn
      .execute_batch(SCHEMA)
      .map_err(|e| StoreError::Unavailable(format!("failed to run migrations: {}", e)))?;

    conn
      .pragma_update(None, "user_version", SCHEMA_VERSION)
      .map_err(|e| StoreError::Unavailable(format!("failed to set schema version: {}", e)))?;

    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
    self
      .conn
      .lock()
      .map_err(|e| StoreError::Unavailable(format!("connection lock poisoned: {}", e)))
  }

  // ==========================================================================
  // Cache collection
  // ==========================================================================

  /// Write a cache entry, overwriting any existing entry for `key`.
  pub fn put_cache(&self, key: &str, data: &Value, ttl: Option<Duration>) -> Result<(), StoreError> {
    let conn = self.lock()?;
    let blob = serde_json::to_vec(data)?;
    let ttl_ms = ttl.map(|d| d.as_millis() as i64);

    conn.execute(
      "INSERT OR REPLACE INTO cache (key, data, timestamp, version, ttl_ms)
       VALUES (?, ?, ?, ?, ?)",
      params![key, blob, now_ms(), ENTRY_VERSION, ttl_ms],
    )?;

    Ok(())
  }

  /// Read a cache entry. A stale entry is purged as a side effect of
  /// the read that discovers it and reported as absent.
  pub fn get_cache(&self, key: &str) -> Result<Option<Value>, StoreError> {
    let conn = self.lock()?;

    let row: Option<(Vec<u8>, i64, String, Option<i64>)> = conn
      .query_row(
        "SELECT data, timestamp, version, ttl_ms FROM cache WHERE key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()?;

    let (blob, timestamp, version, ttl_ms) = match row {
      Some(row) => row,
      None => return Ok(None),
    };

    let entry = CacheEntry {
      key: key.to_string(),
      data: serde_json::from_slice(&blob)?,
      timestamp,
      version,
      ttl_ms,
    };

    if entry.is_stale_at(now_ms()) {
      conn.execute("DELETE FROM cache WHERE key = ?", params![key])?;
      return Ok(None);
    }

    Ok(Some(entry.data))
  }

  /// Delete one cache entry. No-op if absent.
  pub fn remove_cache(&self, key: &str) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM cache WHERE key = ?", params![key])?;
    Ok(())
  }

  /// Delete all cache entries. The queue and results collections are
  /// never touched by this.
  pub fn clear_cache(&self) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM cache", [])?;
    Ok(())
  }

  pub fn cache_len(&self) -> Result<u64, StoreError> {
    let conn = self.lock()?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
    Ok(count as u64)
  }

  /// Approximate byte count of the cache collection.
  pub fn approx_size(&self) -> Result<u64, StoreError> {
    Ok(self.cache_len()? * APPROX_RECORD_BYTES)
  }

  // ==========================================================================
  // Queue collection
  // ==========================================================================

  /// Persist a new queue item with a fresh random id, the current
  /// timestamp and a zero retry count.
  pub fn add_to_queue(&self, draft: QueueDraft) -> Result<QueueItem, StoreError> {
    let item = QueueItem {
      id: uuid::Uuid::new_v4().to_string(),
      url: draft.url,
      method: draft.method,
      data: draft.data,
      timestamp: now_ms(),
      retry_count: 0,
    };

    let conn = self.lock()?;
    let blob = match &item.data {
      Some(data) => Some(serde_json::to_vec(data)?),
      None => None,
    };
    conn.execute(
      "INSERT INTO queue (id, url, method, data, timestamp, retry_count)
       VALUES (?, ?, ?, ?, ?, ?)",
      params![
        item.id,
        item.url,
        item.method,
        blob,
        item.timestamp,
        item.retry_count
      ],
    )?;

    Ok(item)
  }

  /// All queued items in insertion order.
  pub fn queue(&self) -> Result<Vec<QueueItem>, StoreError> {
    let conn = self.lock()?;

    let mut stmt = conn.prepare(
      "SELECT id, url, method, data, timestamp, retry_count FROM queue ORDER BY seq",
    )?;

    let rows = stmt.query_map([], |row| {
      Ok((
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, String>(2)?,
        row.get::<_, Option<Vec<u8>>>(3)?,
        row.get::<_, i64>(4)?,
        row.get::<_, u32>(5)?,
      ))
    })?;

    let mut items = Vec::new();
    for row in rows {
      let (id, url, method, blob, timestamp, retry_count) = row?;
      let data = match blob {
        Some(blob) => Some(serde_json::from_slice(&blob)?),
        None => None,
      };
      items.push(QueueItem {
        id,
        url,
        method,
        data,
        timestamp,
        retry_count,
      });
    }

    Ok(items)
  }

  pub fn queue_len(&self) -> Result<u64, StoreError> {
    let conn = self.lock()?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM queue", [], |row| row.get(0))?;
    Ok(count as u64)
  }

  /// Delete one queued item. No-op if absent.
  pub fn remove_from_queue(&self, id: &str) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM queue WHERE id = ?", params![id])?;
    Ok(())
  }

  /// Persist a mutated item (retry count) in place, keeping its
  /// position in the replay order.
  pub fn update_queue_item(&self, item: &QueueItem) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute(
      "UPDATE queue SET retry_count = ? WHERE id = ?",
      params![item.retry_count, item.id],
    )?;
    Ok(())
  }

  /// Delete all queued items. The cache and results collections are
  /// never touched by this.
  pub fn clear_queue(&self) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM queue", [])?;
    Ok(())
  }

  // ==========================================================================
  // Results collection
  // ==========================================================================

  /// Store the last successful server response for `query`,
  /// overwriting any previous one.
  pub fn put_result(&self, query: &str, data: &Value) -> Result<(), StoreError> {
    let conn = self.lock()?;
    let blob = serde_json::to_vec(data)?;
    conn.execute(
      "INSERT OR REPLACE INTO results (query_hash, query, data, timestamp)
       VALUES (?, ?, ?, ?)",
      params![query_hash(query), query, blob, now_ms()],
    )?;
    Ok(())
  }

  pub fn get_result(&self, query: &str) -> Result<Option<ResultEntry>, StoreError> {
    let conn = self.lock()?;

    let row: Option<(String, Vec<u8>, i64)> = conn
      .query_row(
        "SELECT query, data, timestamp FROM results WHERE query_hash = ?",
        params![query_hash(query)],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()?;

    match row {
      Some((query, blob, timestamp)) => Ok(Some(ResultEntry {
        query,
        data: serde_json::from_slice(&blob)?,
        timestamp,
      })),
      None => Ok(None),
    }
  }

  pub fn clear_results(&self) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM results", [])?;
    Ok(())
  }
}
