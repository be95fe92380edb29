//! Transactional store for offline persistence.
//!
//! Three independent collections behind one lazily-opened SQLite
//! database:
//! - `cache`: TTL-aware key/value entries, lazily expired on read
//! - `queue`: durable FIFO queue of actions awaiting replay
//! - `results`: last successful server response per query
//!
//! Per-operation atomicity only; no operation spans collections.

mod service;
mod sqlite;
mod types;

pub use service::Store;
pub use sqlite::{SqliteStore, APPROX_RECORD_BYTES};
pub use types::{now_ms, query_hash, CacheEntry, QueueDraft, QueueItem, ResultEntry, ENTRY_VERSION};
