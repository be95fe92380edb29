//! Offline-first cache and sync engine for the research assistant
//! client.
//!
//! While connected, reads go through a TTL-aware cache and mutations
//! hit the API directly. While disconnected, reads are served from
//! the local store and mutations are queued durably; the queue is
//! replayed in insertion order, one pass at a time, when connectivity
//! returns. Items that keep failing are dropped after a bounded
//! number of retries.

pub mod capabilities;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod notify;
pub mod research;
pub mod store;
pub mod sync;
