//! Disk Cache - A size-bounded LRU disk cache
//!
//! Stores string and byte payloads under arbitrary keys with a last-modified
//! timestamp and optional metadata, evicting least recently used records once
//! the configured size is exceeded. A JSON layer caches typed objects, and a
//! scoped object pool manages reusable per-lifecycle resources.

pub mod cache;
pub mod config;
pub mod error;
pub mod pool;
pub mod record;
pub mod tasks;
pub mod typed;

pub use cache::{hash_key, CacheStats, CompactionReport};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use pool::{PoolError, PoolHandle, ScopeId, ScopedPool};
pub use record::{DiskCache, Metadata, RecordWriter, StreamEntry, StringEntry};
pub use tasks::spawn_maintenance_task;
pub use typed::JsonDiskCache;
