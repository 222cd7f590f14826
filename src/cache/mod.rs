//! Cache Module
//!
//! Provides the journal-backed, size-bounded LRU disk store and its key hashing.

mod entry;
mod journal;
mod key;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use entry::current_timestamp_ms;
pub use key::hash_key;
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::{CompactionReport, DiskLruStore, Editor, Snapshot};

// == Public Constants ==
/// Chunk size for streaming copies into a slot
pub const IO_BUFFER_SIZE: usize = 4 * 1024;
