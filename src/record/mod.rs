//! Record Cache Module
//!
//! Stores values under arbitrary string keys as three-slot records
//! (last-modified time, metadata, value) in a [`DiskLruStore`].
//!
//! Read paths never fail: any error is logged and reported as a miss.
//! Write paths and [`DiskCache::clear`] return errors to the caller.

mod entry;
mod writer;

use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::{
    current_timestamp_ms, hash_key, CacheStats, CompactionReport, DiskLruStore, Editor, Snapshot,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

pub use entry::{Metadata, StreamEntry, StringEntry};
pub use writer::RecordWriter;

// == Slot Layout ==
const LAST_MODIFIED_SLOT: usize = 0;
const METADATA_SLOT: usize = 1;
const VALUE_SLOT: usize = 2;
const SLOT_COUNT: usize = 3;

// == Disk Cache ==
/// Keyed disk cache with freshness checks and LRU eviction.
///
/// Shared across threads behind an `Arc`. Puts are serialized with each
/// other; [`clear`](Self::clear) waits for every other operation to finish.
///
/// Everything except puts and `clear` takes the store lock recursively, so a
/// thread holding a [`RecordWriter`] cannot block itself behind a queued
/// `clear`.
#[derive(Debug)]
pub struct DiskCache {
    config: CacheConfig,
    store: RwLock<DiskLruStore>,
    write_gate: Mutex<()>,
}

impl DiskCache {
    // == Constructor ==
    /// Opens (or creates) the cache described by `config`.
    pub fn open(config: CacheConfig) -> Result<Self> {
        let store = Self::open_store(&config)?;
        info!(
            "Disk cache ready at {} (version {}, max {} bytes)",
            config.directory.display(),
            config.app_version,
            config.max_size
        );
        Ok(Self {
            config,
            store: RwLock::new(store),
            write_gate: Mutex::new(()),
        })
    }

    /// Shorthand for [`open`](Self::open) with an explicit directory, version
    /// and size limit.
    pub fn open_at(directory: impl AsRef<Path>, app_version: u32, max_size: u64) -> Result<Self> {
        Self::open(CacheConfig::new(directory.as_ref(), app_version, max_size))
    }

    fn open_store(config: &CacheConfig) -> Result<DiskLruStore> {
        DiskLruStore::open(
            &config.directory,
            config.app_version,
            SLOT_COUNT,
            config.max_size,
        )
    }

    // == Put ==
    /// Stores a string value with empty metadata, replacing any previous record.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.put_with_metadata(key, value, &Metadata::new())
    }

    /// Stores a string value with metadata, replacing any previous record.
    pub fn put_with_metadata(&self, key: &str, value: &str, metadata: &Metadata) -> Result<()> {
        let store = self.store.read();
        let _gate = self.write_gate.lock();

        let mut editor = begin_record(&store, key, metadata)?;
        editor.set(VALUE_SLOT, value.as_bytes())?;
        editor.commit()?;
        debug!("Cached {} ({} bytes)", key, value.len());
        Ok(())
    }

    /// Stores the contents of `reader`, copied in fixed-size chunks.
    ///
    /// Returns the number of bytes stored. If reading or writing fails, the
    /// record is left as it was.
    pub fn put_stream<R: Read>(&self, key: &str, mut reader: R, metadata: &Metadata) -> Result<u64> {
        let store = self.store.read();
        let _gate = self.write_gate.lock();

        let mut editor = begin_record(&store, key, metadata)?;
        let copied = editor.copy_from(VALUE_SLOT, &mut reader)?;
        editor.commit()?;
        debug!("Cached stream {} ({} bytes)", key, copied);
        Ok(copied)
    }

    /// Opens a writer for the value of `key`. Other puts wait until it is
    /// finished or dropped.
    ///
    /// Reads, evicts and stats stay available on the writer's own thread,
    /// even while a [`clear`](Self::clear) is queued. A put from that thread
    /// blocks forever, since it waits for this writer.
    pub fn open_writer(&self, key: &str, metadata: &Metadata) -> Result<RecordWriter<'_>> {
        let store = self.store.read();
        let gate = self.write_gate.lock();

        let mut editor = begin_record(&store, key, metadata)?;
        let file = editor.slot_file(VALUE_SLOT)?;
        Ok(RecordWriter::new(editor, file, gate, store))
    }

    // == Get ==
    /// Returns the cached value for `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_string(key).map(|entry| entry.value)
    }

    /// Returns the cached value and its metadata.
    ///
    /// Unreadable metadata does not hide the value; it is replaced by an
    /// empty map.
    pub fn get_string(&self, key: &str) -> Option<StringEntry> {
        absent_on_error(key, self.try_get_string(key))
    }

    /// Returns the cached value as a reader.
    pub fn get_stream(&self, key: &str) -> Option<StreamEntry> {
        absent_on_error(key, self.try_get_stream(key))
    }

    fn try_get_string(&self, key: &str) -> Result<Option<StringEntry>> {
        let Some(mut snapshot) = self.snapshot(key)? else {
            return Ok(None);
        };
        let value = snapshot.read_to_string(VALUE_SLOT)?;
        let metadata = read_metadata(&mut snapshot, key);
        Ok(Some(StringEntry { value, metadata }))
    }

    fn try_get_stream(&self, key: &str) -> Result<Option<StreamEntry>> {
        let Some(mut snapshot) = self.snapshot(key)? else {
            return Ok(None);
        };
        let metadata = read_metadata(&mut snapshot, key);
        let length = snapshot.length(VALUE_SLOT);
        let reader = snapshot
            .take_reader(VALUE_SLOT)
            .ok_or(CacheError::InvalidSlot(VALUE_SLOT))?;
        Ok(Some(StreamEntry::new(reader, length, metadata)))
    }

    fn snapshot(&self, key: &str) -> Result<Option<Snapshot>> {
        self.store.read_recursive().get(&hash_key(key))
    }

    // == Has ==
    /// Checks whether a record exists without reading it.
    pub fn has(&self, key: &str) -> bool {
        match self.store.read_recursive().contains(&hash_key(key)) {
            Ok(found) => found,
            Err(e) => {
                debug!("Existence check for {} failed: {}", key, e);
                false
            }
        }
    }

    // == Freshness ==
    /// True if a record exists and was written less than `max_age_ms` ago.
    pub fn has_fresh_cache(&self, key: &str, max_age_ms: u64) -> bool {
        if !self.has(key) {
            return false;
        }
        match self.cached_date(key) {
            0 => false,
            written => current_timestamp_ms().saturating_sub(written) < max_age_ms,
        }
    }

    /// Milliseconds since the epoch when `key` was last written, or 0.
    pub fn cached_date(&self, key: &str) -> u64 {
        absent_on_error(key, self.try_cached_date(key)).unwrap_or(0)
    }

    /// [`cached_date`](Self::cached_date) as a `DateTime`.
    pub fn cached_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let millis = absent_on_error(key, self.try_cached_date(key))?;
        Utc.timestamp_millis_opt(i64::try_from(millis).ok()?).single()
    }

    fn try_cached_date(&self, key: &str) -> Result<Option<u64>> {
        let Some(mut snapshot) = self.snapshot(key)? else {
            return Ok(None);
        };
        let text = snapshot.read_to_string(LAST_MODIFIED_SLOT)?;
        let millis = text.trim().parse::<u64>().map_err(|_| {
            CacheError::CorruptRecord(format!("bad timestamp {:?} for {}", text, key))
        })?;
        Ok(Some(millis))
    }

    // == Evict ==
    /// Removes the record for `key` if present.
    pub fn evict(&self, key: &str) {
        match self.store.read_recursive().remove(&hash_key(key)) {
            Ok(true) => debug!("Evicted {}", key),
            Ok(false) => {}
            Err(e) => warn!("Evicting {} failed: {}", key, e),
        }
    }

    // == Clear ==
    /// Deletes every record by recreating the cache directory.
    ///
    /// Blocks until in-flight operations finish and holds off new ones.
    pub fn clear(&self) -> Result<()> {
        let mut store = self.store.write();
        let deleted = store.delete();
        if let Err(e) = fs::create_dir_all(&self.config.directory) {
            return Err(CacheError::io("recreating cache directory", e));
        }
        *store = Self::open_store(&self.config)?;
        deleted?;
        info!("Cleared disk cache at {}", self.config.directory.display());
        Ok(())
    }

    // == Maintenance ==
    /// Trims to the size limit and compacts the journal when needed.
    pub fn compact(&self) -> Result<CompactionReport> {
        self.store.read_recursive().compact()
    }

    /// Committed bytes on disk.
    pub fn size(&self) -> u64 {
        self.store.read_recursive().size()
    }

    pub fn stats(&self) -> CacheStats {
        self.store.read_recursive().stats()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

// == Helpers ==
/// Starts an edit and writes the timestamp and metadata slots.
fn begin_record(store: &DiskLruStore, key: &str, metadata: &Metadata) -> Result<Editor> {
    let mut editor = store
        .edit(&hash_key(key))?
        .ok_or_else(|| CacheError::EditInProgress(key.to_string()))?;
    editor.set(
        LAST_MODIFIED_SLOT,
        current_timestamp_ms().to_string().as_bytes(),
    )?;
    editor.set(METADATA_SLOT, &serde_json::to_vec(metadata)?)?;
    Ok(editor)
}

fn read_metadata(snapshot: &mut Snapshot, key: &str) -> Metadata {
    let decoded = snapshot
        .read_to_end(METADATA_SLOT)
        .and_then(|bytes| serde_json::from_slice::<Metadata>(&bytes).map_err(CacheError::from));
    match decoded {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("Ignoring unreadable metadata for {}: {}", key, e);
            Metadata::new()
        }
    }
}

fn absent_on_error<T>(key: &str, result: Result<Option<T>>) -> Option<T> {
    match result {
        Ok(found) => found,
        Err(e) => {
            warn!("Treating {} as a miss: {}", key, e);
            None
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{self, Cursor, Write};
    use std::sync::{mpsc, Arc};
    use std::thread::{self, sleep};
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn open_cache(max_size: u64) -> (TempDir, DiskCache) {
        let dir = tempdir().unwrap();
        let cache = DiskCache::open_at(dir.path().join("cache"), 1, max_size).unwrap();
        (dir, cache)
    }

    fn slot_path(cache: &DiskCache, key: &str, slot: usize) -> std::path::PathBuf {
        cache
            .config()
            .directory
            .join(format!("{}.{}", hash_key(key), slot))
    }

    #[test]
    fn test_put_and_get() {
        let (_dir, cache) = open_cache(1024 * 1024);

        cache.put("posts/hot", "[1,2,3]").unwrap();

        assert_eq!(cache.get("posts/hot"), Some("[1,2,3]".to_string()));
        assert!(cache.has("posts/hot"));
    }

    #[test]
    fn test_absent_key() {
        let (_dir, cache) = open_cache(1024);

        assert_eq!(cache.get("never"), None);
        assert!(!cache.has("never"));
        assert_eq!(cache.cached_date("never"), 0);
        assert!(cache.cached_at("never").is_none());
        assert!(!cache.has_fresh_cache("never", u64::MAX));
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let (_dir, cache) = open_cache(1024);

        cache.put("k", "first").unwrap();
        cache.put("k", "second").unwrap();

        assert_eq!(cache.get("k"), Some("second".to_string()));
    }

    #[test]
    fn test_empty_value_round_trips() {
        let (_dir, cache) = open_cache(1024);

        cache.put("k", "").unwrap();

        assert_eq!(cache.get("k"), Some(String::new()));
    }

    #[test]
    fn test_metadata_round_trips() {
        let (_dir, cache) = open_cache(1024);
        let mut metadata = Metadata::new();
        metadata.insert("etag".into(), json!("abc123"));
        metadata.insert("page".into(), json!(2));

        cache.put_with_metadata("k", "body", &metadata).unwrap();

        let entry = cache.get_string("k").unwrap();
        assert_eq!(entry.value, "body");
        assert_eq!(entry.metadata, metadata);
    }

    #[test]
    fn test_corrupt_metadata_keeps_value() {
        let (_dir, cache) = open_cache(1024);
        cache.put("k", "still here").unwrap();

        fs::write(slot_path(&cache, "k", METADATA_SLOT), b"\x00not json").unwrap();

        let entry = cache.get_string("k").unwrap();
        assert_eq!(entry.value, "still here");
        assert!(entry.metadata.is_empty());
    }

    #[test]
    fn test_non_utf8_value_reads_as_miss() {
        let (_dir, cache) = open_cache(1024);
        cache
            .put_stream("bin", Cursor::new(vec![0xff, 0xfe, 0x00]), &Metadata::new())
            .unwrap();

        assert_eq!(cache.get("bin"), None);
        assert!(cache.has("bin"));
    }

    #[test]
    fn test_fresh_cache_window() {
        let (_dir, cache) = open_cache(1024);
        cache.put("k", "v").unwrap();

        assert!(cache.has_fresh_cache("k", 1000));
        assert!(!cache.has_fresh_cache("k", 0));

        sleep(Duration::from_millis(150));
        assert!(!cache.has_fresh_cache("k", 100));
        assert!(cache.has_fresh_cache("k", 60_000));
    }

    #[test]
    fn test_cached_date_is_write_time() {
        let (_dir, cache) = open_cache(1024);
        let before = current_timestamp_ms();
        cache.put("k", "v").unwrap();
        let after = current_timestamp_ms();

        let written = cache.cached_date("k");
        assert!(written >= before && written <= after);
        assert_eq!(
            cache.cached_at("k").unwrap().timestamp_millis(),
            written as i64
        );
    }

    #[test]
    fn test_corrupt_timestamp_reads_as_zero() {
        let (_dir, cache) = open_cache(1024);
        cache.put("k", "v").unwrap();

        fs::write(slot_path(&cache, "k", LAST_MODIFIED_SLOT), b"yesterday").unwrap();

        assert_eq!(cache.cached_date("k"), 0);
        assert!(!cache.has_fresh_cache("k", u64::MAX));
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn test_evict_is_idempotent() {
        let (_dir, cache) = open_cache(1024);
        cache.put("k", "v").unwrap();

        cache.evict("k");
        cache.evict("k");
        cache.evict("never-written");

        assert!(!cache.has("k"));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_clear_removes_everything() {
        let (_dir, cache) = open_cache(1024);
        cache.put("k1", "v1").unwrap();
        cache.put("k2", "v2").unwrap();

        cache.clear().unwrap();

        assert!(!cache.has("k1"));
        assert!(!cache.has("k2"));
        assert_eq!(cache.size(), 0);

        cache.put("k3", "v3").unwrap();
        assert_eq!(cache.get("k3"), Some("v3".to_string()));
    }

    #[test]
    fn test_put_stream_copies_everything() {
        let (_dir, cache) = open_cache(1024 * 1024);
        let payload = "x".repeat(10_000);

        let copied = cache
            .put_stream("big", Cursor::new(payload.clone()), &Metadata::new())
            .unwrap();

        assert_eq!(copied, 10_000);
        assert_eq!(cache.get("big"), Some(payload));
    }

    #[test]
    fn test_failed_stream_leaves_previous_record() {
        struct FailsAfterOneChunk(bool);
        impl Read for FailsAfterOneChunk {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0 {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection reset"));
                }
                self.0 = true;
                buf[0] = b'z';
                Ok(1)
            }
        }

        let (_dir, cache) = open_cache(1024);
        cache.put("k", "original").unwrap();

        let result = cache.put_stream("k", FailsAfterOneChunk(false), &Metadata::new());

        assert!(result.is_err());
        assert_eq!(cache.get("k"), Some("original".to_string()));
    }

    #[test]
    fn test_get_stream_reads_value() {
        let (_dir, cache) = open_cache(1024);
        let mut metadata = Metadata::new();
        metadata.insert("type".into(), json!("image/png"));
        cache.put_with_metadata("img", "PNGDATA", &metadata).unwrap();

        let mut entry = cache.get_stream("img").unwrap();
        let mut body = String::new();
        entry.read_to_string(&mut body).unwrap();

        assert_eq!(body, "PNGDATA");
        assert_eq!(entry.length(), 7);
        assert_eq!(entry.metadata()["type"], "image/png");
    }

    #[test]
    fn test_writer_commits_on_finish() {
        let (_dir, cache) = open_cache(1024);

        let mut writer = cache.open_writer("k", &Metadata::new()).unwrap();
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();
        writer.finish().unwrap();

        assert_eq!(cache.get("k"), Some("hello world".to_string()));
    }

    #[test]
    fn test_dropped_writer_leaves_nothing() {
        let (_dir, cache) = open_cache(1024);

        {
            let mut writer = cache.open_writer("k", &Metadata::new()).unwrap();
            writer.write_all(b"partial").unwrap();
        }

        assert!(!cache.has("k"));
        assert_eq!(cache.get("k"), None);
        // The writer lock is released again
        cache.put("k", "after").unwrap();
        assert_eq!(cache.get("k"), Some("after".to_string()));
    }

    #[test]
    fn test_reads_on_writer_thread_pass_queued_clear() {
        let (_dir, cache) = open_cache(1024);
        let cache = Arc::new(cache);
        cache.put("other", "kept until clear").unwrap();
        let (done_tx, done_rx) = mpsc::channel();

        let worker = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let mut writer = cache.open_writer("draft", &Metadata::new()).unwrap();
                writer.write_all(b"body").unwrap();

                let clearer = {
                    let cache = Arc::clone(&cache);
                    thread::spawn(move || cache.clear().unwrap())
                };
                // Let clear queue up on the store lock
                sleep(Duration::from_millis(100));

                let seen = cache.get("other");
                let present = cache.has("other");
                let written = cache.cached_date("other");
                done_tx.send((seen, present, written)).unwrap();

                writer.finish().unwrap();
                clearer.join().unwrap();
            })
        };

        let (seen, present, written) = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("read on the writer thread should not wait for clear");
        assert_eq!(seen, Some("kept until clear".to_string()));
        assert!(present);
        assert!(written > 0);

        worker.join().unwrap();
        assert!(!cache.has("draft"));
        assert!(!cache.has("other"));
    }

    #[test]
    fn test_size_limit_evicts_oldest_records() {
        let (_dir, cache) = open_cache(200);
        let value = "v".repeat(50);

        for i in 0..10 {
            cache.put(&format!("key-{}", i), &value).unwrap();
        }

        assert!(cache.size() <= 200);
        assert!(!cache.has("key-0"));
        assert!(cache.has("key-9"));
        assert!(cache.stats().evictions > 0);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let cache = DiskCache::open_at(dir.path(), 1, 1024).unwrap();
            cache.put("k", "persisted").unwrap();
        }

        {
            let cache = DiskCache::open_at(dir.path(), 1, 1024).unwrap();
            assert_eq!(cache.get("k"), Some("persisted".to_string()));
        }

        let bumped = DiskCache::open_at(dir.path(), 2, 1024).unwrap();
        assert_eq!(bumped.get("k"), None);
    }
}
