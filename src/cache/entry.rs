//! Disk Entry Module
//!
//! In-memory bookkeeping for one key of the backing store and the file names
//! of its slots.

use std::path::{Path, PathBuf};

use chrono::Utc;

// == Disk Entry ==
/// State of one key in the backing store.
#[derive(Debug, Clone)]
pub struct DiskEntry {
    /// Store key (already hashed)
    pub key: String,
    /// Committed length of each slot in bytes
    pub lengths: Vec<u64>,
    /// True once the entry has been committed at least once
    pub readable: bool,
    /// Id of the edit currently open on this entry, if any
    pub editor: Option<u64>,
}

impl DiskEntry {
    // == Constructor ==
    /// Creates an entry with no committed data.
    pub fn new(key: impl Into<String>, value_count: usize) -> Self {
        Self {
            key: key.into(),
            lengths: vec![0; value_count],
            readable: false,
            editor: None,
        }
    }

    /// Total committed bytes across all slots.
    pub fn total_length(&self) -> u64 {
        self.lengths.iter().sum()
    }

    pub fn clean_path(&self, directory: &Path, index: usize) -> PathBuf {
        clean_file(directory, &self.key, index)
    }

    pub fn dirty_path(&self, directory: &Path, index: usize) -> PathBuf {
        dirty_file(directory, &self.key, index)
    }
}

// == Utility Functions ==
/// Path of the committed file for a slot.
pub fn clean_file(directory: &Path, key: &str, index: usize) -> PathBuf {
    directory.join(format!("{}.{}", key, index))
}

/// Path of the in-progress file for a slot.
pub fn dirty_file(directory: &Path, key: &str, index: usize) -> PathBuf {
    directory.join(format!("{}.{}.tmp", key, index))
}

/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
