//! Error types for the disk cache
//!
//! Provides unified error handling using thiserror.

use std::io;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the disk cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem failure, with what was being attempted
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Metadata or typed object could not be encoded/decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Journal contains a line that cannot be replayed
    #[error("Corrupt journal: {0}")]
    CorruptJournal(String),

    /// A record slot holds data that cannot be decoded
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// Key rejected by the backing store
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Construction parameters out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Slot index beyond the store's value count
    #[error("Slot index {0} out of range")]
    InvalidSlot(usize),

    /// Another edit is already open for this key
    #[error("Edit already in progress for key: {0}")]
    EditInProgress(String),

    /// A new entry was committed without a value for every slot
    #[error("Incomplete edit for key: {0}")]
    IncompleteEdit(String),

    /// A write failed during the edit, so it was aborted
    #[error("Edit failed for key: {0}")]
    EditFailed(String),

    /// The store has been closed
    #[error("Cache is closed")]
    Closed,
}

impl CacheError {
    /// Wraps an `io::Error` with a short description of the failed step.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        CacheError::Io {
            context: context.into(),
            source,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the disk cache.
pub type Result<T> = std::result::Result<T, CacheError>;
