//! Record Entry Types
//!
//! What a record read hands back to callers.

use std::fs::File;
use std::io::{self, Read};

/// Small annotations stored alongside a value.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// == String Entry ==
/// A cached text value with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StringEntry {
    pub value: String,
    pub metadata: Metadata,
}

// == Stream Entry ==
/// A cached value exposed as a reader over the committed file.
///
/// The file was opened when the record was read, so later overwrites or
/// evictions of the same key do not affect it.
#[derive(Debug)]
pub struct StreamEntry {
    reader: File,
    length: u64,
    metadata: Metadata,
}

impl StreamEntry {
    pub(crate) fn new(reader: File, length: u64, metadata: Metadata) -> Self {
        Self {
            reader,
            length,
            metadata,
        }
    }

    /// Size of the value in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

impl Read for StreamEntry {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}
