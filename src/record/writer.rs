//! Record Writer Module
//!
//! Streaming writer for a record's value slot.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use parking_lot::{MutexGuard, RwLockReadGuard};
use tracing::warn;

use crate::cache::{DiskLruStore, Editor};
use crate::error::{CacheError, Result};

// == Record Writer ==
/// Writes a value incrementally; nothing is visible until [`finish`](Self::finish).
///
/// Holds the cache's writer lock for its whole lifetime. Dropping it without
/// finishing aborts the write. If any write fails, `finish` aborts and
/// returns an error instead of committing.
pub struct RecordWriter<'a> {
    // Field order matters: the buffer drains before the editor aborts, and
    // both finish before the locks are released.
    out: BufWriter<File>,
    editor: Option<Editor>,
    _gate: MutexGuard<'a, ()>,
    _store: RwLockReadGuard<'a, DiskLruStore>,
}

impl<'a> RecordWriter<'a> {
    pub(crate) fn new(
        editor: Editor,
        file: File,
        gate: MutexGuard<'a, ()>,
        store: RwLockReadGuard<'a, DiskLruStore>,
    ) -> Self {
        Self {
            out: BufWriter::new(file),
            editor: Some(editor),
            _gate: gate,
            _store: store,
        }
    }

    // == Finish ==
    /// Flushes and commits the record.
    pub fn finish(mut self) -> Result<()> {
        let Some(mut editor) = self.editor.take() else {
            return Err(CacheError::Closed);
        };
        if let Err(e) = self.out.flush() {
            warn!("Flushing record for {} failed: {}", editor.key(), e);
            editor.mark_failed();
        }
        editor.commit()
    }

    fn record_failure(&mut self) {
        if let Some(editor) = self.editor.as_mut() {
            editor.mark_failed();
        }
    }
}

impl Write for RecordWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.write(buf).map_err(|e| {
            self.record_failure();
            e
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush().map_err(|e| {
            self.record_failure();
            e
        })
    }
}
