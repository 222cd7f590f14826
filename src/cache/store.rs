//! Disk LRU Store Module
//!
//! Size-bounded, journal-backed store of multi-slot entries. Writes go through
//! an [`Editor`] transaction; reads return a [`Snapshot`] of open file handles,
//! so a reader never sees a partially committed entry.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::entry::{clean_file, dirty_file, DiskEntry};
use crate::cache::journal::{
    is_valid_key, read_journal, write_journal, JournalHeader, JournalOp, JournalWriter,
    JOURNAL_FILE, JOURNAL_FILE_BACKUP, JOURNAL_FILE_TEMP,
};
use crate::cache::{CacheStats, LruTracker, IO_BUFFER_SIZE};
use crate::error::{CacheError, Result};

/// Redundant journal lines tolerated before a rebuild
const REDUNDANT_OP_COMPACT_THRESHOLD: usize = 2000;

/// Edit id given to entries left DIRTY by a previous process
const RECOVERED_EDIT: u64 = 0;

// == Compaction Report ==
/// Outcome of a maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Entries evicted to get under the size limit
    pub evicted: usize,
    /// Whether the journal was rewritten
    pub journal_rebuilt: bool,
}

// == Store State ==
#[derive(Debug)]
struct StoreState {
    /// Open journal; `None` once the store is closed
    journal: Option<JournalWriter>,
    entries: HashMap<String, DiskEntry>,
    /// Access order of readable entries
    lru: LruTracker,
    /// Committed bytes across all entries
    size: u64,
    redundant_ops: usize,
    next_edit_id: u64,
    stats: CacheStats,
}

#[derive(Debug)]
struct Shared {
    directory: PathBuf,
    header: JournalHeader,
    max_size: u64,
    state: Mutex<StoreState>,
}

// == Disk LRU Store ==
/// Bounded LRU store of entries with `value_count` slots each.
#[derive(Debug)]
pub struct DiskLruStore {
    shared: Arc<Shared>,
}

impl DiskLruStore {
    // == Open ==
    /// Opens the store in `directory`, creating it if needed.
    ///
    /// An existing journal written with a different `app_version` or
    /// `value_count` causes the directory to be wiped. A journal with an
    /// unreadable line is a fatal [`CacheError::CorruptJournal`].
    pub fn open(
        directory: impl Into<PathBuf>,
        app_version: u32,
        value_count: usize,
        max_size: u64,
    ) -> Result<Self> {
        if value_count == 0 {
            return Err(CacheError::InvalidConfig(
                "value_count must be at least 1".to_string(),
            ));
        }
        if max_size == 0 {
            return Err(CacheError::InvalidConfig(
                "max_size must be at least 1 byte".to_string(),
            ));
        }

        let directory = directory.into();
        fs::create_dir_all(&directory)
            .map_err(|e| CacheError::io("creating cache directory", e))?;

        let header = JournalHeader {
            app_version,
            value_count,
        };
        let journal_path = directory.join(JOURNAL_FILE);
        promote_backup(&directory)?;

        let mut state = StoreState::new();
        let mut needs_rebuild = true;

        if journal_path.exists() {
            match read_journal(&journal_path, &header)? {
                Some(replayed) => {
                    state.replay(replayed.ops, value_count);
                    let dropped = state.drop_unfinished_edits(&directory, value_count);
                    needs_rebuild = replayed.torn_tail || dropped > 0;
                    if dropped > 0 {
                        warn!("Discarded {} entries left mid-edit", dropped);
                    }
                    if !needs_rebuild {
                        state.journal = Some(
                            JournalWriter::append_to(&journal_path)
                                .map_err(|e| CacheError::io("opening journal", e))?,
                        );
                    }
                }
                None => {
                    warn!(
                        "Journal in {} does not match app version {}, wiping cache",
                        directory.display(),
                        app_version
                    );
                    fs::remove_dir_all(&directory)
                        .map_err(|e| CacheError::io("wiping stale cache directory", e))?;
                    fs::create_dir_all(&directory)
                        .map_err(|e| CacheError::io("creating cache directory", e))?;
                }
            }
        }

        if needs_rebuild {
            state.rebuild_journal(&directory, &header)?;
        }

        info!(
            "Opened disk store at {}: {} entries, {} bytes (max {})",
            directory.display(),
            state.lru.len(),
            state.size,
            max_size
        );

        let shared = Arc::new(Shared {
            directory,
            header,
            max_size,
            state: Mutex::new(state),
        });
        let store = Self { shared };

        // A smaller max_size than last time takes effect immediately
        store.compact()?;
        Ok(store)
    }

    // == Edit ==
    /// Starts a write transaction for `key`.
    ///
    /// Returns `Ok(None)` if another edit is already open for the key.
    pub fn edit(&self, key: &str) -> Result<Option<Editor>> {
        validate_key(key)?;
        let value_count = self.shared.header.value_count;
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        state.ensure_open()?;

        if state
            .entries
            .get(key)
            .map_or(false, |entry| entry.editor.is_some())
        {
            return Ok(None);
        }

        let edit_id = state.next_edit_id;
        state.next_edit_id += 1;

        let entry = state
            .entries
            .entry(key.to_string())
            .or_insert_with(|| DiskEntry::new(key, value_count));
        entry.editor = Some(edit_id);

        let logged = state
            .append(&JournalOp::Dirty(key.to_string()))
            .and_then(|_| state.flush());
        if let Err(e) = logged {
            if let Some(entry) = state.entries.get_mut(key) {
                entry.editor = None;
                if !entry.readable {
                    state.entries.remove(key);
                }
            }
            return Err(e);
        }

        debug!("Opened edit {} for {}", edit_id, key);
        Ok(Some(Editor {
            shared: Arc::clone(&self.shared),
            key: key.to_string(),
            edit_id,
            written: vec![false; value_count],
            failed: false,
            done: false,
        }))
    }

    // == Get ==
    /// Returns a snapshot of the committed entry for `key`, if any.
    ///
    /// Every slot file is opened under the store lock, so the snapshot stays
    /// consistent even if the entry is overwritten or evicted afterwards.
    pub fn get(&self, key: &str) -> Result<Option<Snapshot>> {
        validate_key(key)?;
        let directory = &self.shared.directory;
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        state.ensure_open()?;

        let Some(entry) = state.entries.get(key).filter(|entry| entry.readable) else {
            state.stats.record_miss();
            return Ok(None);
        };

        let mut readers = Vec::with_capacity(entry.lengths.len());
        for index in 0..entry.lengths.len() {
            match File::open(entry.clean_path(directory, index)) {
                Ok(file) => readers.push(Some(file)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!("Slot {} of {} vanished from disk", index, key);
                    state.stats.record_miss();
                    return Ok(None);
                }
                Err(e) => return Err(CacheError::io("opening slot file", e)),
            }
        }

        let snapshot = Snapshot {
            lengths: entry.lengths.clone(),
            readers,
        };

        state.redundant_ops += 1;
        state.append(&JournalOp::Read(key.to_string()))?;
        state.lru.touch(key);
        state.stats.record_hit();

        if state.journal_rebuild_required() {
            if let Err(e) = state.rebuild_journal(directory, &self.shared.header) {
                warn!("Journal rebuild after read failed: {}", e);
            }
        }

        Ok(Some(snapshot))
    }

    // == Contains ==
    /// Checks for a committed entry whose slot files exist, without opening them.
    pub fn contains(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let state = self.shared.state.lock();
        state.ensure_open()?;

        let Some(entry) = state.entries.get(key).filter(|entry| entry.readable) else {
            return Ok(false);
        };
        for index in 0..entry.lengths.len() {
            let exists = entry
                .clean_path(&self.shared.directory, index)
                .try_exists()
                .map_err(|e| CacheError::io("checking slot file", e))?;
            if !exists {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // == Remove ==
    /// Deletes the entry for `key`.
    ///
    /// Returns `false` if there was nothing to remove or an edit is open on it.
    pub fn remove(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let directory = &self.shared.directory;
        let mut state = self.shared.state.lock();
        state.ensure_open()?;

        let removed = state.remove_entry(directory, key)?;
        state.flush()?;
        if state.journal_rebuild_required() {
            state.rebuild_journal(directory, &self.shared.header)?;
        }
        Ok(removed)
    }

    // == Compact ==
    /// Trims to the size limit and rewrites the journal if it has grown redundant.
    pub fn compact(&self) -> Result<CompactionReport> {
        let mut state = self.shared.state.lock();
        state.ensure_open()?;

        let evicted = state.trim_to_size(&self.shared.directory, self.shared.max_size)?;
        state.flush()?;
        let journal_rebuilt = state.journal_rebuild_required();
        if journal_rebuilt {
            state.rebuild_journal(&self.shared.directory, &self.shared.header)?;
        }
        Ok(CompactionReport {
            evicted,
            journal_rebuilt,
        })
    }

    /// Forces buffered journal lines to disk.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.ensure_open()?;
        state.flush()
    }

    // == Close ==
    /// Trims, flushes and closes the journal. Idempotent.
    ///
    /// Edits still open will fail to commit.
    pub fn close(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.journal.is_none() {
            return Ok(());
        }
        state.trim_to_size(&self.shared.directory, self.shared.max_size)?;
        state.flush()?;
        state.journal = None;
        info!("Closed disk store at {}", self.shared.directory.display());
        Ok(())
    }

    /// Closes the store and deletes its directory with everything in it.
    pub fn delete(&self) -> Result<()> {
        if let Err(e) = self.close() {
            warn!("Closing store before delete failed: {}", e);
        }
        let mut state = self.shared.state.lock();
        state.journal = None;
        state.entries.clear();
        state.lru.clear();
        state.size = 0;
        match fs::remove_dir_all(&self.shared.directory) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io("deleting cache directory", e)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().journal.is_none()
    }

    /// Committed bytes on disk.
    pub fn size(&self) -> u64 {
        self.shared.state.lock().size
    }

    pub fn max_size(&self) -> u64 {
        self.shared.max_size
    }

    pub fn directory(&self) -> &Path {
        &self.shared.directory
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.shared.state.lock();
        let mut stats = state.stats.clone();
        stats.total_entries = state.lru.len();
        stats.size_bytes = state.size;
        stats
    }
}

// == Editor ==
/// Write transaction on one entry.
///
/// Slots written through the editor land in dirty files and only replace the
/// committed files on [`commit`](Editor::commit). Dropping an editor without
/// committing aborts it.
#[derive(Debug)]
pub struct Editor {
    shared: Arc<Shared>,
    key: String,
    edit_id: u64,
    written: Vec<bool>,
    failed: bool,
    done: bool,
}

impl Editor {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Creates (truncating) the dirty file for a slot.
    ///
    /// Callers writing to the file directly must call
    /// [`mark_failed`](Self::mark_failed) on any write error.
    pub fn slot_file(&mut self, index: usize) -> Result<File> {
        if index >= self.written.len() {
            return Err(CacheError::InvalidSlot(index));
        }
        let path = dirty_file(&self.shared.directory, &self.key, index);
        match File::create(path) {
            Ok(file) => {
                self.written[index] = true;
                Ok(file)
            }
            Err(e) => Err(self.fail("creating slot file", e)),
        }
    }

    /// Writes the whole content of a slot.
    pub fn set(&mut self, index: usize, bytes: &[u8]) -> Result<()> {
        let mut file = self.slot_file(index)?;
        file.write_all(bytes)
            .map_err(|e| self.fail("writing slot file", e))
    }

    /// Copies `reader` into a slot in `IO_BUFFER_SIZE` chunks.
    ///
    /// Returns the number of bytes copied.
    pub fn copy_from<R: Read + ?Sized>(&mut self, index: usize, reader: &mut R) -> Result<u64> {
        let mut file = self.slot_file(index)?;
        let mut buffer = [0u8; IO_BUFFER_SIZE];
        let mut copied = 0u64;

        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail("reading source stream", e)),
            };
            file.write_all(&buffer[..read])
                .map_err(|e| self.fail("writing slot file", e))?;
            copied += read as u64;
        }
        Ok(copied)
    }

    /// Marks the edit as failed; a later commit aborts instead.
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    // == Commit ==
    /// Publishes every written slot atomically with respect to readers.
    ///
    /// A failed edit is aborted and reported as [`CacheError::EditFailed`].
    pub fn commit(mut self) -> Result<()> {
        self.done = true;
        if self.failed {
            self.shared
                .complete_edit(&self.key, self.edit_id, &self.written, false)?;
            return Err(CacheError::EditFailed(self.key.clone()));
        }
        self.shared
            .complete_edit(&self.key, self.edit_id, &self.written, true)
    }

    /// Discards the edit, keeping any previously committed value.
    pub fn abort(mut self) -> Result<()> {
        self.done = true;
        self.shared
            .complete_edit(&self.key, self.edit_id, &self.written, false)
    }

    fn fail(&mut self, context: &str, source: io::Error) -> CacheError {
        self.failed = true;
        CacheError::io(context, source)
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        debug!("Edit {} for {} dropped without commit", self.edit_id, self.key);
        if let Err(e) = self
            .shared
            .complete_edit(&self.key, self.edit_id, &self.written, false)
        {
            warn!("Aborting edit for {} failed: {}", self.key, e);
        }
    }
}

// == Snapshot ==
/// Point-in-time view of a committed entry.
#[derive(Debug)]
pub struct Snapshot {
    lengths: Vec<u64>,
    readers: Vec<Option<File>>,
}

impl Snapshot {
    /// Committed length of a slot, 0 for an out-of-range index.
    pub fn length(&self, index: usize) -> u64 {
        self.lengths.get(index).copied().unwrap_or(0)
    }

    /// Takes ownership of a slot's open file. Each slot can be taken once.
    pub fn take_reader(&mut self, index: usize) -> Option<File> {
        self.readers.get_mut(index)?.take()
    }

    pub fn read_to_end(&mut self, index: usize) -> Result<Vec<u8>> {
        let mut file = self.take_reader(index).ok_or(CacheError::InvalidSlot(index))?;
        let mut bytes = Vec::with_capacity(self.length(index) as usize);
        file.read_to_end(&mut bytes)
            .map_err(|e| CacheError::io("reading slot file", e))?;
        Ok(bytes)
    }

    pub fn read_to_string(&mut self, index: usize) -> Result<String> {
        let bytes = self.read_to_end(index)?;
        String::from_utf8(bytes).map_err(|e| {
            CacheError::io(
                "decoding slot as UTF-8",
                io::Error::new(io::ErrorKind::InvalidData, e),
            )
        })
    }
}

// == Shared Internals ==
impl Shared {
    /// Finishes an edit: publishes the written slots on success, discards
    /// them otherwise.
    fn complete_edit(&self, key: &str, edit_id: u64, written: &[bool], success: bool) -> Result<()> {
        let directory = self.directory.as_path();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let owns_entry = state
            .entries
            .get(key)
            .map_or(false, |entry| entry.editor == Some(edit_id));
        if state.journal.is_none() || !owns_entry {
            discard_dirty_files(directory, key, written.len());
            return Err(if state.journal.is_none() {
                CacheError::Closed
            } else {
                CacheError::EditFailed(key.to_string())
            });
        }

        let Some(mut entry) = state.entries.remove(key) else {
            return Err(CacheError::EditFailed(key.to_string()));
        };
        entry.editor = None;

        let mut outcome = Ok(());
        let mut success = success;
        if success && !entry.readable && written.iter().any(|slot| !slot) {
            success = false;
            outcome = Err(CacheError::IncompleteEdit(key.to_string()));
        }

        if success {
            let mut rename_error = None;
            for index in (0..written.len()).filter(|index| written[*index]) {
                let clean = entry.clean_path(directory, index);
                let published = fs::rename(entry.dirty_path(directory, index), &clean)
                    .and_then(|_| fs::metadata(&clean));
                match published {
                    Ok(meta) => {
                        state.size = state.size - entry.lengths[index] + meta.len();
                        entry.lengths[index] = meta.len();
                    }
                    Err(e) => {
                        rename_error = Some(e);
                        break;
                    }
                }
            }

            if let Some(e) = rename_error {
                // Some slots may already be published; drop the whole entry
                warn!("Commit of {} failed midway, removing entry: {}", key, e);
                discard_dirty_files(directory, key, written.len());
                discard_clean_files(directory, key, written.len());
                state.size = state.size.saturating_sub(entry.total_length());
                state.lru.remove(key);
                state.redundant_ops += 1;
                state.append(&JournalOp::Remove(key.to_string()))?;
                state.flush()?;
                return Err(CacheError::io("publishing slot file", e));
            }

            entry.readable = true;
            let lengths = entry.lengths.clone();
            state.stats.record_write();
            state.lru.touch(key);
            // Table, LRU and size agree even if the append below fails
            state.entries.insert(key.to_string(), entry);
            state.append(&JournalOp::Clean(key.to_string(), lengths))?;
            debug!("Committed edit {} for {}", edit_id, key);
        } else {
            discard_dirty_files(directory, key, written.len());
            if entry.readable {
                let lengths = entry.lengths.clone();
                state.entries.insert(key.to_string(), entry);
                state.append(&JournalOp::Clean(key.to_string(), lengths))?;
            } else {
                state.append(&JournalOp::Remove(key.to_string()))?;
            }
            debug!("Aborted edit {} for {}", edit_id, key);
        }
        state.redundant_ops += 1;
        state.flush()?;

        if state.size > self.max_size {
            state.trim_to_size(directory, self.max_size)?;
            state.flush()?;
        }
        if state.journal_rebuild_required() {
            state.rebuild_journal(directory, &self.header)?;
        }
        outcome
    }
}

impl StoreState {
    fn new() -> Self {
        Self {
            journal: None,
            entries: HashMap::new(),
            lru: LruTracker::new(),
            size: 0,
            redundant_ops: 0,
            next_edit_id: RECOVERED_EDIT + 1,
            stats: CacheStats::new(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.journal.is_some() {
            Ok(())
        } else {
            Err(CacheError::Closed)
        }
    }

    fn append(&mut self, op: &JournalOp) -> Result<()> {
        let journal = self.journal.as_mut().ok_or(CacheError::Closed)?;
        journal
            .append(op)
            .map_err(|e| CacheError::io("appending to journal", e))
    }

    fn flush(&mut self) -> Result<()> {
        match self.journal.as_mut() {
            Some(journal) => journal
                .flush()
                .map_err(|e| CacheError::io("flushing journal", e)),
            None => Ok(()),
        }
    }

    /// Rebuilds the entry table from journal operations.
    fn replay(&mut self, ops: Vec<JournalOp>, value_count: usize) {
        let op_count = ops.len();
        for op in ops {
            match op {
                JournalOp::Dirty(key) => {
                    let entry = self
                        .entries
                        .entry(key.clone())
                        .or_insert_with(|| DiskEntry::new(key, value_count));
                    entry.editor = Some(RECOVERED_EDIT);
                }
                JournalOp::Clean(key, lengths) => {
                    self.lru.touch(&key);
                    let entry = self
                        .entries
                        .entry(key.clone())
                        .or_insert_with(|| DiskEntry::new(key, value_count));
                    entry.readable = true;
                    entry.editor = None;
                    entry.lengths = lengths;
                }
                JournalOp::Remove(key) => {
                    self.entries.remove(&key);
                    self.lru.remove(&key);
                }
                JournalOp::Read(key) => {
                    if self.entries.get(&key).map_or(false, |entry| entry.readable) {
                        self.lru.touch(&key);
                    }
                }
            }
        }
        self.redundant_ops = op_count.saturating_sub(self.entries.len());
    }

    /// Deletes entries whose edit never finished and totals up the rest.
    ///
    /// Returns how many entries were discarded.
    fn drop_unfinished_edits(&mut self, directory: &Path, value_count: usize) -> usize {
        let unfinished: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.editor.is_some())
            .map(|entry| entry.key.clone())
            .collect();

        for key in &unfinished {
            discard_dirty_files(directory, key, value_count);
            discard_clean_files(directory, key, value_count);
            self.entries.remove(key);
            self.lru.remove(key);
        }

        self.size = self.entries.values().map(DiskEntry::total_length).sum();
        unfinished.len()
    }

    fn journal_rebuild_required(&self) -> bool {
        self.redundant_ops >= REDUNDANT_OP_COMPACT_THRESHOLD
            && self.redundant_ops >= self.entries.len()
    }

    /// Rewrites the journal with one line per live entry.
    fn rebuild_journal(&mut self, directory: &Path, header: &JournalHeader) -> Result<()> {
        let ops: Vec<JournalOp> = self
            .lru
            .oldest_first()
            .filter_map(|key| self.entries.get(key))
            .chain(self.entries.values().filter(|entry| !entry.readable))
            .map(|entry| {
                if entry.editor.is_some() {
                    JournalOp::Dirty(entry.key.clone())
                } else {
                    JournalOp::Clean(entry.key.clone(), entry.lengths.clone())
                }
            })
            .collect();

        let journal_path = directory.join(JOURNAL_FILE);
        let temp_path = directory.join(JOURNAL_FILE_TEMP);
        let backup_path = directory.join(JOURNAL_FILE_BACKUP);

        write_journal(&temp_path, header, &ops)
            .map_err(|e| CacheError::io("writing rebuilt journal", e))?;

        if let Some(mut old) = self.journal.take() {
            if let Err(e) = old.flush() {
                warn!("Flushing old journal before rebuild failed: {}", e);
            }
        }
        if journal_path.exists() {
            fs::rename(&journal_path, &backup_path)
                .map_err(|e| CacheError::io("backing up journal", e))?;
        }
        fs::rename(&temp_path, &journal_path)
            .map_err(|e| CacheError::io("installing rebuilt journal", e))?;
        remove_if_exists(&backup_path).map_err(|e| CacheError::io("removing journal backup", e))?;

        self.journal = Some(
            JournalWriter::append_to(&journal_path)
                .map_err(|e| CacheError::io("opening journal", e))?,
        );
        self.redundant_ops = 0;
        debug!("Rebuilt journal with {} entries", ops.len());
        Ok(())
    }

    /// Deletes a committed entry that has no open edit.
    fn remove_entry(&mut self, directory: &Path, key: &str) -> Result<bool> {
        let (value_count, total) = match self.entries.get(key) {
            Some(entry) if entry.editor.is_none() => (entry.lengths.len(), entry.total_length()),
            _ => return Ok(false),
        };

        for index in 0..value_count {
            remove_if_exists(&clean_file(directory, key, index))
                .map_err(|e| CacheError::io("deleting slot file", e))?;
        }

        self.size = self.size.saturating_sub(total);
        self.entries.remove(key);
        self.lru.remove(key);
        self.redundant_ops += 1;
        self.append(&JournalOp::Remove(key.to_string()))?;
        debug!("Removed {}", key);
        Ok(true)
    }

    /// Evicts least recently used entries until `size <= max_size`.
    ///
    /// Entries with an open edit are skipped.
    fn trim_to_size(&mut self, directory: &Path, max_size: u64) -> Result<usize> {
        let mut evicted = 0;
        while self.size > max_size {
            let victim = self
                .lru
                .oldest_first()
                .find(|key| {
                    self.entries
                        .get(*key)
                        .map_or(false, |entry| entry.editor.is_none())
                })
                .map(str::to_string);
            let Some(victim) = victim else {
                break;
            };
            if !self.remove_entry(directory, &victim)? {
                break;
            }
            self.stats.record_eviction();
            evicted += 1;
        }
        if evicted > 0 {
            debug!("Evicted {} entries, size now {}", evicted, self.size);
        }
        Ok(evicted)
    }
}

// == Utility Functions ==
fn validate_key(key: &str) -> Result<()> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_string()))
    }
}

/// Restores `journal` from `journal.bkp` after a rebuild was interrupted.
fn promote_backup(directory: &Path) -> Result<()> {
    let journal_path = directory.join(JOURNAL_FILE);
    let backup_path = directory.join(JOURNAL_FILE_BACKUP);
    if !backup_path.exists() {
        return Ok(());
    }
    if journal_path.exists() {
        remove_if_exists(&backup_path).map_err(|e| CacheError::io("removing journal backup", e))
    } else {
        fs::rename(&backup_path, &journal_path)
            .map_err(|e| CacheError::io("restoring journal backup", e))
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn discard_dirty_files(directory: &Path, key: &str, value_count: usize) {
    for index in 0..value_count {
        if let Err(e) = remove_if_exists(&dirty_file(directory, key, index)) {
            warn!("Could not delete dirty slot {} of {}: {}", index, key, e);
        }
    }
}

fn discard_clean_files(directory: &Path, key: &str, value_count: usize) {
    for index in 0..value_count {
        if let Err(e) = remove_if_exists(&clean_file(directory, key, index)) {
            warn!("Could not delete slot {} of {}: {}", index, key, e);
        }
    }
}
