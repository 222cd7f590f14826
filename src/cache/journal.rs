//! Journal Module
//!
//! Append-only text log of backing store operations. Replaying it on open
//! rebuilds the entry table and LRU order.
//!
//! ```text
//! disk_cache.journal
//! 1
//! <app_version>
//! <value_count>
//!
//! DIRTY <key>
//! CLEAN <key> <len0> <len1> ...
//! REMOVE <key>
//! READ <key>
//! ```

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::{CacheError, Result};

pub const JOURNAL_FILE: &str = "journal";
pub const JOURNAL_FILE_TEMP: &str = "journal.tmp";
pub const JOURNAL_FILE_BACKUP: &str = "journal.bkp";

const MAGIC: &str = "disk_cache.journal";
const FORMAT_VERSION: &str = "1";

/// Maximum length of a store key
pub const MAX_KEY_LENGTH: usize = 120;

// == Journal Operation ==
/// One line of the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalOp {
    /// Entry is being created or updated
    Dirty(String),
    /// Entry committed with the given slot lengths
    Clean(String, Vec<u64>),
    /// Entry deleted
    Remove(String),
    /// Entry accessed
    Read(String),
}

impl JournalOp {
    /// Parses a single line (without its trailing newline).
    pub fn parse(line: &str, value_count: usize) -> Result<Self> {
        let corrupt = || CacheError::CorruptJournal(format!("unexpected line: {:?}", line));

        let mut parts = line.split(' ');
        let verb = parts.next().ok_or_else(corrupt)?;
        let key = parts.next().ok_or_else(corrupt)?;
        if !is_valid_key(key) {
            return Err(corrupt());
        }
        let rest: Vec<&str> = parts.collect();

        let op = match (verb, rest.is_empty()) {
            ("DIRTY", true) => JournalOp::Dirty(key.to_string()),
            ("REMOVE", true) => JournalOp::Remove(key.to_string()),
            ("READ", true) => JournalOp::Read(key.to_string()),
            ("CLEAN", false) if rest.len() == value_count => {
                let lengths = rest
                    .iter()
                    .map(|len| len.parse::<u64>())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| corrupt())?;
                JournalOp::Clean(key.to_string(), lengths)
            }
            _ => return Err(corrupt()),
        };
        Ok(op)
    }
}

impl fmt::Display for JournalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalOp::Dirty(key) => write!(f, "DIRTY {}", key),
            JournalOp::Remove(key) => write!(f, "REMOVE {}", key),
            JournalOp::Read(key) => write!(f, "READ {}", key),
            JournalOp::Clean(key, lengths) => {
                write!(f, "CLEAN {}", key)?;
                for len in lengths {
                    write!(f, " {}", len)?;
                }
                Ok(())
            }
        }
    }
}

// == Header ==
/// Identity of a journal: a mismatch means the data on disk is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalHeader {
    pub app_version: u32,
    pub value_count: usize,
}

impl JournalHeader {
    fn render(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}\n\n",
            MAGIC, FORMAT_VERSION, self.app_version, self.value_count
        )
    }

    fn matches(&self, lines: &[&str]) -> bool {
        lines.len() == 5
            && lines[0] == MAGIC
            && lines[1] == FORMAT_VERSION
            && lines[2] == self.app_version.to_string()
            && lines[3] == self.value_count.to_string()
            && lines[4].is_empty()
    }
}

// == Replay ==
/// Operations recovered from a journal file.
#[derive(Debug, Default)]
pub struct ReplayedJournal {
    pub ops: Vec<JournalOp>,
    /// The final line had no newline and was dropped
    pub torn_tail: bool,
}

/// Reads and parses a journal.
///
/// Returns `Ok(None)` when the header does not match `expected`, which the
/// caller treats as "wipe and start over". A malformed complete line is a
/// `CorruptJournal` error.
pub fn read_journal(path: &Path, expected: &JournalHeader) -> Result<Option<ReplayedJournal>> {
    let bytes = fs::read(path).map_err(|e| CacheError::io("reading journal", e))?;
    let Ok(content) = String::from_utf8(bytes) else {
        return Err(CacheError::CorruptJournal("journal is not valid UTF-8".into()));
    };

    let mut lines: Vec<&str> = content.split('\n').collect();
    // Everything after the last '\n' is either "" or a torn append
    let tail = lines.pop().unwrap_or_default();

    if lines.len() < 5 || !expected.matches(&lines[..5]) {
        return Ok(None);
    }

    let ops = lines[5..]
        .iter()
        .map(|line| JournalOp::parse(line, expected.value_count))
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(ReplayedJournal {
        ops,
        torn_tail: !tail.is_empty(),
    }))
}

// == Writer ==
/// Buffered appender for an open journal.
#[derive(Debug)]
pub struct JournalWriter {
    out: BufWriter<File>,
}

impl JournalWriter {
    /// Opens an existing journal for appending.
    pub fn append_to(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    /// Writer that hands every line straight to the file.
    #[cfg(test)]
    pub(crate) fn unbuffered(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            out: BufWriter::with_capacity(0, file),
        })
    }

    /// Appends one operation. Call [`flush`](Self::flush) to make it durable.
    pub fn append(&mut self, op: &JournalOp) -> io::Result<()> {
        writeln!(self.out, "{}", op)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Writes a complete journal (header plus `ops`) to `path`, replacing it.
pub fn write_journal<'a>(
    path: &Path,
    header: &JournalHeader,
    ops: impl IntoIterator<Item = &'a JournalOp>,
) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(header.render().as_bytes())?;
    for op in ops {
        writeln!(out, "{}", op)?;
    }
    out.flush()?;
    out.get_ref().sync_all()
}

/// Store keys: 1 to 120 characters of `[a-z0-9_-]`.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LENGTH
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}
