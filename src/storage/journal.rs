//! Append-only journal engine
//!
//! Every applied batch becomes one JSON line in the journal file. The
//! tables live in memory and are rebuilt by replaying the journal when
//! the engine is opened.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, StoreError};
use crate::storage::memory::MemoryEngine;
use crate::storage::{Engine, EngineKind, Mutation, TableInfo};

/// One line of the journal
#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    seq: u64,
    /// Unix timestamp in milliseconds
    written_at: i64,
    mutations: Vec<Mutation>,
}

/// The file a journal appends to
pub trait LogFile: Write {
    /// Current length in bytes
    fn size(&self) -> io::Result<u64>;

    /// Cut the file back to `len` bytes
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Push written bytes to stable storage
    fn sync(&mut self) -> io::Result<()>;
}

impl LogFile for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

pub struct JournalEngine<F: LogFile = File> {
    path: PathBuf,
    state: MemoryEngine,
    file: F,
    seq: u64,
    /// Set when a failed append could not be cut back off the file
    broken: bool,
}

impl JournalEngine<File> {
    /// Open the journal at `path`, creating it if needed, and replay it
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let mut state = MemoryEngine::new();
        let mut seq = 0;

        if path.exists() {
            let valid_len = replay(&path, &mut state, &mut seq)?;
            let file = OpenOptions::new().write(true).open(&path)?;
            if file.metadata()?.len() > valid_len {
                warn!("journal {} has a torn tail, truncating to {} bytes", path.display(), valid_len);
                file.set_len(valid_len)?;
                file.sync_all()?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("journal {} opened at seq {}", path.display(), seq);

        Ok(JournalEngine {
            path,
            state,
            file,
            seq,
            broken: false,
        })
    }
}

impl<F: LogFile> JournalEngine<F> {
    /// Append one complete line. On failure the file is cut back to its
    /// previous length so no partial entry is left behind.
    fn append(&mut self, line: &[u8]) -> Result<()> {
        let offset = self.file.size()?;

        let written = self
            .file
            .write_all(line)
            .and_then(|_| self.file.flush())
            .and_then(|_| self.file.sync());

        if let Err(e) = written {
            if let Err(undo) = self.file.truncate(offset) {
                warn!("journal {}: cannot drop partial entry: {}", self.path.display(), undo);
                self.broken = true;
            }
            return Err(e.into());
        }
        Ok(())
    }
}

/// Replay every complete entry into `state` and return the byte length of
/// the valid prefix of the file.
fn replay(path: &Path, state: &mut MemoryEngine, seq: &mut u64) -> Result<u64> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut valid_len = 0u64;
    let mut line_no = 0usize;
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            break;
        }
        line_no += 1;

        // A line without its newline was cut short by a crash mid-append
        if !line.ends_with('\n') {
            break;
        }

        let entry: JournalEntry = serde_json::from_str(line.trim_end())
            .map_err(|e| StoreError::CorruptJournal { line: line_no, reason: e.to_string() })?;
        state
            .validate(&entry.mutations)
            .map_err(|e| StoreError::CorruptJournal { line: line_no, reason: e.to_string() })?;
        state.apply_unchecked(&entry.mutations);

        *seq = entry.seq;
        valid_len += read as u64;
    }

    Ok(valid_len)
}

/// JSON has no encoding for NaN or infinities
fn check_finite(batch: &[Mutation]) -> Result<()> {
    for mutation in batch {
        if let Mutation::Insert { table, document, .. } = mutation {
            if let Some((field, _)) = document.iter().find(|(_, value)| !value.is_finite()) {
                return Err(StoreError::SerializationError(format!(
                    "field {} of a document for {} holds a non-finite double",
                    field, table
                )));
            }
        }
    }
    Ok(())
}

impl<F: LogFile> Engine for JournalEngine<F> {
    fn kind(&self) -> EngineKind {
        EngineKind::Journal
    }

    fn table(&self, name: &str) -> Result<Option<TableInfo>> {
        self.state.table(name)
    }

    fn contains(&self, table: &str, key: &[u8]) -> Result<bool> {
        self.state.contains(table, key)
    }

    fn count(&self, table: &str) -> Result<usize> {
        self.state.count(table)
    }

    fn apply(&mut self, batch: &[Mutation]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        if self.broken {
            return Err(StoreError::Internal(format!(
                "journal {} ends with a partial entry and refuses further writes",
                self.path.display()
            )));
        }
        self.state.validate(batch)?;
        check_finite(batch)?;

        let entry = JournalEntry {
            seq: self.seq + 1,
            written_at: chrono::Utc::now().timestamp_millis(),
            mutations: batch.to_vec(),
        };
        let mut line = serde_json::to_vec(&entry)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        line.push(b'\n');

        self.append(&line)?;

        self.state.apply_unchecked(batch);
        self.seq = entry.seq;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync()?;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.flush()?;
        debug!("journal {} closed at seq {}", self.path.display(), self.seq);
        Ok(())
    }
}
