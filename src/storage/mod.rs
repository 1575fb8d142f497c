//! Storage engines for warzone
//!
//! Every engine stores tables of documents and applies batches of
//! mutations atomically. Statement planning and transactions live one
//! level up, in [`crate::core::database`].

pub mod journal;
pub mod memory;
pub mod persistent;

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, StoreError};
use crate::core::value::Document;

pub use journal::JournalEngine;
pub use memory::MemoryEngine;
pub use persistent::PersistentEngine;

/// The storage engines a database can be opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
pub enum EngineKind {
    /// Volatile, process-local tables
    Memory,
    /// sled-backed durable store
    #[default]
    Sled,
    /// Append-only JSON-lines journal
    Journal,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Memory => "memory",
            EngineKind::Sled => "sled",
            EngineKind::Journal => "journal",
        }
    }

    /// Whether the engine leaves an artifact on disk at its target
    pub fn is_durable(&self) -> bool {
        !matches!(self, EngineKind::Memory)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "memory" => Ok(EngineKind::Memory),
            "sled" => Ok(EngineKind::Sled),
            "journal" => Ok(EngineKind::Journal),
            other => Err(format!("unsupported engine: {}", other)),
        }
    }
}

/// Table metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Document field whose value keys the table
    pub primary_key: Option<String>,
}

/// A single write, as produced by statement planning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    CreateTable { name: String, info: TableInfo },
    DropTable { name: String },
    Insert { table: String, key: Vec<u8>, document: Document },
}

/// Trait defining the operations of a storage engine
pub trait Engine {
    /// Which kind of engine this is
    fn kind(&self) -> EngineKind;

    /// Metadata of a table, or `None` if it does not exist
    fn table(&self, name: &str) -> Result<Option<TableInfo>>;

    /// Check if a document key exists in a table
    fn contains(&self, table: &str, key: &[u8]) -> Result<bool>;

    /// Count the documents in a table
    fn count(&self, table: &str) -> Result<usize>;

    /// Apply a batch of mutations; either all of them take effect or none
    fn apply(&mut self, batch: &[Mutation]) -> Result<()>;

    /// Flush pending writes to durable storage (no-op for memory)
    fn flush(&mut self) -> Result<()>;

    /// Release the engine
    fn close(self: Box<Self>) -> Result<()>;
}

/// Check that every insert of a batch targets a table that exists at that
/// point of the batch. `exists` answers for tables the batch has not
/// created or dropped yet.
pub(crate) fn check_tables<F>(batch: &[Mutation], mut exists: F) -> Result<()>
where
    F: FnMut(&str) -> Result<bool>,
{
    let mut created: HashSet<&str> = HashSet::new();
    let mut dropped: HashSet<&str> = HashSet::new();

    for mutation in batch {
        match mutation {
            Mutation::CreateTable { name, .. } => {
                dropped.remove(name.as_str());
                created.insert(name.as_str());
            },
            Mutation::DropTable { name } => {
                created.remove(name.as_str());
                dropped.insert(name.as_str());
            },
            Mutation::Insert { table, .. } => {
                let found = created.contains(table.as_str())
                    || (!dropped.contains(table.as_str()) && exists(table)?);
                if !found {
                    return Err(StoreError::TableNotFound(table.clone()));
                }
            },
        }
    }

    Ok(())
}

/// Remove the on-disk artifact of a durable engine.
///
/// A missing artifact is not an error.
pub fn remove_artifact(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_engine_kind_names() {
        for kind in [EngineKind::Memory, EngineKind::Sled, EngineKind::Journal] {
            assert_eq!(kind.as_str().parse::<EngineKind>().unwrap(), kind);
        }
        assert!("bolt".parse::<EngineKind>().is_err());
        assert_eq!(EngineKind::default(), EngineKind::Sled);
        assert!(!EngineKind::Memory.is_durable());
        assert!(EngineKind::Journal.is_durable());
    }

    #[test]
    fn test_check_tables_follows_batch_order() {
        let create = Mutation::CreateTable { name: "t".to_string(), info: TableInfo::default() };
        let drop = Mutation::DropTable { name: "t".to_string() };
        let insert = Mutation::Insert { table: "t".to_string(), key: b"k".to_vec(), document: Document::new() };

        let mut lookups = Vec::new();
        let mut exists = |name: &str| -> Result<bool> {
            lookups.push(name.to_string());
            Ok(false)
        };

        check_tables(&[create.clone(), insert.clone()], &mut exists).unwrap();
        assert!(matches!(
            check_tables(&[create, drop, insert.clone()], &mut exists),
            Err(StoreError::TableNotFound(_))
        ));
        assert!(matches!(check_tables(&[insert], &mut exists), Err(StoreError::TableNotFound(_))));

        // Only the untouched table went to the engine
        assert_eq!(lookups, vec!["t".to_string()]);
    }

    #[test]
    fn test_remove_artifact() {
        let dir = tempdir().unwrap();

        let file = dir.path().join("bench.journal");
        fs::write(&file, b"{}\n").unwrap();
        remove_artifact(&file).unwrap();
        assert!(!file.exists());

        let nested = dir.path().join("bench.db");
        fs::create_dir_all(nested.join("blobs")).unwrap();
        fs::write(nested.join("blobs").join("1"), b"x").unwrap();
        remove_artifact(&nested).unwrap();
        assert!(!nested.exists());

        // Already gone
        remove_artifact(&nested).unwrap();
    }
}
