// src/storage/persistent.rs

use std::collections::HashMap;
use std::path::PathBuf;

use bincode::{deserialize, serialize};
use log::debug;
use sled::{Batch, Db};

use crate::core::errors::{Result, StoreError};
use crate::storage::{check_tables, Engine, EngineKind, Mutation, TableInfo};

const META_PREFIX: &[u8] = b"m\0";
const DOC_PREFIX: &[u8] = b"d\0";

/// A durable engine backed by a single sled tree.
///
/// Table metadata lives under `m\0<table>`, documents under
/// `d\0<table>\0<key>`, both bincode-encoded.
pub struct PersistentEngine {
    /// The underlying sled database
    db: Db,
    path: PathBuf,
}

impl PersistentEngine {
    /// Open a persistent engine at the given path
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let db = sled::open(&path)
            .map_err(|e| StoreError::Internal(format!("Failed to open database {}: {}", path.display(), e)))?;

        debug!("sled engine opened at {}", path.display());
        Ok(PersistentEngine { db, path })
    }
}

fn meta_key(table: &str) -> Vec<u8> {
    let mut key = META_PREFIX.to_vec();
    key.extend_from_slice(table.as_bytes());
    key
}

fn doc_prefix(table: &str) -> Vec<u8> {
    let mut key = DOC_PREFIX.to_vec();
    key.extend_from_slice(table.as_bytes());
    key.push(0);
    key
}

fn doc_key(table: &str, key: &[u8]) -> Vec<u8> {
    let mut full = doc_prefix(table);
    full.extend_from_slice(key);
    full
}

impl Engine for PersistentEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Sled
    }

    fn table(&self, name: &str) -> Result<Option<TableInfo>> {
        match self.db.get(meta_key(name))? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn contains(&self, table: &str, key: &[u8]) -> Result<bool> {
        Ok(self.db.contains_key(doc_key(table, key))?)
    }

    fn count(&self, table: &str) -> Result<usize> {
        if self.table(table)?.is_none() {
            return Err(StoreError::TableNotFound(table.to_string()));
        }

        let mut count = 0;
        for item in self.db.scan_prefix(doc_prefix(table)) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn apply(&mut self, batch: &[Mutation]) -> Result<()> {
        check_tables(batch, |table| Ok(self.table(table)?.is_some()))?;

        let mut writes = Batch::default();
        // Keys written earlier in this batch, so a later drop can undo them
        let mut staged: HashMap<&str, Vec<Vec<u8>>> = HashMap::new();

        for mutation in batch {
            match mutation {
                Mutation::CreateTable { name, info } => {
                    writes.insert(meta_key(name), serialize(info)?);
                },
                Mutation::DropTable { name } => {
                    for item in self.db.scan_prefix(doc_prefix(name)) {
                        let (key, _) = item?;
                        writes.remove(key);
                    }
                    for key in staged.remove(name.as_str()).unwrap_or_default() {
                        writes.remove(key);
                    }
                    writes.remove(meta_key(name));
                },
                Mutation::Insert { table, key, document } => {
                    let full = doc_key(table, key);
                    writes.insert(full.clone(), serialize(document)?);
                    staged.entry(table.as_str()).or_default().push(full);
                },
            }
        }

        self.db.apply_batch(writes)?;

        // Flush to ensure data is persisted
        self.db.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.db.flush()?;
        debug!("sled engine at {} closed", self.path.display());
        Ok(())
    }
}
