//! In-memory engine for warzone
//!
//! This module provides a simple in-memory implementation
//! of the storage engine, mapping tables to their documents.

use std::collections::HashMap;

use crate::core::errors::{Result, StoreError};
use crate::core::value::Document;
use crate::storage::{check_tables, Engine, EngineKind, Mutation, TableInfo};

#[derive(Debug, Default)]
struct MemoryTable {
    info: TableInfo,
    docs: HashMap<Vec<u8>, Document>,
}

/// An in-memory engine
#[derive(Debug, Default)]
pub struct MemoryEngine {
    /// Map of table names to tables
    tables: HashMap<String, MemoryTable>,
}

impl MemoryEngine {
    /// Create a new empty memory engine
    pub fn new() -> Self {
        MemoryEngine {
            tables: HashMap::new(),
        }
    }

    /// Check that every insert of a batch targets a table that exists at
    /// that point of the batch.
    pub(crate) fn validate(&self, batch: &[Mutation]) -> Result<()> {
        check_tables(batch, |table| Ok(self.tables.contains_key(table)))
    }

    /// Apply a batch that already passed [`MemoryEngine::validate`]
    pub(crate) fn apply_unchecked(&mut self, batch: &[Mutation]) {
        for mutation in batch {
            match mutation {
                Mutation::CreateTable { name, info } => {
                    self.tables.insert(name.clone(), MemoryTable {
                        info: info.clone(),
                        docs: HashMap::new(),
                    });
                },
                Mutation::DropTable { name } => {
                    self.tables.remove(name);
                },
                Mutation::Insert { table, key, document } => {
                    if let Some(t) = self.tables.get_mut(table) {
                        t.docs.insert(key.clone(), document.clone());
                    }
                },
            }
        }
    }
}

impl Engine for MemoryEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Memory
    }

    fn table(&self, name: &str) -> Result<Option<TableInfo>> {
        Ok(self.tables.get(name).map(|t| t.info.clone()))
    }

    fn contains(&self, table: &str, key: &[u8]) -> Result<bool> {
        Ok(self.tables.get(table).map_or(false, |t| t.docs.contains_key(key)))
    }

    fn count(&self, table: &str) -> Result<usize> {
        self.tables
            .get(table)
            .map(|t| t.docs.len())
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }

    fn apply(&mut self, batch: &[Mutation]) -> Result<()> {
        self.validate(batch)?;
        self.apply_unchecked(batch);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        // No-op for in-memory engine
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
