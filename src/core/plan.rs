//! Statement planning
//!
//! Turns a parsed statement into engine mutations, checked against the
//! engine's state with any not-yet-committed writes layered on top.

use uuid::Uuid;

use crate::core::errors::{Result, StoreError};
use crate::ql::ast::Statement;
use crate::storage::{Engine, Mutation, TableInfo};

/// Engine state as seen through a list of staged writes
struct View<'a> {
    engine: &'a dyn Engine,
    pending: &'a [Mutation],
    planned: Vec<Mutation>,
}

impl<'a> View<'a> {
    /// Staged writes, most recent first
    fn staged(&self) -> impl Iterator<Item = &Mutation> {
        self.planned.iter().rev().chain(self.pending.iter().rev())
    }

    fn table(&self, name: &str) -> Result<Option<TableInfo>> {
        for mutation in self.staged() {
            match mutation {
                Mutation::CreateTable { name: n, info } if n == name => return Ok(Some(info.clone())),
                Mutation::DropTable { name: n } if n == name => return Ok(None),
                _ => {},
            }
        }
        self.engine.table(name)
    }

    fn contains(&self, table: &str, key: &[u8]) -> Result<bool> {
        for mutation in self.staged() {
            match mutation {
                Mutation::Insert { table: t, key: k, .. } if t == table && k == key => return Ok(true),
                Mutation::CreateTable { name, .. } | Mutation::DropTable { name } if name == table => {
                    return Ok(false)
                },
                _ => {},
            }
        }
        self.engine.contains(table, key)
    }
}

/// Plan `statement` on top of `pending` writes
pub(crate) fn plan(statement: Statement, engine: &dyn Engine, pending: &[Mutation]) -> Result<Vec<Mutation>> {
    let mut view = View { engine, pending, planned: Vec::new() };

    match statement {
        Statement::CreateTable { name, if_not_exists, primary_key } => {
            if view.table(&name)?.is_some() {
                if if_not_exists {
                    return Ok(Vec::new());
                }
                return Err(StoreError::TableExists(name));
            }
            view.planned.push(Mutation::CreateTable { name, info: TableInfo { primary_key } });
        },
        Statement::DropTable { name, if_exists } => {
            if view.table(&name)?.is_none() {
                if if_exists {
                    return Ok(Vec::new());
                }
                return Err(StoreError::TableNotFound(name));
            }
            view.planned.push(Mutation::DropTable { name });
        },
        Statement::Insert { table, documents } => {
            let info = view.table(&table)?.ok_or_else(|| StoreError::TableNotFound(table.clone()))?;

            for document in documents {
                let key = match &info.primary_key {
                    Some(field) => {
                        let value = document.get(field).ok_or_else(|| StoreError::MissingPrimaryKey {
                            table: table.clone(),
                            field: field.clone(),
                        })?;
                        let key = bincode::serialize(value)?;
                        if view.contains(&table, &key)? {
                            return Err(StoreError::DuplicateKey { table, key: value.to_string() });
                        }
                        key
                    },
                    None => Uuid::new_v4().as_bytes().to_vec(),
                };
                view.planned.push(Mutation::Insert { table: table.clone(), key, document });
            }
        },
    }

    Ok(view.planned)
}
