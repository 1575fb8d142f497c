//! Abstract Syntax Tree for statements
//!
//! This module defines the structures that represent a parsed statement.

use crate::core::value::Document;

/// A parsed statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Create a table, optionally keyed by one document field
    CreateTable {
        /// Name of the table
        name: String,
        /// Succeed silently when the table already exists
        if_not_exists: bool,
        /// Field used as primary key, if any
        primary_key: Option<String>,
    },
    /// Drop a table and all of its documents
    DropTable {
        /// Name of the table
        name: String,
        /// Succeed silently when the table does not exist
        if_exists: bool,
    },
    /// Insert one or more documents
    Insert {
        /// Target table
        table: String,
        /// Documents to insert, in order
        documents: Vec<Document>,
    },
}

impl Statement {
    /// Name of the table the statement operates on
    pub fn table(&self) -> &str {
        match self {
            Statement::CreateTable { name, .. } => name,
            Statement::DropTable { name, .. } => name,
            Statement::Insert { table, .. } => table,
        }
    }
}
