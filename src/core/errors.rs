//! Error types for warzone
//!
//! This module defines the various error types that can occur
//! during database operations.

use thiserror::Error;

/// Errors that can occur during database operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid statement: {0}")]
    InvalidStatement(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Duplicate primary key {key} in table {table}")]
    DuplicateKey { table: String, key: String },

    #[error("Document inserted into {table} has no primary key field {field}")]
    MissingPrimaryKey { table: String, field: String },

    #[error("Cannot write in a read-only transaction")]
    ReadOnlyTransaction,

    #[error("A write transaction is already in progress")]
    TransactionInProgress,

    #[error("Database is closed")]
    Closed,

    #[error("Corrupt journal at line {line}: {reason}")]
    CorruptJournal { line: usize, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Internal(format!("sled: {}", e))
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::SerializationError(e.to_string())
    }
}

/// Result type for database operations
pub type Result<T> = std::result::Result<T, StoreError>;
