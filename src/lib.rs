//! warzone: a micro-benchmark harness for a small document store
//!
//! This crate runs insert scenarios against pluggable storage engines
//! (in-memory, sled, append-only journal), times every iteration and
//! reports a sampled CSV series.

pub mod bench;
pub mod core;
pub mod ql;
pub mod storage;

// Main types, re-exported for convenience
pub use bench::{execute, BenchConfig, BenchError, Failures, Registry, RunParams};
pub use crate::core::database::{Database, Transaction, TxStats};
pub use crate::core::errors::{Result, StoreError};
pub use crate::core::value::{Document, Value};
pub use storage::EngineKind;
