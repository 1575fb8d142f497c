pub mod value;
pub mod errors;
pub mod database;
mod plan;

pub use value::{Document, Value};
pub use database::{Database, Transaction, TxStats};
pub use errors::{Result, StoreError};
