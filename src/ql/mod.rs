//! Statement language for warzone
//!
//! A small document-SQL dialect: table creation and removal, and document
//! inserts.

pub mod ast;
pub mod parser;

pub use ast::Statement;
pub use parser::parse_statement;
