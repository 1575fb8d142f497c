//! Value module for warzone
//!
//! This module defines the Value enum, representing the different types
//! of values a document field can hold.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use serde::{Serialize, Deserialize};

/// A document: field names mapped to values, kept in key order
pub type Document = BTreeMap<String, Value>;

/// The different types of values that can be stored in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Double(f64),
    /// Text value
    Text(String),
    /// Raw binary data
    Blob(Vec<u8>),
    /// Duration value
    Duration(Duration),
    /// Ordered list of values
    Array(Vec<Value>),
    /// Nested document
    Document(Document),
}

impl Value {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if the value is a number (integer or double)
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Double(_))
    }

    /// False if any double in the value, nested ones included, is NaN or
    /// infinite
    pub fn is_finite(&self) -> bool {
        match self {
            Value::Double(d) => d.is_finite(),
            Value::Array(items) => items.iter().all(Value::is_finite),
            Value::Document(doc) => doc.values().all(Value::is_finite),
            _ => true,
        }
    }

    /// Borrow the inner document, if this value is one
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    /// Get a string representation of the value's type
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Double(_) => "double",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Duration(_) => "duration",
            Value::Array(_) => "array",
            Value::Document(_) => "document",
        }
    }
}

/// Format a Value as a string
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::Text(s) => write!(f, "\"{}\"", s),
            Value::Blob(bytes) => write!(f, "[blob: {} bytes]", bytes.len()),
            Value::Duration(d) => write!(f, "{:?}", d),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            },
            Value::Document(doc) => {
                write!(f, "{{")?;
                for (i, (key, value)) in doc.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            },
        }
    }
}

/// Convert from common types to Value
impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Value::Duration(d)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Document(doc)
    }
}
