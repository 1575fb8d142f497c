//! Parser for statements
//!
//! This module turns statement text into the AST using the pest grammar
//! in `grammar.pest`.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::core::errors::{Result, StoreError};
use crate::core::value::{Document, Value};
use crate::ql::ast::Statement;

#[derive(Parser)]
#[grammar = "ql/grammar.pest"]
pub struct StatementParser;

/// Parse a single statement
pub fn parse_statement(input: &str) -> Result<Statement> {
    let mut pairs = StatementParser::parse(Rule::main, input)
        .map_err(|e| StoreError::Parse(e.to_string()))?;

    let main = pairs
        .next()
        .ok_or_else(|| StoreError::Parse("Empty statement".to_string()))?;
    let statement = first_inner(main)?;
    let inner = first_inner(statement)?;

    match inner.as_rule() {
        Rule::create_table => parse_create_table(inner),
        Rule::drop_table => parse_drop_table(inner),
        Rule::insert => parse_insert(inner),
        rule => Err(unexpected(rule)),
    }
}

fn parse_create_table(pair: Pair<Rule>) -> Result<Statement> {
    let mut if_not_exists = false;
    let mut name = None;
    let mut primary_key = None;

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::if_not_exists => if_not_exists = true,
            Rule::ident => name = Some(part.as_str().to_string()),
            Rule::table_constraint => {
                primary_key = Some(first_inner(part)?.as_str().to_string());
            },
            rule => return Err(unexpected(rule)),
        }
    }

    let name = name.ok_or_else(|| StoreError::Parse("Missing table name".to_string()))?;
    Ok(Statement::CreateTable { name, if_not_exists, primary_key })
}

fn parse_drop_table(pair: Pair<Rule>) -> Result<Statement> {
    let mut if_exists = false;
    let mut name = None;

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::if_exists => if_exists = true,
            Rule::ident => name = Some(part.as_str().to_string()),
            rule => return Err(unexpected(rule)),
        }
    }

    let name = name.ok_or_else(|| StoreError::Parse("Missing table name".to_string()))?;
    Ok(Statement::DropTable { name, if_exists })
}

fn parse_insert(pair: Pair<Rule>) -> Result<Statement> {
    let mut parts = pair.into_inner();
    let table = parts
        .next()
        .ok_or_else(|| StoreError::Parse("Missing table name".to_string()))?
        .as_str()
        .to_string();

    let documents = parts.map(parse_document).collect::<Result<Vec<_>>>()?;
    Ok(Statement::Insert { table, documents })
}

fn parse_document(pair: Pair<Rule>) -> Result<Document> {
    let mut doc = Document::new();

    for field in pair.into_inner() {
        let mut inner = field.into_inner();
        let (key, value) = match (inner.next(), inner.next()) {
            (Some(key), Some(value)) => (key, value),
            _ => return Err(StoreError::Parse("Malformed document field".to_string())),
        };

        let key = parse_key(key)?;
        let value = parse_value(value)?;
        if doc.insert(key.clone(), value).is_some() {
            return Err(StoreError::InvalidStatement(format!("Duplicate field: {}", key)));
        }
    }

    Ok(doc)
}

fn parse_key(pair: Pair<Rule>) -> Result<String> {
    let inner = first_inner(pair)?;
    match inner.as_rule() {
        Rule::ident => Ok(inner.as_str().to_string()),
        Rule::string => parse_string(inner),
        rule => Err(unexpected(rule)),
    }
}

fn parse_value(pair: Pair<Rule>) -> Result<Value> {
    let inner = first_inner(pair)?;

    match inner.as_rule() {
        Rule::document => Ok(Value::Document(parse_document(inner)?)),
        Rule::array => {
            let items = inner.into_inner().map(parse_value).collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(items))
        },
        Rule::blob => {
            let encoded = parse_string(first_inner(inner)?)?;
            let bytes = STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| StoreError::InvalidStatement(format!("Invalid base64 blob: {}", e)))?;
            Ok(Value::Blob(bytes))
        },
        Rule::duration => parse_duration(inner).map(Value::Duration),
        Rule::double => match inner.as_str().parse::<f64>() {
            Ok(d) if d.is_finite() => Ok(Value::Double(d)),
            _ => Err(StoreError::InvalidStatement(format!("Invalid double: {}", inner.as_str()))),
        },
        Rule::integer => inner
            .as_str()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| StoreError::InvalidStatement(format!("Integer out of range: {}", inner.as_str()))),
        Rule::boolean => Ok(Value::Bool(inner.as_str() == "true")),
        Rule::null => Ok(Value::Null),
        Rule::string => parse_string(inner).map(Value::Text),
        rule => Err(unexpected(rule)),
    }
}

fn parse_duration(pair: Pair<Rule>) -> Result<Duration> {
    let text = pair.as_str().to_string();
    let mut inner = pair.into_inner();
    let (len, unit) = match (inner.next(), inner.next()) {
        (Some(len), Some(unit)) => (len, unit),
        _ => return Err(StoreError::Parse(format!("Malformed duration: {}", text))),
    };

    let len: u64 = len
        .as_str()
        .parse()
        .map_err(|_| StoreError::InvalidStatement(format!("Duration out of range: {}", text)))?;

    let duration = match unit.as_str() {
        "ns" => Some(Duration::from_nanos(len)),
        "us" | "µs" => Some(Duration::from_micros(len)),
        "ms" => Some(Duration::from_millis(len)),
        "s" => Some(Duration::from_secs(len)),
        "m" => len.checked_mul(60).map(Duration::from_secs),
        "h" => len.checked_mul(3600).map(Duration::from_secs),
        other => return Err(StoreError::Parse(format!("Unknown duration unit: {}", other))),
    };

    duration.ok_or_else(|| StoreError::InvalidStatement(format!("Duration out of range: {}", text)))
}

fn parse_string(pair: Pair<Rule>) -> Result<String> {
    let raw = first_inner(pair)?.as_str();
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(escaped) => out.push(escaped),
            None => return Err(StoreError::Parse("Dangling escape in string".to_string())),
        }
    }

    Ok(out)
}

fn first_inner(pair: Pair<Rule>) -> Result<Pair<Rule>> {
    let rule = pair.as_rule();
    pair.into_inner()
        .next()
        .ok_or_else(|| StoreError::Parse(format!("Empty {:?}", rule)))
}

fn unexpected(rule: Rule) -> StoreError {
    StoreError::Parse(format!("Unexpected element: {:?}", rule))
}
