//! Raw CQL text for the string-query bindings.
//!
//! Values are inlined as quoted literals. Field and table names are written
//! as given.

use crate::client::{Fields, Record};

/// Quote a value as a CQL string literal. Non-UTF-8 bytes become U+FFFD.
pub fn literal(value: &[u8]) -> String {
    let text = String::from_utf8_lossy(value);
    format!("'{}'", text.replace('\'', "''"))
}

pub(crate) fn selection(fields: Option<&Fields>) -> String {
    match fields {
        Some(fields) if !fields.is_empty() => fields
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(","),
        _ => "*".to_string(),
    }
}

pub fn read(table: &str, key_column: &str, key: &str, fields: Option<&Fields>) -> String {
    format!(
        "SELECT {} FROM {table} WHERE {key_column} = {}",
        selection(fields),
        literal(key.as_bytes())
    )
}

/// Range read in partitioner order starting at `start_key` inclusive.
pub fn scan(
    table: &str,
    key_column: &str,
    start_key: &str,
    record_count: usize,
    fields: Option<&Fields>,
) -> String {
    format!(
        "SELECT {} FROM {table} WHERE token({key_column}) >= token({}) LIMIT {record_count}",
        selection(fields),
        literal(start_key.as_bytes())
    )
}

pub fn update(table: &str, key_column: &str, key: &str, values: &Record) -> String {
    let assignments = values
        .iter()
        .map(|(field, value)| format!("{field} = {}", literal(value)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {table} SET {assignments} WHERE {key_column} = {}",
        literal(key.as_bytes())
    )
}

pub fn insert(table: &str, key_column: &str, key: &str, values: &Record) -> String {
    let mut columns = vec![key_column.to_string()];
    let mut literals = vec![literal(key.as_bytes())];
    for (field, value) in values {
        columns.push(field.clone());
        literals.push(literal(value));
    }
    format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(","),
        literals.join(",")
    )
}

pub fn delete(table: &str, key_column: &str, key: &str) -> String {
    format!(
        "DELETE FROM {table} WHERE {key_column} = {}",
        literal(key.as_bytes())
    )
}
