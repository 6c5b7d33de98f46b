use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::response::query_result::QueryResult;
use scylla::statement::prepared::PreparedStatement;
use tokio::sync::RwLock;
use tracing::debug;

use super::{text, CqlSettings, Statements};
use crate::client::{Fields, Record};
use crate::consistency::ConsistencyLevel;
use crate::query::selection;

fn field_list(fields: Option<&Fields>) -> String {
    match fields {
        Some(fields) if !fields.is_empty() => fields
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(","),
        _ => "NULL".to_string(),
    }
}

fn record_fields(values: &Record) -> String {
    values.keys().map(String::as_str).collect::<Vec<_>>().join(",")
}

/// Cache keys name the statement shape: operation, table, field set and,
/// for scans, the limit. Parts are separated by `|`, which cannot occur in a
/// CQL identifier.
pub fn read_cache_key(table: &str, fields: Option<&Fields>) -> String {
    format!("READ|{table}|{}", field_list(fields))
}

pub fn scan_cache_key(table: &str, fields: Option<&Fields>, record_count: usize) -> String {
    format!("SCAN|{table}|{}|{record_count}", field_list(fields))
}

pub fn update_cache_key(table: &str, values: &Record) -> String {
    format!("UPDATE|{table}|{}", record_fields(values))
}

pub fn insert_cache_key(table: &str, values: &Record) -> String {
    format!("INSERT|{table}|{}", record_fields(values))
}

pub fn delete_cache_key(table: &str) -> String {
    format!("DELETE|{table}")
}

pub fn read_cql(table: &str, key_column: &str, fields: Option<&Fields>) -> String {
    format!(
        "SELECT {} FROM {table} WHERE {key_column} = ?",
        selection(fields)
    )
}

pub fn scan_cql(
    table: &str,
    key_column: &str,
    fields: Option<&Fields>,
    record_count: usize,
) -> String {
    format!(
        "SELECT {} FROM {table} WHERE token({key_column}) >= token(?) LIMIT {record_count}",
        selection(fields)
    )
}

/// Bind order: every field in sorted order, then the key.
pub fn update_cql(table: &str, key_column: &str, values: &Record) -> String {
    let assignments = values
        .keys()
        .map(|field| format!("{field} = ?"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("UPDATE {table} SET {assignments} WHERE {key_column} = ?")
}

/// Bind order: the key, then every field in sorted order.
pub fn insert_cql(table: &str, key_column: &str, values: &Record) -> String {
    let mut columns = vec![key_column];
    columns.extend(values.keys().map(String::as_str));
    let markers = vec!["?"; columns.len()];
    format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(","),
        markers.join(",")
    )
}

pub fn delete_cql(table: &str, key_column: &str) -> String {
    format!("DELETE FROM {table} WHERE {key_column} = ?")
}

/// Statements prepared once per shape and reused for every later call.
#[derive(Default)]
pub struct PreparedStatements {
    cache: RwLock<HashMap<String, PreparedStatement>>,
}

impl PreparedStatements {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cached(&self) -> usize {
        self.cache.read().await.len()
    }

    async fn prepared<F>(
        &self,
        session: &Session,
        cache_key: String,
        level: ConsistencyLevel,
        cql: F,
    ) -> Result<PreparedStatement>
    where
        F: FnOnce() -> String + Send,
    {
        if let Some(statement) = self.cache.read().await.get(&cache_key) {
            debug!(statement = %cache_key, "reusing statement");
            return Ok(statement.clone());
        }

        debug!(statement = %cache_key, "creating statement");
        let mut statement = session.prepare(cql()).await?;
        statement.set_consistency(level.to_driver());
        self.cache
            .write()
            .await
            .insert(cache_key, statement.clone());
        Ok(statement)
    }
}

#[async_trait]
impl Statements for PreparedStatements {
    fn name(&self) -> &'static str {
        "cql-prepared"
    }

    async fn read(
        &self,
        session: &Session,
        settings: &CqlSettings,
        table: &str,
        key: &str,
        fields: Option<&Fields>,
    ) -> Result<QueryResult> {
        let statement = self
            .prepared(
                session,
                read_cache_key(table, fields),
                settings.consistency.read,
                || read_cql(table, &settings.key_column, fields),
            )
            .await?;
        Ok(session.execute_unpaged(&statement, (key,)).await?)
    }

    async fn scan(
        &self,
        session: &Session,
        settings: &CqlSettings,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&Fields>,
    ) -> Result<QueryResult> {
        let statement = self
            .prepared(
                session,
                scan_cache_key(table, fields, record_count),
                settings.consistency.scan,
                || scan_cql(table, &settings.key_column, fields, record_count),
            )
            .await?;
        Ok(session.execute_unpaged(&statement, (start_key,)).await?)
    }

    async fn update(
        &self,
        session: &Session,
        settings: &CqlSettings,
        table: &str,
        key: &str,
        values: &Record,
    ) -> Result<()> {
        let statement = self
            .prepared(
                session,
                update_cache_key(table, values),
                settings.consistency.write,
                || update_cql(table, &settings.key_column, values),
            )
            .await?;

        let mut bound: Vec<String> = values.values().map(|v| text(v)).collect();
        bound.push(key.to_string());
        session.execute_unpaged(&statement, bound).await?;
        Ok(())
    }

    async fn insert(
        &self,
        session: &Session,
        settings: &CqlSettings,
        table: &str,
        key: &str,
        values: &Record,
    ) -> Result<()> {
        let statement = self
            .prepared(
                session,
                insert_cache_key(table, values),
                settings.consistency.write,
                || insert_cql(table, &settings.key_column, values),
            )
            .await?;

        let mut bound = vec![key.to_string()];
        bound.extend(values.values().map(|v| text(v)));
        session.execute_unpaged(&statement, bound).await?;
        Ok(())
    }

    async fn delete(
        &self,
        session: &Session,
        settings: &CqlSettings,
        table: &str,
        key: &str,
    ) -> Result<()> {
        let statement = self
            .prepared(
                session,
                delete_cache_key(table),
                settings.consistency.delete,
                || delete_cql(table, &settings.key_column),
            )
            .await?;
        session.execute_unpaged(&statement, (key,)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::record;

    #[test]
    fn cache_keys_follow_statement_shape() {
        let fields: Fields = ["field1".to_string(), "field0".to_string()]
            .into_iter()
            .collect();
        assert_eq!(read_cache_key("t", None), "READ|t|NULL");
        assert_eq!(read_cache_key("t", Some(&fields)), "READ|t|field0,field1");
        assert_eq!(scan_cache_key("t", None, 10), "SCAN|t|NULL|10");
        assert_ne!(scan_cache_key("t", None, 10), scan_cache_key("t", None, 20));

        let values = record([("b", "1"), ("a", "2")]);
        assert_eq!(update_cache_key("t", &values), "UPDATE|t|a,b");
        assert_eq!(insert_cache_key("t", &values), "INSERT|t|a,b");
        assert_eq!(delete_cache_key("t"), "DELETE|t");
    }

    fn one(name: &str) -> Fields {
        [name.to_string()].into_iter().collect()
    }

    #[test]
    fn distinct_shapes_never_share_a_statement() {
        // field1 LIMIT 23 against field12 LIMIT 3
        let wide = scan_cache_key("usertable", Some(&one("field1")), 23);
        let narrow = scan_cache_key("usertable", Some(&one("field12")), 3);
        assert_ne!(wide, narrow);
        assert_ne!(
            scan_cql("usertable", "key", Some(&one("field1")), 23),
            scan_cql("usertable", "key", Some(&one("field12")), 3)
        );

        // table and field boundaries
        assert_ne!(
            read_cache_key("ab", Some(&one("c"))),
            read_cache_key("a", Some(&one("bc")))
        );
        let values = record([("c", "1")]);
        let shifted = record([("bc", "1")]);
        assert_ne!(update_cache_key("ab", &values), update_cache_key("a", &shifted));
        assert_ne!(insert_cache_key("ab", &values), insert_cache_key("a", &shifted));
        assert_ne!(delete_cache_key("ab"), delete_cache_key("a"));
    }

    #[test]
    fn statement_text_uses_markers_in_bind_order() {
        let values = record([("color", "blue"), ("age", "57")]);
        assert_eq!(
            update_cql("t", "key", &values),
            "UPDATE t SET age = ?, color = ? WHERE key = ?"
        );
        assert_eq!(
            insert_cql("t", "key", &values),
            "INSERT INTO t (key,age,color) VALUES (?,?,?)"
        );
        assert_eq!(
            read_cql("t", "key", None),
            "SELECT * FROM t WHERE key = ?"
        );
        assert_eq!(
            scan_cql("t", "key", None, 3),
            "SELECT * FROM t WHERE token(key) >= token(?) LIMIT 3"
        );
        assert_eq!(delete_cql("t", "key"), "DELETE FROM t WHERE key = ?");
    }

    #[tokio::test]
    async fn starts_empty() {
        assert_eq!(PreparedStatements::new().cached().await, 0);
    }
}
