//! A small typed CQL query builder.
//!
//! Statements are assembled from parts, rendered once, and handed to the
//! driver together with their consistency level. Table references are always
//! keyspace-qualified; identifiers that would change meaning unquoted are
//! double-quoted and literals are escaped.

use std::borrow::Cow;
use std::fmt::Write as _;

use anyhow::Result;
use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::response::query_result::QueryResult;
use scylla::statement::unprepared::Statement;

use super::{statement, CqlSettings, Statements};
use crate::client::{Fields, Record};
use crate::consistency::ConsistencyLevel;
use crate::query::literal;

/// Quote an identifier unless it is already a plain lower-case name.
pub fn identifier(name: &str) -> Cow<'_, str> {
    let mut chars = name.chars();
    let plain = matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if plain {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("\"{}\"", name.replace('"', "\"\"")))
    }
}

fn qualified(keyspace: &str, table: &str) -> String {
    format!("{}.{}", identifier(keyspace), identifier(table))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    Eq { column: String, value: Vec<u8> },
    TokenGte { column: String, value: Vec<u8> },
}

pub fn eq(column: &str, value: impl Into<Vec<u8>>) -> Clause {
    Clause::Eq {
        column: column.to_string(),
        value: value.into(),
    }
}

pub fn token_gte(column: &str, value: impl Into<Vec<u8>>) -> Clause {
    Clause::TokenGte {
        column: column.to_string(),
        value: value.into(),
    }
}

impl Clause {
    fn render(&self, out: &mut String) {
        match self {
            Clause::Eq { column, value } => {
                let _ = write!(out, "{} = {}", identifier(column), literal(value));
            }
            Clause::TokenGte { column, value } => {
                let _ = write!(
                    out,
                    "token({}) >= token({})",
                    identifier(column),
                    literal(value)
                );
            }
        }
    }
}

fn render_where(out: &mut String, clauses: &[Clause]) {
    for (i, clause) in clauses.iter().enumerate() {
        out.push_str(if i == 0 { " WHERE " } else { " AND " });
        clause.render(out);
    }
}

/// Anything that renders to one CQL statement.
pub trait Built {
    fn cql(&self) -> String;

    fn consistency(&self) -> ConsistencyLevel;

    fn statement(&self) -> Statement {
        statement(self.cql(), self.consistency())
    }
}

#[derive(Debug, Clone)]
pub struct Select {
    columns: Option<Vec<String>>,
    keyspace: String,
    table: String,
    clauses: Vec<Clause>,
    limit: Option<usize>,
    consistency: ConsistencyLevel,
}

/// Start a `SELECT`; no columns selects all of them.
pub fn select<I, S>(columns: I) -> SelectBuilder
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
    SelectBuilder {
        columns: if columns.is_empty() {
            None
        } else {
            Some(columns)
        },
    }
}

pub struct SelectBuilder {
    columns: Option<Vec<String>>,
}

impl SelectBuilder {
    pub fn from(self, keyspace: &str, table: &str) -> Select {
        Select {
            columns: self.columns,
            keyspace: keyspace.to_string(),
            table: table.to_string(),
            clauses: Vec::new(),
            limit: None,
            consistency: ConsistencyLevel::default(),
        }
    }
}

impl Select {
    pub fn where_(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn consistency_level(mut self, level: ConsistencyLevel) -> Self {
        self.consistency = level;
        self
    }
}

impl Built for Select {
    fn cql(&self) -> String {
        let mut out = String::from("SELECT ");
        match &self.columns {
            Some(columns) => {
                let names: Vec<_> = columns.iter().map(|c| identifier(c)).collect();
                out.push_str(&names.join(","));
            }
            None => out.push('*'),
        }
        let _ = write!(out, " FROM {}", qualified(&self.keyspace, &self.table));
        render_where(&mut out, &self.clauses);
        if let Some(limit) = self.limit {
            let _ = write!(out, " LIMIT {limit}");
        }
        out
    }

    fn consistency(&self) -> ConsistencyLevel {
        self.consistency
    }
}

#[derive(Debug, Clone)]
pub struct Insert {
    keyspace: String,
    table: String,
    values: Vec<(String, Vec<u8>)>,
    consistency: ConsistencyLevel,
}

pub fn insert_into(keyspace: &str, table: &str) -> Insert {
    Insert {
        keyspace: keyspace.to_string(),
        table: table.to_string(),
        values: Vec::new(),
        consistency: ConsistencyLevel::default(),
    }
}

impl Insert {
    pub fn value(mut self, column: &str, value: impl Into<Vec<u8>>) -> Self {
        self.values.push((column.to_string(), value.into()));
        self
    }

    pub fn consistency_level(mut self, level: ConsistencyLevel) -> Self {
        self.consistency = level;
        self
    }
}

impl Built for Insert {
    fn cql(&self) -> String {
        let columns: Vec<_> = self.values.iter().map(|(c, _)| identifier(c)).collect();
        let values: Vec<_> = self.values.iter().map(|(_, v)| literal(v)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            qualified(&self.keyspace, &self.table),
            columns.join(","),
            values.join(",")
        )
    }

    fn consistency(&self) -> ConsistencyLevel {
        self.consistency
    }
}

#[derive(Debug, Clone)]
pub struct Update {
    keyspace: String,
    table: String,
    assignments: Vec<(String, Vec<u8>)>,
    clauses: Vec<Clause>,
    consistency: ConsistencyLevel,
}

pub fn update(keyspace: &str, table: &str) -> Update {
    Update {
        keyspace: keyspace.to_string(),
        table: table.to_string(),
        assignments: Vec::new(),
        clauses: Vec::new(),
        consistency: ConsistencyLevel::default(),
    }
}

impl Update {
    pub fn set(mut self, column: &str, value: impl Into<Vec<u8>>) -> Self {
        self.assignments.push((column.to_string(), value.into()));
        self
    }

    pub fn where_(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn consistency_level(mut self, level: ConsistencyLevel) -> Self {
        self.consistency = level;
        self
    }
}

impl Built for Update {
    fn cql(&self) -> String {
        let assignments: Vec<_> = self
            .assignments
            .iter()
            .map(|(c, v)| format!("{} = {}", identifier(c), literal(v)))
            .collect();
        let mut out = format!(
            "UPDATE {} SET {}",
            qualified(&self.keyspace, &self.table),
            assignments.join(", ")
        );
        render_where(&mut out, &self.clauses);
        out
    }

    fn consistency(&self) -> ConsistencyLevel {
        self.consistency
    }
}

#[derive(Debug, Clone)]
pub struct Delete {
    keyspace: String,
    table: String,
    clauses: Vec<Clause>,
    consistency: ConsistencyLevel,
}

pub fn delete_from(keyspace: &str, table: &str) -> Delete {
    Delete {
        keyspace: keyspace.to_string(),
        table: table.to_string(),
        clauses: Vec::new(),
        consistency: ConsistencyLevel::default(),
    }
}

impl Delete {
    pub fn where_(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn consistency_level(mut self, level: ConsistencyLevel) -> Self {
        self.consistency = level;
        self
    }
}

impl Built for Delete {
    fn cql(&self) -> String {
        let mut out = format!("DELETE FROM {}", qualified(&self.keyspace, &self.table));
        render_where(&mut out, &self.clauses);
        out
    }

    fn consistency(&self) -> ConsistencyLevel {
        self.consistency
    }
}

fn projection(fields: Option<&Fields>) -> SelectBuilder {
    select(fields.into_iter().flatten().cloned())
}

/// Statements assembled with the builder above.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuilderStatements;

#[async_trait]
impl Statements for BuilderStatements {
    fn name(&self) -> &'static str {
        "cql-builder"
    }

    async fn read(
        &self,
        session: &Session,
        settings: &CqlSettings,
        table: &str,
        key: &str,
        fields: Option<&Fields>,
    ) -> Result<QueryResult> {
        let select = projection(fields)
            .from(&settings.keyspace, table)
            .where_(eq(&settings.key_column, key))
            .consistency_level(settings.consistency.read);
        Ok(session.query_unpaged(select.statement(), ()).await?)
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
        let select = projection(fields)
            .from(&settings.keyspace, table)
            .where_(token_gte(&settings.key_column, start_key))
            .limit(record_count)
            .consistency_level(settings.consistency.scan);
        Ok(session.query_unpaged(select.statement(), ()).await?)
    }

    async fn update(
        &self,
        session: &Session,
        settings: &CqlSettings,
        table: &str,
        key: &str,
        values: &Record,
    ) -> Result<()> {
        let update = values
            .iter()
            .fold(update(&settings.keyspace, table), |u, (field, value)| {
                u.set(field, value.as_slice())
            })
            .where_(eq(&settings.key_column, key))
            .consistency_level(settings.consistency.write);
        session.query_unpaged(update.statement(), ()).await?;
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
        let insert = values
            .iter()
            .fold(
                insert_into(&settings.keyspace, table).value(&settings.key_column, key),
                |i, (field, value)| i.value(field, value.as_slice()),
            )
            .consistency_level(settings.consistency.write);
        session.query_unpaged(insert.statement(), ()).await?;
        Ok(())
    }

    async fn delete(
        &self,
        session: &Session,
        settings: &CqlSettings,
        table: &str,
        key: &str,
    ) -> Result<()> {
        let delete = delete_from(&settings.keyspace, table)
            .where_(eq(&settings.key_column, key))
            .consistency_level(settings.consistency.delete);
        session.query_unpaged(delete.statement(), ()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_when_needed() {
        assert_eq!(identifier("field0"), "field0");
        assert_eq!(identifier("y_id"), "y_id");
        assert_eq!(identifier("FavoriteColor"), "\"FavoriteColor\"");
        assert_eq!(identifier("0col"), "\"0col\"");
        assert_eq!(identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn select_all_by_key() {
        let select = select(Vec::<String>::new())
            .from("usertable", "data")
            .where_(eq("key", "user1"))
            .consistency_level(ConsistencyLevel::Quorum);
        assert_eq!(
            select.cql(),
            "SELECT * FROM usertable.data WHERE key = 'user1'"
        );
        assert_eq!(select.consistency(), ConsistencyLevel::Quorum);
    }

    #[test]
    fn scan_with_projection_and_limit() {
        let select = select(["field1", "field0"])
            .from("ks", "t")
            .where_(token_gte("key", "user9"))
            .limit(5);
        assert_eq!(
            select.cql(),
            "SELECT field1,field0 FROM ks.t WHERE token(key) >= token('user9') LIMIT 5"
        );
    }

    #[test]
    fn writes_escape_literals() {
        let insert = insert_into("ks", "t")
            .value("key", "k")
            .value("name", "O'Hara");
        assert_eq!(
            insert.cql(),
            "INSERT INTO ks.t (key,name) VALUES ('k','O''Hara')"
        );

        let update = update("ks", "t")
            .set("age", "70")
            .set("Color", "red")
            .where_(eq("key", "Paul"));
        assert_eq!(
            update.cql(),
            "UPDATE ks.t SET age = '70', \"Color\" = 'red' WHERE key = 'Paul'"
        );

        let delete = delete_from("ks", "t")
            .where_(eq("key", "a"))
            .where_(eq("part", "b"));
        assert_eq!(
            delete.cql(),
            "DELETE FROM ks.t WHERE key = 'a' AND part = 'b'"
        );
    }

    #[test]
    fn empty_projection_selects_everything() {
        let fields = Fields::new();
        let select = projection(Some(&fields)).from("ks", "t");
        assert_eq!(select.cql(), "SELECT * FROM ks.t");
    }
}
