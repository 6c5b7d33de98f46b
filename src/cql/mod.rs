#![cfg(feature = "cql")]
//! Bindings over the CQL binary protocol driver.
//!
//! All three share one session setup and one row marshaling path; they differ
//! only in how statements are produced ([`Statements`]).

pub mod builder;
pub mod prepared;
pub mod simple;

use anyhow::Result;
use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::client::Compression as DriverCompression;
use scylla::response::query_result::QueryResult;
use scylla::statement::unprepared::Statement;
use scylla::value::{CqlValue, Row};
use tracing::{info, warn};

use crate::client::{Fields, Record, Store};
use crate::config::{CassandraConfig, Compression, ConsistencyLevels};
use crate::consistency::ConsistencyLevel;
use crate::error::DbError;

pub use builder::BuilderStatements;
pub use prepared::PreparedStatements;
pub use simple::SimpleStatements;

pub const DEFAULT_PORT: u16 = 9042;

/// What a statement strategy needs to know about the target schema.
#[derive(Debug, Clone)]
pub struct CqlSettings {
    pub keyspace: String,
    pub key_column: String,
    pub consistency: ConsistencyLevels,
}

impl CqlSettings {
    pub fn from_config(config: &CassandraConfig) -> Self {
        Self {
            keyspace: config.keyspace.clone(),
            key_column: config.key_column.clone(),
            consistency: config.consistency,
        }
    }
}

/// An unprepared statement carrying the requested consistency.
pub fn statement(cql: impl Into<String>, level: ConsistencyLevel) -> Statement {
    let mut statement = Statement::new(cql.into());
    statement.set_consistency(level.to_driver());
    statement
}

/// One way of turning the five operations into CQL.
#[async_trait]
pub trait Statements: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn read(
        &self,
        session: &Session,
        settings: &CqlSettings,
        table: &str,
        key: &str,
        fields: Option<&Fields>,
    ) -> Result<QueryResult>;

    async fn scan(
        &self,
        session: &Session,
        settings: &CqlSettings,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&Fields>,
    ) -> Result<QueryResult>;

    async fn update(
        &self,
        session: &Session,
        settings: &CqlSettings,
        table: &str,
        key: &str,
        values: &Record,
    ) -> Result<()>;

    async fn insert(
        &self,
        session: &Session,
        settings: &CqlSettings,
        table: &str,
        key: &str,
        values: &Record,
    ) -> Result<()>;

    async fn delete(
        &self,
        session: &Session,
        settings: &CqlSettings,
        table: &str,
        key: &str,
    ) -> Result<()>;
}

pub struct CqlStore<S> {
    session: Session,
    settings: CqlSettings,
    statements: S,
}

impl<S: Statements> CqlStore<S> {
    pub async fn connect(config: &CassandraConfig, statements: S) -> Result<Self, DbError> {
        config.require_hosts()?;
        let nodes = config.contact_points(DEFAULT_PORT);
        let policy = config.connection_policy();

        let contact_points = &nodes;
        let (attempts, session) = policy
            .run(move || open_session(config, contact_points))
            .await;
        let session = session.map_err(|source| {
            warn!(hosts = %nodes.join(","), attempts, "unable to connect");
            DbError::Connect {
                hosts: nodes.join(","),
                attempts,
                source,
            }
        })?;

        info!(
            binding = statements.name(),
            hosts = %nodes.join(","),
            keyspace = %config.keyspace,
            "connected"
        );

        Ok(Self {
            session,
            settings: CqlSettings::from_config(config),
            statements,
        })
    }
}

async fn open_session(config: &CassandraConfig, nodes: &[String]) -> Result<Session> {
    let compression = match config.compression {
        Compression::None => None,
        Compression::Snappy => Some(DriverCompression::Snappy),
        Compression::Lz4 => Some(DriverCompression::Lz4),
    };

    let mut builder = SessionBuilder::new()
        .known_nodes(nodes)
        .compression(compression)
        .use_keyspace(config.keyspace.as_str(), false);
    if let Some((username, password)) = config.credentials() {
        builder = builder.user(username, password);
    }

    Ok(builder.build().await?)
}

/// Convert a rows result into records keyed by column name.
pub fn into_records(result: QueryResult) -> Result<Vec<Record>> {
    let rows = result.into_rows_result()?;
    let names: Vec<String> = rows
        .column_specs()
        .iter()
        .map(|spec| spec.name().to_string())
        .collect();

    let mut records = Vec::new();
    for row in rows.rows::<Row>()? {
        let row = row?;
        let record = names
            .iter()
            .cloned()
            .zip(row.columns.iter().map(|c| value_bytes(c.as_ref())))
            .collect();
        records.push(record);
    }
    Ok(records)
}

/// Raw bytes of a column value; null reads as empty.
pub fn value_bytes(value: Option<&CqlValue>) -> Vec<u8> {
    match value {
        None => Vec::new(),
        Some(CqlValue::Text(s)) | Some(CqlValue::Ascii(s)) => s.as_bytes().to_vec(),
        Some(CqlValue::Blob(b)) => b.clone(),
        Some(CqlValue::Int(i)) => i.to_string().into_bytes(),
        Some(CqlValue::BigInt(i)) => i.to_string().into_bytes(),
        Some(CqlValue::Boolean(b)) => b.to_string().into_bytes(),
        Some(other) => format!("{other:?}").into_bytes(),
    }
}

/// Text form of a record value for binding to a varchar column. Lossy for
/// non-UTF-8 input; see [`Record`].
pub(crate) fn text(value: &[u8]) -> String {
    String::from_utf8_lossy(value).into_owned()
}

#[async_trait]
impl<S: Statements> Store for CqlStore<S> {
    fn name(&self) -> &'static str {
        self.statements.name()
    }

    async fn read(&self, table: &str, key: &str, fields: Option<&Fields>) -> Result<Record> {
        let result = self
            .statements
            .read(&self.session, &self.settings, table, key, fields)
            .await?;
        Ok(into_records(result)?.into_iter().next().unwrap_or_default())
    }

    async fn scan(
        &self,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&Fields>,
    ) -> Result<Vec<Record>> {
        let result = self
            .statements
            .scan(
                &self.session,
                &self.settings,
                table,
                start_key,
                record_count,
                fields,
            )
            .await?;
        into_records(result)
    }

    async fn update(&self, table: &str, key: &str, values: &Record) -> Result<()> {
        self.statements
            .update(&self.session, &self.settings, table, key, values)
            .await
    }

    async fn insert(&self, table: &str, key: &str, values: &Record) -> Result<()> {
        self.statements
            .insert(&self.session, &self.settings, table, key, values)
            .await
    }

    async fn delete(&self, table: &str, key: &str) -> Result<()> {
        self.statements
            .delete(&self.session, &self.settings, table, key)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_values_as_bytes() {
        assert_eq!(value_bytes(None), Vec::<u8>::new());
        assert_eq!(
            value_bytes(Some(&CqlValue::Text("blue".into()))),
            b"blue".to_vec()
        );
        assert_eq!(value_bytes(Some(&CqlValue::Blob(vec![1, 2]))), vec![1, 2]);
        assert_eq!(value_bytes(Some(&CqlValue::Int(57))), b"57".to_vec());
    }

    #[test]
    fn bound_text_is_lossy_for_invalid_utf8() {
        assert_eq!(text(b"57"), "57");
        assert_eq!(text(&[0x66, 0xff]), "f\u{FFFD}");
    }

    #[test]
    fn statements_carry_consistency() {
        let stmt = statement("SELECT * FROM t", ConsistencyLevel::Quorum);
        assert_eq!(
            stmt.get_consistency(),
            Some(scylla::statement::Consistency::Quorum)
        );
    }
}
