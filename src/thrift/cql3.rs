use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::protocol::Connection;
use super::types::{CqlResult, CqlRow};
use super::{column_name, ThriftSession};
use crate::client::{Fields, Record, Store};
use crate::config::{CassandraConfig, ConsistencyLevels};
use crate::consistency::ConsistencyLevel;
use crate::error::DbError;
use crate::query;

/// CQL3 text sent through `execute_cql3_query` on a single random node.
pub struct ThriftCqlStore {
    session: ThriftSession,
    key_column: String,
    consistency: ConsistencyLevels,
    gzip: bool,
}

impl ThriftCqlStore {
    pub async fn connect(config: &CassandraConfig) -> Result<Self, DbError> {
        Ok(Self {
            session: ThriftSession::connect(config).await?,
            key_column: config.key_column.clone(),
            consistency: config.consistency,
            gzip: config.thrift_compression,
        })
    }

    async fn execute(&self, cql: String, level: ConsistencyLevel) -> Result<CqlResult> {
        debug!(host = self.session.address(), %level, cql = %cql, "execute_cql3_query");
        let consistency = level.thrift_value();
        let gzip = self.gzip;
        self.session
            .call(move |connection: &mut Connection| {
                connection.execute_cql3_query(cql.as_bytes(), gzip, consistency)
            })
            .await
    }
}

pub(crate) fn row_record(row: CqlRow) -> Record {
    row.columns
        .into_iter()
        .map(|column| (column_name(&column.name), column.value.unwrap_or_default()))
        .collect()
}

#[async_trait]
impl Store for ThriftCqlStore {
    fn name(&self) -> &'static str {
        "thrift-cql"
    }

    async fn read(&self, table: &str, key: &str, fields: Option<&Fields>) -> Result<Record> {
        let cql = query::read(table, &self.key_column, key, fields);
        let result = self.execute(cql, self.consistency.read).await?;
        Ok(result
            .rows
            .into_iter()
            .next()
            .map(row_record)
            .unwrap_or_default())
    }

    async fn scan(
        &self,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&Fields>,
    ) -> Result<Vec<Record>> {
        let cql = query::scan(table, &self.key_column, start_key, record_count, fields);
        let result = self.execute(cql, self.consistency.scan).await?;
        Ok(result.rows.into_iter().map(row_record).collect())
    }

    async fn update(&self, table: &str, key: &str, values: &Record) -> Result<()> {
        let cql = query::update(table, &self.key_column, key, values);
        self.execute(cql, self.consistency.write).await?;
        Ok(())
    }

    async fn insert(&self, table: &str, key: &str, values: &Record) -> Result<()> {
        let cql = query::insert(table, &self.key_column, key, values);
        self.execute(cql, self.consistency.write).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<()> {
        let cql = query::delete(table, &self.key_column, key);
        self.execute(cql, self.consistency.delete).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thrift::types::Column;

    #[test]
    fn rows_become_records() {
        let row = CqlRow {
            key: b"John".to_vec(),
            columns: vec![
                Column::new("key", "John", 1),
                Column::new("age", "57", 1),
                Column {
                    name: b"middlename".to_vec(),
                    value: None,
                    timestamp: None,
                    ttl: None,
                },
            ],
        };
        let record = row_record(row);
        assert_eq!(record["key"], b"John".to_vec());
        assert_eq!(record["age"], b"57".to_vec());
        assert_eq!(record["middlename"], Vec::<u8>::new());
    }
}
