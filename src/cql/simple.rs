use anyhow::Result;
use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::response::query_result::QueryResult;

use super::{statement, CqlSettings, Statements};
use crate::client::{Fields, Record};
use crate::query;

/// Plain CQL strings with inlined literals, re-parsed by the server on every
/// call.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleStatements;

#[async_trait]
impl Statements for SimpleStatements {
    fn name(&self) -> &'static str {
        "cql-simple"
    }

    async fn read(
        &self,
        session: &Session,
        settings: &CqlSettings,
        table: &str,
        key: &str,
        fields: Option<&Fields>,
    ) -> Result<QueryResult> {
        let cql = query::read(table, &settings.key_column, key, fields);
        let result = session
            .query_unpaged(statement(cql, settings.consistency.read), ())
            .await?;
        Ok(result)
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
        let cql = query::scan(table, &settings.key_column, start_key, record_count, fields);
        let result = session
            .query_unpaged(statement(cql, settings.consistency.scan), ())
            .await?;
        Ok(result)
    }

    async fn update(
        &self,
        session: &Session,
        settings: &CqlSettings,
        table: &str,
        key: &str,
        values: &Record,
    ) -> Result<()> {
        let cql = query::update(table, &settings.key_column, key, values);
        session
            .query_unpaged(statement(cql, settings.consistency.write), ())
            .await?;
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
        let cql = query::insert(table, &settings.key_column, key, values);
        session
            .query_unpaged(statement(cql, settings.consistency.write), ())
            .await?;
        Ok(())
    }

    async fn delete(
        &self,
        session: &Session,
        settings: &CqlSettings,
        table: &str,
        key: &str,
    ) -> Result<()> {
        let cql = query::delete(table, &settings.key_column, key);
        session
            .query_unpaged(statement(cql, settings.consistency.delete), ())
            .await?;
        Ok(())
    }
}
