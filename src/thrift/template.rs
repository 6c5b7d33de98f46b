//! A column-family template: row-oriented reads and writes over the raw
//! Thrift data calls, with one consistency level per kind of operation.

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::protocol::{Connection, ThriftError};
use super::types::{
    Column, ColumnOrSuperColumn, ColumnParent, ColumnPath, KeyRange, Mutation, MutationMap,
    SlicePredicate, SliceRange,
};
use super::{column_name, timestamp_micros, ThriftSession};
use crate::client::{projection, Fields, Record, Store};
use crate::config::{CassandraConfig, ConsistencyLevels};
use crate::error::DbError;

/// Pending column writes for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Updater {
    key: Vec<u8>,
    columns: Vec<Column>,
    timestamp: i64,
}

impl Updater {
    pub fn set(&mut self, name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.columns
            .push(Column::new(name, value, self.timestamp));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ColumnFamilyTemplate {
    column_family: String,
    consistency: ConsistencyLevels,
}

impl ColumnFamilyTemplate {
    pub fn new(column_family: impl Into<String>, consistency: ConsistencyLevels) -> Self {
        Self {
            column_family: column_family.into(),
            consistency,
        }
    }

    fn parent(&self) -> ColumnParent {
        ColumnParent::new(self.column_family.clone())
    }

    /// The named columns, or the whole row.
    pub fn predicate(fields: Option<&Fields>) -> SlicePredicate {
        match projection(fields) {
            Some(fields) => {
                SlicePredicate::ColumnNames(fields.iter().map(|f| f.as_bytes().to_vec()).collect())
            }
            None => SlicePredicate::Range(SliceRange::all()),
        }
    }

    pub fn query_columns(
        &self,
        connection: &mut Connection,
        key: &str,
        fields: Option<&Fields>,
    ) -> Result<Record, ThriftError> {
        let columns = connection.get_slice(
            key.as_bytes(),
            &self.parent(),
            &Self::predicate(fields),
            self.consistency.read.thrift_value(),
        )?;
        Ok(to_record(columns))
    }

    /// Rows from `start_key` on, in partitioner order. Rows left with no
    /// columns are deleted rows still awaiting compaction and are skipped.
    pub fn query_range(
        &self,
        connection: &mut Connection,
        start_key: &str,
        count: usize,
        fields: Option<&Fields>,
    ) -> Result<Vec<(String, Record)>, ThriftError> {
        let range = KeyRange {
            start_key: start_key.as_bytes().to_vec(),
            end_key: Vec::new(),
            count: i32::try_from(count).unwrap_or(i32::MAX),
        };
        let slices = connection.get_range_slices(
            &self.parent(),
            &Self::predicate(fields),
            &range,
            self.consistency.scan.thrift_value(),
        )?;

        Ok(slices
            .into_iter()
            .filter(|slice| !slice.columns.is_empty())
            .map(|slice| (column_name(&slice.key), to_record(slice.columns)))
            .collect())
    }

    pub fn create_updater(&self, key: &str) -> Updater {
        Updater {
            key: key.as_bytes().to_vec(),
            columns: Vec::new(),
            timestamp: timestamp_micros(),
        }
    }

    /// Write every column of `updater` in one batch.
    pub fn update(&self, connection: &mut Connection, updater: Updater) -> Result<(), ThriftError> {
        if updater.is_empty() {
            return Ok(());
        }
        let mutations = self.mutations(updater);
        connection.batch_mutate(&mutations, self.consistency.write.thrift_value())
    }

    pub(crate) fn mutations(&self, updater: Updater) -> MutationMap {
        let mut map = MutationMap::new();
        map.entry(updater.key).or_default().insert(
            self.column_family.clone(),
            updater.columns.into_iter().map(Mutation::insert).collect(),
        );
        map
    }

    pub fn delete_row(&self, connection: &mut Connection, key: &str) -> Result<(), ThriftError> {
        let path = ColumnPath {
            column_family: self.column_family.clone(),
            column: None,
        };
        connection.remove(
            key.as_bytes(),
            &path,
            timestamp_micros(),
            self.consistency.delete.thrift_value(),
        )
    }
}

fn to_record(columns: Vec<ColumnOrSuperColumn>) -> Record {
    columns
        .into_iter()
        .filter_map(|cosc| cosc.column)
        .map(|column| (column_name(&column.name), column.value.unwrap_or_default()))
        .collect()
}

/// Template operations over a random node. The table argument names the
/// column family.
pub struct ThriftTemplateStore {
    session: ThriftSession,
    consistency: ConsistencyLevels,
}

impl ThriftTemplateStore {
    pub async fn connect(config: &CassandraConfig) -> Result<Self, DbError> {
        Ok(Self {
            session: ThriftSession::connect(config).await?,
            consistency: config.consistency,
        })
    }

    fn template(&self, table: &str) -> ColumnFamilyTemplate {
        ColumnFamilyTemplate::new(table, self.consistency)
    }

    async fn write(&self, table: &str, key: &str, values: &Record) -> Result<()> {
        let template = self.template(table);
        let mut updater = template.create_updater(key);
        for (field, value) in values {
            updater.set(field.as_bytes(), value.as_slice());
        }
        debug!(host = self.session.address(), key, columns = values.len(), "batch_mutate");
        self.session
            .call(move |connection| template.update(connection, updater))
            .await
    }
}

#[async_trait]
impl Store for ThriftTemplateStore {
    fn name(&self) -> &'static str {
        "thrift-template"
    }

    async fn read(&self, table: &str, key: &str, fields: Option<&Fields>) -> Result<Record> {
        let template = self.template(table);
        let key = key.to_string();
        let fields = fields.cloned();
        debug!(host = self.session.address(), %key, "get_slice");
        self.session
            .call(move |connection| template.query_columns(connection, &key, fields.as_ref()))
            .await
    }

    async fn scan(
        &self,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&Fields>,
    ) -> Result<Vec<Record>> {
        let template = self.template(table);
        let start_key = start_key.to_string();
        let fields = fields.cloned();
        debug!(host = self.session.address(), %start_key, record_count, "get_range_slices");
        let rows = self
            .session
            .call(move |connection| {
                template.query_range(connection, &start_key, record_count, fields.as_ref())
            })
            .await?;
        Ok(rows.into_iter().map(|(_, record)| record).collect())
    }

    async fn update(&self, table: &str, key: &str, values: &Record) -> Result<()> {
        self.write(table, key, values).await
    }

    async fn insert(&self, table: &str, key: &str, values: &Record) -> Result<()> {
        self.write(table, key, values).await
    }

    async fn delete(&self, table: &str, key: &str) -> Result<()> {
        let template = self.template(table);
        let key = key.to_string();
        debug!(host = self.session.address(), %key, "remove");
        self.session
            .call(move |connection| template.delete_row(connection, &key))
            .await
    }
}
