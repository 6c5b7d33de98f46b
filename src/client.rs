use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use async_trait::async_trait;

use crate::error::DbResult;

/// Field name to raw value. Ordered so that statement shapes derived from a
/// record are stable.
///
/// The CQL and Thrift-CQL bindings write values into `text` columns, so they
/// must be UTF-8: invalid sequences are replaced with U+FFFD on the way out
/// and do not round-trip. The Thrift template and memory bindings keep raw
/// bytes.
pub type Record = BTreeMap<String, Vec<u8>>;

/// Field projection for reads and scans.
pub type Fields = BTreeSet<String>;

/// `None` and an empty set both mean every column.
pub fn projection(fields: Option<&Fields>) -> Option<&Fields> {
    fields.filter(|f| !f.is_empty())
}

/// What the benchmark harness drives. One instance per worker.
#[async_trait]
pub trait Client: Send + Sync {
    /// Read a single record, returning only the requested fields
    async fn read(&self, table: &str, key: &str, fields: Option<&Fields>) -> DbResult<Record>;

    /// Read up to `record_count` records starting at `start_key`
    async fn scan(
        &self,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&Fields>,
    ) -> DbResult<Vec<Record>>;

    /// Overwrite the supplied fields of an existing record
    async fn update(&self, table: &str, key: &str, values: &Record) -> DbResult<()>;

    /// Insert a new record
    async fn insert(&self, table: &str, key: &str, values: &Record) -> DbResult<()>;

    /// Delete a record
    async fn delete(&self, table: &str, key: &str) -> DbResult<()>;

    /// Release the underlying connection
    async fn cleanup(&self) -> DbResult<()>;
}

/// A single attempt against one client stack. Retries live in
/// [`crate::retry::RetryingClient`].
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn read(&self, table: &str, key: &str, fields: Option<&Fields>) -> Result<Record>;

    async fn scan(
        &self,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&Fields>,
    ) -> Result<Vec<Record>>;

    async fn update(&self, table: &str, key: &str, values: &Record) -> Result<()>;

    async fn insert(&self, table: &str, key: &str, values: &Record) -> Result<()>;

    async fn delete(&self, table: &str, key: &str) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Build a record from string pairs.
pub fn record<K, V, I>(pairs: I) -> Record
where
    K: Into<String>,
    V: Into<Vec<u8>>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
