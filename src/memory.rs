//! In-process baseline. Measures what the harness itself costs and lets the
//! binding contract be exercised without a cluster.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::client::{projection, Fields, Record, Store};

type Table = BTreeMap<String, Record>;

/// Tables shared by every [`MemoryStore`] cloned from the same root.
pub type SharedTables = Arc<RwLock<BTreeMap<String, Table>>>;

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: SharedTables,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tables(tables: SharedTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> SharedTables {
        Arc::clone(&self.tables)
    }
}

fn project(record: &Record, fields: Option<&Fields>) -> Record {
    match projection(fields) {
        None => record.clone(),
        Some(fields) => record
            .iter()
            .filter(|(name, _)| fields.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn read(&self, table: &str, key: &str, fields: Option<&Fields>) -> Result<Record> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .and_then(|rows| rows.get(key))
            .map(|record| project(record, fields))
            .unwrap_or_default())
    }

    /// Keys are visited in byte order, which stands in for partitioner order.
    async fn scan(
        &self,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&Fields>,
    ) -> Result<Vec<Record>> {
        let tables = self.tables.read().await;
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .range(start_key.to_string()..)
            .take(record_count)
            .map(|(_, record)| project(record, fields))
            .collect())
    }

    async fn update(&self, table: &str, key: &str, values: &Record) -> Result<()> {
        let mut tables = self.tables.write().await;
        let record = tables
            .entry(table.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default();
        record.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    /// Columns are upserted, as a CQL `INSERT` does.
    async fn insert(&self, table: &str, key: &str, values: &Record) -> Result<()> {
        self.update(table, key, values).await
    }

    async fn delete(&self, table: &str, key: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(rows) = tables.get_mut(table) {
            rows.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::record;

    #[tokio::test]
    async fn update_touches_only_given_fields() {
        let store = MemoryStore::new();
        store
            .insert("t", "John", &record([("age", "57"), ("favoritecolor", "blue")]))
            .await
            .unwrap();
        store
            .update("t", "John", &record([("age", "58")]))
            .await
            .unwrap();

        let row = store.read("t", "John", None).await.unwrap();
        assert_eq!(row["age"], b"58".to_vec());
        assert_eq!(row["favoritecolor"], b"blue".to_vec());
    }

    #[tokio::test]
    async fn clones_share_data() {
        let store = MemoryStore::new();
        let other = MemoryStore::with_tables(store.tables());
        store.insert("t", "k", &record([("a", "1")])).await.unwrap();
        assert_eq!(other.read("t", "k", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_table_reads_empty() {
        let store = MemoryStore::new();
        assert!(store.read("nope", "k", None).await.unwrap().is_empty());
        assert!(store.scan("nope", "k", 5, None).await.unwrap().is_empty());
        store.delete("nope", "k").await.unwrap();
    }
}
