//! The behaviour every binding owes the harness, checked against the
//! in-process store plus a store that fails on demand.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use cassandra_bench::client::{record, Client, Fields, Record, Store};
use cassandra_bench::error::{DbError, Operation, Status};
use cassandra_bench::memory::MemoryStore;
use cassandra_bench::retry::{RetryPolicy, RetryingClient};

const TABLE: &str = "usertable";

fn memory_client() -> RetryingClient<MemoryStore> {
    RetryingClient::new(MemoryStore::new(), RetryPolicy::new(3, Duration::ZERO))
}

fn fields(names: &[&str]) -> Fields {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn insert_then_read_returns_inserted_values() {
    let client = memory_client();
    let values = record([
        ("age", "57"),
        ("middlename", "bradley"),
        ("favoritecolor", "blue"),
    ]);
    client.insert(TABLE, "BrianFrankCooper", &values).await.unwrap();

    let all = client.read(TABLE, "BrianFrankCooper", None).await.unwrap();
    assert_eq!(all, values);

    let some = client
        .read(TABLE, "BrianFrankCooper", Some(&fields(&["age"])))
        .await
        .unwrap();
    assert_eq!(some, record([("age", "57")]));

    // an empty projection means every field
    let empty = client
        .read(TABLE, "BrianFrankCooper", Some(&Fields::new()))
        .await
        .unwrap();
    assert_eq!(empty, values);
}

#[tokio::test]
async fn delete_then_read_is_empty() {
    let client = memory_client();
    client
        .insert(TABLE, "k", &record([("f", "v")]))
        .await
        .unwrap();
    client.delete(TABLE, "k").await.unwrap();
    assert!(client.read(TABLE, "k", None).await.unwrap().is_empty());

    // deleting again is not an error
    client.delete(TABLE, "k").await.unwrap();
}

#[tokio::test]
async fn scan_is_bounded_and_starts_at_key() {
    let client = memory_client();
    for i in 0..10 {
        let key = format!("user{i}");
        client
            .insert(TABLE, &key, &record([("field0", key.as_str())]))
            .await
            .unwrap();
    }

    let rows = client.scan(TABLE, "user3", 4, None).await.unwrap();
    let keys: Vec<_> = rows
        .iter()
        .map(|r| String::from_utf8(r["field0"].clone()).unwrap())
        .collect();
    assert_eq!(keys, vec!["user3", "user4", "user5", "user6"]);

    let tail = client.scan(TABLE, "user8", 100, None).await.unwrap();
    assert_eq!(tail.len(), 2);

    assert!(client.scan(TABLE, "user0", 0, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn update_overwrites_only_supplied_fields() {
    let client = memory_client();
    client
        .insert(TABLE, "Paul", &record([("age", "31"), ("middlename", "Paul")]))
        .await
        .unwrap();
    client
        .update(TABLE, "Paul", &record([("age", "70")]))
        .await
        .unwrap();
    client.update(TABLE, "Paul", &Record::new()).await.unwrap();

    let row = client.read(TABLE, "Paul", None).await.unwrap();
    assert_eq!(row, record([("age", "70"), ("middlename", "Paul")]));
}

/// Fails the first `failures` calls of every kind.
struct FlakyStore {
    failures: u32,
    calls: AtomicU32,
    inner: MemoryStore,
}

impl FlakyStore {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
            inner: MemoryStore::new(),
        }
    }

    fn attempt(&self) -> Result<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            bail!("node unavailable (call {n})");
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn read(&self, table: &str, key: &str, fields: Option<&Fields>) -> Result<Record> {
        self.attempt()?;
        self.inner.read(table, key, fields).await
    }

    async fn scan(
        &self,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&Fields>,
    ) -> Result<Vec<Record>> {
        self.attempt()?;
        self.inner.scan(table, start_key, record_count, fields).await
    }

    async fn update(&self, table: &str, key: &str, values: &Record) -> Result<()> {
        self.attempt()?;
        self.inner.update(table, key, values).await
    }

    async fn insert(&self, table: &str, key: &str, values: &Record) -> Result<()> {
        self.attempt()?;
        self.inner.insert(table, key, values).await
    }

    async fn delete(&self, table: &str, key: &str) -> Result<()> {
        self.attempt()?;
        self.inner.delete(table, key).await
    }
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let client = RetryingClient::new(
        FlakyStore::new(2),
        RetryPolicy::new(3, Duration::from_millis(500)),
    );
    client
        .insert(TABLE, "k", &record([("f", "v")]))
        .await
        .unwrap();
    assert_eq!(client.store().calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_report_generic_failure() {
    let client = RetryingClient::new(
        FlakyStore::new(10),
        RetryPolicy::new(3, Duration::from_millis(500)),
    );

    let err = client.read(TABLE, "k", None).await.unwrap_err();
    assert_eq!(err.status(), Status::Error);
    assert_eq!(err.status().code(), -1);
    match err {
        DbError::Exhausted {
            operation,
            key,
            attempts,
            source,
        } => {
            assert_eq!(operation, Operation::Read);
            assert_eq!(key, "k");
            assert_eq!(attempts, 3);
            // the last error is kept
            assert_eq!(source.to_string(), "node unavailable (call 2)");
        }
        other => panic!("unexpected error {other}"),
    }
}
