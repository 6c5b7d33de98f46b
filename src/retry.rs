use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::client::{projection, Client, Fields, Record, Store};
use crate::error::{DbError, DbResult, Operation};

/// Fixed number of attempts with a constant pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Run `attempt` until it succeeds or the attempts are used up. The last
    /// error is returned.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> (u32, anyhow::Result<T>)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut tries = 0;
        loop {
            tries += 1;
            match attempt().await {
                Ok(value) => return (tries, Ok(value)),
                Err(e) if tries >= self.attempts => return (tries, Err(e)),
                Err(e) => {
                    debug!(attempt = tries, error = %e, "attempt failed, retrying");
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

/// Applies one [`RetryPolicy`] to every operation of a [`Store`].
pub struct RetryingClient<S> {
    store: S,
    policy: RetryPolicy,
}

impl<S: Store> RetryingClient<S> {
    pub fn new(store: S, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn retry<T, F, Fut>(&self, operation: Operation, key: &str, attempt: F) -> DbResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        debug!(binding = self.store.name(), %operation, key, "executing");
        match self.policy.run(attempt).await {
            (_, Ok(value)) => Ok(value),
            (attempts, Err(source)) => {
                error!(
                    binding = self.store.name(),
                    %operation,
                    key,
                    attempts,
                    error = ?source,
                    "operation failed"
                );
                Err(DbError::Exhausted {
                    operation,
                    key: key.to_string(),
                    attempts,
                    source,
                })
            }
        }
    }
}

#[async_trait]
impl<S: Store> Client for RetryingClient<S> {
    async fn read(&self, table: &str, key: &str, fields: Option<&Fields>) -> DbResult<Record> {
        let store = &self.store;
        let fields = projection(fields);
        self.retry(Operation::Read, key, move || store.read(table, key, fields))
            .await
    }

    async fn scan(
        &self,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&Fields>,
    ) -> DbResult<Vec<Record>> {
        if record_count == 0 {
            return Ok(Vec::new());
        }
        let store = &self.store;
        let fields = projection(fields);
        self.retry(Operation::Scan, start_key, move || {
            store.scan(table, start_key, record_count, fields)
        })
        .await
    }

    async fn update(&self, table: &str, key: &str, values: &Record) -> DbResult<()> {
        if values.is_empty() {
            debug!(binding = self.store.name(), key, "update without values, nothing to do");
            return Ok(());
        }
        let store = &self.store;
        self.retry(Operation::Update, key, move || store.update(table, key, values))
            .await
    }

    async fn insert(&self, table: &str, key: &str, values: &Record) -> DbResult<()> {
        let store = &self.store;
        self.retry(Operation::Insert, key, move || store.insert(table, key, values))
            .await
    }

    async fn delete(&self, table: &str, key: &str) -> DbResult<()> {
        let store = &self.store;
        self.retry(Operation::Delete, key, move || store.delete(table, key))
            .await
    }

    async fn cleanup(&self) -> DbResult<()> {
        self.store.close().await.map_err(DbError::Cleanup)
    }
}
