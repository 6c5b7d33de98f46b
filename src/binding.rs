use clap::ValueEnum;
use serde::Serialize;
use tracing::info;

use crate::client::Client;
use crate::config::CassandraConfig;
use crate::error::DbError;
use crate::memory::{MemoryStore, SharedTables};
use crate::retry::RetryingClient;

/// The client stack a run drives.
#[derive(ValueEnum, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Binding {
    /// Raw CQL strings through the native driver
    #[cfg(feature = "cql")]
    CqlSimple,
    /// Typed query builder through the native driver
    #[cfg(feature = "cql")]
    CqlBuilder,
    /// Cached prepared statements through the native driver
    #[cfg(feature = "cql")]
    CqlPrepared,
    /// CQL3 strings over Thrift RPC
    #[cfg(feature = "thrift")]
    ThriftCql,
    /// Column-family template over Thrift RPC
    #[cfg(feature = "thrift")]
    ThriftTemplate,
    /// In-process map, for harness overhead
    Memory,
}

impl Binding {
    pub fn name(self) -> &'static str {
        match self {
            #[cfg(feature = "cql")]
            Binding::CqlSimple => "cql-simple",
            #[cfg(feature = "cql")]
            Binding::CqlBuilder => "cql-builder",
            #[cfg(feature = "cql")]
            Binding::CqlPrepared => "cql-prepared",
            #[cfg(feature = "thrift")]
            Binding::ThriftCql => "thrift-cql",
            #[cfg(feature = "thrift")]
            Binding::ThriftTemplate => "thrift-template",
            Binding::Memory => "memory",
        }
    }
}

/// Connect one client instance. Memory clients built from the same
/// `tables` see the same data.
pub async fn connect(
    binding: Binding,
    config: &CassandraConfig,
    tables: &SharedTables,
) -> Result<Box<dyn Client>, DbError> {
    let policy = config.operation_policy();
    let client: Box<dyn Client> = match binding {
        #[cfg(feature = "cql")]
        Binding::CqlSimple => {
            use crate::cql::{CqlStore, SimpleStatements};
            let store = CqlStore::connect(config, SimpleStatements).await?;
            Box::new(RetryingClient::new(store, policy))
        }
        #[cfg(feature = "cql")]
        Binding::CqlBuilder => {
            use crate::cql::{BuilderStatements, CqlStore};
            let store = CqlStore::connect(config, BuilderStatements).await?;
            Box::new(RetryingClient::new(store, policy))
        }
        #[cfg(feature = "cql")]
        Binding::CqlPrepared => {
            use crate::cql::{CqlStore, PreparedStatements};
            let store = CqlStore::connect(config, PreparedStatements::new()).await?;
            Box::new(RetryingClient::new(store, policy))
        }
        #[cfg(feature = "thrift")]
        Binding::ThriftCql => {
            let store = crate::thrift::ThriftCqlStore::connect(config).await?;
            Box::new(RetryingClient::new(store, policy))
        }
        #[cfg(feature = "thrift")]
        Binding::ThriftTemplate => {
            let store = crate::thrift::ThriftTemplateStore::connect(config).await?;
            Box::new(RetryingClient::new(store, policy))
        }
        Binding::Memory => {
            let store = MemoryStore::with_tables(tables.clone());
            Box::new(RetryingClient::new(store, policy))
        }
    };
    info!(binding = binding.name(), "client ready");
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::record;
    use crate::config::Properties;

    #[test]
    fn names_match_cli_values() {
        let value = Binding::Memory.to_possible_value().unwrap();
        assert_eq!(value.get_name(), Binding::Memory.name());
        #[cfg(feature = "cql")]
        assert_eq!(
            Binding::from_str("cql-prepared", true).unwrap(),
            Binding::CqlPrepared
        );
    }

    #[tokio::test]
    async fn memory_clients_share_tables() {
        let config = CassandraConfig::from_properties(&Properties::new()).unwrap();
        let tables = SharedTables::default();

        let a = connect(Binding::Memory, &config, &tables).await.unwrap();
        let b = connect(Binding::Memory, &config, &tables).await.unwrap();
        a.insert("data", "k", &record([("f", "v")])).await.unwrap();
        assert_eq!(b.read("data", "k", None).await.unwrap()["f"], b"v".to_vec());
    }

    #[cfg(feature = "cql")]
    #[tokio::test]
    async fn cassandra_bindings_need_hosts() {
        let config = CassandraConfig::from_properties(&Properties::new()).unwrap();
        let err = connect(Binding::CqlSimple, &config, &SharedTables::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DbError::Config(_)));
    }
}
