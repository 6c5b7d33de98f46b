//! Round trips against a running cluster, one per binding.
//!
//! Ignored by default. Run with
//! `CASSANDRA_HOSTS=127.0.0.1 cargo test --test live_cassandra -- --ignored`
//! against a keyspace `usertable` holding a table `data (key text PRIMARY
//! KEY, age text, middlename text, favoritecolor text)`.
#![cfg(all(feature = "cql", feature = "thrift"))]

use cassandra_bench::binding::{self, Binding};
use cassandra_bench::client::{record, Client};
use cassandra_bench::config::{CassandraConfig, Properties};
use cassandra_bench::harness;
use cassandra_bench::memory::SharedTables;

const TABLE: &str = "data";

fn config() -> CassandraConfig {
    let hosts = std::env::var("CASSANDRA_HOSTS").unwrap_or_else(|_| "127.0.0.1".to_string());
    let props: Properties = [
        ("hosts", hosts.as_str()),
        ("cassandra.connectionretries", "3"),
        ("cassandra.operationretries", "3"),
        ("cassandra.retrydelayms", "100"),
    ]
    .into_iter()
    .collect();
    CassandraConfig::from_properties(&props).unwrap()
}

async fn round_trip(binding: Binding) {
    let client: Box<dyn Client> = binding::connect(binding, &config(), &SharedTables::default())
        .await
        .unwrap();
    let key = format!("live-{}", binding.name());

    client
        .insert(TABLE, &key, &record([("age", "57"), ("middlename", "bradley")]))
        .await
        .unwrap();
    client
        .update(TABLE, &key, &record([("age", "58")]))
        .await
        .unwrap();

    let row = client.read(TABLE, &key, None).await.unwrap();
    assert_eq!(row["age"], b"58".to_vec());
    assert_eq!(row["middlename"], b"bradley".to_vec());

    let rows = client.scan(TABLE, &key, 1, None).await.unwrap();
    assert!(rows.len() <= 1);

    client.delete(TABLE, &key).await.unwrap();
    let row = client.read(TABLE, &key, None).await.unwrap();
    assert!(row.get("age").map_or(true, |v| v.is_empty()));

    client.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn cql_simple_round_trip() {
    round_trip(Binding::CqlSimple).await;
}

#[tokio::test]
#[ignore]
async fn cql_builder_round_trip() {
    round_trip(Binding::CqlBuilder).await;
}

#[tokio::test]
#[ignore]
async fn cql_prepared_round_trip() {
    round_trip(Binding::CqlPrepared).await;
}

#[tokio::test]
#[ignore]
async fn thrift_cql_round_trip() {
    round_trip(Binding::ThriftCql).await;
}

#[tokio::test]
#[ignore]
async fn thrift_template_round_trip() {
    round_trip(Binding::ThriftTemplate).await;
}

#[tokio::test]
#[ignore]
async fn simulation_against_cluster() {
    let client = binding::connect(Binding::CqlPrepared, &config(), &SharedTables::default())
        .await
        .unwrap();
    let steps = harness::simulate(client.as_ref(), TABLE).await;
    assert!(steps.iter().all(|s| s.status == 0), "{steps:?}");
}
