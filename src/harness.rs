//! What the binary runs: a fixed smoke sequence against one client, or a
//! load-then-mix benchmark over concurrent clients.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{ensure, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::task;
use tracing::{debug, info};

use crate::binding::{self, Binding};
use crate::client::{record, Client, Record};
use crate::config::CassandraConfig;
use crate::error::{DbResult, Operation, Status};
use crate::memory::SharedTables;
use crate::metrics::{ConcurrentMetrics, Report};
use crate::workload::Workload;

/// Outcome of one smoke step.
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub action: String,
    pub status: i32,
    pub records: Vec<Record>,
}

impl Step {
    fn new<T>(action: impl Into<String>, result: &DbResult<T>) -> Self {
        Self {
            action: action.into(),
            status: status_of(result).code(),
            records: Vec::new(),
        }
    }
}

fn status_of<T>(result: &DbResult<T>) -> Status {
    match result {
        Ok(_) => Status::Ok,
        Err(e) => e.status(),
    }
}

/// Render a record as `[field]=[value]` pairs.
pub fn render(record: &Record) -> String {
    record
        .iter()
        .map(|(k, v)| format!("[{k}]=[{}]", String::from_utf8_lossy(v)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn person(age: &str, middlename: &str, color: &str) -> Record {
    record([
        ("age", age),
        ("middlename", middlename),
        ("favoritecolor", color),
    ])
}

/// Sum of status codes, so any failure makes the total negative.
fn combined(action: &str, results: &[DbResult<()>]) -> Step {
    Step {
        action: action.to_string(),
        status: results.iter().map(|r| status_of(r).code()).sum(),
        records: Vec::new(),
    }
}

/// Insert, read and delete one record, then insert four, scan two, update
/// one field, read it back and delete everything.
pub async fn simulate(client: &dyn Client, table: &str) -> Vec<Step> {
    const BRIAN: &str = "BrianFrankCooper";
    let mut steps = Vec::new();

    let result = client
        .insert(table, BRIAN, &person("57", "bradley", "blue"))
        .await;
    steps.push(Step::new("insert", &result));

    let result = client.read(table, BRIAN, None).await;
    let mut step = Step::new("read", &result);
    step.records.extend(result.ok());
    steps.push(step);

    let result = client.delete(table, BRIAN).await;
    steps.push(Step::new("delete", &result));

    let result = client.read(table, BRIAN, None).await;
    let mut step = Step::new("read", &result);
    step.records.extend(result.ok());
    steps.push(step);

    let people = [
        ("John", person("30", "John", "yellow")),
        ("Paul", person("31", "Paul", "yellow")),
        ("Ringo", person("32", "Ringo", "yellow")),
        ("George", person("33", "George", "yellow")),
    ];
    let mut inserts = Vec::new();
    for (key, values) in &people {
        inserts.push(client.insert(table, key, values).await);
    }
    steps.push(combined("inserts", &inserts));

    let result = client.scan(table, "John", 2, None).await;
    let mut step = Step::new("scan", &result);
    step.records = result.unwrap_or_default();
    steps.push(step);

    let result = client
        .update(table, "Paul", &record([("age", "70")]))
        .await;
    steps.push(Step::new("update", &result));

    let result = client.read(table, "Paul", None).await;
    let mut step = Step::new("read", &result);
    step.records.extend(result.ok());
    steps.push(step);

    let mut deletes = Vec::new();
    for (key, _) in &people {
        deletes.push(client.delete(table, key).await);
    }
    steps.push(combined("deletes", &deletes));

    for step in &steps {
        debug!(action = %step.action, status = step.status, "simulation step");
    }
    steps
}

async fn connect_all(
    binding: Binding,
    config: &CassandraConfig,
    tables: &SharedTables,
    count: u32,
) -> Result<Vec<Box<dyn Client>>> {
    let mut clients = Vec::with_capacity(count as usize);
    for _ in 0..count {
        clients.push(binding::connect(binding, config, tables).await?);
    }
    Ok(clients)
}

async fn timed<T>(
    metrics: &ConcurrentMetrics,
    operation: Operation,
    call: impl std::future::Future<Output = DbResult<T>>,
) -> DbResult<T> {
    let start = Instant::now();
    let result = call.await;
    metrics
        .record(operation, status_of(&result), start.elapsed())
        .await;
    result
}

/// Load `workload.record_count` records, then run the read/update mix with
/// `num_clients` workers, each owning its own client.
pub async fn bench(
    binding: Binding,
    config: &CassandraConfig,
    tables: &SharedTables,
    table: &str,
    workload: &Workload,
    num_clients: u32,
) -> Result<Report> {
    let num_clients = num_clients.max(1);
    info!(binding = binding.name(), num_clients, "starting benchmark");
    let clients = connect_all(binding, config, tables, num_clients).await?;
    let metrics = ConcurrentMetrics::default();
    let table: Arc<str> = Arc::from(table);

    info!(
        records = workload.record_count,
        pattern = ?workload.load_pattern,
        "loading initial dataset"
    );
    let order = workload.load_order();
    let chunk = order.len().div_ceil(num_clients as usize).max(1);
    let mut handles = Vec::new();
    for (client, keys) in clients.into_iter().zip(
        order
            .chunks(chunk)
            .map(<[u32]>::to_vec)
            .chain(std::iter::repeat(Vec::new())),
    ) {
        let metrics = metrics.clone();
        let workload = workload.clone();
        let table = Arc::clone(&table);
        handles.push(task::spawn(async move {
            let mut rng = StdRng::from_entropy();
            for index in keys {
                let values = workload.build_record(&mut rng);
                let key = Workload::key(index);
                timed(&metrics, Operation::Insert, client.insert(&table, &key, &values)).await?;
            }
            Ok::<_, anyhow::Error>(client)
        }));
    }
    let mut clients = Vec::with_capacity(handles.len());
    for handle in handles {
        clients.push(handle.await??);
    }

    if workload.record_count > 0 {
        let mut rng = StdRng::from_entropy();
        let verify_key = workload.next_key(&mut rng);
        let verify = clients[0].read(&table, &verify_key, None).await?;
        ensure!(
            !verify.is_empty(),
            "initial data load failed, could not read {verify_key}"
        );
        info!("initial dataset loaded and verified");
    }

    let ops_per_client = workload.operation_count / num_clients;
    info!(ops_per_client, "running read/update mix");
    let start = Instant::now();
    let mut handles = Vec::new();
    for (client_id, client) in clients.into_iter().enumerate() {
        let metrics = metrics.clone();
        let workload = workload.clone();
        let table = Arc::clone(&table);
        handles.push(task::spawn(async move {
            let mut rng = StdRng::from_entropy();
            for i in 0..ops_per_client {
                if i > 0 && i % 1000 == 0 {
                    debug!(client_id, done = i, total = ops_per_client, "progress");
                }
                let key = workload.next_key(&mut rng);
                // failures are counted, not fatal
                match workload.next_operation(&mut rng) {
                    Operation::Read => {
                        let _ = timed(&metrics, Operation::Read, client.read(&table, &key, None))
                            .await;
                    }
                    _ => {
                        let values = workload.build_update(&mut rng);
                        let _ = timed(
                            &metrics,
                            Operation::Update,
                            client.update(&table, &key, &values),
                        )
                        .await;
                    }
                }
            }
            client
        }));
    }

    let mut clients = Vec::with_capacity(handles.len());
    for handle in handles {
        clients.push(handle.await?);
    }
    let elapsed = start.elapsed();

    for client in &clients {
        client.cleanup().await?;
    }

    let metrics = metrics.get_metrics().await;
    info!(
        operations = metrics.total(),
        failures = metrics.failures(),
        elapsed_ms = elapsed.as_millis() as u64,
        "benchmark complete"
    );
    let mut report = metrics.report(binding.name(), elapsed);
    // throughput covers the timed mix only, not the load
    let mixed = u64::from(ops_per_client) * clients.len() as u64;
    report.throughput = if elapsed > Duration::ZERO {
        mixed as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Properties;
    use crate::workload::LoadPattern;

    fn memory_config() -> CassandraConfig {
        CassandraConfig::from_properties(&Properties::new()).unwrap()
    }

    #[tokio::test]
    async fn simulation_on_memory_succeeds() {
        let tables = SharedTables::default();
        let client = binding::connect(Binding::Memory, &memory_config(), &tables)
            .await
            .unwrap();

        let steps = simulate(client.as_ref(), "usertest").await;
        let actions: Vec<_> = steps.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(
            actions,
            vec![
                "insert", "read", "delete", "read", "inserts", "scan", "update", "read",
                "deletes"
            ]
        );
        assert!(steps.iter().all(|s| s.status == 0));

        assert_eq!(steps[1].records[0]["middlename"], b"bradley".to_vec());
        assert!(steps[3].records[0].is_empty());
        assert_eq!(steps[5].records.len(), 2);
        assert_eq!(steps[7].records[0]["age"], b"70".to_vec());
        assert_eq!(steps[7].records[0]["middlename"], b"Paul".to_vec());

        assert!(client.scan("usertest", "", 10, None).await.unwrap().is_empty());
    }

    #[test]
    fn renders_fields_in_order() {
        assert_eq!(
            render(&person("57", "bradley", "blue")),
            "[age]=[57] [favoritecolor]=[blue] [middlename]=[bradley]"
        );
    }

    #[tokio::test]
    async fn bench_on_memory_reports_every_operation() {
        let workload = Workload {
            record_count: 40,
            operation_count: 200,
            read_proportion: 0.5,
            field_count: 3,
            field_length: 8,
            load_pattern: LoadPattern::Random,
        };
        let tables = SharedTables::default();
        let report = bench(
            Binding::Memory,
            &memory_config(),
            &tables,
            "usertable",
            &workload,
            4,
        )
        .await
        .unwrap();

        let count = |op: &str| {
            report
                .operations
                .iter()
                .find(|s| s.operation == op)
                .map_or(0, |s| s.count)
        };
        assert_eq!(count("insert"), 40);
        assert_eq!(count("read") + count("update"), 200);
        assert!(report.operations.iter().all(|s| s.failures == 0));
        assert_eq!(tables.read().await["usertable"].len(), 40);
    }
}
