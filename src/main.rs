use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cassandra_bench::args::{Args, Format, Mode};
use cassandra_bench::binding;
use cassandra_bench::config::{CassandraConfig, Properties};
use cassandra_bench::harness::{self, render};
use cassandra_bench::memory::SharedTables;
use cassandra_bench::workload::Workload;

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let props = load_properties(&args)?;
    let config = CassandraConfig::from_properties(&props)?;
    init_logging(config.debug);

    let runtime = configure_runtime(&args)?;
    runtime.block_on(run(&args, &config))
}

/// Files first, in order, then individual overrides.
fn load_properties(args: &Args) -> Result<Properties> {
    let mut props = Properties::new();
    for path in &args.property_files {
        let file = Properties::load(path)
            .with_context(|| format!("reading properties from {}", path.display()))?;
        props.merge(file);
    }
    for pair in &args.properties {
        let (key, value) = Properties::parse_override(pair)?;
        props.set(key, value);
    }
    Ok(props)
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn configure_runtime(args: &Args) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.worker_threads(args.worker_threads.max(1));

    if let Some(max_threads) = args.max_blocking_threads {
        builder.max_blocking_threads(max_threads.max(1));
    }

    Ok(builder.enable_all().build()?)
}

async fn run(args: &Args, config: &CassandraConfig) -> Result<ExitCode> {
    let tables = SharedTables::default();
    let table = args
        .table
        .clone()
        .unwrap_or_else(|| config.column_family.clone());

    match args.mode {
        Mode::Simulate => {
            let client = binding::connect(args.binding, config, &tables).await?;
            let steps = harness::simulate(client.as_ref(), &table).await;
            client.cleanup().await?;

            match args.format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&steps)?),
                Format::Text => {
                    for step in &steps {
                        println!("Result of {}: {}", step.action, step.status);
                        for record in &step.records {
                            println!("{}", render(record));
                        }
                    }
                }
            }

            if steps.iter().all(|s| s.status == 0) {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Mode::Bench => {
            let workload = Workload {
                record_count: args.record_count,
                operation_count: args.operation_count,
                read_proportion: args.read_proportion,
                field_count: args.field_count,
                field_length: args.field_length,
                load_pattern: args.load_pattern,
            };
            println!(
                "Starting benchmark with {} concurrent clients...",
                args.num_clients
            );

            let report = harness::bench(
                args.binding,
                config,
                &tables,
                &table,
                &workload,
                args.num_clients,
            )
            .await?;

            match args.format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                Format::Text => {
                    println!("\nBenchmark Complete");
                    println!("{report}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
