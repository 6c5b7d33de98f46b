use std::path::PathBuf;

use clap::Parser;
use clap::ValueEnum;

use crate::binding::Binding;
use crate::workload::LoadPattern;

#[derive(Parser, Debug)]
#[command(term_width = 0)]
pub struct Args {
    /// The client stack to drive
    #[arg(short, long)]
    pub binding: Binding,

    /// What to run
    #[arg(long, default_value = "bench")]
    pub mode: Mode,

    /// Property files, applied in order
    #[arg(short = 'P', long = "properties")]
    pub property_files: Vec<PathBuf>,

    /// Individual key=value properties, applied after the files
    #[arg(short = 'p', long = "property")]
    pub properties: Vec<String>,

    /// Table (column family) to operate on; defaults to cassandra.columnfamily
    #[arg(long)]
    pub table: Option<String>,

    /// Number of records to load initially
    #[arg(long, default_value = "1000")]
    pub record_count: u32,

    /// Number of operations to perform
    #[arg(long, default_value = "1000")]
    pub operation_count: u32,

    /// Proportion of read operations
    #[arg(long, default_value = "0.5")]
    pub read_proportion: f32,

    /// Number of concurrent clients
    #[arg(long, default_value = "1")]
    pub num_clients: u32,

    /// Fields per record
    #[arg(long, default_value = "10")]
    pub field_count: u32,

    /// Bytes per field value
    #[arg(long, default_value = "100")]
    pub field_length: usize,

    /// Pattern for loading initial data (sequential or random)
    #[arg(long, default_value = "sequential")]
    pub load_pattern: LoadPattern,

    /// Runtime worker threads
    #[arg(long, default_value_t = num_cpus::get())]
    pub worker_threads: usize,

    /// Maximum threads for blocking calls (Thrift bindings run there)
    #[arg(long)]
    pub max_blocking_threads: Option<usize>,

    /// Report format
    #[arg(long, default_value = "text")]
    pub format: Format,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// Fixed insert/read/scan/update/delete sequence
    Simulate,
    /// Load, then a timed read/update mix
    Bench,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum Format {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_properties_and_defaults() {
        let args = Args::try_parse_from([
            "cassandra-bench",
            "--binding",
            "memory",
            "-P",
            "workloads/a.properties",
            "-p",
            "hosts=127.0.0.1",
            "-p",
            "cassandra.keyspace=ycsb",
        ])
        .unwrap();

        assert_eq!(args.binding, Binding::Memory);
        assert_eq!(args.mode, Mode::Bench);
        assert_eq!(args.property_files.len(), 1);
        assert_eq!(args.properties, vec!["hosts=127.0.0.1", "cassandra.keyspace=ycsb"]);
        assert_eq!(args.field_count, 10);
        assert_eq!(args.format, Format::Text);
        assert!(args.worker_threads >= 1);
    }

    #[test]
    fn binding_is_required() {
        assert!(Args::try_parse_from(["cassandra-bench", "--mode", "simulate"]).is_err());
    }
}
