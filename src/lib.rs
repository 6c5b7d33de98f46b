//! Cassandra client-stack bindings for a key-value benchmark harness.
//!
//! Every binding implements the same five operations ([`client::Client`]),
//! so one harness can compare the native CQL driver, used three different
//! ways, against the legacy Thrift interface, used two ways.

pub mod args;
pub mod binding;
pub mod client;
pub mod config;
pub mod consistency;
pub mod cql;
pub mod error;
pub mod harness;
pub mod memory;
pub mod metrics;
pub mod query;
pub mod retry;
pub mod thrift;
pub mod workload;
