use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{Operation, Status};

#[derive(Default, Clone)]
struct Samples {
    latencies: Vec<Duration>,
    failures: u64,
}

#[derive(Default, Clone)]
pub struct Metrics {
    operations: BTreeMap<&'static str, Samples>,
}

/// Metrics shared between worker tasks.
#[derive(Default, Clone)]
pub struct ConcurrentMetrics {
    metrics: Arc<Mutex<Metrics>>,
}

impl ConcurrentMetrics {
    pub async fn record(&self, operation: Operation, status: Status, duration: Duration) {
        self.metrics.lock().await.record(operation, status, duration);
    }

    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.lock().await.clone()
    }
}

/// Latency summary for one operation, in microseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationStats {
    pub operation: &'static str,
    pub count: u64,
    pub failures: u64,
    pub min_us: f64,
    pub max_us: f64,
    pub avg_us: f64,
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub binding: String,
    pub elapsed_ms: u128,
    pub throughput: f64,
    pub operations: Vec<OperationStats>,
}

impl Metrics {
    /// Failed operations count towards `failures` only; latency percentiles
    /// cover successful calls.
    pub fn record(&mut self, operation: Operation, status: Status, duration: Duration) {
        let samples = self.operations.entry(operation.as_str()).or_default();
        match status {
            Status::Ok => samples.latencies.push(duration),
            Status::Error => samples.failures += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.operations
            .values()
            .map(|s| s.latencies.len() as u64 + s.failures)
            .sum()
    }

    pub fn failures(&self) -> u64 {
        self.operations.values().map(|s| s.failures).sum()
    }

    pub fn stats(&self) -> Vec<OperationStats> {
        self.operations
            .iter()
            .map(|(name, samples)| Self::calculate_stats(name, samples))
            .collect()
    }

    pub fn report(&self, binding: &str, elapsed: Duration) -> Report {
        let secs = elapsed.as_secs_f64();
        Report {
            binding: binding.to_string(),
            elapsed_ms: elapsed.as_millis(),
            throughput: if secs > 0.0 {
                self.total() as f64 / secs
            } else {
                0.0
            },
            operations: self.stats(),
        }
    }

    fn calculate_stats(operation: &'static str, samples: &Samples) -> OperationStats {
        let count = samples.latencies.len() as u64;
        let mut stats = OperationStats {
            operation,
            count,
            failures: samples.failures,
            min_us: 0.0,
            max_us: 0.0,
            avg_us: 0.0,
            p50_us: 0.0,
            p95_us: 0.0,
            p99_us: 0.0,
        };
        if count == 0 {
            return stats;
        }

        // streaming mean avoids overflow on long runs
        let mut avg = 0.0;
        for (i, d) in samples.latencies.iter().enumerate() {
            avg += (micros(d) - avg) / (i + 1) as f64;
        }

        let mut sorted = samples.latencies.clone();
        sorted.sort_unstable();
        let at = |pct: u64| micros(&sorted[((count - 1) * pct / 100) as usize]);

        stats.min_us = micros(&sorted[0]);
        stats.max_us = micros(&sorted[sorted.len() - 1]);
        stats.avg_us = avg;
        stats.p50_us = at(50);
        stats.p95_us = at(95);
        stats.p99_us = at(99);
        stats
    }
}

fn format_duration(micros: f64) -> String {
    if micros < 1.0 {
        format!("{:.2} ns", micros * 1_000.0)
    } else if micros < 1_000.0 {
        format!("{:.2} µs", micros)
    } else if micros < 1_000_000.0 {
        format!("{:.2} ms", micros / 1_000.0)
    } else {
        format!("{:.2} s", micros / 1_000_000.0)
    }
}

fn micros(d: &Duration) -> f64 {
    d.as_nanos() as f64 / 1_000.0
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Binding: {}", self.binding)?;
        writeln!(f, "Elapsed: {} ms", self.elapsed_ms)?;
        writeln!(f, "Throughput: {:.2} ops/sec", self.throughput)?;
        writeln!(f, "\nDetailed Latency Statistics:")?;
        writeln!(
            f,
            "{:<12} {:<10} {:<10} {:<12} {:<12} {:<12} {:<12} {:<12}",
            "Operation", "Count", "Failed", "Min", "Max", "Median", "P95", "P99"
        )?;
        writeln!(f, "{:-<96}", "")?;

        for stats in &self.operations {
            writeln!(
                f,
                "{:<12} {:<10} {:<10} {:<12} {:<12} {:<12} {:<12} {:<12}",
                stats.operation,
                stats.count,
                stats.failures,
                format_duration(stats.min_us),
                format_duration(stats.max_us),
                format_duration(stats.p50_us),
                format_duration(stats.p95_us),
                format_duration(stats.p99_us),
            )?;
        }
        Ok(())
    }
}
