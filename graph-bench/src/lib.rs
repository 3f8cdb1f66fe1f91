//! Shared types for graph-bench: run specification, error type and the
//! aggregate produced by a benchmark run.
//!
//! A run has two phases. First a [`workloads::PreparedWorkload`] samples a
//! working set of node ids from the backend under test. Then the
//! [`runner::Runner`] fans a fixed number of timed operations out over worker
//! threads, each holding a private backend handle, and folds the recorded
//! latencies into a [`RunResult`].

pub mod adapters;
pub mod config;
pub mod datagen;
pub mod loader;
pub mod report;
pub mod runner;
pub mod stats;
pub mod workloads;

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ────────────────────────────────────────────────────────────────────────────────
// Error type
// ────────────────────────────────────────────────────────────────────────────────

pub type BenchResult<T> = std::result::Result<T, BenchError>;

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("working set undersampled: wanted {wanted} ids, backend returned {got}")]
    Undersampled { wanted: usize, got: usize },

    #[error("backend returned no candidates for a run of {operations} operations")]
    EmptyWorkingSet { operations: usize },

    #[error("candidate index {index} out of range (working set holds {len} entries)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("operation failed: {0}")]
    Operation(String),
}

// ────────────────────────────────────────────────────────────────────────────────
// Backend / workload selection
// ────────────────────────────────────────────────────────────────────────────────

/// Data store under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Backend {
    Postgres,
    Neo4j,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Postgres, Backend::Neo4j];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Postgres => "postgres",
            Backend::Neo4j => "neo4j",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Backend::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "invalid backend '{}', available options: {}",
                    s,
                    option_list(Backend::ALL.iter().map(|b| b.as_str()))
                )
            })
    }
}

/// Graph access pattern being measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkloadKind {
    /// Distinct nodes reachable at exactly `depth` hops.
    Fof,
    /// Whether two nodes follow each other.
    Reciprocal,
    /// Shortest directed path between two nodes, bounded by `depth`.
    ShortestPath,
    /// Direct neighbours filtered on a node attribute.
    Filtered,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 4] = [
        WorkloadKind::Fof,
        WorkloadKind::Reciprocal,
        WorkloadKind::ShortestPath,
        WorkloadKind::Filtered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Fof => "fof",
            WorkloadKind::Reciprocal => "reciprocal",
            WorkloadKind::ShortestPath => "shortest_path",
            WorkloadKind::Filtered => "filtered",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

impl FromStr for WorkloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkloadKind::ALL
            .into_iter()
            .find(|w| w.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "invalid workload '{}', available options: {}",
                    s,
                    option_list(WorkloadKind::ALL.iter().map(|w| w.as_str()))
                )
            })
    }
}

fn option_list<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}

// ────────────────────────────────────────────────────────────────────────────────
// Run specification
// ────────────────────────────────────────────────────────────────────────────────

/// Largest accepted operation count: pair workloads sample two ids per
/// operation and the count must still fit a signed 64-bit LIMIT.
pub const MAX_OPERATIONS: usize = (i64::MAX as usize) / 2;

/// Immutable description of one benchmark run, built once from the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSpec {
    backend: Backend,
    workload: WorkloadKind,
    depth: u32,
    operations: usize,
    threads: usize,
    output: Option<PathBuf>,
}

impl RunSpec {
    /// Validates counts before anything is opened.
    pub fn new(
        backend: Backend,
        workload: WorkloadKind,
        depth: u32,
        operations: usize,
        threads: usize,
        output: Option<PathBuf>,
    ) -> BenchResult<Self> {
        if threads == 0 {
            return Err(BenchError::Config("thread count must be at least 1".into()));
        }
        if depth == 0 {
            return Err(BenchError::Config(
                "depth must be at least 1 (use 1 for workloads that ignore it)".into(),
            ));
        }
        if operations > MAX_OPERATIONS {
            return Err(BenchError::Config(format!(
                "operation count {} exceeds the maximum of {}",
                operations, MAX_OPERATIONS
            )));
        }
        Ok(Self {
            backend,
            workload,
            depth,
            operations,
            threads,
            output,
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn workload(&self) -> WorkloadKind {
        self.workload
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn operations(&self) -> usize {
        self.operations
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn output(&self) -> Option<&PathBuf> {
        self.output.as_ref()
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Benchmark output
// ────────────────────────────────────────────────────────────────────────────────

/// Aggregate of one completed run. Latencies are in microseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub total_ops: usize,
    #[serde(rename = "total_time_ms", serialize_with = "serialize_millis")]
    pub total_time: Duration,
    pub throughput_ops_per_sec: f64,
    pub avg_latency_us: f64,
    pub p50_latency_us: u64,
    pub p95_latency_us: u64,
    pub p99_latency_us: u64,
    pub max_latency_us: u64,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunResult {
    /// Wall-clock run time in whole milliseconds.
    pub fn total_time_ms(&self) -> u128 {
        self.total_time.as_millis()
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse_case_insensitively() {
        assert_eq!("POSTGRES".parse::<Backend>().unwrap(), Backend::Postgres);
        assert_eq!("Neo4J".parse::<Backend>().unwrap(), Backend::Neo4j);
        let err = "mysql".parse::<Backend>().unwrap_err();
        assert!(err.contains("postgres, neo4j"));
    }

    #[test]
    fn workload_names_parse_case_insensitively() {
        assert_eq!("FOF".parse::<WorkloadKind>().unwrap(), WorkloadKind::Fof);
        assert_eq!(
            "Shortest_Path".parse::<WorkloadKind>().unwrap(),
            WorkloadKind::ShortestPath
        );
        assert!("pagerank".parse::<WorkloadKind>().is_err());
    }

    #[test]
    fn display_uses_report_spelling() {
        assert_eq!(Backend::Neo4j.to_string(), "NEO4J");
        assert_eq!(WorkloadKind::ShortestPath.to_string(), "SHORTEST_PATH");
    }

    #[test]
    fn run_spec_rejects_zero_threads_and_depth() {
        let zero_threads = RunSpec::new(Backend::Postgres, WorkloadKind::Fof, 2, 10, 0, None);
        assert!(matches!(zero_threads, Err(BenchError::Config(_))));

        let zero_depth = RunSpec::new(Backend::Postgres, WorkloadKind::Fof, 0, 10, 1, None);
        assert!(matches!(zero_depth, Err(BenchError::Config(_))));

        let ok = RunSpec::new(Backend::Neo4j, WorkloadKind::Filtered, 1, 0, 4, None).unwrap();
        assert_eq!(ok.operations(), 0);
        assert_eq!(ok.threads(), 4);
    }

    #[test]
    fn run_spec_bounds_operation_count() {
        let max =
            RunSpec::new(Backend::Postgres, WorkloadKind::Reciprocal, 1, MAX_OPERATIONS, 1, None);
        assert_eq!(max.unwrap().operations(), MAX_OPERATIONS);

        for operations in [MAX_OPERATIONS + 1, usize::MAX / 2 + 1, usize::MAX] {
            let spec =
                RunSpec::new(Backend::Neo4j, WorkloadKind::ShortestPath, 2, operations, 1, None);
            assert!(matches!(spec, Err(BenchError::Config(_))), "{operations}");
        }
    }
}
