//! Backend adapters.
//!
//! Every data store under test implements [`GraphBackend`]. A handle is a
//! single connection and is never shared between threads: the runner asks
//! the template handle for one clone per worker and each worker owns its
//! clone for the whole run.

pub mod memory_adapter;
pub mod neo4j_adapter;
pub mod postgres_adapter;

use crate::config::ConnectionConfig;
use crate::{Backend, BenchResult};
use std::ops::{Deref, DerefMut};

/// Size of one ingest batch for both bulk loaders.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// One row of the nodes file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: i64,
    pub public: Option<i32>,
    pub completion_pct: Option<i32>,
    pub gender: Option<i32>,
    pub region: Option<String>,
    pub last_login: Option<String>,
    pub registration: Option<String>,
    pub age: Option<i32>,
    pub education: Option<String>,
    pub smoking: Option<String>,
    pub alcohol: Option<String>,
}

/// Exclusive age bounds for the filtered-neighbour query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeBand {
    pub above: i32,
    pub below: i32,
}

impl AgeBand {
    pub const YOUNG_ADULTS: AgeBand = AgeBand { above: 18, below: 25 };

    pub fn contains(&self, age: i32) -> bool {
        age > self.above && age < self.below
    }
}

/// Unified backend adapter trait.
pub trait GraphBackend: Send {
    fn name(&self) -> &str;

    // ── connection lifecycle ──

    /// Open a new handle with the same settings for use by one worker thread.
    fn clone_for_thread(&self) -> BenchResult<Box<dyn GraphBackend>>;
    /// Release the underlying connection. Calling it twice is a no-op.
    fn close(&mut self) -> BenchResult<()>;

    // ── working-set sampling ──

    /// Up to `limit` distinct random ids of nodes with at least one outgoing edge.
    fn sample_start_ids(&mut self, limit: usize) -> BenchResult<Vec<i64>>;
    /// Up to `limit` distinct random node ids.
    fn sample_node_ids(&mut self, limit: usize) -> BenchResult<Vec<i64>>;

    // ── timed queries ──

    /// Number of distinct nodes reachable from `start` in exactly `depth` hops.
    fn friends_of_friends(&mut self, start: i64, depth: u32) -> BenchResult<usize>;
    /// Whether both `u -> v` and `v -> u` exist.
    fn reciprocal(&mut self, u: i64, v: i64) -> BenchResult<bool>;
    /// Hop count of the shortest directed path, if one exists within `max_depth`.
    fn shortest_path(&mut self, from: i64, to: i64, max_depth: u32) -> BenchResult<Option<u32>>;
    /// Number of direct neighbours of `start` whose age lies inside `band`.
    fn filtered_neighbours(&mut self, start: i64, band: AgeBand) -> BenchResult<usize>;

    // ── bulk ingest ──

    /// Remove all nodes and edges and make sure the schema exists.
    fn wipe(&mut self) -> BenchResult<()>;
    fn insert_nodes(&mut self, nodes: &[NodeRecord]) -> BenchResult<()>;
    fn insert_edges(&mut self, edges: &[(i64, i64)]) -> BenchResult<()>;
}

/// Open and verify a template handle for `backend`.
pub fn open(backend: Backend, cfg: &ConnectionConfig) -> BenchResult<Box<dyn GraphBackend>> {
    match backend {
        Backend::Postgres => {
            let settings = cfg.postgres()?;
            Ok(Box::new(postgres_adapter::PostgresAdapter::connect(&settings)?))
        }
        Backend::Neo4j => {
            let settings = cfg.neo4j()?;
            Ok(Box::new(neo4j_adapter::Neo4jAdapter::connect(&settings)?))
        }
    }
}

/// Owns a handle and closes it when dropped, including during unwinding.
pub struct ScopedHandle {
    inner: Box<dyn GraphBackend>,
}

impl ScopedHandle {
    pub fn new(inner: Box<dyn GraphBackend>) -> Self {
        Self { inner }
    }
}

impl Deref for ScopedHandle {
    type Target = dyn GraphBackend;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for ScopedHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for ScopedHandle {
    fn drop(&mut self) {
        if let Err(e) = self.inner.close() {
            tracing::warn!(backend = self.inner.name(), error = %e, "failed to close handle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory_adapter::MemoryGraph;
    use super::*;

    #[test]
    fn age_band_bounds_are_exclusive() {
        let band = AgeBand::YOUNG_ADULTS;
        assert!(!band.contains(18));
        assert!(band.contains(19));
        assert!(band.contains(24));
        assert!(!band.contains(25));
    }

    #[test]
    fn scoped_handle_closes_on_drop() {
        let graph = MemoryGraph::new();
        let handle = graph.handle();
        {
            let _scoped = ScopedHandle::new(handle.clone_for_thread().unwrap());
            assert_eq!(graph.open_handles(), 2);
        }
        assert_eq!(graph.open_handles(), 1);
        drop(handle);
        assert_eq!(graph.open_handles(), 1, "plain drop does not count as close");
    }

    #[test]
    fn scoped_handle_closes_during_unwind() {
        let graph = MemoryGraph::new();
        let template = graph.handle();
        let clone = template.clone_for_thread().unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _scoped = ScopedHandle::new(clone);
            panic!("worker failed");
        }));
        assert!(result.is_err());
        assert_eq!(graph.open_handles(), 1);
    }
}
