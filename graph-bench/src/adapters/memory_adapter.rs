//! In-process graph backend.
//!
//! Adjacency lists behind a shared `RwLock`, answered with plain BFS. Used
//! by the unit tests and the criterion benches as a deterministic stand-in
//! for a real server: sampling is seeded, per-call latency can be fixed, and
//! queries or connections can be made to fail on demand.

use crate::adapters::{AgeBand, GraphBackend, NodeRecord};
use crate::{BenchError, BenchResult};
use parking_lot::RwLock;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct GraphData {
    nodes: BTreeMap<i64, NodeRecord>,
    out: BTreeMap<i64, Vec<i64>>,
    edges: usize,
}

struct Shared {
    data: RwLock<GraphData>,
    seed: u64,
    open_handles: AtomicUsize,
    queries: AtomicUsize,
    query_latency_ns: AtomicU64,
    fail_queries: AtomicBool,
    /// Remaining `clone_for_thread` calls allowed; `usize::MAX` is unlimited.
    clone_budget: AtomicUsize,
}

/// Shared in-memory graph. Cloning shares the same data.
#[derive(Clone)]
pub struct MemoryGraph {
    shared: Arc<Shared>,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::with_seed(42)
    }

    /// Graph whose handles sample with RNGs seeded from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            shared: Arc::new(Shared {
                data: RwLock::new(GraphData::default()),
                seed,
                open_handles: AtomicUsize::new(0),
                queries: AtomicUsize::new(0),
                query_latency_ns: AtomicU64::new(0),
                fail_queries: AtomicBool::new(false),
                clone_budget: AtomicUsize::new(usize::MAX),
            }),
        }
    }

    /// Build a graph from `(start, end)` pairs; every endpoint becomes a node.
    pub fn from_edges(edges: &[(i64, i64)]) -> Self {
        let graph = Self::new();
        {
            let mut data = graph.shared.data.write();
            for &(u, v) in edges {
                for id in [u, v] {
                    data.nodes.entry(id).or_insert_with(|| NodeRecord {
                        id,
                        ..NodeRecord::default()
                    });
                }
                data.out.entry(u).or_default().push(v);
                data.edges += 1;
            }
        }
        graph
    }

    /// Open a new handle onto this graph.
    pub fn handle(&self) -> Box<dyn GraphBackend> {
        self.shared.open_handles.fetch_add(1, Ordering::SeqCst);
        let seed = self.shared.seed;
        Box::new(MemoryAdapter {
            shared: Arc::clone(&self.shared),
            rng: ChaCha8Rng::seed_from_u64(seed),
            closed: false,
        })
    }

    pub fn add_node(&self, node: NodeRecord) {
        self.shared.data.write().nodes.insert(node.id, node);
    }

    pub fn add_edge(&self, start: i64, end: i64) {
        let mut data = self.shared.data.write();
        data.out.entry(start).or_default().push(end);
        data.edges += 1;
    }

    pub fn node_count(&self) -> usize {
        self.shared.data.read().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.shared.data.read().edges
    }

    pub fn node(&self, id: i64) -> Option<NodeRecord> {
        self.shared.data.read().nodes.get(&id).cloned()
    }

    /// Handles opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.shared.open_handles.load(Ordering::SeqCst)
    }

    /// Timed queries issued across all handles.
    pub fn queries_executed(&self) -> usize {
        self.shared.queries.load(Ordering::SeqCst)
    }

    /// Every timed query sleeps for `latency` before answering.
    pub fn set_query_latency(&self, latency: Duration) {
        self.shared
            .query_latency_ns
            .store(latency.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.shared.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Make `clone_for_thread` fail.
    pub fn set_refuse_connections(&self, refuse: bool) {
        let budget = if refuse { 0 } else { usize::MAX };
        self.shared.clone_budget.store(budget, Ordering::SeqCst);
    }

    /// Let `clone_for_thread` succeed `allowed` more times, then fail.
    pub fn refuse_connections_after(&self, allowed: usize) {
        self.shared.clone_budget.store(allowed, Ordering::SeqCst);
    }
}

/// One handle onto a [`MemoryGraph`].
pub struct MemoryAdapter {
    shared: Arc<Shared>,
    rng: ChaCha8Rng,
    closed: bool,
}

impl MemoryAdapter {
    fn begin_query(&self) -> BenchResult<()> {
        if self.closed {
            return Err(BenchError::Database("handle is closed".into()));
        }
        self.shared.queries.fetch_add(1, Ordering::SeqCst);
        let latency = self.shared.query_latency_ns.load(Ordering::SeqCst);
        if latency > 0 {
            std::thread::sleep(Duration::from_nanos(latency));
        }
        if self.shared.fail_queries.load(Ordering::SeqCst) {
            return Err(BenchError::Database("injected query failure".into()));
        }
        Ok(())
    }

    fn sample(&mut self, mut ids: Vec<i64>, limit: usize) -> Vec<i64> {
        ids.shuffle(&mut self.rng);
        ids.truncate(limit);
        ids
    }
}

impl GraphBackend for MemoryAdapter {
    fn name(&self) -> &str {
        "memory"
    }

    fn clone_for_thread(&self) -> BenchResult<Box<dyn GraphBackend>> {
        self.shared
            .clone_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .map_err(|_| BenchError::Connection("memory graph refused connection".into()))?;
        Ok(MemoryGraph {
            shared: Arc::clone(&self.shared),
        }
        .handle())
    }

    fn close(&mut self) -> BenchResult<()> {
        if !self.closed {
            self.closed = true;
            self.shared.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn sample_start_ids(&mut self, limit: usize) -> BenchResult<Vec<i64>> {
        let ids: Vec<i64> = {
            let data = self.shared.data.read();
            data.out
                .iter()
                .filter(|(_, targets)| !targets.is_empty())
                .map(|(&id, _)| id)
                .collect()
        };
        Ok(self.sample(ids, limit))
    }

    fn sample_node_ids(&mut self, limit: usize) -> BenchResult<Vec<i64>> {
        let ids: Vec<i64> = self.shared.data.read().nodes.keys().copied().collect();
        Ok(self.sample(ids, limit))
    }

    fn friends_of_friends(&mut self, start: i64, depth: u32) -> BenchResult<usize> {
        self.begin_query()?;
        let data = self.shared.data.read();
        let mut frontier: BTreeSet<i64> = BTreeSet::from([start]);
        for _ in 0..depth {
            frontier = frontier
                .iter()
                .filter_map(|id| data.out.get(id))
                .flatten()
                .copied()
                .collect();
            if frontier.is_empty() {
                break;
            }
        }
        Ok(frontier.len())
    }

    fn reciprocal(&mut self, u: i64, v: i64) -> BenchResult<bool> {
        self.begin_query()?;
        let data = self.shared.data.read();
        let follows = |a: i64, b: i64| data.out.get(&a).is_some_and(|t| t.contains(&b));
        Ok(follows(u, v) && follows(v, u))
    }

    fn shortest_path(&mut self, from: i64, to: i64, max_depth: u32) -> BenchResult<Option<u32>> {
        self.begin_query()?;
        if from == to {
            return Ok(Some(0));
        }
        let data = self.shared.data.read();
        let mut seen: HashSet<i64> = HashSet::from([from]);
        let mut queue: VecDeque<(i64, u32)> = VecDeque::from([(from, 0)]);
        while let Some((node, dist)) = queue.pop_front() {
            if dist == max_depth {
                continue;
            }
            for &next in data.out.get(&node).into_iter().flatten() {
                if next == to {
                    return Ok(Some(dist + 1));
                }
                if seen.insert(next) {
                    queue.push_back((next, dist + 1));
                }
            }
        }
        Ok(None)
    }

    fn filtered_neighbours(&mut self, start: i64, band: AgeBand) -> BenchResult<usize> {
        self.begin_query()?;
        let data = self.shared.data.read();
        let matches: HashSet<i64> = data
            .out
            .get(&start)
            .into_iter()
            .flatten()
            .copied()
            .filter(|id| {
                data.nodes
                    .get(id)
                    .and_then(|n| n.age)
                    .is_some_and(|age| band.contains(age))
            })
            .collect();
        Ok(matches.len())
    }

    fn wipe(&mut self) -> BenchResult<()> {
        *self.shared.data.write() = GraphData::default();
        Ok(())
    }

    fn insert_nodes(&mut self, nodes: &[NodeRecord]) -> BenchResult<()> {
        let mut data = self.shared.data.write();
        for node in nodes {
            // first row wins, like ON CONFLICT DO NOTHING
            data.nodes.entry(node.id).or_insert_with(|| node.clone());
        }
        Ok(())
    }

    fn insert_edges(&mut self, edges: &[(i64, i64)]) -> BenchResult<()> {
        let mut data = self.shared.data.write();
        for &(u, v) in edges {
            data.out.entry(u).or_default().push(v);
        }
        data.edges += edges.len();
        Ok(())
    }
}
