//! Deterministic data generation.
//!
//! Everything here is driven by a seeded `ChaCha8Rng`, so the same seed
//! always yields the same graph and the same padded working set.

use crate::adapters::NodeRecord;
use crate::BenchResult;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::io::Write;

const REGIONS: &[&str] = &[
    "bratislavsky kraj, bratislava - ruzinov",
    "zilinsky kraj, zilina",
    "kosicky kraj, kosice - juh",
    "banskobystricky kraj, banska bystrica",
    "presovsky kraj, presov",
    "trnavsky kraj, trnava",
];

const EDUCATION: &[&str] = &["zakladne", "stredoskolske", "vysokoskolske", "ucnovske"];

const HABITS: &[&str] = &["nefajcim", "prilezitostne", "pravidelne"];

/// A synthetic social graph.
#[derive(Debug, Clone, Default)]
pub struct SocialGraph {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<(i64, i64)>,
}

pub struct DataGen {
    rng: ChaCha8Rng,
}

impl DataGen {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Extend `ids` to exactly `target` entries by drawing with replacement
    /// from the ids already present. Longer inputs are truncated.
    ///
    /// Returns an empty vector when `ids` is empty.
    pub fn pad(&mut self, ids: &[i64], target: usize) -> Vec<i64> {
        if ids.is_empty() {
            return Vec::new();
        }
        let mut out: Vec<i64> = ids.iter().copied().take(target).collect();
        while out.len() < target {
            let pick = ids[self.rng.gen_range(0..ids.len())];
            out.push(pick);
        }
        out
    }

    /// Random profile for user `id`. Roughly one in ten profiles has no age.
    pub fn node(&mut self, id: i64) -> NodeRecord {
        let maybe = |rng: &mut ChaCha8Rng, pool: &[&str]| -> Option<String> {
            if rng.gen_bool(0.2) {
                None
            } else {
                pool.choose(rng).map(|s| s.to_string())
            }
        };

        NodeRecord {
            id,
            public: Some(self.rng.gen_range(0..=1)),
            completion_pct: Some(self.rng.gen_range(0..=100)),
            gender: Some(self.rng.gen_range(0..=1)),
            region: maybe(&mut self.rng, REGIONS),
            last_login: Some(format!(
                "2012-05-{:02} {:02}:{:02}:00.0",
                self.rng.gen_range(1..=25),
                self.rng.gen_range(0..24),
                self.rng.gen_range(0..60)
            )),
            registration: Some(format!(
                "20{:02}-{:02}-{:02} 00:00:00.0",
                self.rng.gen_range(4..=12),
                self.rng.gen_range(1..=12),
                self.rng.gen_range(1..=28)
            )),
            age: if self.rng.gen_bool(0.1) {
                None
            } else {
                Some(self.rng.gen_range(14..=70))
            },
            education: maybe(&mut self.rng, EDUCATION),
            smoking: maybe(&mut self.rng, HABITS),
            alcohol: maybe(&mut self.rng, HABITS),
        }
    }

    /// `nodes` users with ids `1..=nodes` and up to `edges` distinct directed
    /// friendships without self loops.
    pub fn social_graph(&mut self, nodes: usize, edges: usize) -> SocialGraph {
        let node_records: Vec<NodeRecord> = (1..=nodes as i64).map(|id| self.node(id)).collect();

        let max_edges = nodes.saturating_mul(nodes.saturating_sub(1));
        let wanted = edges.min(max_edges);
        let mut seen = HashSet::with_capacity(wanted);
        let mut edge_list = Vec::with_capacity(wanted);
        while edge_list.len() < wanted {
            let a = self.rng.gen_range(1..=nodes as i64);
            let b = self.rng.gen_range(1..=nodes as i64);
            if a != b && seen.insert((a, b)) {
                edge_list.push((a, b));
            }
        }

        SocialGraph {
            nodes: node_records,
            edges: edge_list,
        }
    }
}

fn column<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "null".to_string())
}

impl SocialGraph {
    /// Write the nodes in the Pokec profile layout (tab separated, 24 columns).
    pub fn write_nodes(&self, mut out: impl Write) -> BenchResult<()> {
        for n in &self.nodes {
            let mut cols = vec![String::new(); 24];
            cols[0] = n.id.to_string();
            cols[1] = column(&n.public);
            cols[2] = column(&n.completion_pct);
            cols[3] = column(&n.gender);
            cols[4] = column(&n.region);
            cols[5] = column(&n.last_login);
            cols[6] = column(&n.registration);
            cols[7] = column(&n.age);
            cols[19] = column(&n.education);
            cols[22] = column(&n.smoking);
            cols[23] = column(&n.alcohol);
            writeln!(out, "{}", cols.join("\t"))?;
        }
        Ok(())
    }

    /// Write the edges as `start<TAB>end` lines.
    pub fn write_edges(&self, mut out: impl Write) -> BenchResult<()> {
        for (a, b) in &self.edges {
            writeln!(out, "{}\t{}", a, b)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_graph() {
        let a = DataGen::new(7).social_graph(50, 200);
        let b = DataGen::new(7).social_graph(50, 200);
        assert_eq!(a.nodes, b.nodes);
        assert_eq!(a.edges, b.edges);

        let c = DataGen::new(8).social_graph(50, 200);
        assert_ne!(a.edges, c.edges);
    }

    #[test]
    fn edges_are_distinct_and_loop_free() {
        let g = DataGen::new(1).social_graph(20, 100);
        assert_eq!(g.nodes.len(), 20);
        assert_eq!(g.edges.len(), 100);
        let unique: HashSet<_> = g.edges.iter().collect();
        assert_eq!(unique.len(), 100);
        assert!(g.edges.iter().all(|(a, b)| a != b));
        assert!(g.edges.iter().all(|(a, b)| (1..=20).contains(a) && (1..=20).contains(b)));
    }

    #[test]
    fn edge_count_is_capped_by_complete_graph() {
        let g = DataGen::new(1).social_graph(3, 1_000);
        assert_eq!(g.edges.len(), 6);
        assert!(DataGen::new(1).social_graph(1, 10).edges.is_empty());
    }

    #[test]
    fn pad_keeps_prefix_and_draws_from_sample() {
        let mut gen = DataGen::new(42);
        let padded = gen.pad(&[10, 20, 30], 8);
        assert_eq!(padded.len(), 8);
        assert_eq!(&padded[..3], &[10, 20, 30]);
        assert!(padded.iter().all(|id| [10, 20, 30].contains(id)));

        assert_eq!(DataGen::new(42).pad(&[10, 20, 30], 8), padded);
    }

    #[test]
    fn pad_truncates_and_handles_empty() {
        let mut gen = DataGen::new(42);
        assert_eq!(gen.pad(&[1, 2, 3, 4], 2), vec![1, 2]);
        assert!(gen.pad(&[], 5).is_empty());
        assert!(gen.pad(&[1], 0).is_empty());
    }

    #[test]
    fn nodes_file_uses_pokec_columns() {
        let g = SocialGraph {
            nodes: vec![NodeRecord {
                id: 5,
                age: Some(22),
                region: Some("zilinsky kraj, zilina".into()),
                ..Default::default()
            }],
            edges: vec![(5, 6)],
        };
        let mut nodes = Vec::new();
        g.write_nodes(&mut nodes).unwrap();
        let line = String::from_utf8(nodes).unwrap();
        let cols: Vec<&str> = line.trim_end_matches('\n').split('\t').collect();
        assert_eq!(cols.len(), 24);
        assert_eq!(cols[0], "5");
        assert_eq!(cols[1], "null");
        assert_eq!(cols[4], "zilinsky kraj, zilina");
        assert_eq!(cols[7], "22");

        let mut edges = Vec::new();
        g.write_edges(&mut edges).unwrap();
        assert_eq!(edges, b"5\t6\n");
    }
}
