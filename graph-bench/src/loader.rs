//! Bulk loader for the Pokec social network dump.
//!
//! The nodes file is the `soc-pokec-profiles` layout: one tab-separated line
//! per user, the user id in the first column. Only the columns the workloads
//! (or a curious analyst) need are kept. The edges file holds one
//! `start<TAB>end` pair per line.

use crate::adapters::{GraphBackend, NodeRecord};
use crate::{BenchError, BenchResult};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

/// Minimum number of columns for a profile line to be accepted.
pub const MIN_NODE_COLUMNS: usize = 8;

const COL_EDUCATION: usize = 19;
const COL_SMOKING: usize = 22;
const COL_ALCOHOL: usize = 23;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub nodes: usize,
    pub edges: usize,
    /// Lines that could not be parsed, across both files.
    pub skipped: usize,
}

fn text(cols: &[&str], idx: usize) -> Option<String> {
    let raw = cols.get(idx)?.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(raw.to_string())
    }
}

fn int(cols: &[&str], idx: usize) -> Option<i32> {
    text(cols, idx)?.parse().ok()
}

/// Parse one profile line. Returns `None` for short lines and lines whose
/// id is not an integer.
pub fn parse_node_line(line: &str) -> Option<NodeRecord> {
    let cols: Vec<&str> = line
        .trim_end_matches(|c: char| c == '\r' || c == '\n')
        .split('\t')
        .collect();
    if cols.len() < MIN_NODE_COLUMNS {
        return None;
    }
    let id = cols[0].trim().parse::<i64>().ok()?;

    Some(NodeRecord {
        id,
        public: int(&cols, 1),
        completion_pct: int(&cols, 2),
        gender: int(&cols, 3),
        region: text(&cols, 4),
        last_login: text(&cols, 5),
        registration: text(&cols, 6),
        age: int(&cols, 7),
        education: text(&cols, COL_EDUCATION),
        smoking: text(&cols, COL_SMOKING),
        alcohol: text(&cols, COL_ALCOHOL),
    })
}

/// Parse one `start end` line (tab or any whitespace).
pub fn parse_edge_line(line: &str) -> Option<(i64, i64)> {
    let mut parts = line.split_whitespace();
    let start = parts.next()?.parse().ok()?;
    let end = parts.next()?.parse().ok()?;
    Some((start, end))
}

fn open(path: &Path) -> BenchResult<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|e| {
        BenchError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })
}

/// Read `lines`, parse each with `parse`, and hand full batches to `flush`.
/// Returns `(parsed, skipped)`.
fn ingest<T>(
    reader: impl BufRead,
    batch_size: usize,
    parse: impl Fn(&str) -> Option<T>,
    mut flush: impl FnMut(&[T]) -> BenchResult<()>,
) -> BenchResult<(usize, usize)> {
    let batch_size = batch_size.max(1);
    let mut batch = Vec::with_capacity(batch_size);
    let (mut parsed, mut skipped) = (0, 0);

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse(&line) {
            Some(item) => {
                batch.push(item);
                parsed += 1;
            }
            None => skipped += 1,
        }
        if batch.len() == batch_size {
            flush(&batch)?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        flush(&batch)?;
    }
    Ok((parsed, skipped))
}

/// Wipe `db` and load the nodes and edges files into it.
pub fn load(
    db: &mut dyn GraphBackend,
    nodes_path: &Path,
    edges_path: &Path,
    batch_size: usize,
) -> BenchResult<LoadStats> {
    let nodes_reader = open(nodes_path)?;
    let edges_reader = open(edges_path)?;

    let t = Instant::now();
    db.wipe()?;
    tracing::info!(backend = db.name(), "wiped existing graph");

    let (nodes, skipped_nodes) = ingest(nodes_reader, batch_size, parse_node_line, |batch| {
        db.insert_nodes(batch)
    })?;
    tracing::info!(nodes, skipped = skipped_nodes, "nodes loaded");

    let (edges, skipped_edges) = ingest(edges_reader, batch_size, parse_edge_line, |batch| {
        db.insert_edges(batch)
    })?;
    tracing::info!(edges, skipped = skipped_edges, "edges loaded");

    let stats = LoadStats {
        nodes,
        edges,
        skipped: skipped_nodes + skipped_edges,
    };
    tracing::info!(
        backend = db.name(),
        nodes = stats.nodes,
        edges = stats.edges,
        skipped = stats.skipped,
        elapsed_ms = t.elapsed().as_millis() as u64,
        "load complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_adapter::MemoryGraph;
    use crate::datagen::DataGen;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn profile(cols: &[(usize, &str)]) -> String {
        let mut line = vec![""; 24];
        for &(i, v) in cols {
            line[i] = v;
        }
        line.join("\t")
    }

    #[test]
    fn parses_pokec_profile_columns() {
        let line = profile(&[
            (0, "17"),
            (1, "1"),
            (2, "14"),
            (3, "0"),
            (4, "zilinsky kraj, zilina"),
            (7, "22"),
            (19, "null"),
            (22, "nefajcim"),
        ]);
        let node = parse_node_line(&line).unwrap();
        assert_eq!(node.id, 17);
        assert_eq!(node.public, Some(1));
        assert_eq!(node.completion_pct, Some(14));
        assert_eq!(node.gender, Some(0));
        assert_eq!(node.region.as_deref(), Some("zilinsky kraj, zilina"));
        assert_eq!(node.last_login, None);
        assert_eq!(node.age, Some(22));
        assert_eq!(node.education, None);
        assert_eq!(node.smoking.as_deref(), Some("nefajcim"));
        assert_eq!(node.alcohol, None);
    }

    #[test]
    fn short_or_unidentified_lines_are_rejected() {
        assert!(parse_node_line("1\t1\t14").is_none());
        assert!(parse_node_line(&profile(&[(0, "abc")])).is_none());
        // Exactly eight columns is enough; trailing columns are optional.
        let node = parse_node_line("5\t0\t0\t1\tx\tnull\tnull\t0").unwrap();
        assert_eq!(node.age, Some(0));
        assert_eq!(node.education, None);
    }

    #[test]
    fn unparseable_ints_become_null() {
        let node = parse_node_line(&profile(&[(0, "3"), (7, "twenty")])).unwrap();
        assert_eq!(node.age, None);
    }

    #[test]
    fn edges_accept_tabs_and_spaces() {
        assert_eq!(parse_edge_line("1\t13"), Some((1, 13)));
        assert_eq!(parse_edge_line("  4   9 "), Some((4, 9)));
        assert_eq!(parse_edge_line("4"), None);
        assert_eq!(parse_edge_line("a\tb"), None);
    }

    #[test]
    fn load_wipes_then_batches() {
        let graph = MemoryGraph::new();
        graph.add_edge(100, 200);

        let mut nodes = NamedTempFile::new().unwrap();
        let mut edges = NamedTempFile::new().unwrap();
        for id in 1..=5 {
            writeln!(nodes, "{}", profile(&[(0, id.to_string().as_str()), (7, "20")])).unwrap();
        }
        writeln!(nodes, "broken line").unwrap();
        writeln!(edges, "1\t2\n2\t3\n3\t1\nnot an edge\n\n4\t5").unwrap();

        let mut db = graph.handle();
        let stats = load(db.as_mut(), nodes.path(), edges.path(), 2).unwrap();

        assert_eq!(
            stats,
            LoadStats {
                nodes: 5,
                edges: 4,
                skipped: 2
            }
        );
        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.node(3).unwrap().age, Some(20));
    }

    #[test]
    fn generated_graph_round_trips_through_files() {
        let generated = DataGen::new(3).social_graph(40, 120);
        let mut nodes = NamedTempFile::new().unwrap();
        let mut edges = NamedTempFile::new().unwrap();
        generated.write_nodes(nodes.as_file_mut()).unwrap();
        generated.write_edges(edges.as_file_mut()).unwrap();

        let graph = MemoryGraph::new();
        let mut db = graph.handle();
        let stats = load(db.as_mut(), nodes.path(), edges.path(), 7).unwrap();

        assert_eq!(stats.nodes, 40);
        assert_eq!(stats.edges, 120);
        assert_eq!(stats.skipped, 0);
        for n in &generated.nodes {
            assert_eq!(graph.node(n.id).as_ref(), Some(n));
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let graph = MemoryGraph::new();
        let mut db = graph.handle();
        let err = load(
            db.as_mut(),
            Path::new("/nonexistent/nodes.tsv"),
            Path::new("/nonexistent/edges.tsv"),
            10,
        )
        .unwrap_err();
        assert!(matches!(err, BenchError::Io(_)));
        assert_eq!(graph.edge_count(), 0);
    }
}
