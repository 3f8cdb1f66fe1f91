//! Neo4j adapter (via `neo4rs` over Bolt).
//!
//! `neo4rs` is async-only, so every handle drives its own current-thread
//! tokio runtime and blocks on each query. A handle therefore stays usable
//! from a plain worker thread and never shares a connection pool with
//! another worker.
//!
//! Graph layout: `(:Person {id, age, ...})-[:FRIENDS_WITH]->(:Person)`.

use crate::adapters::{AgeBand, GraphBackend, NodeRecord, DEFAULT_BATCH_SIZE};
use crate::config::Neo4jSettings;
use crate::{BenchError, BenchResult};
use neo4rs::{query, BoltNull, BoltType, ConfigBuilder, Graph, Query};
use tokio::runtime::{Builder, Runtime};

const SAMPLE_START_IDS: &str = "
    MATCH (p:Person)-[:FRIENDS_WITH]->()
    WITH DISTINCT p ORDER BY rand() LIMIT $limit
    RETURN p.id AS id";

const SAMPLE_NODE_IDS: &str = "
    MATCH (p:Person)
    RETURN p.id AS id
    ORDER BY rand() LIMIT $limit";

const RECIPROCAL: &str = "
    OPTIONAL MATCH (u:Person {id: $u})-[:FRIENDS_WITH]->(v:Person {id: $v}),
                   (v)-[:FRIENDS_WITH]->(u)
    RETURN count(v) > 0 AS reciprocal";

const FILTERED: &str = "
    MATCH (u:Person {id: $start})-[:FRIENDS_WITH]->(v:Person)
    WHERE v.age > $above AND v.age < $below
    RETURN count(DISTINCT v) AS c";

const WIPE_BATCH: &str = "
    MATCH (n) WITH n LIMIT $batch
    DETACH DELETE n
    RETURN count(*) AS deleted";

const CREATE_INDEX: &str = "CREATE INDEX person_id IF NOT EXISTS FOR (p:Person) ON (p.id)";

const INSERT_NODES: &str = "
    UNWIND range(0, size($ids) - 1) AS i
    MERGE (p:Person {id: $ids[i]})
    ON CREATE SET
        p.public         = $public[i],
        p.completion_pct = $completion[i],
        p.gender         = $gender[i],
        p.region         = $region[i],
        p.last_login     = $last_login[i],
        p.registration   = $registration[i],
        p.age            = $age[i],
        p.education      = $education[i],
        p.smoking        = $smoking[i],
        p.alcohol        = $alcohol[i]";

const INSERT_EDGES: &str = "
    UNWIND range(0, size($starts) - 1) AS i
    MATCH (a:Person {id: $starts[i]}), (b:Person {id: $ends[i]})
    CREATE (a)-[:FRIENDS_WITH]->(b)";

/// Variable-length bounds cannot be parameters in Cypher, so the depth is
/// interpolated.
pub fn friends_of_friends_cypher(depth: u32) -> String {
    format!(
        "MATCH (s:Person {{id: $start}})-[:FRIENDS_WITH*{}]->(f:Person) \
         RETURN count(DISTINCT f) AS c",
        depth
    )
}

pub fn shortest_path_cypher(max_depth: u32) -> String {
    format!(
        "MATCH (u:Person {{id: $u}}), (v:Person {{id: $v}}) WHERE u <> v \
         MATCH p = shortestPath((u)-[:FRIENDS_WITH*..{}]->(v)) \
         RETURN length(p) AS dist",
        max_depth
    )
}

fn neo_err(context: &'static str) -> impl Fn(neo4rs::Error) -> BenchError {
    move |e| BenchError::Database(format!("{}: {}", context, e))
}

fn nullable<T: Into<BoltType>>(value: Option<T>) -> BoltType {
    value.map(Into::into).unwrap_or(BoltType::Null(BoltNull))
}

pub struct Neo4jAdapter {
    settings: Neo4jSettings,
    runtime: Runtime,
    graph: Option<Graph>,
}

impl Neo4jAdapter {
    /// Connect and verify the server answers.
    pub fn connect(settings: &Neo4jSettings) -> BenchResult<Self> {
        let adapter = Self::open(settings.clone())?;
        tracing::info!(
            uri = %settings.uri,
            db = %settings.database,
            "Neo4j connection established"
        );
        Ok(adapter)
    }

    fn open(settings: Neo4jSettings) -> BenchResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BenchError::Connection(format!("tokio runtime: {}", e)))?;

        let config = ConfigBuilder::default()
            .uri(settings.uri.as_str())
            .user(settings.user.as_str())
            .password(settings.password.as_str())
            .db(settings.database.as_str())
            .max_connections(1)
            .build()
            .map_err(|e| BenchError::Config(format!("invalid Neo4j settings: {}", e)))?;

        let graph = runtime.block_on(async {
            let graph = Graph::connect(config).await?;
            graph.run(query("RETURN 1")).await?;
            Ok::<_, neo4rs::Error>(graph)
        });
        let graph = graph.map_err(|e| BenchError::Connection(format!("Neo4j connect: {}", e)))?;

        Ok(Self {
            settings,
            runtime,
            graph: Some(graph),
        })
    }

    fn graph(&self) -> BenchResult<&Graph> {
        self.graph
            .as_ref()
            .ok_or_else(|| BenchError::Database("Neo4j handle is closed".into()))
    }

    /// Run `q` and collect column `column` of every row.
    fn fetch_i64(&self, q: Query, column: &str) -> BenchResult<Vec<i64>> {
        let graph = self.graph()?;
        self.runtime.block_on(async {
            let mut stream = graph.execute(q).await.map_err(neo_err("execute"))?;
            let mut out = Vec::new();
            while let Some(row) = stream.next().await.map_err(neo_err("fetch row"))? {
                let value: i64 = row
                    .get(column)
                    .map_err(|e| BenchError::Database(format!("column {}: {}", column, e)))?;
                out.push(value);
            }
            Ok(out)
        })
    }

    /// Run `q` and collect every row.
    fn drain(&self, q: Query) -> BenchResult<Vec<neo4rs::Row>> {
        let graph = self.graph()?;
        self.runtime.block_on(async {
            let mut stream = graph.execute(q).await.map_err(neo_err("execute"))?;
            let mut rows = Vec::new();
            while let Some(row) = stream.next().await.map_err(neo_err("fetch row"))? {
                rows.push(row);
            }
            Ok(rows)
        })
    }

    fn run(&self, q: Query, context: &'static str) -> BenchResult<()> {
        let graph = self.graph()?;
        self.runtime.block_on(graph.run(q)).map_err(neo_err(context))
    }

    fn single_count(&self, q: Query) -> BenchResult<usize> {
        let counts = self.fetch_i64(q, "c")?;
        Ok(counts.first().copied().unwrap_or(0) as usize)
    }
}

impl GraphBackend for Neo4jAdapter {
    fn name(&self) -> &str {
        "Neo4j"
    }

    fn clone_for_thread(&self) -> BenchResult<Box<dyn GraphBackend>> {
        Ok(Box::new(Self::open(self.settings.clone())?))
    }

    fn close(&mut self) -> BenchResult<()> {
        // Dropping the graph closes its pooled connection.
        self.graph.take();
        Ok(())
    }

    fn sample_start_ids(&mut self, limit: usize) -> BenchResult<Vec<i64>> {
        self.fetch_i64(query(SAMPLE_START_IDS).param("limit", limit as i64), "id")
    }

    fn sample_node_ids(&mut self, limit: usize) -> BenchResult<Vec<i64>> {
        self.fetch_i64(query(SAMPLE_NODE_IDS).param("limit", limit as i64), "id")
    }

    fn friends_of_friends(&mut self, start: i64, depth: u32) -> BenchResult<usize> {
        let q = query(&friends_of_friends_cypher(depth)).param("start", start);
        self.single_count(q)
    }

    fn reciprocal(&mut self, u: i64, v: i64) -> BenchResult<bool> {
        let rows = self.drain(query(RECIPROCAL).param("u", u).param("v", v))?;
        match rows.first() {
            Some(row) => row
                .get::<bool>("reciprocal")
                .map_err(|e| BenchError::Database(format!("column reciprocal: {}", e))),
            None => Ok(false),
        }
    }

    fn shortest_path(&mut self, from: i64, to: i64, max_depth: u32) -> BenchResult<Option<u32>> {
        let q = query(&shortest_path_cypher(max_depth))
            .param("u", from)
            .param("v", to);
        // shortestPath() rejects identical endpoints, so u == v matches no rows.
        let dists = self.fetch_i64(q, "dist")?;
        if from == to {
            return Ok(Some(0));
        }
        Ok(dists.into_iter().min().map(|d| d as u32))
    }

    fn filtered_neighbours(&mut self, start: i64, band: AgeBand) -> BenchResult<usize> {
        let q = query(FILTERED)
            .param("start", start)
            .param("above", band.above as i64)
            .param("below", band.below as i64);
        self.single_count(q)
    }

    fn wipe(&mut self) -> BenchResult<()> {
        // Batched so large graphs do not blow the transaction memory limit.
        loop {
            let q = query(WIPE_BATCH).param("batch", DEFAULT_BATCH_SIZE as i64);
            let deleted = self.fetch_i64(q, "deleted")?;
            let deleted = deleted.first().copied().unwrap_or(0);
            tracing::debug!(deleted, "wipe batch");
            if deleted == 0 {
                break;
            }
        }
        self.run(query(CREATE_INDEX), "create index")
    }

    fn insert_nodes(&mut self, nodes: &[NodeRecord]) -> BenchResult<()> {
        if nodes.is_empty() {
            return Ok(());
        }
        let column = |f: fn(&NodeRecord) -> BoltType| -> Vec<BoltType> {
            nodes.iter().map(f).collect()
        };

        let q = query(INSERT_NODES)
            .param("ids", nodes.iter().map(|n| n.id).collect::<Vec<i64>>())
            .param("public", column(|n| nullable(n.public.map(i64::from))))
            .param("completion", column(|n| nullable(n.completion_pct.map(i64::from))))
            .param("gender", column(|n| nullable(n.gender.map(i64::from))))
            .param("region", column(|n| nullable(n.region.clone())))
            .param("last_login", column(|n| nullable(n.last_login.clone())))
            .param("registration", column(|n| nullable(n.registration.clone())))
            .param("age", column(|n| nullable(n.age.map(i64::from))))
            .param("education", column(|n| nullable(n.education.clone())))
            .param("smoking", column(|n| nullable(n.smoking.clone())))
            .param("alcohol", column(|n| nullable(n.alcohol.clone())));
        self.run(q, "insert nodes")
    }

    fn insert_edges(&mut self, edges: &[(i64, i64)]) -> BenchResult<()> {
        if edges.is_empty() {
            return Ok(());
        }
        let (starts, ends): (Vec<i64>, Vec<i64>) = edges.iter().copied().unzip();
        let q = query(INSERT_EDGES).param("starts", starts).param("ends", ends);
        self.run(q, "insert edges")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_is_interpolated_into_pattern() {
        let fof = friends_of_friends_cypher(3);
        assert!(fof.contains("[:FRIENDS_WITH*3]->"));
        assert!(fof.contains("{id: $start}"));

        let sp = shortest_path_cypher(5);
        assert!(sp.contains("[:FRIENDS_WITH*..5]->"));
        assert!(sp.contains("u <> v"));
    }

    #[test]
    fn missing_values_become_null() {
        assert!(matches!(nullable::<i64>(None), BoltType::Null(_)));
        assert!(matches!(nullable(Some(21_i64)), BoltType::Integer(_)));
        assert!(matches!(nullable(Some("x".to_string())), BoltType::String(_)));
    }
}
