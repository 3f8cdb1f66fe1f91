//! PostgreSQL adapter (via the synchronous `postgres` client).
//!
//! Graph layout: `nodes(id BIGINT PRIMARY KEY, ...)` with profile attributes
//! and `edges(start_id BIGINT, end_id BIGINT)` indexed on `start_id`.
//! Traversals are recursive CTEs that expand one hop per iteration.

use crate::adapters::{AgeBand, GraphBackend, NodeRecord};
use crate::config::PostgresSettings;
use crate::{BenchError, BenchResult};
use postgres::{Client, Config, NoTls};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS nodes (
        id             BIGINT PRIMARY KEY,
        public         INTEGER,
        completion_pct INTEGER,
        gender         INTEGER,
        region         TEXT,
        last_login     TEXT,
        registration   TEXT,
        age            INTEGER,
        education      TEXT,
        smoking        TEXT,
        alcohol        TEXT
    );
    CREATE TABLE IF NOT EXISTS edges (
        start_id BIGINT NOT NULL,
        end_id   BIGINT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_edges_start ON edges(start_id);
    CREATE INDEX IF NOT EXISTS idx_edges_end   ON edges(end_id);
    CREATE INDEX IF NOT EXISTS idx_nodes_age   ON nodes(age);";

const SAMPLE_START_IDS: &str = "
    SELECT start_id FROM (SELECT DISTINCT start_id FROM edges) AS s
    ORDER BY random() LIMIT $1";

const SAMPLE_NODE_IDS: &str = "SELECT id FROM nodes ORDER BY random() LIMIT $1";

const FRIENDS_OF_FRIENDS: &str = "
    WITH RECURSIVE bfs AS (
        SELECT 0 AS depth, $1::BIGINT AS node_id
        UNION ALL
        SELECT bfs.depth + 1, e.end_id
        FROM bfs
        JOIN edges e ON e.start_id = bfs.node_id
        WHERE bfs.depth < $2::INT
    )
    SELECT COUNT(DISTINCT node_id) AS fof_count
    FROM bfs
    WHERE depth = $2::INT";

const RECIPROCAL: &str = "
    SELECT
        EXISTS (SELECT 1 FROM edges WHERE start_id = $1 AND end_id = $2) AS forward_exists,
        EXISTS (SELECT 1 FROM edges WHERE start_id = $2 AND end_id = $1) AS backward_exists";

const SHORTEST_PATH: &str = "
    WITH RECURSIVE bfs AS (
        SELECT 0 AS depth, $1::BIGINT AS node_id
        UNION ALL
        SELECT bfs.depth + 1, e.end_id
        FROM bfs
        JOIN edges e ON e.start_id = bfs.node_id
        WHERE bfs.depth < $2::INT
    )
    SELECT MIN(depth) AS dist
    FROM bfs
    WHERE node_id = $3::BIGINT";

const FILTERED: &str = "
    SELECT COUNT(DISTINCT n.id)
    FROM edges e
    JOIN nodes n ON n.id = e.end_id
    WHERE e.start_id = $1
      AND n.age > $2
      AND n.age < $3";

const INSERT_NODE: &str = "
    INSERT INTO nodes (
        id, public, completion_pct, gender, region, last_login,
        registration, age, education, smoking, alcohol
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (id) DO NOTHING";

const INSERT_EDGE: &str = "INSERT INTO edges (start_id, end_id) VALUES ($1, $2)";

/// Accepts both `postgresql://…` URLs and JDBC-style `jdbc:postgresql://…`.
pub fn normalize_uri(uri: &str) -> &str {
    uri.strip_prefix("jdbc:").unwrap_or(uri)
}

fn db_err(context: &str) -> impl Fn(postgres::Error) -> BenchError + '_ {
    move |e| BenchError::Database(format!("{}: {}", context, e))
}

pub struct PostgresAdapter {
    config: Config,
    client: Option<Client>,
}

impl PostgresAdapter {
    /// Connect and verify the server answers.
    pub fn connect(settings: &PostgresSettings) -> BenchResult<Self> {
        let mut config: Config = normalize_uri(&settings.uri)
            .parse()
            .map_err(|e| BenchError::Config(format!("invalid PG_URI: {}", e)))?;
        config.user(&settings.user);
        config.password(&settings.password);

        let adapter = Self::open(config)?;
        tracing::info!(uri = %settings.uri, "PostgreSQL connection established");
        Ok(adapter)
    }

    fn open(config: Config) -> BenchResult<Self> {
        let mut client = config
            .connect(NoTls)
            .map_err(|e| BenchError::Connection(format!("PostgreSQL connect: {}", e)))?;
        client
            .simple_query("SELECT 1")
            .map_err(|e| BenchError::Connection(format!("PostgreSQL verify: {}", e)))?;
        Ok(Self {
            config,
            client: Some(client),
        })
    }

    fn client(&mut self) -> BenchResult<&mut Client> {
        self.client
            .as_mut()
            .ok_or_else(|| BenchError::Database("PostgreSQL handle is closed".into()))
    }

    fn sample(&mut self, sql: &str, limit: usize) -> BenchResult<Vec<i64>> {
        let rows = self
            .client()?
            .query(sql, &[&(limit as i64)])
            .map_err(db_err("sample ids"))?;
        rows.iter()
            .map(|row| row.try_get::<_, i64>(0).map_err(db_err("sample row")))
            .collect()
    }
}

impl GraphBackend for PostgresAdapter {
    fn name(&self) -> &str {
        "PostgreSQL"
    }

    fn clone_for_thread(&self) -> BenchResult<Box<dyn GraphBackend>> {
        Ok(Box::new(Self::open(self.config.clone())?))
    }

    fn close(&mut self) -> BenchResult<()> {
        match self.client.take() {
            Some(client) => client
                .close()
                .map_err(|e| BenchError::Connection(format!("PostgreSQL close: {}", e))),
            None => Ok(()),
        }
    }

    // ── sampling ──

    fn sample_start_ids(&mut self, limit: usize) -> BenchResult<Vec<i64>> {
        self.sample(SAMPLE_START_IDS, limit)
    }

    fn sample_node_ids(&mut self, limit: usize) -> BenchResult<Vec<i64>> {
        self.sample(SAMPLE_NODE_IDS, limit)
    }

    // ── timed queries ──

    fn friends_of_friends(&mut self, start: i64, depth: u32) -> BenchResult<usize> {
        let depth = depth as i32;
        let row = self
            .client()?
            .query_one(FRIENDS_OF_FRIENDS, &[&start, &depth])
            .map_err(db_err("friends of friends"))?;
        let count: i64 = row.try_get(0).map_err(db_err("fof_count"))?;
        Ok(count as usize)
    }

    fn reciprocal(&mut self, u: i64, v: i64) -> BenchResult<bool> {
        let row = self
            .client()?
            .query_one(RECIPROCAL, &[&u, &v])
            .map_err(db_err("reciprocal"))?;
        let forward: bool = row.try_get(0).map_err(db_err("forward_exists"))?;
        let backward: bool = row.try_get(1).map_err(db_err("backward_exists"))?;
        Ok(forward && backward)
    }

    fn shortest_path(&mut self, from: i64, to: i64, max_depth: u32) -> BenchResult<Option<u32>> {
        let max_depth = max_depth as i32;
        let row = self
            .client()?
            .query_one(SHORTEST_PATH, &[&from, &max_depth, &to])
            .map_err(db_err("shortest path"))?;
        let dist: Option<i32> = row.try_get(0).map_err(db_err("dist"))?;
        Ok(dist.map(|d| d as u32))
    }

    fn filtered_neighbours(&mut self, start: i64, band: AgeBand) -> BenchResult<usize> {
        let row = self
            .client()?
            .query_one(FILTERED, &[&start, &band.above, &band.below])
            .map_err(db_err("filtered neighbours"))?;
        let count: i64 = row.try_get(0).map_err(db_err("filtered count"))?;
        Ok(count as usize)
    }

    // ── bulk ingest ──

    fn wipe(&mut self) -> BenchResult<()> {
        let client = self.client()?;
        client.batch_execute(SCHEMA).map_err(db_err("create schema"))?;
        client
            .batch_execute("TRUNCATE TABLE edges; TRUNCATE TABLE nodes;")
            .map_err(db_err("truncate"))?;
        Ok(())
    }

    fn insert_nodes(&mut self, nodes: &[NodeRecord]) -> BenchResult<()> {
        let mut tx = self.client()?.transaction().map_err(db_err("begin"))?;
        let stmt = tx.prepare(INSERT_NODE).map_err(db_err("prepare nodes"))?;
        for n in nodes {
            tx.execute(
                &stmt,
                &[
                    &n.id,
                    &n.public,
                    &n.completion_pct,
                    &n.gender,
                    &n.region,
                    &n.last_login,
                    &n.registration,
                    &n.age,
                    &n.education,
                    &n.smoking,
                    &n.alcohol,
                ],
            )
            .map_err(db_err("insert node"))?;
        }
        tx.commit().map_err(db_err("commit nodes"))
    }

    fn insert_edges(&mut self, edges: &[(i64, i64)]) -> BenchResult<()> {
        let mut tx = self.client()?.transaction().map_err(db_err("begin"))?;
        let stmt = tx.prepare(INSERT_EDGE).map_err(db_err("prepare edges"))?;
        for &(start, end) in edges {
            tx.execute(&stmt, &[&start, &end])
                .map_err(db_err("insert edge"))?;
        }
        tx.commit().map_err(db_err("commit edges"))
    }
}
