//! Connection settings for the backends under test.
//!
//! Credentials come from the environment (`PG_URI`, `PG_USER`, `PG_PASS`,
//! `NEO4J_URI`, `NEO4J_USER`, `NEO4J_PASS`, `NEO4J_DB`) and, optionally, a
//! TOML file:
//!
//! ```toml
//! [postgres]
//! uri = "postgresql://localhost:5432/graph"
//! user = "bench"
//! password = "bench"
//!
//! [neo4j]
//! uri = "bolt://localhost:7687"
//! user = "neo4j"
//! password = "benchmarkpassword"
//! database = "neo4j"
//! ```
//!
//! Values from the file take precedence; the environment fills the gaps.
//! Only the settings for the selected backend are required.

use crate::{Backend, BenchError, BenchResult};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

pub const DEFAULT_NEO4J_DATABASE: &str = "neo4j";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresSection {
    pub uri: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Neo4jSection {
    pub uri: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

/// Partially-filled connection settings for both backends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub postgres: PostgresSection,
    #[serde(default)]
    pub neo4j: Neo4jSection,
}

/// Resolved PostgreSQL credentials.
#[derive(Clone)]
pub struct PostgresSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
}

/// Resolved Neo4j credentials.
#[derive(Clone)]
pub struct Neo4jSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl fmt::Debug for PostgresSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresSettings")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for Neo4jSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Neo4jSettings")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

impl ConnectionConfig {
    /// Load settings from a TOML file.
    pub fn load_toml(path: &Path) -> BenchResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BenchError::Config(format!("failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> BenchResult<Self> {
        toml::from_str(content)
            .map_err(|e| BenchError::Config(format!("failed to parse config TOML: {}", e)))
    }

    /// Fill unset fields from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Fill unset fields from `lookup`, keyed by environment variable name.
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn fill(slot: &mut Option<String>, value: Option<String>) {
            if slot.is_none() {
                *slot = value.filter(|v| !v.is_empty());
            }
        }

        fill(&mut self.postgres.uri, lookup("PG_URI"));
        fill(&mut self.postgres.user, lookup("PG_USER"));
        fill(&mut self.postgres.password, lookup("PG_PASS"));
        fill(&mut self.neo4j.uri, lookup("NEO4J_URI"));
        fill(&mut self.neo4j.user, lookup("NEO4J_USER"));
        fill(&mut self.neo4j.password, lookup("NEO4J_PASS"));
        fill(&mut self.neo4j.database, lookup("NEO4J_DB"));
        self
    }

    /// Fails with a configuration error unless `backend` has complete credentials.
    pub fn require(&self, backend: Backend) -> BenchResult<()> {
        match backend {
            Backend::Postgres => self.postgres().map(|_| ()),
            Backend::Neo4j => self.neo4j().map(|_| ()),
        }
    }

    pub fn postgres(&self) -> BenchResult<PostgresSettings> {
        let pg = &self.postgres;
        match (&pg.uri, &pg.user, &pg.password) {
            (Some(uri), Some(user), Some(password)) => Ok(PostgresSettings {
                uri: uri.clone(),
                user: user.clone(),
                password: password.clone(),
            }),
            _ => Err(missing([
                ("PG_URI", pg.uri.is_none()),
                ("PG_USER", pg.user.is_none()),
                ("PG_PASS", pg.password.is_none()),
            ])),
        }
    }

    pub fn neo4j(&self) -> BenchResult<Neo4jSettings> {
        let neo = &self.neo4j;
        match (&neo.uri, &neo.user, &neo.password) {
            (Some(uri), Some(user), Some(password)) => Ok(Neo4jSettings {
                uri: uri.clone(),
                user: user.clone(),
                password: password.clone(),
                database: neo
                    .database
                    .clone()
                    .unwrap_or_else(|| DEFAULT_NEO4J_DATABASE.to_string()),
            }),
            _ => Err(missing([
                ("NEO4J_URI", neo.uri.is_none()),
                ("NEO4J_USER", neo.user.is_none()),
                ("NEO4J_PASS", neo.password.is_none()),
            ])),
        }
    }
}

fn missing<const N: usize>(vars: [(&str, bool); N]) -> BenchError {
    let names: Vec<&str> = vars
        .iter()
        .filter(|(_, is_missing)| *is_missing)
        .map(|(name, _)| *name)
        .collect();
    BenchError::Config(format!("environment variables missing: {}", names.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn env_supplies_postgres_credentials() {
        let cfg = ConnectionConfig::default().with_env_from(env(&[
            ("PG_URI", "postgresql://db:5432/graph"),
            ("PG_USER", "bench"),
            ("PG_PASS", "secret"),
        ]));
        let pg = cfg.postgres().unwrap();
        assert_eq!(pg.uri, "postgresql://db:5432/graph");
        assert_eq!(pg.user, "bench");
        assert!(cfg.require(Backend::Postgres).is_ok());
        assert!(cfg.require(Backend::Neo4j).is_err());
    }

    #[test]
    fn missing_variables_are_named() {
        let cfg = ConnectionConfig::default().with_env_from(env(&[("NEO4J_URI", "bolt://x")]));
        let err = cfg.neo4j().unwrap_err().to_string();
        assert!(err.contains("NEO4J_USER"));
        assert!(err.contains("NEO4J_PASS"));
        assert!(!err.contains("NEO4J_URI"));
    }

    #[test]
    fn file_values_win_over_environment() {
        let cfg = ConnectionConfig::from_toml_str(
            r#"
            [neo4j]
            uri = "bolt://file:7687"
            user = "neo4j"
            "#,
        )
        .unwrap()
        .with_env_from(env(&[
            ("NEO4J_URI", "bolt://env:7687"),
            ("NEO4J_PASS", "from-env"),
        ]));

        let neo = cfg.neo4j().unwrap();
        assert_eq!(neo.uri, "bolt://file:7687");
        assert_eq!(neo.password, "from-env");
        assert_eq!(neo.database, DEFAULT_NEO4J_DATABASE);
    }

    #[test]
    fn empty_environment_values_count_as_unset() {
        let cfg = ConnectionConfig::default().with_env_from(env(&[
            ("PG_URI", ""),
            ("PG_USER", "u"),
            ("PG_PASS", "p"),
        ]));
        assert!(cfg.postgres().is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ConnectionConfig::from_toml_str("[mysql]\nuri = \"x\"\n").unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
    }

    #[test]
    fn debug_output_hides_password() {
        let settings = PostgresSettings {
            uri: "postgresql://h/db".into(),
            user: "u".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", settings).contains("hunter2"));
    }
}
