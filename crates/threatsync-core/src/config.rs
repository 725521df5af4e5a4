//! Layered configuration: defaults, TOML file, `.env`, environment.
//!
//! ```toml
//! [graph]
//! uri = "bolt://localhost:7687"
//! user = "neo4j"
//! password = "secret"
//!
//! [sqlite]
//! path = "data/threat_intel.db"
//!
//! [migration]
//! batch_size = 1000
//! validate = true
//! count_parity = "all"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "threatsync.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub graph: GraphConfig,
    pub sqlite: SqliteConfig,
    pub migration: MigrationConfig,
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: usize,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "threatsync_dev".to_string(),
            database: "neo4j".to_string(),
            max_connections: 4,
            fetch_size: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    pub path: PathBuf,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/threat_intel.db"),
        }
    }
}

/// Which entity kinds get a source/destination count-parity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountParity {
    /// Every entity kind the run migrated.
    #[default]
    All,
    /// Threat actors only.
    ThreatActors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub batch_size: usize,
    pub validate: bool,
    pub strict_stix_ids: bool,
    pub count_parity: CountParity,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            validate: true,
            strict_stix_ids: false,
            count_parity: CountParity::All,
        }
    }
}

/// A missing `.env` is not an error; anything else is.
fn env_file_outcome(result: dotenv::Result<PathBuf>) -> dotenv::Result<Option<PathBuf>> {
    match result {
        Ok(path) => {
            debug!(path = %path.display(), "Loaded .env file");
            Ok(Some(path))
        }
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, `threatsync.toml` in the
    /// working directory is used when present. `.env` and process environment
    /// variables are applied last.
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        if let Err(e) = env_file_outcome(dotenv::dotenv()) {
            warn!(error = %e, "Ignoring malformed .env file");
        }
        config.apply_env(|key| std::env::var(key).ok());
        config.check()?;
        Ok(config)
    }

    /// Parse a TOML file.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(toml::from_str(&raw)?)
    }

    /// Override settings from environment variables.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SQLITE_DB_PATH") {
            self.sqlite.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("NEO4J_URI") {
            self.graph.uri = v;
        }
        if let Some(v) = lookup("NEO4J_USER") {
            self.graph.user = v;
        }
        if let Some(v) = lookup("NEO4J_PASSWORD") {
            self.graph.password = v;
        }
        if let Some(v) = lookup("NEO4J_DATABASE") {
            self.graph.database = v;
        }
    }

    /// Reject settings the migration cannot run with.
    pub fn check(&self) -> CoreResult<()> {
        if self.migration.batch_size == 0 {
            return Err(CoreError::config("migration.batch_size must be greater than zero"));
        }
        if self.graph.max_connections == 0 {
            return Err(CoreError::config("graph.max_connections must be greater than zero"));
        }
        Ok(())
    }
}
