//! CLI command definitions and handlers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use threatsync_core::Config;
use threatsync_graph::{GraphClient, GraphSource, MemoryGraph, Neo4jSource};
use tracing::warn;

pub mod db;
pub mod migrate;
pub mod validate;

/// threatsync - threat intelligence graph to relational migration
#[derive(Parser)]
#[command(name = "threatsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to ./threatsync.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a migration
    #[command(subcommand)]
    Migrate(migrate::MigrateCommands),

    /// Destination and graph schema management
    #[command(subcommand)]
    Db(db::DbCommands),

    /// Check the destination against the graph
    Validate(validate::ValidateArgs),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = Config::load(self.config.as_deref()).context("Failed to load configuration")?;

        match self.command {
            Commands::Migrate(cmd) => migrate::execute(cmd, config).await,
            Commands::Db(cmd) => db::execute(cmd, &config).await,
            Commands::Validate(args) => validate::execute(args, &config).await,
        }
    }
}

/// Open the graph source: a snapshot file when given, Neo4j otherwise.
pub(crate) async fn open_source(config: &Config, snapshot: Option<&Path>) -> Result<Box<dyn GraphSource>> {
    match snapshot {
        Some(path) => {
            let graph = MemoryGraph::from_json_file(path)
                .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
            Ok(Box::new(graph))
        }
        None => {
            let client = GraphClient::connect(&config.graph)
                .await
                .with_context(|| format!("Failed to connect to Neo4j at {}", config.graph.uri))?;
            Ok(Box::new(Neo4jSource::new(client)))
        }
    }
}

/// Like [`open_source`], but an unreachable Neo4j server is not an error.
pub(crate) async fn try_open_source(config: &Config, snapshot: Option<&Path>) -> Result<Option<Box<dyn GraphSource>>> {
    if snapshot.is_some() {
        return open_source(config, snapshot).await.map(Some);
    }
    match open_source(config, None).await {
        Ok(source) => Ok(Some(source)),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "Graph unavailable; continuing without it");
            Ok(None)
        }
    }
}
