//! Destination and graph schema commands.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use threatsync_core::Config;
use threatsync_graph::GraphClient;

use crate::output;

#[derive(Subcommand)]
pub enum DbCommands {
    /// Create the SQLite schema and the Neo4j constraints
    Init {
        /// Only initialize SQLite
        #[arg(long)]
        skip_graph: bool,
    },

    /// Show row counts for SQLite and the graph
    Status,
}

pub async fn execute(cmd: DbCommands, config: &Config) -> Result<()> {
    match cmd {
        DbCommands::Init { skip_graph } => cmd_init(config, skip_graph).await,
        DbCommands::Status => cmd_status(config).await,
    }
}

async fn cmd_init(config: &Config, skip_graph: bool) -> Result<()> {
    let path = &config.sqlite.path;
    threatsync_db::init_pool(path).with_context(|| format!("Failed to initialize {}", path.display()))?;
    println!("{} SQLite schema ready at {}", "✓".green(), path.display().to_string().cyan());

    if skip_graph {
        return Ok(());
    }

    let client = GraphClient::connect(&config.graph)
        .await
        .with_context(|| format!("Failed to connect to Neo4j at {}", config.graph.uri))?;
    threatsync_graph::schema::initialize_schema(&client)
        .await
        .context("Failed to initialize Neo4j schema")?;
    println!(
        "{} Neo4j constraints and indexes ready at {}",
        "✓".green(),
        config.graph.uri.cyan()
    );
    Ok(())
}

async fn cmd_status(config: &Config) -> Result<()> {
    let path = &config.sqlite.path;
    let db = threatsync_db::init_pool(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let counts = threatsync_db::queries::entities::table_counts(&db)?;

    println!("{} {}", "SQLite".bold(), path.display().to_string().dimmed());
    output::print_table_counts(&counts);
    println!();

    println!("{} {}", "Neo4j".bold(), config.graph.uri.dimmed());
    match GraphClient::connect(&config.graph).await {
        Ok(client) => {
            let counts = client.get_counts().await?;
            println!("  Nodes:         {}", counts.nodes.to_string().cyan());
            println!("  Relationships: {}", counts.relationships.to_string().cyan());
        }
        Err(e) => println!("  {} {}", "unreachable:".yellow(), e.to_string().dimmed()),
    }
    Ok(())
}
