//! Migration commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use threatsync_core::Config;
use threatsync_etl::{MigrationOptions, MigrationScope, NoProgress, Orchestrator, Progress};

use crate::output;
use crate::progress::BarProgress;

#[derive(Subcommand)]
pub enum MigrateCommands {
    /// Copy entities and relationships from Neo4j into SQLite
    Neo4jToSqlite(MigrateArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Only {
    ThreatActors,
    Malware,
    AttackPatterns,
    All,
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Validate after migrating (default from config)
    #[arg(long, overrides_with = "no_validate")]
    pub validate: bool,

    /// Skip validation
    #[arg(long, overrides_with = "validate")]
    pub no_validate: bool,

    /// Restrict the run to one entity kind
    #[arg(long, value_enum, default_value = "all")]
    pub only: Only,

    /// Rows per progress batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Read from a JSON snapshot instead of Neo4j
    #[arg(long, value_name = "FILE")]
    pub from_snapshot: Option<PathBuf>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

impl MigrateArgs {
    /// `Some` when either flag was given.
    pub fn validate_flag(&self) -> Option<bool> {
        if self.validate {
            Some(true)
        } else if self.no_validate {
            Some(false)
        } else {
            None
        }
    }

    pub fn scope(&self) -> MigrationScope {
        match self.only {
            Only::ThreatActors => MigrationScope::ThreatActors,
            Only::Malware => MigrationScope::Malware,
            Only::AttackPatterns => MigrationScope::AttackPatterns,
            Only::All => MigrationScope::All,
        }
    }
}

pub async fn execute(cmd: MigrateCommands, config: Config) -> Result<()> {
    match cmd {
        MigrateCommands::Neo4jToSqlite(args) => cmd_neo4j_to_sqlite(args, config).await,
    }
}

async fn cmd_neo4j_to_sqlite(args: MigrateArgs, mut config: Config) -> Result<()> {
    if let Some(batch_size) = args.batch_size {
        config.migration.batch_size = batch_size;
    }
    if let Some(validate) = args.validate_flag() {
        config.migration.validate = validate;
    }
    let options = MigrationOptions::from_config(&config.migration, args.scope());

    let db = threatsync_db::init_pool(&config.sqlite.path)
        .with_context(|| format!("Failed to open database {}", config.sqlite.path.display()))?;
    let source = super::open_source(&config, args.from_snapshot.as_deref()).await?;

    if !args.json {
        println!(
            "{} {} {} {}",
            "Migrating".bold(),
            source.describe().cyan(),
            "→".dimmed(),
            config.sqlite.path.display().to_string().cyan()
        );
    }

    let bars;
    let progress: &dyn Progress = if args.json {
        &NoProgress
    } else {
        bars = BarProgress::new()?;
        &bars
    };

    let orchestrator = Orchestrator::new(source.as_ref(), &db).with_progress(progress);
    let stats = orchestrator.run(&options).await.context("Migration failed")?;

    let report = if config.migration.validate {
        Some(orchestrator.validate(&options).await.context("Validation failed to run")?)
    } else {
        None
    };

    if args.json {
        let doc = serde_json::json!({
            "stats": stats,
            "counts": stats.counts(),
            "validation": report,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        output::print_migration_stats(&stats);
        if let Some(report) = &report {
            println!();
            output::print_validation_report(report);
        }
    }

    Ok(())
}
