//! Standalone validation.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use threatsync_core::{Config, CountParity, EntityKind};

use crate::output;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Compare counts against a JSON snapshot instead of Neo4j
    #[arg(long, value_name = "FILE")]
    pub from_snapshot: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: ValidateArgs, config: &Config) -> Result<()> {
    let path = &config.sqlite.path;
    let db = threatsync_db::init_pool(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let source = super::try_open_source(config, args.from_snapshot.as_deref()).await?;

    let parity_kinds = match config.migration.count_parity {
        CountParity::All => EntityKind::ALL.to_vec(),
        CountParity::ThreatActors => vec![EntityKind::ThreatActor],
    };
    let report = threatsync_etl::validate(&db, source.as_deref(), &parity_kinds)
        .await
        .context("Validation failed to run")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_validation_report(&report);
    }
    Ok(())
}
