//! threatsync CLI
//!
//! Moves threat intelligence from a Neo4j property graph into SQLite and
//! checks the result.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;
mod progress;

use commands::Cli;

/// Initialize tracing: stderr always, plus a plain-text file when `log_file`
/// is given. The returned guard flushes the file writer on drop.
fn init_tracing(log_file: Option<&std::path::Path>, verbose: bool) -> Result<Option<WorkerGuard>> {
    let default_filter = if verbose {
        "threatsync=debug,threatsync_etl=debug"
    } else {
        "threatsync=info,threatsync_etl=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if let Some(path) = log_file {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => std::path::Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let file_name = path
            .file_name()
            .with_context(|| format!("Log file path has no file name: {}", path.display()))?;

        let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref(), cli.verbose)?;

    cli.execute().await
}
