//! kpi - Channel KPI queries from the command line
//!
//! # Usage
//!
//! ```bash
//! # Run a query group against a local data directory
//! kpi query queries/google_daily.json --data data/
//! kpi query queries/google_daily.json --config configs/kpi.toml --format json
//!
//! # Run an older channel_v1 query group
//! kpi query queries/legacy.json --legacy --data data/
//!
//! # Print the canonical form of a channel_v1 query group
//! kpi transform queries/legacy.json
//!
//! # List queryable channels
//! kpi channels
//!
//! # List the values a property can be filtered on
//! kpi filter-values google_ads_metrics campaign name --data data/
//! ```

mod cmd;

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kpi_engine::Config;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// kpi - Channel KPI query engine
#[derive(Parser, Debug)]
#[command(name = "kpi")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a query group file
    Query(cmd::query::QueryArgs),

    /// Translate a channel_v1 query group into the canonical format
    Transform(cmd::transform::TransformArgs),

    /// List queryable channels, dimensions and metrics
    Channels(cmd::channels::ChannelsArgs),

    /// List the distinct values of a property for filters
    FilterValues(cmd::filter_values::FilterValuesArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Query(mut args) => {
            // CLI global --config fills in the subcommand config
            if args.config.is_none() {
                args.config = cli.config;
            }
            let log_level = resolve_log_level(cli.log_level.as_deref(), args.config.as_deref());
            init_logging(&log_level)?;
            cmd::query::run(args).await
        }
        Command::Transform(args) => {
            // Transform doesn't need logging - just outputs to stdout
            cmd::transform::run(args)
        }
        Command::Channels(args) => cmd::channels::run(args),
        Command::FilterValues(mut args) => {
            if args.config.is_none() {
                args.config = cli.config;
            }
            let log_level = resolve_log_level(cli.log_level.as_deref(), args.config.as_deref());
            init_logging(&log_level)?;
            cmd::filter_values::run(args).await
        }
    }
}

/// Resolve log level: CLI flag > config file > default "info"
fn resolve_log_level(cli_level: Option<&str>, config_path: Option<&Path>) -> String {
    if let Some(level) = cli_level {
        return level.to_string();
    }

    if let Some(path) = config_path
        && path.exists()
        && let Ok(config) = Config::from_file(path)
    {
        return config.log.level.as_str().to_string();
    }

    "info".to_string()
}

/// Initialize the tracing subscriber for logging
///
/// Logs go to stderr so query output on stdout stays parseable.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();

    Ok(())
}
