//! Transform command - Translate channel_v1 query groups
//!
//! # Usage
//!
//! ```bash
//! kpi transform legacy.json
//! kpi transform legacy.json --compact
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use kpi_engine::{ChannelGroupQueryV1, transform_legacy_query};

/// Transform command arguments
#[derive(Args, Debug)]
pub struct TransformArgs {
    /// channel_v1 query group file (JSON)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Print on a single line
    #[arg(long)]
    compact: bool,
}

/// Run the transform command
pub fn run(args: TransformArgs) -> Result<()> {
    let contents = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read query file: {}", args.file.display()))?;
    let legacy: ChannelGroupQueryV1 =
        serde_json::from_str(&contents).context("failed to parse channel_v1 query group")?;

    let group = transform_legacy_query(&legacy)?;

    let json = if args.compact {
        serde_json::to_string(&group)?
    } else {
        serde_json::to_string_pretty(&group)?
    };
    println!("{}", json);
    Ok(())
}
