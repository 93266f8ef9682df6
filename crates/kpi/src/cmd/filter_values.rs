//! Filter-values command - List the values a property can be filtered on
//!
//! # Usage
//!
//! ```bash
//! kpi filter-values google_ads_metrics campaign name --data data/
//! kpi filter-values all_channels_metrics channel name --format json
//! kpi filter-values google_ads_metrics campaign campaign_region --from 2021-02-01 --to 2021-02-28
//! ```
//!
//! Without `--from`/`--to` the engine's `filter_values_lookback_days`
//! window ending today is scanned.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use kpi_engine::ResultTable;
use kpi_engine::query::property_header;
use kpi_store::DateRange;
use serde_json::Value;

use super::query::{OutputFormat, open_engine, output_tables};

/// Filter-values command arguments
#[derive(Args, Debug)]
pub struct FilterValuesArgs {
    /// Display category (e.g. google_ads_metrics)
    #[arg(value_name = "DISPLAY_CATEGORY")]
    display_category: String,

    /// Object type (e.g. campaign, channel)
    #[arg(value_name = "OBJECT_TYPE")]
    object_type: String,

    /// Property name (e.g. name, campaign_region)
    #[arg(value_name = "PROPERTY")]
    property: String,

    /// Project to query
    #[arg(short, long, default_value_t = 1)]
    project: u64,

    /// Local data directory (overrides [store])
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// First day scanned (YYYY-MM-DD)
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,

    /// Last day scanned (YYYY-MM-DD)
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,

    /// Output format (table, json, csv)
    #[arg(short, long, default_value = "table")]
    format: String,

    /// Config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Run the filter-values command
pub async fn run(args: FilterValuesArgs) -> Result<()> {
    let format: OutputFormat = args
        .format
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid format: {}", e))?;

    let engine = open_engine(args.config.as_deref(), args.data.as_deref())?;

    let values = match (args.from, args.to) {
        (Some(from), Some(to)) => {
            engine
                .filter_values_in(
                    args.project,
                    &args.display_category,
                    &args.object_type,
                    &args.property,
                    DateRange::new(from, to),
                )
                .await
        }
        _ => {
            engine
                .filter_values(
                    args.project,
                    &args.display_category,
                    &args.object_type,
                    &args.property,
                )
                .await
        }
    }
    .context("failed to list filter values")?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&values)?);
        return Ok(());
    }

    let table = values_table(&args.object_type, &args.property, values);
    output_tables(std::slice::from_ref(&table), format)
}

/// One-column table of values headed by the property
fn values_table(object_type: &str, property: &str, values: Vec<String>) -> ResultTable {
    ResultTable {
        headers: vec![property_header(object_type, property)],
        rows: values.into_iter().map(|v| vec![Value::String(v)]).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_values_table() {
        let table = values_table(
            "campaign",
            "campaign_region",
            vec!["EU".to_string(), "NA".to_string()],
        );
        assert_eq!(table.headers, vec!["campaign_region"]);
        assert_eq!(table.rows, vec![vec![json!("EU")], vec![json!("NA")]]);

        let table = values_table("channel", "name", Vec::new());
        assert_eq!(table.headers, vec!["channel_name"]);
        assert!(table.is_empty());
    }
}
