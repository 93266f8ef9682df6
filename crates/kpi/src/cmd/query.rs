//! Query command - Execute KPI query groups
//!
//! Reads a query group from a JSON file, runs it against the configured
//! document store and prints one table per sub-query.
//!
//! # Usage
//!
//! ```bash
//! kpi query google_daily.json --data data/
//! kpi query google_daily.json --data data/ --project 3 --format json
//! kpi query legacy.json --legacy --format csv
//! ```
//!
//! # Configuration
//!
//! ```toml
//! [engine]
//! query_timeout_ms = 30000
//! default_timezone = "UTC"
//!
//! [store]
//! backend = "local"
//! path = "data/"
//! ```
//!
//! `--data` overrides the configured store with a local directory.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use kpi_engine::{
    ChannelGroupQueryV1, Config, KpiEngine, KpiQueryGroup, ResultTable, legacy_headers,
};
use kpi_store::{StoreConfig, StoreHandles};
use serde_json::Value;

/// Default config file locations, tried in order
const DEFAULT_CONFIG_PATHS: &[&str] = &["configs/kpi.toml", "kpi.toml"];

/// Query command arguments
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Query group file (JSON)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Parse the file as a channel_v1 query group
    #[arg(long)]
    legacy: bool,

    /// Project to query
    #[arg(short, long, default_value_t = 1)]
    project: u64,

    /// Local data directory (overrides [store])
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Request identifier for logs
    #[arg(long, default_value = "cli")]
    request_id: String,

    /// Output format (table, json, csv)
    #[arg(short, long, default_value = "table")]
    format: String,

    /// Config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown format '{}' (use table, json or csv)", other)),
        }
    }
}

/// Run the query command
pub async fn run(args: QueryArgs) -> Result<()> {
    let format: OutputFormat = args
        .format
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid format: {}", e))?;

    let engine = open_engine(args.config.as_deref(), args.data.as_deref())?;

    let contents = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read query file: {}", args.file.display()))?;

    tracing::debug!(
        file = %args.file.display(),
        legacy = args.legacy,
        project_id = args.project,
        "running query file"
    );

    let started = Instant::now();
    let tables = if args.legacy {
        let group: ChannelGroupQueryV1 =
            serde_json::from_str(&contents).context("failed to parse channel_v1 query group")?;
        let mut tables = engine
            .execute_legacy_query_group(args.project, &args.request_id, &group)
            .await
            .context("query execution failed")?;
        for (table, query) in tables.iter_mut().zip(&group.query_group) {
            table.headers = legacy_headers(query, table)?;
        }
        tables
    } else {
        let group: KpiQueryGroup =
            serde_json::from_str(&contents).context("failed to parse query group")?;
        engine
            .execute_query_group(args.project, &args.request_id, &group)
            .await
            .context("query execution failed")?
    };
    let elapsed = started.elapsed();

    output_tables(&tables, format)?;

    let rows: usize = tables.iter().map(ResultTable::len).sum();
    eprintln!(
        "\n{} table(s), {} row(s) in {}ms",
        tables.len(),
        rows,
        elapsed.as_millis()
    );

    Ok(())
}

/// Build an engine from the config file; `data` overrides the store
pub fn open_engine(config: Option<&Path>, data: Option<&Path>) -> Result<KpiEngine> {
    let mut config = load_config(config)?;
    if let Some(data) = data {
        config.store = StoreConfig::local(data);
    }
    if config.store.backend.is_none() && config.store.path.is_none() {
        config.store = StoreConfig::local("data/");
    }

    let stores = StoreHandles::from_config(&config.store).context("failed to open store")?;
    Ok(KpiEngine::new(stores).with_config(config.engine))
}

/// Load the config file, falling back to defaults when none exists
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(p) = path {
        if !p.exists() {
            return Err(anyhow::anyhow!("config file not found: {}", p.display()));
        }
        return Config::from_file(p)
            .with_context(|| format!("failed to load config: {}", p.display()));
    }

    match DEFAULT_CONFIG_PATHS
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
    {
        Some(p) => Config::from_file(p)
            .with_context(|| format!("failed to load config: {}", p.display())),
        None => Ok(Config::default()),
    }
}

pub fn output_tables(tables: &[ResultTable], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => output_json(tables),
        OutputFormat::Table | OutputFormat::Csv => {
            for (i, table) in tables.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                match format {
                    OutputFormat::Csv => output_csv(table),
                    _ => output_table(table),
                }
            }
            Ok(())
        }
    }
}

/// Output as ASCII table
fn output_table(table: &ResultTable) {
    if table.is_empty() {
        println!("(empty result)");
        return;
    }

    let widths = column_widths(table);

    let header: Vec<String> = table
        .headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{:width$}", h, width = *w))
        .collect();
    println!("{}", header.join(" | "));

    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    println!("{}", sep.join("-+-"));

    for row in &table.rows {
        let values: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(v, w)| {
                let s = format_value(v);
                if s.chars().count() > *w {
                    let cut: String = s.chars().take(w.saturating_sub(3)).collect();
                    format!("{}...", cut)
                } else {
                    format!("{:width$}", s, width = *w)
                }
            })
            .collect();
        println!("{}", values.join(" | "));
    }
}

/// Display width of each column, in characters, capped at 50
fn column_widths(table: &ResultTable) -> Vec<usize> {
    let mut widths: Vec<usize> = table.headers.iter().map(|h| h.chars().count()).collect();
    for row in &table.rows {
        for (width, value) in widths.iter_mut().zip(row) {
            *width = (*width).max(format_value(value).chars().count());
        }
    }

    for w in &mut widths {
        *w = (*w).min(50);
    }
    widths
}

/// Output as a JSON array of `{headers, rows}` tables
fn output_json(tables: &[ResultTable]) -> Result<()> {
    let json = serde_json::to_string_pretty(tables)?;
    println!("{}", json);
    Ok(())
}

/// Output as CSV
fn output_csv(table: &ResultTable) {
    let header: Vec<String> = table
        .headers
        .iter()
        .map(|h| csv_escape(&Value::String(h.clone())))
        .collect();
    println!("{}", header.join(","));

    for row in &table.rows {
        let values: Vec<String> = row.iter().map(csv_escape).collect();
        println!("{}", values.join(","));
    }
}

/// Format a cell for display
fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Escape a cell for CSV output
fn csv_escape(value: &Value) -> String {
    let s = match value {
        Value::Null => String::new(),
        other => format_value(other),
    };

    // Quote if contains comma, newline, or quote
    if s.contains(',') || s.contains('\n') || s.contains('"') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("table".parse::<OutputFormat>(), Ok(OutputFormat::Table));
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape(&json!("Brand, US")), "\"Brand, US\"");
        assert_eq!(csv_escape(&json!("say \"hi\"")), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape(&json!(1001.0)), "1001.0");
        assert_eq!(csv_escape(&json!(0)), "0");
        assert_eq!(csv_escape(&Value::Null), "");
    }

    #[test]
    fn test_column_widths_count_characters() {
        let table = ResultTable {
            headers: vec!["campaign_name".to_string(), "ctr".to_string()],
            rows: vec![
                vec![json!("Größe München"), json!(1.5)],
                vec![json!("日本語キャンペーン"), json!(12.25)],
            ],
        };
        assert_eq!(column_widths(&table), vec![13, 5]);

        let long = ResultTable {
            headers: vec!["page".to_string()],
            rows: vec![vec![json!("é".repeat(80))]],
        };
        assert_eq!(column_widths(&long), vec![50]);
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config(Some(Path::new("/nonexistent/kpi.toml"))).is_err());
    }
}
