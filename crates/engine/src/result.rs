//! Query results
//!
//! Channel executions produce a [`PartialTable`] of accumulators keyed by
//! group values and time bucket. Partial tables from several channels merge
//! by summing accumulators, then render into a [`ResultTable`].

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{QueryError, Result};
use crate::query::NONE_VALUE;
use crate::registry::ResolvedMetric;
use crate::timerange::format_bucket;

/// Header of the time bucket column
pub const DATETIME_HEADER: &str = "datetime";

/// Rendered result of one sub-query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    /// Column headers
    pub headers: Vec<String>,
    /// Rows, each with one cell per header
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Metric column of a partial table
#[derive(Debug, Clone, PartialEq)]
pub struct MetricColumn {
    /// Canonical metric name
    pub name: String,
    /// Multiplier for ratio metrics, `None` for sums
    pub ratio_multiplier: Option<f64>,
}

impl From<&ResolvedMetric> for MetricColumn {
    fn from(metric: &ResolvedMetric) -> Self {
        Self {
            name: metric.name.clone(),
            ratio_multiplier: metric.denominator.map(|_| metric.multiplier),
        }
    }
}

/// Running totals for one metric cell
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulator {
    /// Summed value, or the ratio numerator
    pub numerator: f64,
    /// Ratio denominator
    pub denominator: f64,
    /// Documents that contributed
    pub contributions: u64,
}

impl Accumulator {
    /// Add one document's contribution
    pub fn add(&mut self, numerator: f64, denominator: f64) {
        self.numerator += numerator;
        self.denominator += denominator;
        self.contributions += 1;
    }

    /// Fold another accumulator into this one
    pub fn merge(&mut self, other: &Accumulator) {
        self.numerator += other.numerator;
        self.denominator += other.denominator;
        self.contributions += other.contributions;
    }

    /// Cell value; integer `0` when nothing contributed
    pub fn value(&self, column: &MetricColumn) -> Value {
        if self.contributions == 0 {
            return Value::from(0);
        }
        match column.ratio_multiplier {
            None => Value::from(self.numerator),
            Some(_) if self.denominator == 0.0 => Value::from(0.0),
            Some(multiplier) => Value::from(self.numerator * multiplier / self.denominator),
        }
    }
}

/// Group key: time bucket plus group-by values in column order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    /// Bucket start, when bucketed
    pub bucket: Option<NaiveDate>,
    /// Group-by values
    pub values: Vec<String>,
}

impl GroupKey {
    /// Create a key
    pub fn new(bucket: Option<NaiveDate>, values: Vec<String>) -> Self {
        Self { bucket, values }
    }
}

/// Unrendered result of one channel, or of several merged channels
#[derive(Debug, Clone, PartialEq)]
pub struct PartialTable {
    /// Group-by headers in column order
    pub group_headers: Vec<String>,
    /// Metric columns in query order
    pub metrics: Vec<MetricColumn>,
    /// Bucket grid, when bucketed
    pub buckets: Option<Vec<NaiveDate>>,
    /// Accumulators by key, one per metric column
    pub rows: HashMap<GroupKey, Vec<Accumulator>>,
}

impl PartialTable {
    /// Create an empty table
    pub fn new(
        group_headers: Vec<String>,
        metrics: Vec<MetricColumn>,
        buckets: Option<Vec<NaiveDate>>,
    ) -> Self {
        Self {
            group_headers,
            metrics,
            buckets,
            rows: HashMap::new(),
        }
    }

    /// Accumulators for a key, created empty if absent
    pub fn entry(&mut self, key: GroupKey) -> &mut Vec<Accumulator> {
        let width = self.metrics.len();
        self.rows
            .entry(key)
            .or_insert_with(|| vec![Accumulator::default(); width])
    }

    /// Fold accumulators into a key
    pub fn merge_row(&mut self, key: GroupKey, accumulators: &[Accumulator]) {
        for (slot, other) in self.entry(key).iter_mut().zip(accumulators) {
            slot.merge(other);
        }
    }

    /// Fill the bucket grid
    ///
    /// Every observed group gets a row for every bucket. Without group-bys
    /// the empty group always exists.
    pub fn join_grid(&mut self) -> Result<()> {
        let groups: BTreeSet<Vec<String>> = if self.group_headers.is_empty() {
            BTreeSet::from([Vec::new()])
        } else {
            self.rows.keys().map(|k| k.values.clone()).collect()
        };

        match self.buckets.clone() {
            Some(grid) => {
                if let Some(key) = self
                    .rows
                    .keys()
                    .find(|k| k.bucket.is_none_or(|b| grid.binary_search(&b).is_err()))
                {
                    let bucket = key
                        .bucket
                        .map(|b| b.to_string())
                        .unwrap_or_else(|| "none".to_string());
                    tracing::error!(bucket = %bucket, "aggregated bucket outside the time grid");
                    return Err(QueryError::BucketMismatch { bucket });
                }
                for values in groups {
                    for bucket in &grid {
                        self.entry(GroupKey::new(Some(*bucket), values.clone()));
                    }
                }
            }
            None => {
                for values in groups {
                    self.entry(GroupKey::new(None, values));
                }
            }
        }

        Ok(())
    }

    /// Merge another table into this one
    ///
    /// Headers become the union in first-seen order; values for columns a
    /// table lacks are `$none`. Rows with equal keys are summed.
    pub fn merge(&mut self, other: PartialTable) {
        let mut headers = self.group_headers.clone();
        for header in &other.group_headers {
            if !headers.contains(header) {
                headers.push(header.clone());
            }
        }

        if headers != self.group_headers {
            let rows = std::mem::take(&mut self.rows);
            for (key, accumulators) in rows {
                let key = remap(&self.group_headers, &headers, key);
                self.merge_row(key, &accumulators);
            }
        }

        for (key, accumulators) in other.rows {
            let key = remap(&other.group_headers, &headers, key);
            self.merge_row(key, &accumulators);
        }

        self.group_headers = headers;
        if self.buckets.is_none() {
            self.buckets = other.buckets;
        }
    }

    /// Render into headers and sorted rows
    pub fn render(&self, display_category: &str, timezone: &Tz) -> ResultTable {
        let mut headers = Vec::with_capacity(1 + self.group_headers.len() + self.metrics.len());
        if self.buckets.is_some() {
            headers.push(DATETIME_HEADER.to_string());
        }
        headers.extend(self.group_headers.iter().cloned());
        headers.extend(
            self.metrics
                .iter()
                .map(|m| format!("{}_{}", display_category, m.name)),
        );

        let mut keys: Vec<&GroupKey> = self.rows.keys().collect();
        keys.sort_by(|a, b| compare_keys(a, b));

        let rows = keys
            .into_iter()
            .map(|key| {
                let mut row = Vec::with_capacity(headers.len());
                if self.buckets.is_some() {
                    row.push(match key.bucket {
                        Some(bucket) => Value::String(format_bucket(bucket, timezone)),
                        None => Value::String(NONE_VALUE.to_string()),
                    });
                }
                row.extend(key.values.iter().map(|v| Value::String(v.clone())));
                row.extend(
                    self.rows[key]
                        .iter()
                        .zip(&self.metrics)
                        .map(|(acc, column)| acc.value(column)),
                );
                row
            })
            .collect();

        ResultTable { headers, rows }
    }
}

fn remap(from: &[String], to: &[String], key: GroupKey) -> GroupKey {
    let values = to
        .iter()
        .map(|header| {
            from.iter()
                .position(|h| h == header)
                .and_then(|i| key.values.get(i).cloned())
                .unwrap_or_else(|| NONE_VALUE.to_string())
        })
        .collect();
    GroupKey::new(key.bucket, values)
}

/// Row order: bucket ascending, then group values left to right
pub fn compare_keys(a: &GroupKey, b: &GroupKey) -> Ordering {
    a.bucket.cmp(&b.bucket).then_with(|| {
        a.values
            .iter()
            .zip(&b.values)
            .map(|(x, y)| natural_cmp(x, y))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a.values.len().cmp(&b.values.len()))
    })
}

/// Total order on group values
///
/// `$none` first, then finite numbers in numeric order, then everything
/// else in byte order. Numerically equal values fall back to byte order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (rank_a, number_a) = sort_rank(a);
    let (rank_b, number_b) = sort_rank(b);

    rank_a
        .cmp(&rank_b)
        .then_with(|| match (number_a, number_b) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => Ordering::Equal,
        })
        .then_with(|| a.cmp(b))
}

fn sort_rank(value: &str) -> (u8, Option<f64>) {
    if value == NONE_VALUE {
        return (0, None);
    }
    match value.parse::<f64>() {
        Ok(number) if number.is_finite() => (1, Some(number)),
        _ => (2, None),
    }
}
