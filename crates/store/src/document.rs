//! Raw channel documents and smart-property records
//!
//! Documents are stored one per entity per day, with the channel's own field
//! vocabulary inside `value`. Dates are `YYYYMMDD` integers in the project's
//! reporting day, matching how ad platforms export daily reports.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single per-entity, per-day document from a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    /// Entity identifier within the channel report
    pub id: String,

    /// Report kind, e.g. `campaign_performance_report`
    pub type_alias: String,

    /// Reporting day as `YYYYMMDD`
    pub timestamp: u32,

    /// Channel-specific fields
    #[serde(default)]
    pub value: Map<String, Value>,
}

impl RawDocument {
    /// Create a document from a JSON object value
    ///
    /// Non-object values produce an empty field map.
    pub fn new(
        id: impl Into<String>,
        type_alias: impl Into<String>,
        timestamp: u32,
        value: Value,
    ) -> Self {
        let value = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            type_alias: type_alias.into(),
            timestamp,
            value,
        }
    }

    /// Reporting day, if `timestamp` is a valid `YYYYMMDD`
    pub fn date(&self) -> Option<NaiveDate> {
        date_from_timestamp(self.timestamp)
    }

    /// Look up a raw field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.value.get(name)
    }
}

/// Inclusive range of reporting days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// First day (inclusive)
    pub start: NaiveDate,
    /// Last day (inclusive)
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range; bounds are swapped if given out of order
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Check whether a day falls inside the range
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Check whether a `YYYYMMDD` timestamp falls inside the range
    pub fn contains_timestamp(&self, timestamp: u32) -> bool {
        timestamp >= date_to_timestamp(self.start) && timestamp <= date_to_timestamp(self.end)
    }
}

/// Convert a day to its `YYYYMMDD` form
pub fn date_to_timestamp(date: NaiveDate) -> u32 {
    // Years before 0 are not representable in reports.
    let year = date.year().max(0) as u32;
    year * 10_000 + date.month() * 100 + date.day()
}

/// Parse a `YYYYMMDD` timestamp
pub fn date_from_timestamp(timestamp: u32) -> Option<NaiveDate> {
    let year = (timestamp / 10_000) as i32;
    let month = (timestamp / 100) % 100;
    let day = timestamp % 100;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// An operator-defined rule assigning a custom property value to entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartPropertyRule {
    /// Object type the property attaches to (`campaign`, `ad_group`)
    pub object_type: String,

    /// Custom property name, without the object-type prefix
    pub name: String,

    /// Value assigned when the rule matches
    pub value: String,

    /// Channel identifier the rule applies to, or `all`
    #[serde(default = "default_rule_source")]
    pub source: String,

    /// Conditions over the entity's native attributes
    #[serde(default)]
    pub filters: Vec<RuleFilter>,
}

fn default_rule_source() -> String {
    "all".to_string()
}

/// A single condition in a smart-property rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleFilter {
    /// Native property of the rule's object type (`name`, `id`)
    pub property: String,

    /// `equals`, `notEqual`, `contains`, `notContains`
    pub condition: String,

    /// Comparison value
    pub value: String,

    /// `AND` or `OR` joining this condition to the previous one
    #[serde(default)]
    pub logical_op: String,
}

/// Materialized custom property values for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartPropertyTag {
    /// Object type of the entity
    pub object_type: String,

    /// Entity identifier (e.g. campaign id)
    pub entity_id: String,

    /// Custom property name to value
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timestamp_round_trip_day() {
        let date = NaiveDate::from_ymd_opt(2021, 2, 5).unwrap();
        assert_eq!(date_to_timestamp(date), 20210205);
        assert_eq!(date_from_timestamp(20210205), Some(date));
    }

    #[test]
    fn test_invalid_timestamp() {
        assert_eq!(date_from_timestamp(20211345), None);
        assert_eq!(date_from_timestamp(0), None);
    }

    #[test]
    fn test_date_range_contains() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2021, 2, 8).unwrap(),
            NaiveDate::from_ymd_opt(2021, 2, 3).unwrap(),
        );
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2021, 2, 3).unwrap());
        assert!(range.contains_timestamp(20210203));
        assert!(range.contains_timestamp(20210208));
        assert!(!range.contains_timestamp(20210209));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2021, 2, 2).unwrap()));
    }

    #[test]
    fn test_document_non_object_value() {
        let doc = RawDocument::new("1", "campaign_insights", 20210205, json!("oops"));
        assert!(doc.value.is_empty());
        assert_eq!(doc.field("clicks"), None);
    }

    #[test]
    fn test_rule_defaults() {
        let rule: SmartPropertyRule = serde_json::from_value(json!({
            "object_type": "campaign",
            "name": "region",
            "value": "NA",
        }))
        .unwrap();
        assert_eq!(rule.source, "all");
        assert!(rule.filters.is_empty());
    }
}
