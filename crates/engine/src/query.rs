//! Canonical KPI query model
//!
//! A query group holds one or more channel sub-queries plus filters and
//! group-bys applied to all of them. Field names on the wire are the short
//! keys used by the dashboard API (`qG`, `gFil`, `objTy`, ...).

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{QueryError, Result};

/// Sentinel value meaning "dimension absent on this entity"
pub const NONE_VALUE: &str = "$none";

/// Only category served by this engine
pub const CHANNELS_CATEGORY: &str = "channels";

/// Class of canonical query groups
pub const KPI_CLASS: &str = "kpi";

/// Synthetic object type for the channel dimension
pub const CHANNEL_OBJECT: &str = "channel";

/// Header of the synthetic channel dimension
pub const CHANNEL_NAME_HEADER: &str = "channel_name";

/// A group of sub-queries sharing global filters and group-bys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiQueryGroup {
    /// Query class, `kpi`
    #[serde(rename = "cl", default)]
    pub class: String,

    /// Sub-queries, executed in order
    #[serde(rename = "qG", default)]
    pub queries: Vec<KpiQuery>,

    /// Filters appended to every sub-query
    #[serde(rename = "gFil", default)]
    pub global_filters: Vec<KpiFilter>,

    /// Group-bys appended to every sub-query
    #[serde(rename = "gGBy", default)]
    pub global_group_by: Vec<KpiGroupBy>,
}

impl KpiQueryGroup {
    /// Create a group from sub-queries
    pub fn new(queries: Vec<KpiQuery>) -> Self {
        Self {
            class: KPI_CLASS.to_string(),
            queries,
            global_filters: Vec::new(),
            global_group_by: Vec::new(),
        }
    }

    /// Add a global filter
    pub fn with_filter(mut self, filter: KpiFilter) -> Self {
        self.global_filters.push(filter);
        self
    }

    /// Add a global group-by
    pub fn with_group_by(mut self, group_by: KpiGroupBy) -> Self {
        self.global_group_by.push(group_by);
        self
    }

    /// Sub-queries with the global filters and group-bys folded in
    ///
    /// Global filters follow the query's own filters. Group-bys are
    /// de-duplicated on `(objectType, propertyName)`, first occurrence wins.
    pub fn effective_queries(&self) -> Vec<KpiQuery> {
        self.queries
            .iter()
            .map(|query| {
                let mut effective = query.clone();
                effective.filters.extend(self.global_filters.iter().cloned());

                let mut group_by: Vec<KpiGroupBy> = Vec::new();
                for g in query.group_by.iter().chain(&self.global_group_by) {
                    if !group_by.iter().any(|existing| existing.same_property(g)) {
                        group_by.push(g.clone());
                    }
                }
                effective.group_by = group_by;
                effective
            })
            .collect()
    }

    /// Validate the group and every effective sub-query
    pub fn validate(&self) -> Result<()> {
        if !self.class.is_empty() && self.class != KPI_CLASS {
            return Err(QueryError::InvalidQuery(format!(
                "unsupported query class: {}",
                self.class
            )));
        }
        if self.queries.is_empty() {
            return Err(QueryError::InvalidQuery("query group is empty".to_string()));
        }
        for query in self.effective_queries() {
            query.validate()?;
        }
        Ok(())
    }
}

/// A single channel sub-query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiQuery {
    /// Category, always `channels`
    #[serde(rename = "ca", default)]
    pub category: String,

    /// Display category selecting the channel
    #[serde(rename = "dc", default)]
    pub display_category: String,

    /// Metric names
    #[serde(rename = "me", default)]
    pub metrics: Vec<String>,

    /// Filters, combined left to right
    #[serde(rename = "fil", default)]
    pub filters: Vec<KpiFilter>,

    /// Group-by dimensions, in output order
    #[serde(rename = "gBy", default)]
    pub group_by: Vec<KpiGroupBy>,

    /// Time bucket granularity (`date`, `week`, `month`, empty for none)
    #[serde(rename = "gbt", default, deserialize_with = "string_or_empty")]
    pub group_by_timestamp: String,

    /// IANA timezone, empty for the engine default
    #[serde(rename = "tz", default)]
    pub timezone: String,

    /// Range start, epoch seconds (inclusive)
    #[serde(rename = "fr", default)]
    pub from: i64,

    /// Range end, epoch seconds (inclusive)
    #[serde(rename = "to", default)]
    pub to: i64,
}

impl KpiQuery {
    /// Create a channels query for a display category
    pub fn new(display_category: impl Into<String>, metrics: &[&str]) -> Self {
        Self {
            category: CHANNELS_CATEGORY.to_string(),
            display_category: display_category.into(),
            metrics: metrics.iter().map(|m| m.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Set the time range
    pub fn with_range(mut self, from: i64, to: i64) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Add a filter
    pub fn with_filter(mut self, filter: KpiFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add a group-by
    pub fn with_group_by(mut self, group_by: KpiGroupBy) -> Self {
        self.group_by.push(group_by);
        self
    }

    /// Set the time bucket granularity
    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.group_by_timestamp = granularity.as_str().to_string();
        self
    }

    /// Set the timezone
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// Parsed time bucket granularity, `None` when not bucketed
    pub fn granularity(&self) -> Result<Option<Granularity>> {
        match self.group_by_timestamp.trim() {
            "" => Ok(None),
            s if s.eq_ignore_ascii_case("none") => Ok(None),
            s => Granularity::parse(s).map(Some),
        }
    }

    /// Check the query's structural invariants
    ///
    /// Channel-specific checks (dimension and metric names) happen at
    /// compile time against the registry.
    pub fn validate(&self) -> Result<()> {
        if self.category != CHANNELS_CATEGORY {
            return Err(QueryError::InvalidQuery(format!(
                "unsupported category: {:?}",
                self.category
            )));
        }
        if self.metrics.is_empty() {
            return Err(QueryError::InvalidQuery("no metrics selected".to_string()));
        }
        if self.metrics.iter().any(|m| m.trim().is_empty()) {
            return Err(QueryError::InvalidQuery("empty metric name".to_string()));
        }
        if self.from > self.to {
            return Err(QueryError::InvalidTimeRange(format!(
                "from {} is after to {}",
                self.from, self.to
            )));
        }
        self.granularity()?;

        for filter in &self.filters {
            validate_property(&filter.object_type, &filter.property_name, &filter.entity)?;
        }
        for group_by in &self.group_by {
            validate_property(&group_by.object_type, &group_by.property_name, &group_by.entity)?;
        }
        Ok(())
    }
}

fn validate_property(object_type: &str, property_name: &str, entity: &str) -> Result<()> {
    if object_type.is_empty() || property_name.is_empty() {
        return Err(QueryError::InvalidFilter(format!(
            "object type and property are required, got {:?}.{:?}",
            object_type, property_name
        )));
    }
    for part in [object_type, property_name, entity] {
        if part.chars().any(char::is_whitespace) {
            return Err(QueryError::InvalidFilter(format!(
                "whitespace not allowed in {:?}",
                part
            )));
        }
    }
    Ok(())
}

pub(crate) fn string_or_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        _ => String::new(),
    })
}

/// A filter condition on one dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiFilter {
    /// Object type (`campaign`, `ad_group`, `channel`, ...)
    #[serde(rename = "objTy")]
    pub object_type: String,

    /// Property of the object (`name`, `id`, or a smart property)
    #[serde(rename = "prNa")]
    pub property_name: String,

    /// Declared value type
    #[serde(rename = "prDaTy", default)]
    pub data_type: DataType,

    /// Property-mapping flag; not used for channels
    #[serde(rename = "isPrMa", default)]
    pub is_property_mapping: bool,

    /// Entity qualifier; not used for channels
    #[serde(rename = "en", default)]
    pub entity: String,

    /// Comparison
    #[serde(rename = "co")]
    pub condition: Condition,

    /// Comparison value, or `$none`
    #[serde(rename = "va", default)]
    pub value: String,

    /// How this filter joins the previous one
    #[serde(rename = "lOp", default)]
    pub logical_op: LogicalOp,
}

impl KpiFilter {
    /// Create an `AND`-joined categorical filter
    pub fn new(
        object_type: impl Into<String>,
        property_name: impl Into<String>,
        condition: Condition,
        value: impl Into<String>,
    ) -> Self {
        Self {
            object_type: object_type.into(),
            property_name: property_name.into(),
            data_type: DataType::Categorical,
            is_property_mapping: false,
            entity: String::new(),
            condition,
            value: value.into(),
            logical_op: LogicalOp::And,
        }
    }

    /// Join to the previous filter with `OR`
    pub fn or(mut self) -> Self {
        self.logical_op = LogicalOp::Or;
        self
    }

    /// Declare the value type
    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }
}

/// A group-by dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiGroupBy {
    /// Object type
    #[serde(rename = "objTy")]
    pub object_type: String,

    /// Property of the object
    #[serde(rename = "prNa")]
    pub property_name: String,

    /// Declared value type
    #[serde(rename = "prDaTy", default)]
    pub data_type: DataType,

    /// Property-mapping flag; not used for channels
    #[serde(rename = "isPrMa", default)]
    pub is_property_mapping: bool,

    /// Group-by type; not used for channels
    #[serde(rename = "gbty", default)]
    pub group_by_type: String,

    /// Entity qualifier; not used for channels
    #[serde(rename = "en", default)]
    pub entity: String,

    /// Granularity for datetime properties; not used for channels
    #[serde(rename = "grn", default)]
    pub granularity: String,
}

impl KpiGroupBy {
    /// Create a categorical group-by
    pub fn new(object_type: impl Into<String>, property_name: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            property_name: property_name.into(),
            data_type: DataType::Categorical,
            is_property_mapping: false,
            group_by_type: String::new(),
            entity: String::new(),
            granularity: String::new(),
        }
    }

    /// Output column header
    pub fn header(&self) -> String {
        property_header(&self.object_type, &self.property_name)
    }

    fn same_property(&self, other: &KpiGroupBy) -> bool {
        self.object_type == other.object_type && self.property_name == other.property_name
    }
}

/// Output header for a dimension
///
/// Smart properties already carry the object-type prefix
/// (`campaign_region`), other properties get it added (`campaign_name`).
pub fn property_header(object_type: &str, property_name: &str) -> String {
    let prefix = format!("{}_", object_type);
    if property_name.starts_with(&prefix) {
        property_name.to_string()
    } else {
        format!("{}{}", prefix, property_name)
    }
}

/// Filter conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    /// Exact match (`$none`: value absent)
    #[serde(alias = "eq", alias = "equal")]
    Equals,
    /// Negated exact match (`$none`: value present)
    #[serde(alias = "not_equal", alias = "notEquals", alias = "ne")]
    NotEqual,
    /// Case-insensitive substring match
    Contains,
    /// Negated substring match
    #[serde(alias = "not_contains")]
    NotContains,
}

impl Condition {
    /// Parse condition from string
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "equals" | "equal" | "eq" | "=" | "==" => Ok(Self::Equals),
            "notequal" | "not_equal" | "notequals" | "ne" | "!=" => Ok(Self::NotEqual),
            "contains" | "like" => Ok(Self::Contains),
            "notcontains" | "not_contains" | "not_like" => Ok(Self::NotContains),
            _ => Err(QueryError::InvalidFilter(format!("unknown condition: {}", s))),
        }
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEqual => "notEqual",
            Self::Contains => "contains",
            Self::NotContains => "notContains",
        }
    }
}

/// How a filter joins the filter before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogicalOp {
    /// Extends the current conjunctive group
    #[default]
    And,
    /// Starts a new conjunctive group
    Or,
}

impl From<String> for LogicalOp {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<LogicalOp> for String {
    fn from(op: LogicalOp) -> Self {
        op.as_str().to_string()
    }
}

impl LogicalOp {
    /// Parse a logical operator; anything but `OR` means `AND`
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("or") {
            Self::Or
        } else {
            Self::And
        }
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Declared value type of a dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataType {
    /// Compared as strings
    #[default]
    Categorical,
    /// Compared as numbers where both sides parse
    Numerical,
}

impl From<String> for DataType {
    fn from(s: String) -> Self {
        if s.trim().eq_ignore_ascii_case("numerical") {
            Self::Numerical
        } else {
            Self::Categorical
        }
    }
}

impl From<DataType> for String {
    fn from(data_type: DataType) -> Self {
        match data_type {
            DataType::Categorical => "categorical".to_string(),
            DataType::Numerical => "numerical".to_string(),
        }
    }
}

/// Time bucket granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One bucket per calendar day
    Date,
    /// Weeks starting on Sunday
    Week,
    /// Calendar months
    Month,
}

impl Granularity {
    /// Parse granularity from string
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "date" | "day" | "daily" => Ok(Self::Date),
            "week" | "weekly" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            _ => Err(QueryError::InvalidQuery(format!(
                "unknown granularity: {}",
                s
            ))),
        }
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}
