//! Single-channel execution
//!
//! A channel sub-query moves through typed stages:
//!
//! ```text
//! Compiled -> Fetched -> Aggregated -> Overlaid -> GridJoined -> PartialTable
//! ```
//!
//! Compilation resolves every dimension and metric against the registry
//! before any document is read, so caller errors never reach the store.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use kpi_store::{DocumentStore, RawDocument, StoreError};
use serde_json::{Map, Value};

use crate::error::{QueryError, Result};
use crate::predicate::{FieldLookup, Predicate, is_missing, value_text};
use crate::query::{CHANNEL_OBJECT, DataType, Granularity, KpiQuery, NONE_VALUE};
use crate::registry::{ChannelSpec, FieldRef, ObjectLevel, ResolvedMetric, SMART_OBJECTS};
use crate::result::{GroupKey, MetricColumn, PartialTable};
use crate::smart_property::SmartPropertyOverlay;
use crate::timerange::{TimeRange, truncate};

/// Execution stage, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Compiled,
    Fetched,
    Aggregated,
    Overlaid,
    GridJoined,
    Done,
}

impl ExecutionState {
    /// Stage name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compiled => "compiled",
            Self::Fetched => "fetched",
            Self::Aggregated => "aggregated",
            Self::Overlaid => "overlaid",
            Self::GridJoined => "grid_joined",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved execution plan for one channel
#[derive(Debug, Clone)]
pub struct ChannelPlan {
    /// Channel to query
    pub channel: Arc<ChannelSpec>,
    /// Hierarchy level whose documents are read
    pub level: ObjectLevel,
    /// Compiled filters
    pub predicate: Predicate,
    /// Group-by fields in column order
    pub group_fields: Vec<FieldRef>,
    /// Group-by headers in column order
    pub group_headers: Vec<String>,
    /// Metrics in query order
    pub metrics: Vec<ResolvedMetric>,
    /// Query time range
    pub range: TimeRange,
    /// Bucket granularity, when bucketed
    pub granularity: Option<Granularity>,
}

impl ChannelPlan {
    fn smart_fields(&self) -> Vec<(&str, &'static str)> {
        let mut entities: Vec<(&str, &'static str)> = Vec::new();
        for field in self.predicate.fields().chain(&self.group_fields) {
            if let FieldRef::Smart {
                object_type,
                id_field,
                ..
            } = field
                && !entities.contains(&(object_type.as_str(), *id_field))
            {
                entities.push((object_type.as_str(), *id_field));
            }
        }
        entities
    }

    fn empty_table(&self) -> PartialTable {
        PartialTable::new(
            self.group_headers.clone(),
            self.metrics.iter().map(MetricColumn::from).collect(),
            self.granularity.map(|g| self.range.buckets(g)),
        )
    }
}

/// Resolve a dimension in a channel
///
/// Native and synthetic dimensions come first, then smart properties of
/// the channel's campaign and ad-group objects.
pub fn resolve_dimension(
    channel: &ChannelSpec,
    overlay: &SmartPropertyOverlay,
    object_type: &str,
    property: &str,
) -> Result<(FieldRef, DataType)> {
    if let Some(dimension) = channel.dimension(object_type, property) {
        return Ok((FieldRef::Raw(dimension.field), dimension.data_type));
    }
    if object_type == CHANNEL_OBJECT {
        return channel
            .resolve(object_type, property)
            .map(|field| (field, DataType::Categorical));
    }
    if SMART_OBJECTS.contains(&object_type)
        && let Some(level) = channel.level(object_type)
        && let Some(name) = overlay.property_name(object_type, property)
    {
        return Ok((
            FieldRef::Smart {
                object_type: object_type.to_string(),
                name: name.to_string(),
                id_field: level.id_field,
            },
            DataType::Categorical,
        ));
    }
    Err(QueryError::unknown_dimension(channel.id, object_type, property))
}

// =============================================================================
// Stages
// =============================================================================

/// Plan resolved, nothing read yet
#[derive(Debug, Clone)]
pub struct Compiled {
    plan: ChannelPlan,
}

impl Compiled {
    /// Compile an effective sub-query for one channel
    pub fn compile(
        channel: Arc<ChannelSpec>,
        query: &KpiQuery,
        range: &TimeRange,
        overlay: &SmartPropertyOverlay,
    ) -> Result<Self> {
        let predicate = Predicate::compile(&query.filters, |filter| {
            let (field, declared) = resolve_dimension(
                &channel,
                overlay,
                &filter.object_type,
                &filter.property_name,
            )?;
            let data_type = match filter.data_type {
                DataType::Numerical => DataType::Numerical,
                DataType::Categorical => declared,
            };
            Ok((field, data_type))
        })?;

        let mut group_fields = Vec::with_capacity(query.group_by.len());
        let mut group_headers = Vec::with_capacity(query.group_by.len());
        for group_by in &query.group_by {
            let (field, _) =
                resolve_dimension(&channel, overlay, &group_by.object_type, &group_by.property_name)?;
            group_fields.push(field);
            group_headers.push(group_by.header());
        }

        let metrics = query
            .metrics
            .iter()
            .map(|m| channel.resolve_metric(m))
            .collect::<Result<Vec<_>>>()?;

        let level = channel
            .lowest_level(
                query
                    .filters
                    .iter()
                    .map(|f| f.object_type.as_str())
                    .chain(query.group_by.iter().map(|g| g.object_type.as_str())),
            )?
            .clone();

        tracing::debug!(
            channel = channel.id,
            state = %ExecutionState::Compiled,
            type_alias = level.type_alias,
            groups = predicate.groups.len(),
            "channel query compiled"
        );

        Ok(Self {
            plan: ChannelPlan {
                channel,
                level,
                predicate,
                group_fields,
                group_headers,
                metrics,
                range: range.clone(),
                granularity: query.granularity()?,
            },
        })
    }

    /// The resolved plan
    pub fn plan(&self) -> &ChannelPlan {
        &self.plan
    }

    /// Read the level's documents for the range
    pub async fn fetch(self, store: &dyn DocumentStore, project_id: u64) -> Result<Fetched> {
        let channel = self.plan.channel.id;
        let documents = store
            .fetch(
                project_id,
                channel,
                self.plan.level.type_alias,
                self.plan.range.date_range(),
            )
            .await
            .map_err(|e| QueryError::source(channel, e))?;

        if let Some(doc) = documents.iter().find(|doc| doc.date().is_none()) {
            return Err(QueryError::source(
                channel,
                StoreError::Malformed(format!(
                    "document {} has invalid timestamp {}",
                    doc.id, doc.timestamp
                )),
            ));
        }

        tracing::debug!(
            channel = channel,
            state = %ExecutionState::Fetched,
            documents = documents.len(),
            "channel documents fetched"
        );

        Ok(Fetched {
            plan: self.plan,
            documents,
        })
    }

    /// Run every remaining stage
    pub async fn run(
        self,
        store: &dyn DocumentStore,
        overlay: &SmartPropertyOverlay,
        project_id: u64,
    ) -> Result<PartialTable> {
        let table = self
            .fetch(store, project_id)
            .await?
            .aggregate(overlay)
            .await?
            .overlay()
            .join_grid()?
            .finish();
        Ok(table)
    }
}

/// Documents read
#[derive(Debug)]
pub struct Fetched {
    plan: ChannelPlan,
    documents: Vec<RawDocument>,
}

impl Fetched {
    /// Filter, group and accumulate the documents
    pub async fn aggregate(self, overlay: &SmartPropertyOverlay) -> Result<Aggregated> {
        let plan = self.plan;
        let mut tags = EntityTags::default();

        for (object_type, id_field) in plan.smart_fields() {
            for doc in &self.documents {
                if let Some(entity_id) = entity_id(doc, id_field) {
                    tags.ensure(overlay, &plan.channel, object_type, &entity_id, &doc.value)
                        .await?;
                }
            }
        }

        let mut table = plan.empty_table();
        let mut matched = 0usize;

        for doc in &self.documents {
            let record = DocumentRecord {
                doc,
                label: plan.channel.label,
                tags: &tags,
            };
            if !plan.predicate.evaluate(&record) {
                continue;
            }

            // Dates were checked at fetch
            let bucket = plan
                .granularity
                .zip(doc.date())
                .map(|(granularity, date)| truncate(date, granularity));

            let values = plan
                .group_fields
                .iter()
                .map(|field| match field {
                    FieldRef::Smart { id_field, .. } => {
                        entity_id(doc, id_field).unwrap_or_else(|| NONE_VALUE.to_string())
                    }
                    field => record
                        .lookup(field)
                        .filter(|v| !v.is_empty())
                        .map(Cow::into_owned)
                        .unwrap_or_else(|| NONE_VALUE.to_string()),
                })
                .collect();

            let accumulators = table.entry(GroupKey::new(bucket, values));
            for (acc, metric) in accumulators.iter_mut().zip(&plan.metrics) {
                let value = |field: &str| field_number(doc, field);
                let numerator = metric.numerator.evaluate(value);
                let denominator = metric
                    .denominator
                    .map(|c| c.evaluate(value))
                    .unwrap_or(0.0);
                acc.add(numerator, denominator);
            }
            matched += 1;
        }

        tracing::debug!(
            channel = plan.channel.id,
            state = %ExecutionState::Aggregated,
            matched = matched,
            rows = table.rows.len(),
            entities = tags.len(),
            "channel documents aggregated"
        );

        Ok(Aggregated { plan, table, tags })
    }
}

/// Documents grouped and accumulated; smart dimensions still hold entity ids
#[derive(Debug)]
pub struct Aggregated {
    plan: ChannelPlan,
    table: PartialTable,
    tags: EntityTags,
}

impl Aggregated {
    /// Number of entities annotated by the overlay
    pub fn annotated_entities(&self) -> usize {
        self.tags.len()
    }

    /// Replace entity ids with smart-property values
    pub fn overlay(self) -> Overlaid {
        let Self { plan, table, tags } = self;

        let has_smart = plan
            .group_fields
            .iter()
            .any(|f| matches!(f, FieldRef::Smart { .. }));

        let table = if has_smart {
            let mut overlaid = plan.empty_table();
            for (key, accumulators) in table.rows {
                let values = key
                    .values
                    .into_iter()
                    .zip(&plan.group_fields)
                    .map(|(value, field)| match field {
                        FieldRef::Smart {
                            object_type, name, ..
                        } => tags
                            .value(object_type, &value, name)
                            .unwrap_or(NONE_VALUE)
                            .to_string(),
                        _ => value,
                    })
                    .collect();
                overlaid.merge_row(GroupKey::new(key.bucket, values), &accumulators);
            }
            overlaid
        } else {
            table
        };

        tracing::debug!(
            channel = plan.channel.id,
            state = %ExecutionState::Overlaid,
            rows = table.rows.len(),
            "smart properties applied"
        );

        Overlaid { plan, table }
    }
}

/// Group values final
#[derive(Debug)]
pub struct Overlaid {
    plan: ChannelPlan,
    table: PartialTable,
}

impl Overlaid {
    /// Fill the bucket grid
    pub fn join_grid(self) -> Result<GridJoined> {
        let Self { plan, mut table } = self;
        table.join_grid()?;

        tracing::debug!(
            channel = plan.channel.id,
            state = %ExecutionState::GridJoined,
            rows = table.rows.len(),
            "time grid joined"
        );

        Ok(GridJoined { plan, table })
    }
}

/// Grid complete
#[derive(Debug)]
pub struct GridJoined {
    plan: ChannelPlan,
    table: PartialTable,
}

impl GridJoined {
    /// The channel's partial result
    pub fn finish(self) -> PartialTable {
        tracing::debug!(
            channel = self.plan.channel.id,
            state = %ExecutionState::Done,
            rows = self.table.rows.len(),
            "channel query done"
        );
        self.table
    }
}

// =============================================================================
// Entity annotations
// =============================================================================

/// Smart-property values per entity, annotated at most once per execution
#[derive(Debug, Default)]
pub struct EntityTags {
    values: HashMap<(String, String), BTreeMap<String, String>>,
}

impl EntityTags {
    async fn ensure(
        &mut self,
        overlay: &SmartPropertyOverlay,
        channel: &ChannelSpec,
        object_type: &str,
        entity_id: &str,
        attributes: &Map<String, Value>,
    ) -> Result<()> {
        let key = (object_type.to_string(), entity_id.to_string());
        if self.values.contains_key(&key) {
            return Ok(());
        }
        let values = overlay
            .annotate(channel, object_type, entity_id, attributes)
            .await?;
        self.values.insert(key, values);
        Ok(())
    }

    /// Smart-property value of an entity
    pub fn value(&self, object_type: &str, entity_id: &str, name: &str) -> Option<&str> {
        self.values
            .get(&(object_type.to_string(), entity_id.to_string()))
            .and_then(|values| values.get(name))
            .map(String::as_str)
    }

    /// Number of annotated entities
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no entity was annotated
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

struct DocumentRecord<'a> {
    doc: &'a RawDocument,
    label: &'a str,
    tags: &'a EntityTags,
}

impl FieldLookup for DocumentRecord<'_> {
    fn lookup(&self, field: &FieldRef) -> Option<Cow<'_, str>> {
        match field {
            FieldRef::Raw(name) => self.doc.field(name).and_then(value_text),
            FieldRef::Channel => Some(Cow::Borrowed(self.label)),
            FieldRef::Smart {
                object_type,
                name,
                id_field,
            } => {
                let entity_id = entity_id(self.doc, id_field)?;
                self.tags
                    .value(object_type, &entity_id, name)
                    .map(|v| Cow::Owned(v.to_string()))
            }
        }
    }
}

fn entity_id(doc: &RawDocument, id_field: &str) -> Option<String> {
    doc.field(id_field)
        .and_then(value_text)
        .filter(|v| !is_missing(v))
        .map(Cow::into_owned)
}

/// Numeric value of a field, `None` when absent, null or empty
fn field_number(doc: &RawDocument, field: &str) -> Option<f64> {
    doc.field(field)
        .filter(|v| !v.is_null() && v.as_str() != Some(""))
        .map(parse_numeric)
}

/// Numeric value of a raw metric field
///
/// Thousands separators are ignored and trailing units are dropped
/// (`"1,024"` is 1024, `"10%"` is 10). Anything else is 0.
pub fn parse_numeric(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_numeric_str(s),
        _ => 0.0,
    }
}

fn parse_numeric_str(s: &str) -> f64 {
    let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
    if let Ok(value) = cleaned.parse::<f64>() {
        return if value.is_finite() { value } else { 0.0 };
    }

    let end = cleaned
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    cleaned[..end].parse::<f64>().unwrap_or(0.0)
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod executor_test;
