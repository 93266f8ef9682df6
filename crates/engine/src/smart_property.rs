//! Smart property overlay
//!
//! Custom properties attach operator-defined values to campaign and ad-group
//! entities. A value comes from the entity's materialized tag when one
//! exists, otherwise from the first matching rule, otherwise `$none`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use kpi_store::{SmartPropertyRule, SmartPropertyStore};
use serde_json::{Map, Value};

use crate::error::{QueryError, Result};
use crate::predicate::{Attributes, Predicate};
use crate::query::{Condition, KpiFilter, LogicalOp, NONE_VALUE};
use crate::registry::{ChannelSpec, FieldRef, Registry, SMART_OBJECTS};

/// Channel name reported when the smart-property store fails
const STORE_CHANNEL: &str = "smart_properties";

/// Rule source matching every channel
const ALL_SOURCES: &str = "all";

/// A rule compiled against one channel's dimensions
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Value assigned on match
    pub value: String,
    /// Compiled rule filters
    pub predicate: Predicate,
}

/// Compiled rules by object type, channel and property name
type CompiledRules = HashMap<String, HashMap<&'static str, HashMap<String, Vec<CompiledRule>>>>;

/// Smart-property definitions for one project, loaded once per query group
pub struct SmartPropertyOverlay {
    store: Arc<dyn SmartPropertyStore>,
    project_id: u64,
    /// Rules by object type, in store order
    rules: HashMap<String, Vec<SmartPropertyRule>>,
    /// Rules in evaluation order, per channel
    compiled: CompiledRules,
}

impl std::fmt::Debug for SmartPropertyOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartPropertyOverlay")
            .field("project_id", &self.project_id)
            .field("rules", &self.rules)
            .finish()
    }
}

impl SmartPropertyOverlay {
    /// Overlay with no definitions
    pub fn empty(store: Arc<dyn SmartPropertyStore>, project_id: u64) -> Self {
        Self {
            store,
            project_id,
            rules: HashMap::new(),
            compiled: HashMap::new(),
        }
    }

    /// Load rules for the referenced object types that can carry smart properties
    ///
    /// Rules are compiled once here for every registry channel that stores
    /// the object type.
    pub async fn load<'a>(
        store: Arc<dyn SmartPropertyStore>,
        project_id: u64,
        registry: &Registry,
        object_types: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        let mut overlay = Self::empty(store, project_id);

        for object_type in object_types {
            if !SMART_OBJECTS.contains(&object_type) || overlay.rules.contains_key(object_type) {
                continue;
            }
            let rules = overlay
                .store
                .get_rules(project_id, object_type)
                .await
                .map_err(|e| QueryError::source(STORE_CHANNEL, e))?;

            let mut by_channel = HashMap::new();
            for channel in registry.channels() {
                if channel.level(object_type).is_some() {
                    by_channel.insert(channel.id, compile_rules(channel, &rules));
                }
            }

            tracing::debug!(
                project_id = project_id,
                object_type = object_type,
                rules = rules.len(),
                channels = by_channel.len(),
                "loaded smart property rules"
            );
            overlay.compiled.insert(object_type.to_string(), by_channel);
            overlay.rules.insert(object_type.to_string(), rules);
        }

        Ok(overlay)
    }

    /// Custom property name referenced by `property`, if defined
    ///
    /// Both `{objectType}_{name}` and the bare `name` are accepted.
    pub fn property_name(&self, object_type: &str, property: &str) -> Option<&str> {
        let rules = self.rules.get(object_type)?;
        let bare = property
            .strip_prefix(object_type)
            .and_then(|rest| rest.strip_prefix('_'));

        rules
            .iter()
            .map(|r| r.name.as_str())
            .find(|name| Some(*name) == bare)
            .or_else(|| rules.iter().map(|r| r.name.as_str()).find(|name| *name == property))
    }

    /// Whether `property` names a custom property of the object type
    pub fn defines(&self, object_type: &str, property: &str) -> bool {
        self.property_name(object_type, property).is_some()
    }

    /// Distinct custom property names for an object type, in definition order
    pub fn names(&self, object_type: &str) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for rule in self.rules.get(object_type).into_iter().flatten() {
            if !names.contains(&rule.name.as_str()) {
                names.push(&rule.name);
            }
        }
        names
    }

    /// Resolve every custom property of one entity
    ///
    /// `attributes` are the entity's native fields as found in the channel's
    /// documents.
    pub async fn annotate(
        &self,
        channel: &ChannelSpec,
        object_type: &str,
        entity_id: &str,
        attributes: &Map<String, Value>,
    ) -> Result<BTreeMap<String, String>> {
        let names = self.names(object_type);
        if names.is_empty() {
            return Ok(BTreeMap::new());
        }

        let tag = self
            .store
            .get_tag(self.project_id, object_type, entity_id)
            .await
            .map_err(|e| QueryError::source(STORE_CHANNEL, e))?
            .unwrap_or_default();

        let record = Attributes {
            values: attributes,
            label: channel.label,
        };

        let mut values = BTreeMap::new();
        for name in names {
            let value = match tag.get(name) {
                Some(value) => value.clone(),
                None => self
                    .compiled_rules(channel.id, object_type, name)
                    .iter()
                    .find(|rule| rule.predicate.evaluate(&record))
                    .map(|rule| rule.value.clone())
                    .unwrap_or_else(|| NONE_VALUE.to_string()),
            };
            values.insert(name.to_string(), value);
        }

        Ok(values)
    }

    /// Compiled rules for one property in evaluation order
    ///
    /// Rules that cannot be resolved in the channel are absent.
    pub fn compiled_rules(&self, channel_id: &str, object_type: &str, name: &str) -> &[CompiledRule] {
        self.compiled
            .get(object_type)
            .and_then(|channels| channels.get(channel_id))
            .and_then(|names| names.get(name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Distinct values custom property rules assign
    ///
    /// Only rules with source `all`, or with the channel's source when one
    /// is given, are considered.
    pub fn rule_values(
        &self,
        channel: Option<&ChannelSpec>,
        object_type: &str,
        name: &str,
    ) -> Vec<&str> {
        let mut values: Vec<&str> = Vec::new();
        for rule in self.rules.get(object_type).into_iter().flatten() {
            if rule.name == name
                && applies_to(rule, channel)
                && !values.contains(&rule.value.as_str())
            {
                values.push(&rule.value);
            }
        }
        values
    }
}

fn applies_to(rule: &SmartPropertyRule, channel: Option<&ChannelSpec>) -> bool {
    rule.source == ALL_SOURCES
        || channel.is_some_and(|c| c.smart_source && rule.source == c.id)
}

/// Compile every rule that applies to the channel
///
/// Rules for this channel come before `all` rules; within a source, rules
/// with more filters come first.
fn compile_rules(
    channel: &ChannelSpec,
    rules: &[SmartPropertyRule],
) -> HashMap<String, Vec<CompiledRule>> {
    let mut ordered: Vec<&SmartPropertyRule> = rules
        .iter()
        .filter(|r| applies_to(r, Some(channel)))
        .collect();
    ordered.sort_by_key(|r| (r.source == ALL_SOURCES, std::cmp::Reverse(r.filters.len())));

    let mut compiled: HashMap<String, Vec<CompiledRule>> = HashMap::new();
    for rule in ordered {
        if let Some(predicate) = compile_rule(channel, rule) {
            compiled.entry(rule.name.clone()).or_default().push(CompiledRule {
                value: rule.value.clone(),
                predicate,
            });
        }
    }
    compiled
}

/// Compile a rule's filters against the channel's native dimensions
///
/// Returns `None` when a filter cannot be resolved in this channel.
fn compile_rule(channel: &ChannelSpec, rule: &SmartPropertyRule) -> Option<Predicate> {
    let filters = rule
        .filters
        .iter()
        .map(|f| {
            Condition::parse(&f.condition).ok().map(|condition| KpiFilter {
                logical_op: LogicalOp::parse(&f.logical_op),
                ..KpiFilter::new(&rule.object_type, &f.property, condition, &f.value)
            })
        })
        .collect::<Option<Vec<_>>>()?;

    let compiled = Predicate::compile(&filters, |filter| {
        let dimension = channel
            .dimension(&filter.object_type, &filter.property_name)
            .ok_or_else(|| {
                QueryError::unknown_dimension(
                    channel.id,
                    &filter.object_type,
                    &filter.property_name,
                )
            })?;
        Ok((
            FieldRef::Raw(dimension.field),
            dimension.data_type,
        ))
    });

    match compiled {
        Ok(predicate) => Some(predicate),
        Err(e) => {
            tracing::debug!(
                channel = channel.id,
                property = %rule.name,
                error = %e,
                "skipping smart property rule"
            );
            None
        }
    }
}
