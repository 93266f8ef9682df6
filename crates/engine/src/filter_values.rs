//! Filter value listing
//!
//! Distinct values a property takes in a display category, offered to callers
//! as operands for filters. Native dimensions are read from the channel's
//! documents in a date window, smart properties from their rule definitions,
//! and the synthetic channel name from the channel labels.

use std::borrow::Cow;
use std::collections::HashSet;

use kpi_store::DateRange;

use crate::error::{QueryError, Result};
use crate::merger::QueryContext;
use crate::predicate::{is_missing, value_text};
use crate::registry::{ALL_CHANNELS_ID, ChannelSelector, ChannelSpec, SMART_OBJECTS};
use crate::result::natural_cmp;

/// Most values listed for one channel
pub const FILTER_VALUES_LIMIT: usize = 5000;

/// Most values listed for the all-channels view
pub const ALL_CHANNELS_FILTER_VALUES_LIMIT: usize = 2500;

/// List the distinct values of a property, in group-value order
///
/// A property the display category cannot resolve fails with
/// `UnknownDimension`; store failures surface as `SourceUnavailable`.
pub async fn filter_values(
    ctx: &QueryContext,
    display_category: &str,
    object_type: &str,
    property: &str,
    range: DateRange,
) -> Result<Vec<String>> {
    let (mut values, limit) = match ctx.registry.select(display_category)? {
        ChannelSelector::Single(channel) => {
            let values = if channel.is_native(object_type, property) {
                native_values(ctx, &channel, object_type, property, range).await?
            } else if let Some(name) = smart_property(ctx, &channel, object_type, property) {
                owned(ctx.overlay.rule_values(Some(&*channel), object_type, name))
            } else {
                return Err(QueryError::unknown_dimension(channel.id, object_type, property));
            };
            (values, FILTER_VALUES_LIMIT)
        }
        ChannelSelector::All(all) => {
            let values = if all.members.iter().any(|c| c.is_native(object_type, property)) {
                let connected = ctx
                    .documents
                    .list_connected_channels(ctx.project_id)
                    .await
                    .map_err(|e| QueryError::source(ALL_CHANNELS_ID, e))?;

                let mut values = Vec::new();
                for channel in all.members.iter().filter(|c| {
                    c.is_native(object_type, property) && connected.iter().any(|id| id == c.id)
                }) {
                    values.extend(native_values(ctx, channel, object_type, property, range).await?);
                }
                values
            } else if SMART_OBJECTS.contains(&object_type)
                && let Some(name) = ctx.overlay.property_name(object_type, property)
            {
                // Only rules that apply to every channel
                owned(ctx.overlay.rule_values(None, object_type, name))
            } else {
                return Err(QueryError::unknown_dimension(ALL_CHANNELS_ID, object_type, property));
            };
            (values, ALL_CHANNELS_FILTER_VALUES_LIMIT)
        }
    };

    values.sort_by(|a, b| natural_cmp(a, b));
    values.dedup();
    values.truncate(limit);

    tracing::debug!(
        project_id = ctx.project_id,
        display_category = display_category,
        object_type = object_type,
        property = property,
        values = values.len(),
        "listed filter values"
    );

    Ok(values)
}

/// Smart property of an object the channel stores
fn smart_property<'a>(
    ctx: &'a QueryContext,
    channel: &ChannelSpec,
    object_type: &str,
    property: &str,
) -> Option<&'a str> {
    if !SMART_OBJECTS.contains(&object_type) || channel.level(object_type).is_none() {
        return None;
    }
    ctx.overlay.property_name(object_type, property)
}

/// Values of a native dimension, or the label for the channel name
async fn native_values(
    ctx: &QueryContext,
    channel: &ChannelSpec,
    object_type: &str,
    property: &str,
    range: DateRange,
) -> Result<Vec<String>> {
    let Some(dimension) = channel.dimension(object_type, property) else {
        return Ok(vec![channel.label.to_string()]);
    };

    let level = channel.lowest_level([dimension.object_type])?;
    let documents = ctx
        .documents
        .fetch(ctx.project_id, channel.id, level.type_alias, range)
        .await
        .map_err(|e| QueryError::source(channel.id, e))?;

    let values: HashSet<String> = documents
        .iter()
        .filter_map(|doc| doc.field(dimension.field).and_then(value_text))
        .filter(|v| !is_missing(v))
        .map(Cow::into_owned)
        .collect();

    tracing::debug!(
        channel = channel.id,
        field = dimension.field,
        documents = documents.len(),
        values = values.len(),
        "collected dimension values"
    );

    Ok(values.into_iter().collect())
}

fn owned(values: Vec<&str>) -> Vec<String> {
    values.into_iter().map(str::to_string).collect()
}
