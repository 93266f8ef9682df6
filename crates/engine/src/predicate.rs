//! Filter predicates
//!
//! Filters compile into a disjunction of conjunctive groups: a run of
//! `AND`-joined filters forms one group and every `OR` starts a new one.
//! Records are evaluated locally through [`FieldLookup`].

use std::borrow::Cow;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::query::{Condition, DataType, KpiFilter, LogicalOp, NONE_VALUE};
use crate::registry::FieldRef;

/// Source of dimension values for predicate evaluation
pub trait FieldLookup {
    /// Value of a field, `None` when absent
    fn lookup(&self, field: &FieldRef) -> Option<Cow<'_, str>>;
}

/// Comparison operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Equals,
    NotEqual,
    Contains,
    NotContains,
    /// Value is null, missing, empty or `$none`
    IsMissing,
    /// Value is present and non-empty
    IsPresent,
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Compared as a string
    Text(String),
    /// Compared numerically when the field value parses
    Number { value: f64, text: String },
    /// No operand (`IsMissing`, `IsPresent`)
    None,
}

impl Operand {
    fn typed(value: &str, data_type: DataType) -> Self {
        match data_type {
            DataType::Numerical => match value.trim().parse::<f64>() {
                Ok(number) => Self::Number {
                    value: number,
                    text: value.to_string(),
                },
                Err(_) => Self::Text(value.to_string()),
            },
            DataType::Categorical => Self::Text(value.to_string()),
        }
    }

    fn text(&self) -> &str {
        match self {
            Self::Text(text) | Self::Number { text, .. } => text,
            Self::None => "",
        }
    }

    fn equals(&self, value: &str) -> bool {
        match self {
            Self::Number { value: number, text } => match value.trim().parse::<f64>() {
                Ok(parsed) => parsed == *number,
                Err(_) => value == text,
            },
            Self::Text(text) => value == text,
            Self::None => false,
        }
    }
}

/// A single field comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub field: FieldRef,
    pub operation: Operation,
    pub operand: Operand,
}

impl Comparison {
    /// Build a comparison from a filter condition and value
    pub fn new(field: FieldRef, condition: Condition, value: &str, data_type: DataType) -> Self {
        let none = value == NONE_VALUE;
        let (operation, operand) = match condition {
            Condition::Equals if none => (Operation::IsMissing, Operand::None),
            Condition::NotEqual if none => (Operation::IsPresent, Operand::None),
            Condition::Equals => (Operation::Equals, Operand::typed(value, data_type)),
            Condition::NotEqual => (Operation::NotEqual, Operand::typed(value, data_type)),
            Condition::Contains => (Operation::Contains, Operand::Text(value.to_string())),
            Condition::NotContains => (Operation::NotContains, Operand::Text(value.to_string())),
        };
        Self {
            field,
            operation,
            operand,
        }
    }

    /// Test a field value
    pub fn matches(&self, value: Option<&str>) -> bool {
        let present = value.filter(|v| !is_missing(v));

        match (self.operation, present) {
            (Operation::IsMissing, value) => value.is_none(),
            (Operation::IsPresent, value) => value.is_some(),
            (Operation::Equals, Some(v)) => self.operand.equals(v),
            (Operation::NotEqual, Some(v)) => !self.operand.equals(v),
            (Operation::Contains, Some(v)) => contains_ignore_case(v, self.operand.text()),
            (Operation::NotContains, Some(v)) => !contains_ignore_case(v, self.operand.text()),
            (Operation::Equals | Operation::Contains, None) => false,
            (Operation::NotEqual | Operation::NotContains, None) => true,
        }
    }
}

/// Whether a value counts as absent
pub fn is_missing(value: &str) -> bool {
    value.is_empty() || value == NONE_VALUE
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Comparisons that must all hold
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conjunction {
    pub comparisons: Vec<Comparison>,
}

impl Conjunction {
    fn evaluate(&self, record: &impl FieldLookup) -> bool {
        self.comparisons
            .iter()
            .all(|c| c.matches(record.lookup(&c.field).as_deref()))
    }
}

/// Disjunction of conjunctive groups; empty means always true
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub groups: Vec<Conjunction>,
}

impl Predicate {
    /// Compile filters in order
    ///
    /// `resolve` maps a filter's dimension to a field and its effective data
    /// type. The first filter's logical operator is ignored.
    pub fn compile<F>(filters: &[KpiFilter], mut resolve: F) -> Result<Self>
    where
        F: FnMut(&KpiFilter) -> Result<(FieldRef, DataType)>,
    {
        let mut groups: Vec<Conjunction> = Vec::new();

        for (i, filter) in filters.iter().enumerate() {
            let (field, data_type) = resolve(filter)?;
            let comparison = Comparison::new(field, filter.condition, &filter.value, data_type);

            let starts_group = i == 0 || filter.logical_op == LogicalOp::Or;
            if let Some(group) = groups.last_mut().filter(|_| !starts_group) {
                group.comparisons.push(comparison);
            } else {
                groups.push(Conjunction {
                    comparisons: vec![comparison],
                });
            }
        }

        Ok(Self { groups })
    }

    /// Whether the predicate accepts every record
    pub fn is_always(&self) -> bool {
        self.groups.is_empty()
    }

    /// Evaluate against a record
    pub fn evaluate(&self, record: &impl FieldLookup) -> bool {
        self.is_always() || self.groups.iter().any(|g| g.evaluate(record))
    }

    /// Every field the predicate reads
    pub fn fields(&self) -> impl Iterator<Item = &FieldRef> {
        self.groups
            .iter()
            .flat_map(|g| g.comparisons.iter().map(|c| &c.field))
    }
}

/// Text form of a raw document value, `None` for null
pub fn value_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        other => Some(Cow::Owned(other.to_string())),
    }
}

/// Native attributes of one entity
#[derive(Debug, Clone, Copy)]
pub struct Attributes<'a> {
    /// Raw document fields
    pub values: &'a Map<String, Value>,
    /// Channel label
    pub label: &'a str,
}

impl FieldLookup for Attributes<'_> {
    fn lookup(&self, field: &FieldRef) -> Option<Cow<'_, str>> {
        match field {
            FieldRef::Raw(name) => self.values.get(*name).and_then(value_text),
            FieldRef::Channel => Some(Cow::Borrowed(self.label)),
            FieldRef::Smart { .. } => None,
        }
    }
}

#[cfg(test)]
#[path = "predicate_test.rs"]
mod predicate_test;
