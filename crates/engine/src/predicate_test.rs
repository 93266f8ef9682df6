//! Tests for predicate compilation and evaluation

use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::QueryError;
use crate::predicate::{FieldLookup, Operation, Predicate};
use crate::query::{Condition, DataType, KpiFilter};
use crate::registry::FieldRef;

// =============================================================================
// Test Helpers
// =============================================================================

struct Record(HashMap<&'static str, &'static str>);

impl Record {
    fn new(fields: &[(&'static str, &'static str)]) -> Self {
        Self(fields.iter().copied().collect())
    }
}

impl FieldLookup for Record {
    fn lookup(&self, field: &FieldRef) -> Option<Cow<'_, str>> {
        match field {
            FieldRef::Raw(name) => self.0.get(name).map(|v| Cow::Borrowed(*v)),
            FieldRef::Channel => Some(Cow::Borrowed("Google Ads")),
            FieldRef::Smart { .. } => None,
        }
    }
}

fn raw(filter: &KpiFilter) -> crate::error::Result<(FieldRef, DataType)> {
    let field = match filter.property_name.as_str() {
        "name" => "campaign_name",
        "id" => "campaign_id",
        "clicks" => "clicks",
        other => {
            return Err(QueryError::unknown_dimension(
                "google_ads",
                &filter.object_type,
                other,
            ));
        }
    };
    Ok((FieldRef::Raw(field), filter.data_type))
}

fn name(condition: Condition, value: &str) -> KpiFilter {
    KpiFilter::new("campaign", "name", condition, value)
}

// =============================================================================
// Compilation
// =============================================================================

#[test]
fn test_empty_filters_always_match() {
    let predicate = Predicate::compile(&[], raw).unwrap();
    assert!(predicate.is_always());
    assert!(predicate.evaluate(&Record::new(&[])));
}

#[test]
fn test_or_starts_new_group() {
    let filters = vec![
        name(Condition::Contains, "brand"),
        KpiFilter::new("campaign", "id", Condition::Equals, "1"),
        name(Condition::Contains, "generic").or(),
        KpiFilter::new("campaign", "id", Condition::Equals, "$none"),
    ];
    let predicate = Predicate::compile(&filters, raw).unwrap();

    assert_eq!(predicate.groups.len(), 2);
    assert_eq!(predicate.groups[0].comparisons.len(), 2);
    assert_eq!(
        predicate.groups[1].comparisons[1].operation,
        Operation::IsMissing
    );
}

#[test]
fn test_first_logical_operator_ignored() {
    let filters = vec![name(Condition::Contains, "brand").or()];
    let predicate = Predicate::compile(&filters, raw).unwrap();
    assert_eq!(predicate.groups.len(), 1);
}

#[test]
fn test_unknown_dimension_fails_compile() {
    let filters = vec![KpiFilter::new("campaign", "budget", Condition::Equals, "1")];
    let err = Predicate::compile(&filters, raw).unwrap_err();
    assert!(matches!(err, QueryError::UnknownDimension { .. }));
}

// =============================================================================
// Evaluation
// =============================================================================

#[test]
fn test_or_of_and_groups() {
    let filters = vec![
        name(Condition::Contains, "brand"),
        KpiFilter::new("campaign", "id", Condition::Equals, "1"),
        name(Condition::Contains, "generic").or(),
    ];
    let predicate = Predicate::compile(&filters, raw).unwrap();

    let brand_1 = Record::new(&[("campaign_name", "Brand US"), ("campaign_id", "1")]);
    let brand_2 = Record::new(&[("campaign_name", "Brand US"), ("campaign_id", "2")]);
    let generic = Record::new(&[("campaign_name", "Generic"), ("campaign_id", "2")]);

    assert!(predicate.evaluate(&brand_1));
    assert!(!predicate.evaluate(&brand_2));
    assert!(predicate.evaluate(&generic));
}

#[test]
fn test_contains_is_case_insensitive() {
    let predicate = Predicate::compile(&[name(Condition::Contains, "BRAND")], raw).unwrap();
    assert!(predicate.evaluate(&Record::new(&[("campaign_name", "my brand")])));

    let predicate = Predicate::compile(&[name(Condition::NotContains, "brand")], raw).unwrap();
    assert!(!predicate.evaluate(&Record::new(&[("campaign_name", "Brand")])));
    assert!(predicate.evaluate(&Record::new(&[])));
}

#[test]
fn test_none_partitions_records() {
    let missing = Predicate::compile(&[name(Condition::Equals, "$none")], raw).unwrap();
    let present = Predicate::compile(&[name(Condition::NotEqual, "$none")], raw).unwrap();

    let records = [
        Record::new(&[("campaign_name", "Brand")]),
        Record::new(&[("campaign_name", "")]),
        Record::new(&[("campaign_name", "$none")]),
        Record::new(&[]),
    ];
    for record in &records {
        assert_ne!(missing.evaluate(record), present.evaluate(record));
    }
    assert!(present.evaluate(&records[0]));
    assert!(missing.evaluate(&records[3]));
}

#[test]
fn test_not_equal_matches_missing_values() {
    let predicate = Predicate::compile(&[name(Condition::NotEqual, "Brand")], raw).unwrap();
    assert!(predicate.evaluate(&Record::new(&[])));
    assert!(!predicate.evaluate(&Record::new(&[("campaign_name", "Brand")])));
}

#[test]
fn test_numerical_equality() {
    let filter = KpiFilter::new("campaign", "clicks", Condition::Equals, "10")
        .with_data_type(DataType::Numerical);
    let predicate = Predicate::compile(&[filter], raw).unwrap();

    assert!(predicate.evaluate(&Record::new(&[("clicks", "10.0")])));
    assert!(!predicate.evaluate(&Record::new(&[("clicks", "11")])));
    assert!(!predicate.evaluate(&Record::new(&[("clicks", "ten")])));
}

#[test]
fn test_categorical_equality_is_exact() {
    let predicate = Predicate::compile(
        &[KpiFilter::new("campaign", "clicks", Condition::Equals, "10")],
        raw,
    )
    .unwrap();
    assert!(!predicate.evaluate(&Record::new(&[("clicks", "10.0")])));
    assert!(predicate.evaluate(&Record::new(&[("clicks", "10")])));
}
