use pretty_assertions::assert_eq;
use zqlz_core::{DataKind, DataTypeCategory, DataTypeInfo};

use super::*;
use crate::test_support::{catalog_dialect, plain_dialect};

fn attr(declared: &str) -> SourceAttribute {
    SourceAttribute::from_declared_type("col", declared, 0, &plain_dialect())
}

fn resolve(declared: &str, catalog: &[DataTypeInfo]) -> String {
    resolve_target_type(&attr(declared), None, Some(catalog))
}

#[test]
fn test_explicit_override_wins() {
    let catalog = catalog_dialect().data_types;
    let resolved = resolve_target_type(&attr("VARCHAR(50)"), Some("jsonb"), Some(catalog.as_slice()));
    assert_eq!(resolved, "jsonb");

    let resolved = resolve_target_type(&attr("INTEGER"), Some("MY_TYPE(3)"), None);
    assert_eq!(resolved, "MY_TYPE(3)");
}

#[test]
fn test_exact_name_match() {
    let catalog = catalog_dialect().data_types;
    assert_eq!(resolve("INTEGER", &catalog), "INTEGER");
    assert_eq!(resolve("int", &catalog), "INTEGER");
    assert_eq!(resolve("VARCHAR(50)", &catalog), "VARCHAR(50)");
    assert_eq!(resolve("timestamp", &catalog), "TIMESTAMP");
}

#[test]
fn test_double_retries_long_form() {
    let catalog = catalog_dialect().data_types;
    let source = attr("DOUBLE");
    assert_eq!(source.data_kind, DataKind::Numeric);
    assert_eq!(resolve_target_type(&source, None, Some(catalog.as_slice())), "DOUBLE PRECISION");
}

#[test]
fn test_kind_mismatch_on_name_match_falls_back_to_kind() {
    // MySQL-style catalog where BOOLEAN is only an alias of an integer type
    let catalog = vec![
        DataTypeInfo::new("TINYINT", DataTypeCategory::Integer).with_alias("BOOLEAN"),
        DataTypeInfo::new("BIT", DataTypeCategory::Boolean),
    ];
    let source = attr("BOOLEAN");
    assert_eq!(source.data_kind, DataKind::Boolean);
    assert_eq!(resolve_target_type(&source, None, Some(catalog.as_slice())), "BIT");
}

#[test]
fn test_kind_fallback_prefers_standard_name() {
    let catalog = catalog_dialect().data_types;
    assert_eq!(resolve("NVARCHAR2(20)", &catalog), "VARCHAR(20)");
    assert_eq!(resolve("DECIMAL(12,4)", &catalog), "NUMERIC(12,4)");
    assert_eq!(resolve("DATETIME2", &catalog), "TIMESTAMP");
}

#[test]
fn test_kind_fallback_takes_first_of_kind_in_catalog_order() {
    let catalog = vec![
        DataTypeInfo::new("INTEGER", DataTypeCategory::Integer),
        DataTypeInfo::new("TEXT", DataTypeCategory::String),
        DataTypeInfo::new("CHARACTER VARYING", DataTypeCategory::String).with_length(None, None),
    ];
    assert_eq!(resolve("NVARCHAR2(20)", &catalog), "TEXT");
}

#[test]
fn test_no_match_of_kind_passes_source_name_through() {
    let catalog = vec![DataTypeInfo::new("INTEGER", DataTypeCategory::Integer)];
    assert_eq!(resolve("VARCHAR(30)", &catalog), "VARCHAR(30)");
}

#[test]
fn test_without_catalog_source_name_plus_modifiers() {
    assert_eq!(resolve_target_type(&attr("INTEGER"), None, None), "INTEGER");
    assert_eq!(resolve_target_type(&attr("VARCHAR(50)"), None, None), "VARCHAR(50)");
    assert_eq!(resolve_target_type(&attr("NUMERIC(10,2)"), None, None), "NUMERIC(10,2)");
    // Precision is only emitted for decimal names
    assert_eq!(resolve_target_type(&attr("FLOAT(24)"), None, None), "FLOAT");
}

#[test]
fn test_length_clamped_to_type_maximum() {
    let catalog = catalog_dialect().data_types;
    assert_eq!(resolve("VARCHAR(10000)", &catalog), "VARCHAR(4000)");
}

#[test]
fn test_length_dropped_for_types_without_length() {
    let catalog = catalog_dialect().data_types;
    assert_eq!(resolve("TEXT", &catalog), "TEXT");
    let mut source = attr("TEXT");
    source.max_length = Some(65535);
    assert_eq!(resolve_target_type(&source, None, Some(catalog.as_slice())), "TEXT");
}

#[test]
fn test_zero_precision_and_scale_omitted() {
    let catalog = catalog_dialect().data_types;
    assert_eq!(resolve("NUMERIC(0,0)", &catalog), "NUMERIC");
    assert_eq!(resolve("NUMERIC(8)", &catalog), "NUMERIC(8,0)");
}
