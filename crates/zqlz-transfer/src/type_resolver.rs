//! Type compatibility resolution between source columns and a target catalog
//!
//! Resolution never fails: when nothing in the target catalog fits, the
//! source type name is passed through and the user corrects it by setting an
//! explicit target type on the column mapping.

use zqlz_core::{DataKind, DataTypeInfo};

use crate::SourceAttribute;

const DOUBLE_ALIAS: &str = "DOUBLE";
const DOUBLE_LONG_FORM: &str = "DOUBLE PRECISION";

/// Compute the DDL type for a column created in the target.
///
/// `explicit` is the user override and wins unconditionally. `catalog` is the
/// target's local type catalog, `None` for sinks that expose no types.
pub fn resolve_target_type(
    source: &SourceAttribute,
    explicit: Option<&str>,
    catalog: Option<&[DataTypeInfo]>,
) -> String {
    if let Some(explicit) = explicit {
        return explicit.to_string();
    }

    let Some(catalog) = catalog else {
        let modifiers = type_modifiers(source, &source.type_name, None);
        return format!("{}{}", source.type_name, modifiers);
    };

    let mut found = find_type(catalog, &source.type_name);
    if found.is_none() && source.type_name.eq_ignore_ascii_case(DOUBLE_ALIAS) {
        found = find_type(catalog, DOUBLE_LONG_FORM);
    }
    if let Some(target) = found {
        if source.data_kind != DataKind::Unknown && target.data_kind() != source.data_kind {
            tracing::debug!(
                column = %source.name,
                source_type = %source.type_name,
                target_type = %target.name,
                "ignoring target type with mismatched data kind"
            );
            found = None;
        }
    }

    match found.or_else(|| find_type_by_kind(catalog, source.data_kind)) {
        Some(target) => {
            let modifiers = type_modifiers(source, &target.name, Some(target));
            format!("{}{}", target.name, modifiers)
        }
        None => {
            let modifiers = type_modifiers(source, &source.type_name, None);
            format!("{}{}", source.type_name, modifiers)
        }
    }
}

fn find_type<'a>(catalog: &'a [DataTypeInfo], name: &str) -> Option<&'a DataTypeInfo> {
    catalog.iter().find(|t| t.matches_name(name.trim()))
}

/// Prefer the kind's standard type name, then the first type of that kind in
/// catalog order.
fn find_type_by_kind(catalog: &[DataTypeInfo], kind: DataKind) -> Option<&DataTypeInfo> {
    if kind == DataKind::Unknown {
        return None;
    }
    let standard = kind.standard_type_name();
    let of_kind = || catalog.iter().filter(move |t| t.data_kind() == kind);
    of_kind()
        .find(|t| t.matches_name(standard))
        .or_else(|| of_kind().next())
}

/// Length or precision clause for `type_name`, empty when none applies.
///
/// With a catalog entry the type's own capabilities decide; without one the
/// decision falls back to the source kind and well-known decimal names.
fn type_modifiers(
    source: &SourceAttribute,
    type_name: &str,
    target: Option<&DataTypeInfo>,
) -> String {
    if type_name.contains('(') {
        return String::new();
    }

    let kind = target.map(DataTypeInfo::data_kind).unwrap_or(source.data_kind);
    match kind {
        DataKind::String | DataKind::Binary => {
            let accepts_length = match target {
                Some(t) => t.accepts_length,
                None => kind == DataKind::String,
            };
            match source.max_length {
                Some(length) if accepts_length && length > 0 => {
                    let length = match target.and_then(|t| t.max_length) {
                        Some(max) => u64::try_from(length).unwrap_or(max).min(max),
                        None => u64::try_from(length).unwrap_or_default(),
                    };
                    format!("({length})")
                }
                _ => String::new(),
            }
        }
        DataKind::Numeric => {
            let accepts_scale = match target {
                Some(t) => t.accepts_scale,
                None => ["DECIMAL", "NUMERIC", "NUMBER"]
                    .iter()
                    .any(|n| type_name.eq_ignore_ascii_case(n)),
            };
            match (source.precision, source.scale) {
                (Some(precision), scale) if accepts_scale && precision >= 0 => {
                    let scale = scale.unwrap_or(0);
                    if (precision == 0 && scale == 0) || scale < 0 {
                        String::new()
                    } else {
                        format!("({precision},{scale})")
                    }
                }
                _ => String::new(),
            }
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests;
