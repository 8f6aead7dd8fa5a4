//! DDL for target objects created by a transfer

use zqlz_core::{DataTypeInfo, DialectInfo};

use crate::{ColumnMapping, MappingKind, TableMapping, TargetTable};

/// Quoted target name of a create-new column, in the dialect's stored case
pub fn target_column_name(dialect: &DialectInfo, column: &ColumnMapping) -> String {
    dialect.quote_identifier(&dialect.transform_name(column.effective_target_name()))
}

/// `CREATE TABLE` statement for a create-new table mapping.
///
/// Only create-new columns are emitted. A primary key is declared when every
/// column of the source identifier is among them.
pub fn create_table_sql(
    dialect: &DialectInfo,
    catalog: Option<&[DataTypeInfo]>,
    schema: Option<&str>,
    mapping: &TableMapping,
    identifier_columns: &[String],
) -> String {
    let table_name = dialect.qualified_name(schema, &dialect.transform_name(mapping.target_name()));
    let created: Vec<&ColumnMapping> = mapping
        .columns()
        .iter()
        .filter(|c| c.kind() == MappingKind::Create)
        .collect();

    let mut sql = format!("CREATE TABLE {}(\n", table_name);
    let definitions: Vec<String> = created
        .iter()
        .map(|column| format!("\t{}", column_clause(dialect, catalog, column)))
        .collect();
    sql.push_str(&definitions.join(",\n"));

    if !identifier_columns.is_empty() {
        let key_columns: Option<Vec<String>> = identifier_columns
            .iter()
            .map(|id| {
                created
                    .iter()
                    .find(|c| c.source_name().eq_ignore_ascii_case(id))
                    .map(|c| target_column_name(dialect, c))
            })
            .collect();
        if let Some(key_columns) = key_columns {
            sql.push_str(&format!(",\n\tPRIMARY KEY ({})", key_columns.join(",")));
        }
    }

    sql.push_str("\n)");
    sql
}

/// `ALTER TABLE ... ADD` statement for a create-new column of an existing table
pub fn add_column_sql(
    dialect: &DialectInfo,
    catalog: Option<&[DataTypeInfo]>,
    table: &TargetTable,
    column: &ColumnMapping,
) -> String {
    format!(
        "ALTER TABLE {} ADD {}",
        dialect.qualified_name(table.schema(), table.name()),
        column_clause(dialect, catalog, column)
    )
}

fn column_clause(
    dialect: &DialectInfo,
    catalog: Option<&[DataTypeInfo]>,
    column: &ColumnMapping,
) -> String {
    let mut clause = format!(
        "{} {}",
        target_column_name(dialect, column),
        column.target_type(catalog)
    );
    if dialect.supports_nullability && column.source().required {
        clause.push_str(" NOT NULL");
    }
    clause
}
