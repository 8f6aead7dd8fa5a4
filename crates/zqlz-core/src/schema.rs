//! Schema introspection traits and types

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Schema introspection interface
#[async_trait]
pub trait SchemaIntrospection: Send + Sync {
    /// List all tables (and table-like objects) in a schema
    async fn list_tables(&self, schema: Option<&str>) -> Result<Vec<TableInfo>>;

    /// Get columns for a table, in ordinal order
    async fn get_columns(&self, schema: Option<&str>, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Get primary key for a table
    async fn get_primary_key(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Option<PrimaryKeyInfo>>;
}

/// Table information (basic)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema: Option<String>,
    pub name: String,
    pub table_type: TableType,
    #[serde(default)]
    pub comment: Option<String>,
}

impl TableInfo {
    pub fn new(schema: Option<&str>, name: impl Into<String>, table_type: TableType) -> Self {
        Self {
            schema: schema.map(str::to_string),
            name: name.into(),
            table_type,
            comment: None,
        }
    }
}

/// Table type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableType {
    Table,
    View,
    MaterializedView,
    ForeignTable,
    Temporary,
    System,
}

impl TableType {
    /// Whether rows can be inserted into objects of this type
    pub fn is_data_manipulable(self) -> bool {
        matches!(
            self,
            TableType::Table | TableType::ForeignTable | TableType::Temporary
        )
    }
}

/// Column information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub ordinal: usize,
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub max_length: Option<i64>,
    pub precision: Option<i32>,
    pub scale: Option<i32>,
    pub is_primary_key: bool,
    pub is_auto_increment: bool,
    /// Pseudo-column maintained by the engine (e.g. SQLite `rowid`)
    #[serde(default)]
    pub is_hidden: bool,
    pub comment: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            ordinal,
            data_type: data_type.into(),
            nullable: true,
            default_value: None,
            max_length: None,
            precision: None,
            scale: None,
            is_primary_key: false,
            is_auto_increment: false,
            is_hidden: false,
            comment: None,
        }
    }

    pub fn with_length(mut self, max_length: i64) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.is_hidden = true;
        self
    }
}

/// Primary key information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKeyInfo {
    pub name: Option<String>,
    pub columns: Vec<String>,
}
