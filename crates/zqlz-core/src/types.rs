//! Core value and result types

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DataKind;

/// A database value that can represent any SQL type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    /// Decimal/Numeric kept as text to preserve precision
    Decimal(String),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeUtc(DateTime<Utc>),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

impl Value {
    /// Integer view of the value, parsing strings when needed
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::Decimal(s) | Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Coarse classification of the runtime value.
    ///
    /// `Null` carries no type information and classifies as [`DataKind::Unknown`].
    pub fn data_kind(&self) -> DataKind {
        match self {
            Value::Null => DataKind::Unknown,
            Value::Bool(_) => DataKind::Boolean,
            Value::Int16(_)
            | Value::Int32(_)
            | Value::Int64(_)
            | Value::Float64(_)
            | Value::Decimal(_) => DataKind::Numeric,
            Value::String(_) | Value::Uuid(_) => DataKind::String,
            Value::Bytes(_) => DataKind::Binary,
            Value::Date(_) | Value::Time(_) | Value::DateTime(_) | Value::DateTimeUtc(_) => {
                DataKind::DateTime
            }
            Value::Json(_) => DataKind::Content,
            Value::Array(_) => DataKind::Array,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Decimal(v) | Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Uuid(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v),
            Value::Time(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::DateTimeUtc(v) => write!(f, "{}", v),
            Value::Json(v) => write!(f, "{}", v),
            Value::Array(v) => write!(f, "[{} items]", v.len()),
        }
    }
}

/// A row from a query result
#[derive(Debug, Clone)]
pub struct Row {
    pub values: Vec<Value>,
    columns: Vec<String>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Result-set column metadata
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ColumnMeta {
    #[serde(default)]
    pub name: String,
    /// Declared type as reported by the driver
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
    /// 0-based position in the result set
    #[serde(default)]
    pub ordinal: usize,
    #[serde(default)]
    pub max_length: Option<i64>,
    #[serde(default)]
    pub precision: Option<i32>,
    #[serde(default)]
    pub scale: Option<i32>,
    /// Driver pseudo-column (ROWID, ctid and similar)
    #[serde(default)]
    pub hidden: bool,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            ordinal,
            ..Default::default()
        }
    }
}

/// Query result
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub id: Uuid,
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Row>,
    /// Rows affected (for DML statements)
    pub affected_rows: u64,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: 0,
            execution_time_ms: 0,
        }
    }

    /// Build a result from column metadata and raw value rows
    pub fn from_rows(columns: Vec<ColumnMeta>, rows: Vec<Vec<Value>>) -> Self {
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        Self {
            rows: rows
                .into_iter()
                .map(|values| Row::new(names.clone(), values))
                .collect(),
            columns,
            ..Self::empty()
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Result of a single executed statement
#[derive(Debug, Clone, Default)]
pub struct StatementResult {
    /// Whether the statement produced a result set
    pub is_query: bool,
    pub result: Option<QueryResult>,
    pub affected_rows: u64,
    pub error: Option<String>,
}

impl StatementResult {
    pub fn affected(rows: u64) -> Self {
        Self {
            affected_rows: rows,
            ..Default::default()
        }
    }
}
