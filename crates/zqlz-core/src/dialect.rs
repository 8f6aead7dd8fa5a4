//! SQL Dialect Metadata
//!
//! Drivers describe their dialect through [`DialectInfo`]: the local data type
//! catalog, identifier quoting and case rules, paging syntax and parameter
//! placeholders. Code that generates SQL for an arbitrary target consumes this
//! metadata instead of branching on driver names.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Coarse classification of a data type used to judge compatibility across
/// databases.
///
/// Two types with the same kind can hold each other's values after at most a
/// length or precision adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Boolean,
    Numeric,
    String,
    DateTime,
    Binary,
    /// Large structured content (JSON, XML, LOBs)
    Content,
    Array,
    /// Engine-specific structured types (geometry, intervals, ranges)
    Object,
    Unknown,
}

impl DataKind {
    /// Standard SQL type name conventionally used for this kind
    pub fn standard_type_name(self) -> &'static str {
        match self {
            DataKind::Boolean => "BOOLEAN",
            DataKind::Numeric => "NUMERIC",
            DataKind::String => "VARCHAR",
            DataKind::DateTime => "TIMESTAMP",
            DataKind::Binary | DataKind::Content => "BLOB",
            DataKind::Array | DataKind::Object | DataKind::Unknown => "VARCHAR",
        }
    }

    /// Classify a declared type name when no catalog entry is available.
    ///
    /// Only the base name is considered: `VARCHAR(50)` and `varchar` classify
    /// the same way.
    pub fn from_type_name(type_name: &str) -> DataKind {
        let upper = type_name.trim().to_uppercase();
        if upper.ends_with("[]") || upper.starts_with("ARRAY") {
            return DataKind::Array;
        }
        let base = upper.split('(').next().unwrap_or_default().trim();
        if base.is_empty() {
            return DataKind::Unknown;
        }

        let has = |needle: &str| base.contains(needle);
        if has("BOOL") || base == "BIT" {
            DataKind::Boolean
        } else if has("INTERVAL") {
            DataKind::Object
        } else if has("DATE") || has("TIME") {
            DataKind::DateTime
        } else if has("CLOB") || has("JSON") || has("XML") {
            DataKind::Content
        } else if has("CHAR") || has("TEXT") || has("STRING") || has("UUID") || has("ENUM") {
            DataKind::String
        } else if (has("INT") && !has("POINT"))
            || has("SERIAL")
            || has("NUMERIC")
            || has("DECIMAL")
            || has("NUMBER")
            || has("REAL")
            || has("FLOAT")
            || has("DOUBLE")
            || has("MONEY")
        {
            DataKind::Numeric
        } else if has("BLOB") || has("BINARY") || has("BYTEA") || has("IMAGE") || base == "RAW" {
            DataKind::Binary
        } else {
            DataKind::Object
        }
    }
}

/// Information about a SQL data type
#[derive(Debug, Clone)]
pub struct DataTypeInfo {
    /// Type name as used in DDL (e.g., "VARCHAR", "INTEGER")
    pub name: Cow<'static, str>,
    /// Aliases (e.g., "INT" for "INTEGER")
    pub aliases: Vec<Cow<'static, str>>,
    pub category: DataTypeCategory,
    /// Whether this type accepts a length parameter
    pub accepts_length: bool,
    /// Whether this type accepts precision and scale
    pub accepts_scale: bool,
    pub default_length: Option<u32>,
    /// Upper bound for the length parameter
    pub max_length: Option<u64>,
}

impl DataTypeInfo {
    pub const fn new(name: &'static str, category: DataTypeCategory) -> Self {
        Self {
            name: Cow::Borrowed(name),
            aliases: Vec::new(),
            category,
            accepts_length: false,
            accepts_scale: false,
            default_length: None,
            max_length: None,
        }
    }

    pub fn with_length(mut self, default: Option<u32>, max: Option<u64>) -> Self {
        self.accepts_length = true;
        self.default_length = default;
        self.max_length = max;
        self
    }

    pub fn with_scale(mut self) -> Self {
        self.accepts_scale = true;
        self
    }

    pub fn with_alias(mut self, alias: &'static str) -> Self {
        self.aliases.push(Cow::Borrowed(alias));
        self
    }

    pub fn data_kind(&self) -> DataKind {
        self.category.data_kind()
    }

    /// Case-insensitive match against the name and aliases
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

/// Categories of SQL data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataTypeCategory {
    Integer,
    Float,
    Decimal,
    String,
    Binary,
    Boolean,
    Date,
    Time,
    DateTime,
    Interval,
    Json,
    Array,
    Uuid,
    Network,
    Geometry,
    Other,
}

impl DataTypeCategory {
    pub fn data_kind(self) -> DataKind {
        match self {
            DataTypeCategory::Integer | DataTypeCategory::Float | DataTypeCategory::Decimal => {
                DataKind::Numeric
            }
            DataTypeCategory::String | DataTypeCategory::Uuid | DataTypeCategory::Network => {
                DataKind::String
            }
            DataTypeCategory::Binary => DataKind::Binary,
            DataTypeCategory::Boolean => DataKind::Boolean,
            DataTypeCategory::Date | DataTypeCategory::Time | DataTypeCategory::DateTime => {
                DataKind::DateTime
            }
            DataTypeCategory::Json => DataKind::Content,
            DataTypeCategory::Array => DataKind::Array,
            DataTypeCategory::Interval | DataTypeCategory::Geometry | DataTypeCategory::Other => {
                DataKind::Object
            }
        }
    }
}

/// Case in which the engine stores unquoted identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentifierCase {
    Upper,
    Lower,
    /// Stored as written
    #[default]
    Mixed,
}

/// How a bounded read is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PagingStyle {
    /// `LIMIT n OFFSET m`
    #[default]
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch,
}

/// Positional parameter placeholder syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderStyle {
    /// `?`
    #[default]
    Question,
    /// `$1`, `$2`, ...
    Dollar,
    /// `@P1`, `@P2`, ...
    AtP,
}

/// Dialect information provided by a driver
#[derive(Debug, Clone)]
pub struct DialectInfo {
    /// Dialect identifier (e.g., "sqlite", "postgresql")
    pub id: Cow<'static, str>,
    pub display_name: Cow<'static, str>,
    /// Local type catalog, in the driver's preferred order
    pub data_types: Vec<DataTypeInfo>,
    /// Identifier quote character (e.g., '"' for SQL standard, '`' for MySQL)
    pub identifier_quote: char,
    pub case_sensitive_identifiers: bool,
    pub identifier_case: IdentifierCase,
    /// Separator between schema and object name
    pub catalog_separator: Cow<'static, str>,
    /// Whether column definitions accept `NOT NULL`
    pub supports_nullability: bool,
    /// Whether `TRUNCATE TABLE` is available (otherwise `DELETE FROM` is used)
    pub supports_truncate: bool,
    pub paging_style: PagingStyle,
    pub placeholder_style: PlaceholderStyle,
}

impl Default for DialectInfo {
    fn default() -> Self {
        Self {
            id: Cow::Borrowed("generic"),
            display_name: Cow::Borrowed("SQL"),
            data_types: Vec::new(),
            identifier_quote: '"',
            case_sensitive_identifiers: false,
            identifier_case: IdentifierCase::Mixed,
            catalog_separator: Cow::Borrowed("."),
            supports_nullability: true,
            supports_truncate: true,
            paging_style: PagingStyle::LimitOffset,
            placeholder_style: PlaceholderStyle::Question,
        }
    }
}

impl DialectInfo {
    /// Get data types whose category falls into `kind`, in catalog order
    pub fn data_types_by_kind(&self, kind: DataKind) -> impl Iterator<Item = &DataTypeInfo> {
        self.data_types
            .iter()
            .filter(move |t| t.data_kind() == kind)
    }

    /// Look up a catalog type by name or alias (case-insensitive)
    pub fn find_data_type(&self, name: &str) -> Option<&DataTypeInfo> {
        let name = name.trim();
        self.data_types.iter().find(|t| t.matches_name(name))
    }

    /// Whether the driver exposes a local type catalog at all
    pub fn has_type_catalog(&self) -> bool {
        !self.data_types.is_empty()
    }

    /// Quote an identifier if it would not survive unquoted.
    ///
    /// Names that are plain identifiers already in the stored case are
    /// returned as-is.
    pub fn quote_identifier(&self, name: &str) -> String {
        if self.is_plain_identifier(name) {
            return name.to_string();
        }
        let quote = self.identifier_quote;
        let escaped = name.replace(quote, &format!("{quote}{quote}"));
        format!("{quote}{escaped}{quote}")
    }

    /// Transform an unquoted name into the case the engine stores it in
    pub fn transform_name(&self, name: &str) -> String {
        match self.identifier_case {
            IdentifierCase::Upper => name.to_uppercase(),
            IdentifierCase::Lower => name.to_lowercase(),
            IdentifierCase::Mixed => name.to_string(),
        }
    }

    /// Remove surrounding identifier quotes, if any
    pub fn unquote_identifier<'a>(&self, name: &'a str) -> Cow<'a, str> {
        let quote = self.identifier_quote;
        if name.len() >= 2 && name.starts_with(quote) && name.ends_with(quote) {
            let inner = &name[quote.len_utf8()..name.len() - quote.len_utf8()];
            Cow::Owned(inner.replace(&format!("{quote}{quote}"), &quote.to_string()))
        } else {
            Cow::Borrowed(name)
        }
    }

    /// Schema-qualified, quoted object name
    pub fn qualified_name(&self, schema: Option<&str>, name: &str) -> String {
        match schema {
            Some(schema) if !schema.is_empty() => format!(
                "{}{}{}",
                self.quote_identifier(schema),
                self.catalog_separator,
                self.quote_identifier(name)
            ),
            _ => self.quote_identifier(name),
        }
    }

    /// Placeholder for the 1-based parameter `index`
    pub fn placeholder(&self, index: usize) -> String {
        match self.placeholder_style {
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::Dollar => format!("${index}"),
            PlaceholderStyle::AtP => format!("@P{index}"),
        }
    }

    /// Paging clause appended to a `SELECT` for a bounded read
    pub fn paging_clause(&self, offset: u64, limit: u64) -> String {
        match self.paging_style {
            PagingStyle::LimitOffset if offset == 0 => format!("LIMIT {limit}"),
            PagingStyle::LimitOffset => format!("LIMIT {limit} OFFSET {offset}"),
            PagingStyle::OffsetFetch => {
                format!("OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY")
            }
        }
    }

    fn is_plain_identifier(&self, name: &str) -> bool {
        let mut chars = name.chars();
        let Some(first) = chars.next() else {
            return false;
        };
        if !(first.is_ascii_alphabetic() || first == '_') {
            return false;
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return false;
        }
        match self.identifier_case {
            IdentifierCase::Upper => !name.chars().any(|c| c.is_ascii_lowercase()),
            IdentifierCase::Lower => !name.chars().any(|c| c.is_ascii_uppercase()),
            IdentifierCase::Mixed => true,
        }
    }
}
