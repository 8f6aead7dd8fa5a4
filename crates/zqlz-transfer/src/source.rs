//! Source containers: stored tables and ad hoc queries

use std::sync::Arc;

use async_trait::async_trait;
use zqlz_core::{ColumnInfo, ColumnMeta, DataKind, DialectInfo, Row, SchemaIntrospection, TableInfo, ZqlzError};

use crate::{DataConsumer, DataSource, TransferMonitor, TransferResult, TransferSession};

/// Column metadata of a transfer source, normalized across tables and queries
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAttribute {
    pub name: String,
    /// Declared type name without modifiers (`VARCHAR`, not `VARCHAR(50)`)
    pub type_name: String,
    pub data_kind: DataKind,
    pub max_length: Option<i64>,
    pub precision: Option<i32>,
    pub scale: Option<i32>,
    /// Declared `NOT NULL`
    pub required: bool,
    pub ordinal: usize,
}

impl SourceAttribute {
    /// Build from introspected table column metadata
    pub fn from_column_info(column: &ColumnInfo, dialect: &DialectInfo) -> Self {
        let mut attr = Self::from_declared_type(&column.name, &column.data_type, column.ordinal, dialect);
        attr.max_length = column.max_length.or(attr.max_length);
        attr.precision = column.precision.or(attr.precision);
        attr.scale = column.scale.or(attr.scale);
        attr.required = !column.nullable;
        attr
    }

    /// Build from result-set metadata
    pub fn from_column_meta(column: &ColumnMeta, dialect: &DialectInfo) -> Self {
        let mut attr = Self::from_declared_type(&column.name, &column.data_type, column.ordinal, dialect);
        attr.max_length = column.max_length.or(attr.max_length);
        attr.precision = column.precision.or(attr.precision);
        attr.scale = column.scale.or(attr.scale);
        attr.required = !column.nullable;
        attr
    }

    /// Split a declared type such as `NUMERIC(10,2)` into its base name and
    /// modifiers, classifying the base through the source dialect's catalog.
    pub fn from_declared_type(
        name: &str,
        declared_type: &str,
        ordinal: usize,
        dialect: &DialectInfo,
    ) -> Self {
        let (type_name, modifiers) = split_type_modifiers(declared_type);
        let data_kind = dialect
            .find_data_type(&type_name)
            .map(|t| t.data_kind())
            .unwrap_or_else(|| DataKind::from_type_name(&type_name));

        let (mut max_length, mut precision, mut scale) = (None, None, None);
        match (data_kind, modifiers.as_slice()) {
            (DataKind::Numeric, [p, rest @ ..]) => {
                precision = i32::try_from(*p).ok();
                scale = rest.first().and_then(|s| i32::try_from(*s).ok());
            }
            (_, [len, ..]) => max_length = Some(*len),
            _ => {}
        }

        Self {
            name: name.to_string(),
            type_name,
            data_kind,
            max_length,
            precision,
            scale,
            required: false,
            ordinal,
        }
    }
}

fn split_type_modifiers(declared: &str) -> (String, Vec<i64>) {
    let declared = declared.trim();
    match declared.find('(') {
        Some(open) => {
            let close = declared[open..].find(')').map(|c| open + c);
            let inner = match close {
                Some(close) => &declared[open + 1..close],
                None => &declared[open + 1..],
            };
            let modifiers = inner
                .split(',')
                .filter_map(|part| part.trim().parse::<i64>().ok())
                .collect();
            let mut base = declared[..open].trim().to_string();
            if let Some(close) = close {
                let suffix = declared[close + 1..].trim();
                if !suffix.is_empty() {
                    base.push(' ');
                    base.push_str(suffix);
                }
            }
            (base, modifiers)
        }
        None => (declared.to_string(), Vec::new()),
    }
}

/// What kind of object a source container is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// A persisted table or view with introspectable attributes
    Table,
    /// An ad hoc query whose shape is only known from result metadata
    Query,
}

/// Something rows can be read from.
///
/// Reads push rows into a [`DataConsumer`]: one `fetch_start`, a `fetch_row`
/// per row and one `fetch_end` per `read_data` call.
#[async_trait]
pub trait DataContainer: Send + Sync {
    /// Stable identity, used to key mappings
    fn full_name(&self) -> String;

    /// Short name, used as the default target table name
    fn name(&self) -> &str;

    fn kind(&self) -> ContainerKind;

    fn data_source(&self) -> &Arc<dyn DataSource>;

    /// Whether reads must run in manual-commit mode even on a shared connection
    fn forces_transactional_read(&self) -> bool {
        false
    }

    /// Visible attributes in ordinal order; pseudo columns are excluded
    async fn attributes(&self, monitor: &TransferMonitor) -> TransferResult<Vec<SourceAttribute>>;

    /// Columns of the best unique identifier, empty when there is none
    async fn identifier_columns(&self, _monitor: &TransferMonitor) -> TransferResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn count_data(&self, session: &mut TransferSession) -> TransferResult<u64>;

    /// Read rows `offset..offset + limit` (unbounded when `limit` is `None`)
    /// into `consumer`, returning the number of rows delivered.
    async fn read_data(
        &self,
        session: &mut TransferSession,
        consumer: &mut dyn DataConsumer,
        offset: u64,
        limit: Option<u64>,
    ) -> TransferResult<u64>;
}

/// A stored table in the source database
pub struct TableSource {
    data_source: Arc<dyn DataSource>,
    table: TableInfo,
}

impl TableSource {
    pub fn new(data_source: Arc<dyn DataSource>, table: TableInfo) -> Self {
        Self { data_source, table }
    }

    pub fn table(&self) -> &TableInfo {
        &self.table
    }

    fn qualified_name(&self) -> String {
        self.data_source
            .dialect()
            .qualified_name(self.table.schema.as_deref(), &self.table.name)
    }
}

#[async_trait]
impl DataContainer for TableSource {
    fn full_name(&self) -> String {
        match &self.table.schema {
            Some(schema) => format!("{}.{}.{}", self.data_source.name(), schema, self.table.name),
            None => format!("{}.{}", self.data_source.name(), self.table.name),
        }
    }

    fn name(&self) -> &str {
        &self.table.name
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::Table
    }

    fn data_source(&self) -> &Arc<dyn DataSource> {
        &self.data_source
    }

    async fn attributes(&self, monitor: &TransferMonitor) -> TransferResult<Vec<SourceAttribute>> {
        monitor.check_cancelled()?;
        monitor.sub_task(format!("Read attributes of {}", self.table.name));
        let connection = self.data_source.default_connection();
        let columns = introspection(connection.as_schema_introspection())?
            .get_columns(self.table.schema.as_deref(), &self.table.name)
            .await?;
        let dialect = self.data_source.dialect();
        Ok(columns
            .iter()
            .filter(|c| !c.is_hidden)
            .map(|c| SourceAttribute::from_column_info(c, dialect))
            .collect())
    }

    async fn identifier_columns(&self, monitor: &TransferMonitor) -> TransferResult<Vec<String>> {
        monitor.check_cancelled()?;
        let connection = self.data_source.default_connection();
        let primary_key = introspection(connection.as_schema_introspection())?
            .get_primary_key(self.table.schema.as_deref(), &self.table.name)
            .await?;
        Ok(primary_key.map(|pk| pk.columns).unwrap_or_default())
    }

    async fn count_data(&self, session: &mut TransferSession) -> TransferResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.qualified_name());
        count_rows(session, &sql).await
    }

    async fn read_data(
        &self,
        session: &mut TransferSession,
        consumer: &mut dyn DataConsumer,
        offset: u64,
        limit: Option<u64>,
    ) -> TransferResult<u64> {
        let mut sql = format!("SELECT * FROM {}", self.qualified_name());
        if let Some(limit) = limit {
            sql.push(' ');
            sql.push_str(&self.data_source.dialect().paging_clause(offset, limit));
        }
        stream_rows(session, consumer, &sql, offset, limit).await
    }
}

/// An ad hoc query against the source database
pub struct QuerySource {
    data_source: Arc<dyn DataSource>,
    name: String,
    query: String,
}

impl QuerySource {
    pub fn new(data_source: Arc<dyn DataSource>, name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            data_source,
            name: name.into(),
            query: query.into(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    fn inner_query(&self) -> &str {
        self.query.trim().trim_end_matches(';').trim_end()
    }

    fn bounded_query(&self, offset: u64, limit: u64) -> String {
        format!(
            "SELECT * FROM ({}) src {}",
            self.inner_query(),
            self.data_source.dialect().paging_clause(offset, limit)
        )
    }
}

#[async_trait]
impl DataContainer for QuerySource {
    fn full_name(&self) -> String {
        format!("{}:{}", self.data_source.name(), self.query)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::Query
    }

    fn data_source(&self) -> &Arc<dyn DataSource> {
        &self.data_source
    }

    /// Runs a one-row probe and takes the shape from its result metadata
    async fn attributes(&self, monitor: &TransferMonitor) -> TransferResult<Vec<SourceAttribute>> {
        monitor.check_cancelled()?;
        monitor.sub_task(format!("Probe query {}", self.name));
        let connection = self.data_source.default_connection();
        let probe = connection.query(&self.bounded_query(0, 1), &[]).await?;
        let dialect = self.data_source.dialect();
        Ok(probe
            .columns
            .iter()
            .filter(|c| !c.hidden)
            .map(|c| SourceAttribute::from_column_meta(c, dialect))
            .collect())
    }

    async fn count_data(&self, session: &mut TransferSession) -> TransferResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM ({}) cnt", self.inner_query());
        count_rows(session, &sql).await
    }

    async fn read_data(
        &self,
        session: &mut TransferSession,
        consumer: &mut dyn DataConsumer,
        offset: u64,
        limit: Option<u64>,
    ) -> TransferResult<u64> {
        let sql = match limit {
            Some(limit) => self.bounded_query(offset, limit),
            None => self.inner_query().to_string(),
        };
        stream_rows(session, consumer, &sql, offset, limit).await
    }
}

fn introspection(capability: Option<&dyn SchemaIntrospection>) -> TransferResult<&dyn SchemaIntrospection> {
    capability.ok_or_else(|| {
        ZqlzError::NotSupported("Schema introspection is not supported by this driver".into()).into()
    })
}

async fn count_rows(session: &mut TransferSession, sql: &str) -> TransferResult<u64> {
    let result = session.query(sql, &[]).await?;
    result
        .rows
        .first()
        .and_then(|row| row.get(0))
        .and_then(|value| value.as_i64())
        .and_then(|count| u64::try_from(count).ok())
        .ok_or_else(|| ZqlzError::Query(format!("Row count query returned no count: {sql}")).into())
}

/// Execute `sql` and push the visible columns of every row into `consumer`
async fn stream_rows(
    session: &mut TransferSession,
    consumer: &mut dyn DataConsumer,
    sql: &str,
    offset: u64,
    limit: Option<u64>,
) -> TransferResult<u64> {
    tracing::debug!(sql, offset, ?limit, "reading source rows");
    let result = session.query(sql, &[]).await?;

    let visible: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.hidden)
        .map(|(idx, _)| idx)
        .collect();
    let columns: Vec<ColumnMeta> = visible.iter().map(|&idx| result.columns[idx].clone()).collect();
    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
    let all_visible = visible.len() == result.columns.len();

    consumer.fetch_start(&columns, offset, limit).await?;
    let mut fetched = 0u64;
    for row in result.rows {
        let row = if all_visible {
            row
        } else {
            let values = visible
                .iter()
                .map(|&idx| row.get(idx).cloned().unwrap_or(zqlz_core::Value::Null))
                .collect();
            Row::new(names.clone(), values)
        };
        consumer.fetch_row(row).await?;
        fetched += 1;
    }
    consumer.fetch_end().await?;
    Ok(fetched)
}
