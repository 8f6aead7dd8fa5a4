//! In-memory database and helpers shared by the transfer tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use parking_lot::Mutex;
use zqlz_core::{
    ColumnInfo, ColumnMeta, Connection, DataTypeCategory, DataTypeInfo, DialectInfo,
    PrimaryKeyInfo, QueryResult, Result, Row, SchemaIntrospection, StatementResult, TableInfo,
    TableType, Transaction, Value, ZqlzError,
};

use crate::{DataConsumer, DataSource, TransferResult};

static TRACING: Once = Once::new();

/// Route tracing output through the test harness
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

// =============================================================================
// Dialects
// =============================================================================

/// Generic dialect with a small Postgres-like type catalog
pub fn catalog_dialect() -> DialectInfo {
    DialectInfo {
        id: "mockdb".into(),
        display_name: "Mock".into(),
        data_types: vec![
            DataTypeInfo::new("INTEGER", DataTypeCategory::Integer)
                .with_alias("INT")
                .with_alias("INT4"),
            DataTypeInfo::new("BIGINT", DataTypeCategory::Integer).with_alias("INT8"),
            DataTypeInfo::new("DOUBLE PRECISION", DataTypeCategory::Float).with_alias("FLOAT8"),
            DataTypeInfo::new("NUMERIC", DataTypeCategory::Decimal).with_scale(),
            DataTypeInfo::new("VARCHAR", DataTypeCategory::String).with_length(Some(255), Some(4000)),
            DataTypeInfo::new("TEXT", DataTypeCategory::String),
            DataTypeInfo::new("BOOLEAN", DataTypeCategory::Boolean).with_alias("BOOL"),
            DataTypeInfo::new("DATE", DataTypeCategory::Date),
            DataTypeInfo::new("TIMESTAMP", DataTypeCategory::DateTime),
            DataTypeInfo::new("BYTEA", DataTypeCategory::Binary),
        ],
        ..DialectInfo::default()
    }
}

/// Dialect of a sink that exposes no type catalog
pub fn plain_dialect() -> DialectInfo {
    DialectInfo::default()
}

// =============================================================================
// Tables
// =============================================================================

#[derive(Debug, Clone)]
pub struct MockTable {
    pub info: TableInfo,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl MockTable {
    pub fn new(name: &str) -> Self {
        Self::with_type(name, TableType::Table)
    }

    pub fn with_type(name: &str, table_type: TableType) -> Self {
        Self {
            info: TableInfo::new(None, name, table_type),
            columns: Vec::new(),
            primary_key: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn rows(mut self, rows: Vec<Vec<Value>>) -> Self {
        self.rows = rows;
        self
    }

    fn column_meta(&self) -> Vec<ColumnMeta> {
        self.columns
            .iter()
            .map(|c| {
                let mut meta = ColumnMeta::new(&c.name, &c.data_type, c.ordinal);
                meta.nullable = c.nullable;
                meta.max_length = c.max_length;
                meta.precision = c.precision;
                meta.scale = c.scale;
                meta.hidden = c.is_hidden;
                meta
            })
            .collect()
    }
}

/// `users(id INTEGER NOT NULL PRIMARY KEY, name VARCHAR(50))` with `count` rows
pub fn users_table(count: usize) -> MockTable {
    MockTable::new("users")
        .column(ColumnInfo::new("id", "INTEGER", 0).primary_key())
        .column(ColumnInfo::new("name", "VARCHAR", 1).with_length(50))
        .primary_key(&["id"])
        .rows(
            (0..count)
                .map(|i| vec![Value::Int32(i as i32), Value::String(format!("user{i}"))])
                .collect(),
        )
}

// =============================================================================
// Database
// =============================================================================

#[derive(Default)]
struct MockState {
    tables: Vec<MockTable>,
    statements: Vec<String>,
}

impl MockState {
    fn table(&self, name: &str) -> Option<&MockTable> {
        let name = bare_name(name);
        self.tables
            .iter()
            .find(|t| t.info.name.eq_ignore_ascii_case(&name))
    }

    fn table_mut(&mut self, name: &str) -> Option<&mut MockTable> {
        let name = bare_name(name);
        self.tables
            .iter_mut()
            .find(|t| t.info.name.eq_ignore_ascii_case(&name))
    }
}

/// Shared state behind every connection to one mock database
#[derive(Default)]
pub struct MockDatabase {
    state: Mutex<MockState>,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    open_now: AtomicUsize,
    peak_open: AtomicUsize,
    pub fail_count: AtomicBool,
    pub fail_reads: AtomicBool,
    pub fail_inserts: AtomicBool,
    pub fail_columns: AtomicBool,
    pub fail_ddl: AtomicBool,
}

impl MockDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_tables(tables: Vec<MockTable>) -> Arc<Self> {
        let db = Self::new();
        for table in tables {
            db.add_table(table);
        }
        db
    }

    pub fn add_table(&self, table: MockTable) {
        self.state.lock().tables.push(table);
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.state.lock().table(name).is_some()
    }

    pub fn table_rows(&self, name: &str) -> Vec<Vec<Value>> {
        self.state
            .lock()
            .table(name)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn table_columns(&self, name: &str) -> Vec<ColumnInfo> {
        self.state
            .lock()
            .table(name)
            .map(|t| t.columns.clone())
            .unwrap_or_default()
    }

    /// Every statement run so far, queries included
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().statements.clone()
    }

    /// Statements starting with `prefix`, ignoring case
    pub fn statements_like(&self, prefix: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| {
                s.get(..prefix.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
            })
            .collect()
    }

    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// Isolated connections opened
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Isolated connections closed
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Highest number of isolated connections open at the same time
    pub fn peak_open(&self) -> usize {
        self.peak_open.load(Ordering::SeqCst)
    }

    fn run_query(&self, sql: &str) -> Result<QueryResult> {
        let mut state = self.state.lock();
        state.statements.push(sql.to_string());

        let upper = sql.to_uppercase();
        let name = source_table(sql)
            .ok_or_else(|| ZqlzError::Query(format!("Unsupported query: {sql}")))?;
        let table = state
            .table(&name)
            .ok_or_else(|| ZqlzError::NotFound(format!("Table {name} does not exist")))?;

        if upper.contains("COUNT(*)") {
            if self.fail_count.load(Ordering::SeqCst) {
                return Err(ZqlzError::Query("COUNT is not permitted".into()));
            }
            return Ok(QueryResult::from_rows(
                vec![ColumnMeta::new("count", "BIGINT", 0)],
                vec![vec![Value::Int64(table.rows.len() as i64)]],
            ));
        }

        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ZqlzError::Query("connection reset while reading".into()));
        }

        let (offset, limit) = paging(&upper);
        let rows = table
            .rows
            .iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(QueryResult::from_rows(table.column_meta(), rows))
    }

    fn run_execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let mut state = self.state.lock();
        state.statements.push(sql.to_string());
        let upper = sql.to_uppercase();

        if let Some(rest) = strip_prefix_ci(sql, "CREATE TABLE ") {
            if self.fail_ddl.load(Ordering::SeqCst) {
                return Err(ZqlzError::Query("permission denied for schema".into()));
            }
            let open = rest
                .find('(')
                .ok_or_else(|| ZqlzError::Query(format!("Malformed DDL: {sql}")))?;
            let close = rest.rfind(')').unwrap_or(rest.len());
            let mut table = MockTable::new(&bare_name(rest[..open].trim()));
            for definition in rest[open + 1..close].split(",\n") {
                let definition = definition.trim();
                if definition.to_uppercase().starts_with("PRIMARY KEY") {
                    let cols = definition
                        .trim_start_matches(|c| c != '(')
                        .trim_matches(|c| c == '(' || c == ')');
                    table.primary_key = cols.split(',').map(|c| bare_name(c.trim())).collect();
                    continue;
                }
                let ordinal = table.columns.len();
                table.columns.push(parse_column(definition, ordinal));
            }
            state.tables.push(table);
            return Ok(StatementResult::default());
        }

        if let Some(rest) = strip_prefix_ci(sql, "ALTER TABLE ") {
            if self.fail_ddl.load(Ordering::SeqCst) {
                return Err(ZqlzError::Query("permission denied for table".into()));
            }
            let add = upper
                .find(" ADD ")
                .ok_or_else(|| ZqlzError::Query(format!("Malformed DDL: {sql}")))?;
            let name = rest[..add - "ALTER TABLE ".len()].trim().to_string();
            let definition = sql[add + " ADD ".len()..].trim().to_string();
            let table = state
                .table_mut(&name)
                .ok_or_else(|| ZqlzError::NotFound(format!("Table {name} does not exist")))?;
            let ordinal = table.columns.len();
            table.columns.push(parse_column(&definition, ordinal));
            for row in &mut table.rows {
                row.push(Value::Null);
            }
            return Ok(StatementResult::default());
        }

        if let Some(rest) =
            strip_prefix_ci(sql, "TRUNCATE TABLE ").or_else(|| strip_prefix_ci(sql, "DELETE FROM "))
        {
            let table = state
                .table_mut(rest.trim())
                .ok_or_else(|| ZqlzError::NotFound(format!("Table {rest} does not exist")))?;
            let removed = table.rows.len() as u64;
            table.rows.clear();
            return Ok(StatementResult::affected(removed));
        }

        if let Some(rest) = strip_prefix_ci(sql, "INSERT INTO ") {
            if self.fail_inserts.load(Ordering::SeqCst) {
                return Err(ZqlzError::Query("value too long for type".into()));
            }
            let open = rest
                .find('(')
                .ok_or_else(|| ZqlzError::Query(format!("Malformed INSERT: {sql}")))?;
            let close = rest[open..].find(')').map(|c| open + c).unwrap_or(rest.len());
            let name = rest[..open].trim().to_string();
            let columns: Vec<String> = rest[open + 1..close]
                .split(',')
                .map(|c| bare_name(c.trim()))
                .collect();
            let table = state
                .table_mut(&name)
                .ok_or_else(|| ZqlzError::NotFound(format!("Table {name} does not exist")))?;
            let positions: Vec<usize> = columns
                .iter()
                .map(|c| {
                    table
                        .columns
                        .iter()
                        .position(|t| t.name.eq_ignore_ascii_case(c))
                        .ok_or_else(|| ZqlzError::Query(format!("Column {c} does not exist")))
                })
                .collect::<Result<_>>()?;
            let width = table.columns.len();
            let mut inserted = 0;
            for chunk in params.chunks(positions.len().max(1)) {
                let mut row = vec![Value::Null; width];
                for (value, position) in chunk.iter().zip(&positions) {
                    row[*position] = value.clone();
                }
                table.rows.push(row);
                inserted += 1;
            }
            return Ok(StatementResult::affected(inserted));
        }

        Err(ZqlzError::Query(format!("Unsupported statement: {sql}")))
    }
}

fn strip_prefix_ci<'a>(sql: &'a str, prefix: &str) -> Option<&'a str> {
    let head = sql.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &sql[prefix.len()..])
}

/// Unqualified, unquoted object name
fn bare_name(name: &str) -> String {
    name.rsplit('.')
        .next()
        .unwrap_or(name)
        .trim()
        .trim_matches('"')
        .to_string()
}

fn parse_column(definition: &str, ordinal: usize) -> ColumnInfo {
    let (name, rest) = definition.split_once(' ').unwrap_or((definition, ""));
    let mut data_type = rest.trim().to_string();
    let mut nullable = true;
    if data_type.to_uppercase().ends_with(" NOT NULL") {
        data_type.truncate(data_type.len() - " NOT NULL".len());
        nullable = false;
    }
    let mut column = ColumnInfo::new(bare_name(name), data_type, ordinal);
    column.nullable = nullable;
    column
}

/// Table named by the innermost `FROM` clause
fn source_table(sql: &str) -> Option<String> {
    let upper = sql.to_uppercase();
    let from = upper.rfind("FROM ")?;
    let rest = sql[from + "FROM ".len()..].trim_start();
    let end = rest
        .find(|c: char| c.is_whitespace() || c == ')' || c == ';')
        .unwrap_or(rest.len());
    Some(bare_name(&rest[..end]))
}

fn paging(upper: &str) -> (usize, Option<usize>) {
    let number_after = |keyword: &str| {
        upper.rfind(keyword).and_then(|pos| {
            upper[pos + keyword.len()..]
                .split_whitespace()
                .next()
                .and_then(|n| n.parse::<usize>().ok())
        })
    };
    (number_after(" OFFSET ").unwrap_or(0), number_after(" LIMIT "))
}

// =============================================================================
// Connections
// =============================================================================

pub struct MockConnection {
    db: Arc<MockDatabase>,
    isolated: bool,
    closed: AtomicBool,
}

impl MockConnection {
    pub fn new(db: Arc<MockDatabase>) -> Self {
        Self {
            db,
            isolated: false,
            closed: AtomicBool::new(false),
        }
    }

    pub fn open_isolated(db: Arc<MockDatabase>) -> Self {
        db.opened.fetch_add(1, Ordering::SeqCst);
        let open = db.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        db.peak_open.fetch_max(open, Ordering::SeqCst);
        Self {
            db,
            isolated: true,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        tokio::task::yield_now().await;
        self.db.run_execute(sql, params)
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        tokio::task::yield_now().await;
        self.db.run_query(sql)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        self.db.begins.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockTransaction {
            db: self.db.clone(),
        }))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) && self.isolated {
            self.db.closed.fetch_add(1, Ordering::SeqCst);
            self.db.open_now.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn as_schema_introspection(&self) -> Option<&dyn SchemaIntrospection> {
        Some(self)
    }
}

#[async_trait]
impl SchemaIntrospection for MockConnection {
    async fn list_tables(&self, _schema: Option<&str>) -> Result<Vec<TableInfo>> {
        Ok(self
            .db
            .state
            .lock()
            .tables
            .iter()
            .map(|t| t.info.clone())
            .collect())
    }

    async fn get_columns(&self, _schema: Option<&str>, table: &str) -> Result<Vec<ColumnInfo>> {
        if self.db.fail_columns.load(Ordering::SeqCst) {
            return Err(ZqlzError::Schema("catalog is locked".into()));
        }
        self.db
            .state
            .lock()
            .table(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| ZqlzError::NotFound(format!("Table {table} does not exist")))
    }

    async fn get_primary_key(
        &self,
        _schema: Option<&str>,
        table: &str,
    ) -> Result<Option<PrimaryKeyInfo>> {
        Ok(self.db.state.lock().table(table).and_then(|t| {
            (!t.primary_key.is_empty()).then(|| PrimaryKeyInfo {
                name: Some(format!("{}_pkey", t.info.name)),
                columns: t.primary_key.clone(),
            })
        }))
    }
}

struct MockTransaction {
    db: Arc<MockDatabase>,
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.db.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.db.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        tokio::task::yield_now().await;
        self.db.run_query(sql)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        tokio::task::yield_now().await;
        self.db.run_execute(sql, params)
    }
}

// =============================================================================
// Data source
// =============================================================================

pub struct MockDataSource {
    name: String,
    dialect: DialectInfo,
    db: Arc<MockDatabase>,
    connection: Arc<MockConnection>,
    embedded: bool,
}

impl MockDataSource {
    pub fn new(name: &str, dialect: DialectInfo, db: Arc<MockDatabase>) -> Self {
        Self {
            name: name.to_string(),
            dialect,
            connection: Arc::new(MockConnection::new(db.clone())),
            db,
            embedded: false,
        }
    }

    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    pub fn shared(self) -> Arc<dyn DataSource> {
        Arc::new(self)
    }

    pub fn db(&self) -> &Arc<MockDatabase> {
        &self.db
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> &DialectInfo {
        &self.dialect
    }

    fn is_embedded(&self) -> bool {
        self.embedded
    }

    fn default_connection(&self) -> Arc<dyn Connection> {
        self.connection.clone()
    }

    async fn open_isolated(&self, _purpose: &str) -> Result<Arc<dyn Connection>> {
        Ok(Arc::new(MockConnection::open_isolated(self.db.clone())))
    }
}

// =============================================================================
// Consumer
// =============================================================================

/// Consumer that records every callback it receives
#[derive(Default)]
pub struct RecordingConsumer {
    /// `(offset, limit, column names)` for each `fetch_start`
    pub starts: Vec<(u64, Option<u64>, Vec<String>)>,
    pub rows: Vec<Row>,
    pub ends: usize,
    /// Fail on this row number (0-based)
    pub fail_at_row: Option<usize>,
}

#[async_trait]
impl DataConsumer for RecordingConsumer {
    async fn fetch_start(
        &mut self,
        columns: &[ColumnMeta],
        offset: u64,
        limit: Option<u64>,
    ) -> TransferResult<()> {
        let names = columns.iter().map(|c| c.name.clone()).collect();
        self.starts.push((offset, limit, names));
        Ok(())
    }

    async fn fetch_row(&mut self, row: Row) -> TransferResult<()> {
        if self.fail_at_row == Some(self.rows.len()) {
            return Err(ZqlzError::Query("disk full".into()).into());
        }
        self.rows.push(row);
        Ok(())
    }

    async fn fetch_end(&mut self) -> TransferResult<()> {
        self.ends += 1;
        Ok(())
    }
}
