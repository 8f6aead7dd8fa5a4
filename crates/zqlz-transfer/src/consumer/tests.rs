//! Tests for target-side loading

use std::sync::Arc;
use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;
use zqlz_core::{ColumnInfo, DialectInfo, PlaceholderStyle, TableInfo, TableType};

use super::*;
use crate::test_support::{
    MockDataSource, MockDatabase, MockTable, catalog_dialect, init_tracing, users_table,
};
use crate::{
    ColumnMapping, DataContainer, DatabaseTransferProducer, ProducerSettings, ProducerStats,
    TableSource,
};

/// Empty `users(id, name)` table in the target
fn existing_users() -> MockTable {
    MockTable::new("users")
        .column(ColumnInfo::new("id", "INTEGER", 0).not_null())
        .column(ColumnInfo::new("name", "TEXT", 1))
}

struct Fixture {
    src: Arc<MockDatabase>,
    dst: Arc<MockDatabase>,
    source: Arc<dyn DataContainer>,
    container: TargetContainer,
    monitor: TransferMonitor,
}

impl Fixture {
    fn new(source_rows: usize, target_tables: Vec<MockTable>) -> Self {
        Self::with_target_dialect(source_rows, target_tables, catalog_dialect())
    }

    fn with_target_dialect(
        source_rows: usize,
        target_tables: Vec<MockTable>,
        dialect: DialectInfo,
    ) -> Self {
        Self::with_source(users_table(source_rows), target_tables, dialect)
    }

    fn with_source(source_table: MockTable, target_tables: Vec<MockTable>, dialect: DialectInfo) -> Self {
        init_tracing();
        let src = MockDatabase::with_tables(vec![source_table]);
        let dst = MockDatabase::with_tables(target_tables);
        let src_ds = MockDataSource::new("src", catalog_dialect(), src.clone()).shared();
        let dst_ds = MockDataSource::new("dst", dialect, dst.clone()).shared();
        let table = TableInfo::new(None, "users", TableType::Table);
        Self {
            src,
            dst,
            source: Arc::new(TableSource::new(src_ds, table)),
            container: TargetContainer::new(dst_ds, None),
            monitor: TransferMonitor::new(),
        }
    }

    async fn mapping(&self) -> TableMapping {
        let mut mapping = TableMapping::new(self.source.clone());
        mapping
            .map_target_name("users", &self.container, &self.monitor)
            .await
            .expect("mapping should resolve");
        mapping
    }

    fn consumer(&self, mapping: TableMapping, settings: ConsumerSettings) -> DatabaseTransferConsumer {
        DatabaseTransferConsumer::new(mapping, self.container.clone(), settings, self.monitor.clone())
    }

    async fn run(
        &self,
        consumer: &mut DatabaseTransferConsumer,
        producer_settings: ProducerSettings,
    ) -> TransferResult<ProducerStats> {
        consumer.start_transfer().await?;
        let result = DatabaseTransferProducer::new(self.source.clone())
            .transfer_data(consumer, &producer_settings, &self.monitor)
            .await;
        consumer.close().await;
        result
    }
}

fn single_query() -> ProducerSettings {
    ProducerSettings::default().with_query_row_count(false)
}

// =============================================================================
// Target labels
// =============================================================================

#[tokio::test]
async fn test_target_name_labels() {
    let fixture = Fixture::new(0, vec![]);
    let mapping = fixture.mapping().await;
    let consumer = fixture.consumer(mapping.clone(), ConsumerSettings::default());
    assert_eq!(consumer.target_name(), "users [Create]");

    let mut skipped = mapping.clone();
    skipped.set_disposition(Disposition::Skip);
    assert_eq!(fixture.consumer(skipped, ConsumerSettings::default()).target_name(), "[Skip]");

    let unresolved = TableMapping::new(fixture.source.clone());
    assert_eq!(fixture.consumer(unresolved, ConsumerSettings::default()).target_name(), "?");

    let fixture = Fixture::new(0, vec![existing_users()]);
    let consumer = fixture.consumer(fixture.mapping().await, ConsumerSettings::default());
    assert_eq!(consumer.target_name(), "users [Insert]");
}

// =============================================================================
// Target DDL
// =============================================================================

#[tokio::test]
async fn test_start_transfer_creates_table_and_rebinds() {
    let fixture = Fixture::new(3, vec![]);
    let mut consumer = fixture.consumer(fixture.mapping().await, ConsumerSettings::default());

    consumer.start_transfer().await.unwrap();

    assert_eq!(
        fixture.dst.statements_like("CREATE TABLE"),
        vec!["CREATE TABLE users(\n\tid INTEGER NOT NULL,\n\tname VARCHAR(50),\n\tPRIMARY KEY (id)\n)"]
    );
    assert!(fixture.dst.has_table("users"));
    assert_eq!(consumer.mapping().kind(), MappingKind::Existing);
    assert_eq!(consumer.target_name(), "users [Insert]");
    assert!(
        consumer
            .mapping()
            .columns()
            .iter()
            .all(|c| c.kind() == MappingKind::Existing)
    );
    // DDL is committed on its own
    assert_eq!(fixture.dst.commits(), 1);
    consumer.close().await;
}

#[tokio::test]
async fn test_start_transfer_adds_missing_columns() {
    let fixture = Fixture::new(2, vec![MockTable::new("users").column(ColumnInfo::new("id", "INTEGER", 0))]);
    let mut consumer = fixture.consumer(fixture.mapping().await, ConsumerSettings::default());
    assert_eq!(
        consumer.mapping().column("name").map(ColumnMapping::kind),
        Some(MappingKind::Create)
    );

    fixture.run(&mut consumer, single_query()).await.unwrap();

    assert_eq!(
        fixture.dst.statements_like("ALTER TABLE"),
        vec!["ALTER TABLE users ADD name VARCHAR(50)"]
    );
    assert_eq!(
        consumer.mapping().column("name").map(ColumnMapping::kind),
        Some(MappingKind::Existing)
    );
    assert_eq!(fixture.dst.table_rows("users").len(), 2);
}

#[tokio::test]
async fn test_skipped_column_stays_skipped_after_create() {
    let fixture = Fixture::new(3, vec![]);
    let mut mapping = fixture.mapping().await;
    mapping
        .column_mut("name")
        .expect("name column")
        .set_disposition(Disposition::Skip);
    assert!(mapping.is_completed());
    let mut consumer = fixture.consumer(mapping, ConsumerSettings::default());

    fixture.run(&mut consumer, single_query()).await.unwrap();

    assert_eq!(
        fixture.dst.statements_like("CREATE TABLE"),
        vec!["CREATE TABLE users(\n\tid INTEGER NOT NULL,\n\tPRIMARY KEY (id)\n)"]
    );
    assert_eq!(
        consumer.mapping().column("name").map(ColumnMapping::kind),
        Some(MappingKind::Skip)
    );
    assert_eq!(
        fixture.dst.statements_like("INSERT"),
        vec!["INSERT INTO users (id) VALUES (?),(?),(?)"]
    );
    assert_eq!(fixture.dst.table_rows("users").len(), 3);
}

#[tokio::test]
async fn test_skipped_column_stays_skipped_after_alter() {
    let source_table = users_table(0)
        .column(ColumnInfo::new("email", "VARCHAR", 2).with_length(120))
        .rows(vec![vec![
            Value::Int32(7),
            Value::String("ann".into()),
            Value::String("ann@example.com".into()),
        ]]);
    let target = MockTable::new("users").column(ColumnInfo::new("id", "INTEGER", 0));
    let fixture = Fixture::with_source(source_table, vec![target], catalog_dialect());
    let mut mapping = fixture.mapping().await;
    mapping
        .column_mut("name")
        .expect("name column")
        .set_disposition(Disposition::Skip);
    let mut consumer = fixture.consumer(mapping, ConsumerSettings::default());

    fixture.run(&mut consumer, single_query()).await.unwrap();

    assert_eq!(
        fixture.dst.statements_like("ALTER TABLE"),
        vec!["ALTER TABLE users ADD email VARCHAR(120)"]
    );
    assert_eq!(
        consumer.mapping().column("name").map(ColumnMapping::kind),
        Some(MappingKind::Skip)
    );
    assert_eq!(
        consumer.mapping().column("email").map(ColumnMapping::kind),
        Some(MappingKind::Existing)
    );
    assert_eq!(
        fixture.dst.table_rows("users"),
        vec![vec![Value::Int32(7), Value::String("ann@example.com".into())]]
    );
}

#[tokio::test]
async fn test_create_without_columns_is_rejected() {
    let fixture = Fixture::new(2, vec![]);
    let mut mapping = fixture.mapping().await;
    for column in mapping.columns_mut() {
        column.set_disposition(Disposition::Skip);
    }
    let mut consumer = fixture.consumer(mapping, ConsumerSettings::default());

    let err = consumer.start_transfer().await.unwrap_err();

    assert!(matches!(err, TransferError::IncompleteMapping(_)));
    assert!(fixture.dst.statements_like("CREATE TABLE").is_empty());
    assert!(!fixture.dst.has_table("users"));
}

#[tokio::test]
async fn test_start_transfer_without_changes_runs_no_ddl() {
    let fixture = Fixture::new(2, vec![existing_users()]);
    let mut consumer = fixture.consumer(fixture.mapping().await, ConsumerSettings::default());

    consumer.start_transfer().await.unwrap();

    assert!(fixture.dst.statements().is_empty());
    assert_eq!(fixture.dst.opened(), 0);
}

#[tokio::test]
async fn test_ddl_failure_is_reported_with_statement() {
    let fixture = Fixture::new(2, vec![]);
    fixture.dst.fail_ddl.store(true, Ordering::SeqCst);
    let mut consumer = fixture.consumer(fixture.mapping().await, ConsumerSettings::default());

    let err = consumer.start_transfer().await.unwrap_err();
    match err {
        TransferError::Ddl { sql, .. } => assert!(sql.starts_with("CREATE TABLE users(")),
        other => panic!("expected DDL error, got {other:?}"),
    }
    consumer.close().await;
    assert_eq!(fixture.dst.closed(), 1);
}

// =============================================================================
// Loading rows
// =============================================================================

#[tokio::test]
async fn test_rows_are_loaded_into_new_table() {
    let fixture = Fixture::new(4, vec![]);
    let mut consumer = fixture.consumer(fixture.mapping().await, ConsumerSettings::default());

    fixture.run(&mut consumer, single_query()).await.unwrap();

    assert_eq!(fixture.dst.table_rows("users"), fixture.src.table_rows("users"));
    assert_eq!(consumer.rows_exported(), 4);
    assert_eq!(fixture.monitor.rows_written(), 4);
    assert_eq!(fixture.dst.closed(), 1);
}

#[tokio::test]
async fn test_commit_cadence() {
    let fixture = Fixture::new(25, vec![existing_users()]);
    let settings = ConsumerSettings::default().with_commit_after_rows(10);
    let mut consumer = fixture.consumer(fixture.mapping().await, settings);

    fixture.run(&mut consumer, single_query()).await.unwrap();

    // floor(25 / 10) periodic commits plus the one at stream end
    assert_eq!(fixture.dst.commits(), 3);
    assert_eq!(fixture.dst.statements_like("INSERT").len(), 3);
    assert_eq!(fixture.dst.table_rows("users").len(), 25);
}

#[tokio::test]
async fn test_segments_commit_at_each_segment_end() {
    let fixture = Fixture::new(25, vec![existing_users()]);
    let settings = ConsumerSettings::default().with_commit_after_rows(100);
    let mut consumer = fixture.consumer(fixture.mapping().await, settings);

    fixture
        .run(&mut consumer, single_query().with_segments(10))
        .await
        .unwrap();

    assert_eq!(fixture.dst.commits(), 3);
    assert_eq!(fixture.dst.table_rows("users").len(), 25);
}

#[tokio::test]
async fn test_without_transactions_nothing_is_committed() {
    let fixture = Fixture::new(25, vec![existing_users()]);
    let settings = ConsumerSettings::default()
        .with_transactions(false)
        .with_commit_after_rows(10);
    let mut consumer = fixture.consumer(fixture.mapping().await, settings);

    fixture.run(&mut consumer, single_query()).await.unwrap();

    assert_eq!(fixture.dst.begins(), 0);
    assert_eq!(fixture.dst.commits(), 0);
    assert_eq!(fixture.dst.table_rows("users").len(), 25);
}

#[tokio::test]
async fn test_insert_uses_dialect_placeholders() {
    let dialect = DialectInfo {
        placeholder_style: PlaceholderStyle::Dollar,
        ..catalog_dialect()
    };
    let fixture = Fixture::with_target_dialect(2, vec![existing_users()], dialect);
    let mut consumer = fixture.consumer(fixture.mapping().await, ConsumerSettings::default());

    fixture.run(&mut consumer, single_query()).await.unwrap();

    assert_eq!(
        fixture.dst.statements_like("INSERT"),
        vec!["INSERT INTO users (id,name) VALUES ($1,$2),($3,$4)"]
    );
}

#[tokio::test]
async fn test_skipped_columns_are_not_written() {
    let fixture = Fixture::new(2, vec![existing_users()]);
    let mut mapping = fixture.mapping().await;
    mapping
        .column_mut("name")
        .expect("name column")
        .set_disposition(Disposition::Skip);
    let mut consumer = fixture.consumer(mapping, ConsumerSettings::default());

    fixture.run(&mut consumer, single_query()).await.unwrap();

    assert_eq!(
        fixture.dst.statements_like("INSERT"),
        vec!["INSERT INTO users (id) VALUES (?),(?)"]
    );
    assert_eq!(
        fixture.dst.table_rows("users"),
        vec![
            vec![Value::Int32(0), Value::Null],
            vec![Value::Int32(1), Value::Null],
        ]
    );
}

#[tokio::test]
async fn test_truncate_before_load_runs_once() {
    let fixture = Fixture::new(
        5,
        vec![existing_users().rows(vec![vec![Value::Int32(99), Value::Null]; 3])],
    );
    let settings = ConsumerSettings::default().with_truncate_before_load(true);
    let mut consumer = fixture.consumer(fixture.mapping().await, settings);

    fixture
        .run(&mut consumer, single_query().with_segments(2))
        .await
        .unwrap();

    assert_eq!(fixture.dst.statements_like("TRUNCATE"), vec!["TRUNCATE TABLE users"]);
    assert_eq!(fixture.dst.table_rows("users").len(), 5);
}

#[tokio::test]
async fn test_truncate_falls_back_to_delete() {
    let dialect = DialectInfo {
        supports_truncate: false,
        ..catalog_dialect()
    };
    let fixture = Fixture::with_target_dialect(1, vec![existing_users()], dialect);
    let settings = ConsumerSettings::default().with_truncate_before_load(true);
    let mut consumer = fixture.consumer(fixture.mapping().await, settings);

    fixture.run(&mut consumer, single_query()).await.unwrap();

    assert_eq!(fixture.dst.statements_like("DELETE"), vec!["DELETE FROM users"]);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_unknown_result_column_is_rejected() {
    let fixture = Fixture::new(0, vec![existing_users()]);
    let mut consumer = fixture.consumer(fixture.mapping().await, ConsumerSettings::default());

    let err = consumer
        .fetch_start(&[ColumnMeta::new("ghost", "TEXT", 0)], 0, None)
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::MissingTargetAttribute(ref name) if name == "ghost"));
    assert_eq!(err.to_string(), "Can't find target attribute [ghost]");
    consumer.close().await;
}

#[tokio::test]
async fn test_unresolved_column_is_rejected() {
    let fixture = Fixture::new(1, vec![existing_users()]);
    let mut mapping = fixture.mapping().await;
    mapping
        .column_mut("name")
        .expect("name column")
        .set_disposition(Disposition::Unresolved);
    let mut consumer = fixture.consumer(mapping, ConsumerSettings::default());

    let err = fixture.run(&mut consumer, single_query()).await.unwrap_err();
    assert_eq!(err.to_string(), "Target attribute for [name] wasn't resolved");
}

#[tokio::test]
async fn test_unresolved_table_is_rejected() {
    let fixture = Fixture::new(1, vec![]);
    let mapping = TableMapping::new(fixture.source.clone());
    let mut consumer = fixture.consumer(mapping, ConsumerSettings::default());

    let err = fixture.run(&mut consumer, single_query()).await.unwrap_err();
    assert!(matches!(err, TransferError::IncompleteMapping(_)));
}

#[tokio::test]
async fn test_insert_failure_aborts() {
    let fixture = Fixture::new(3, vec![existing_users()]);
    fixture.dst.fail_inserts.store(true, Ordering::SeqCst);
    let mut consumer = fixture.consumer(fixture.mapping().await, ConsumerSettings::default());

    let err = fixture.run(&mut consumer, single_query()).await.unwrap_err();

    assert!(matches!(err, TransferError::Database(_)));
    assert_eq!(fixture.dst.commits(), 0);
    assert_eq!(fixture.dst.rollbacks(), 1);
    assert_eq!(fixture.dst.closed(), 1);
}

#[tokio::test]
async fn test_ignore_errors_keeps_loading() {
    let fixture = Fixture::new(3, vec![existing_users()]);
    fixture.dst.fail_inserts.store(true, Ordering::SeqCst);
    let settings = ConsumerSettings::default().with_ignore_errors(true);
    let mut consumer = fixture.consumer(fixture.mapping().await, settings);

    let stats = fixture.run(&mut consumer, single_query()).await.unwrap();

    assert_eq!(stats.rows, 3);
    assert_eq!(consumer.rows_exported(), 3);
    assert_eq!(fixture.monitor.rows_written(), 0);
}

// =============================================================================
// Finishing
// =============================================================================

#[tokio::test]
async fn test_finish_transfer_reports_table_to_open() {
    let fixture = Fixture::new(1, vec![existing_users()]);
    let mut consumer = fixture.consumer(fixture.mapping().await, ConsumerSettings::default());
    fixture.run(&mut consumer, single_query()).await.unwrap();

    let table = consumer.finish_transfer();
    assert_eq!(table.as_ref().map(TargetTable::name), Some("users"));

    let settings = ConsumerSettings::default().with_open_table_on_finish(false);
    let consumer = fixture.consumer(fixture.mapping().await, settings);
    assert_eq!(consumer.finish_transfer(), None);

    let unresolved = TableMapping::new(fixture.source.clone());
    let consumer = fixture.consumer(unresolved, ConsumerSettings::default());
    assert_eq!(consumer.finish_transfer(), None);
}
