//! Tests for running many tables through the worker pool

use std::sync::Arc;

use pretty_assertions::assert_eq;
use zqlz_core::{ColumnInfo, TableInfo, TableType, Value};

use super::*;
use crate::test_support::{
    MockDataSource, MockDatabase, MockTable, catalog_dialect, init_tracing, users_table,
};
use crate::{DataSource, TableSource};

fn numbered_table(name: &str, count: usize) -> MockTable {
    MockTable::new(name)
        .column(ColumnInfo::new("id", "INTEGER", 0).not_null())
        .column(ColumnInfo::new("amount", "BIGINT", 1))
        .rows(
            (0..count)
                .map(|i| vec![Value::Int32(i as i32), Value::Int64(i as i64 * 100)])
                .collect(),
        )
}

struct Fixture {
    src: Arc<MockDatabase>,
    dst: Arc<MockDatabase>,
    src_ds: Arc<dyn DataSource>,
    store: MappingStore,
    monitor: TransferMonitor,
}

impl Fixture {
    fn new(tables: Vec<MockTable>) -> Self {
        init_tracing();
        let src = MockDatabase::with_tables(tables);
        let dst = MockDatabase::new();
        let src_ds = MockDataSource::new("src", catalog_dialect(), src.clone()).shared();
        let dst_ds = MockDataSource::new("dst", catalog_dialect(), dst.clone()).shared();
        Self {
            src,
            dst,
            src_ds,
            store: MappingStore::with_container(TargetContainer::new(dst_ds, None)),
            monitor: TransferMonitor::new(),
        }
    }

    fn add(&mut self, name: &str) -> &mut TableMapping {
        let table = TableInfo::new(None, name, TableType::Table);
        self.store
            .add_source(Arc::new(TableSource::new(self.src_ds.clone(), table)))
    }

    async fn assign(&mut self) {
        self.store.auto_assign(&self.monitor).await.unwrap();
    }

    async fn run(self, settings: TransferSettings) -> (TransferReport, Arc<MockDatabase>, Arc<MockDatabase>) {
        let pipeline = TransferPipeline::new(self.store, settings, self.monitor).unwrap();
        (pipeline.run().await, self.src, self.dst)
    }
}

fn sources(report: &TransferReport) -> Vec<&str> {
    report.results.iter().map(|r| r.source.as_str()).collect()
}

// =============================================================================
// Running mappings
// =============================================================================

#[tokio::test]
async fn test_transfers_every_table() {
    let mut fixture = Fixture::new(vec![users_table(5), numbered_table("orders", 3)]);
    fixture.add("users");
    fixture.add("orders");
    fixture.assign().await;

    let (report, _, dst) = fixture.run(TransferSettings::default()).await;

    assert!(report.is_success());
    assert!(!report.cancelled);
    assert_eq!(sources(&report), vec!["src.users", "src.orders"]);
    assert_eq!(report.total_rows_written(), 8);

    let users = &report.results[0];
    assert!(matches!(users.status, TransferStatus::Completed));
    assert_eq!(users.target, "users [Insert]");
    assert_eq!(users.rows_read, 5);
    assert_eq!(users.rows_written, 5);
    assert_eq!(users.stats.map(|s| s.rows), Some(5));
    assert_eq!(users.open_target.as_ref().map(|t| t.name()), Some("users"));

    assert_eq!(dst.table_rows("users").len(), 5);
    assert_eq!(dst.table_rows("orders").len(), 3);
}

#[tokio::test]
async fn test_skipped_mapping_is_reported_without_work() {
    let mut fixture = Fixture::new(vec![users_table(2), numbered_table("audit", 4)]);
    fixture.add("users");
    fixture.add("audit").set_target_name("skip");
    fixture.assign().await;

    let (report, src, dst) = fixture.run(TransferSettings::default()).await;

    assert!(report.is_success());
    let audit = &report.results[1];
    assert!(matches!(audit.status, TransferStatus::Skipped));
    assert_eq!(audit.target, "[Skip]");
    assert_eq!(audit.rows_written, 0);
    assert!(!dst.has_table("audit"));
    assert!(src.statements_like("SELECT * FROM audit").is_empty());
}

#[tokio::test]
async fn test_results_follow_mapping_order() {
    let names = ["a", "b", "c", "d", "e"];
    let mut fixture = Fixture::new(
        names
            .iter()
            .enumerate()
            .map(|(i, name)| numbered_table(name, 10 - i * 2))
            .collect(),
    );
    for name in names {
        fixture.add(name);
    }
    fixture.assign().await;

    let (report, _, _) = fixture
        .run(TransferSettings::default().with_max_jobs(3))
        .await;

    assert_eq!(
        report.results.iter().map(|r| r.index).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
    assert_eq!(sources(&report), vec!["src.a", "src.b", "src.c", "src.d", "src.e"]);
    assert_eq!(
        report.results.iter().map(|r| r.rows_written).collect::<Vec<_>>(),
        vec![10, 8, 6, 4, 2]
    );
}

// =============================================================================
// Worker pool
// =============================================================================

#[tokio::test]
async fn test_single_job_runs_tables_one_at_a_time() {
    let mut fixture = Fixture::new((0..4).map(|i| numbered_table(&format!("t{i}"), 3)).collect());
    for i in 0..4 {
        fixture.add(&format!("t{i}"));
    }
    fixture.assign().await;

    let (report, src, _) = fixture
        .run(TransferSettings::default().with_max_jobs(1))
        .await;

    assert!(report.is_success());
    assert_eq!(src.opened(), 4);
    assert_eq!(src.peak_open(), 1);
}

#[tokio::test]
async fn test_concurrency_is_bounded_by_max_jobs() {
    let mut fixture = Fixture::new((0..6).map(|i| numbered_table(&format!("t{i}"), 5)).collect());
    for i in 0..6 {
        fixture.add(&format!("t{i}"));
    }
    fixture.assign().await;

    let (report, src, dst) = fixture
        .run(TransferSettings::default().with_max_jobs(2))
        .await;

    assert!(report.is_success());
    assert_eq!(report.total_rows_written(), 30);
    assert_eq!(src.closed(), 6);
    assert!(src.peak_open() <= 2, "peak {}", src.peak_open());
    assert!(dst.peak_open() <= 2, "peak {}", dst.peak_open());
}

// =============================================================================
// Failures and cancellation
// =============================================================================

#[tokio::test]
async fn test_failed_table_does_not_stop_others() {
    let mut fixture = Fixture::new(vec![
        users_table(3),
        numbered_table("orders", 2),
        numbered_table("payments", 1),
    ]);
    fixture.add("users");
    fixture.add("orders");
    fixture.assign().await;
    // Registered after assignment, so it is still unresolved when the run starts
    fixture.add("payments");

    let (report, _, dst) = fixture.run(TransferSettings::default().with_max_jobs(1)).await;

    assert!(!report.is_success());
    let failures: Vec<_> = report.failures().map(|r| r.source.as_str()).collect();
    assert_eq!(failures, vec!["src.payments"]);
    assert!(matches!(
        report.results[2].error(),
        Some(TransferError::IncompleteMapping(_))
    ));
    assert_eq!(dst.table_rows("users").len(), 3);
    assert_eq!(dst.table_rows("orders").len(), 2);
}

#[tokio::test]
async fn test_store_without_container_is_rejected() {
    let result = TransferPipeline::new(
        MappingStore::new(),
        TransferSettings::default(),
        TransferMonitor::new(),
    );
    assert!(matches!(result, Err(TransferError::NoTargetContainer)));
}

#[tokio::test]
async fn test_cancelled_transfer_creates_nothing() {
    let mut fixture = Fixture::new(vec![users_table(3), numbered_table("orders", 2)]);
    fixture.add("users");
    fixture.add("orders");
    fixture.assign().await;
    fixture.monitor.cancel();

    let (report, src, dst) = fixture.run(TransferSettings::default()).await;

    assert!(report.cancelled);
    assert!(!report.is_success());
    assert!(
        report
            .results
            .iter()
            .all(|r| matches!(r.status, TransferStatus::Cancelled))
    );
    assert!(!dst.has_table("users"));
    assert_eq!(src.opened(), 0);
}
