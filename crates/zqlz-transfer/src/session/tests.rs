use pretty_assertions::assert_eq;

use super::*;
use crate::test_support::{MockDataSource, MockDatabase, catalog_dialect, users_table};

fn source(db: &Arc<MockDatabase>) -> Arc<dyn DataSource> {
    MockDataSource::new("src", catalog_dialect(), db.clone()).shared()
}

#[tokio::test]
async fn test_auto_commit_runs_without_transaction() {
    let db = MockDatabase::with_tables(vec![users_table(2)]);
    let mut session = TransferSession::open(source(&db).as_ref(), false, "test")
        .await
        .unwrap();

    let result = session.query("SELECT * FROM users", &[]).await.unwrap();
    session.commit().await.unwrap();

    assert_eq!(result.rows.len(), 2);
    assert!(!session.is_isolated());
    assert_eq!(db.begins(), 0);
    assert_eq!(db.commits(), 0);
}

#[tokio::test]
async fn test_manual_commit_begins_lazily() {
    let db = MockDatabase::with_tables(vec![users_table(2)]);
    let mut session = TransferSession::open(source(&db).as_ref(), true, "test")
        .await
        .unwrap();
    session.set_auto_commit(false).await.unwrap();
    assert_eq!(db.begins(), 0);

    session.query("SELECT * FROM users", &[]).await.unwrap();
    session.query("SELECT * FROM users", &[]).await.unwrap();
    assert_eq!(db.begins(), 1);

    session.commit().await.unwrap();
    // Nothing ran since the last commit
    session.commit().await.unwrap();
    assert_eq!(db.commits(), 1);

    session.query("SELECT * FROM users", &[]).await.unwrap();
    assert_eq!(db.begins(), 2);
    session.set_auto_commit(true).await.unwrap();
    assert_eq!(db.commits(), 2);
}

#[tokio::test]
async fn test_close_rolls_back_and_releases_isolated_connection() {
    let db = MockDatabase::with_tables(vec![users_table(1)]);
    let mut session = TransferSession::open(source(&db).as_ref(), true, "test")
        .await
        .unwrap();
    session.set_auto_commit(false).await.unwrap();
    session.execute("DELETE FROM users", &[]).await.unwrap();

    session.close().await;

    assert_eq!(db.rollbacks(), 1);
    assert_eq!(db.opened(), 1);
    assert_eq!(db.closed(), 1);
}

#[tokio::test]
async fn test_embedded_source_shares_default_connection() {
    let db = MockDatabase::new();
    let ds = MockDataSource::new("local", catalog_dialect(), db.clone())
        .embedded()
        .shared();

    let session = TransferSession::open(ds.as_ref(), true, "test").await.unwrap();

    assert!(!session.is_isolated());
    assert!(Arc::ptr_eq(session.connection(), &ds.default_connection()));
    session.close().await;
    assert_eq!(db.opened(), 0);
}
