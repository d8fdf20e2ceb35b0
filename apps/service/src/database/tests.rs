use chrono::{DateTime, Utc};
use deadpool::managed::{Pool, PoolConfig};
use libsql::Builder;
use tempfile::TempDir;

use super::memory::MemoryDatabase;
use super::migrations;
use super::models::StateChangeParams;
use super::repository::{Database, LibsqlDatabase, StoreError};
use crate::pool::LibsqlManager;

async fn create_test_database(dir: &TempDir) -> LibsqlDatabase {
    let path = dir.path().join("checks.db");
    let database = Builder::new_local(&path).build().await.unwrap();

    let conn = database.connect().unwrap();
    migrations::run_migrations(&conn).await.unwrap();

    let manager = LibsqlManager::new(database);
    let pool = Pool::builder(manager).config(PoolConfig::default()).build().unwrap();
    LibsqlDatabase::new(pool)
}

fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn hook_params(host: &str, change_threshold: i64) -> StateChangeParams {
    StateChangeParams {
        host: host.to_string(),
        change_threshold,
        action: "http://hook.example/?host={HOST}".to_string(),
    }
}

async fn exercise_hosts(database: &dyn Database) {
    assert!(database.list_hosts().await.unwrap().is_empty());

    database.add_host("b.example").await.unwrap();
    database.add_host("a.example").await.unwrap();
    assert!(matches!(
        database.add_host("a.example").await,
        Err(StoreError::HostExists)
    ));

    assert_eq!(database.list_hosts().await.unwrap(), vec!["a.example", "b.example"]);
    assert!(database.host_exists("a.example").await.unwrap());
    assert!(!database.host_exists("c.example").await.unwrap());

    database.remove_host("a.example").await.unwrap();
    assert!(matches!(
        database.remove_host("a.example").await,
        Err(StoreError::NoSuchHost)
    ));
    assert_eq!(database.list_hosts().await.unwrap(), vec!["b.example"]);
}

async fn exercise_checks(database: &dyn Database) {
    database.add_host("h.example").await.unwrap();
    assert!(database.get_last_check("h.example").await.unwrap().is_none());

    database.save_check("h.example", ts(100), 1_000, true).await.unwrap();
    database.save_check("h.example", ts(160), 7_000, true).await.unwrap();
    database.save_check("h.example", ts(220), 2_000, true).await.unwrap();

    // Rewriting the same second replaces instead of duplicating.
    database.save_check("h.example", ts(160), -1, false).await.unwrap();

    let all = database.get_checks("h.example", ts(0), ts(1_000)).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].check_time, ts(100));
    assert_eq!(all[1].rtt, -1);
    assert!(!all[1].up);

    // Range bounds are inclusive.
    let bounded = database.get_checks("h.example", ts(100), ts(160)).await.unwrap();
    assert_eq!(bounded.len(), 2);

    let last = database.get_last_check("h.example").await.unwrap().unwrap();
    assert_eq!(last.check_time, ts(220));
    assert_eq!(last.rtt, 2_000);

    database.delete_checks_before(ts(200)).await.unwrap();
    let kept = database.get_checks("h.example", ts(0), ts(1_000)).await.unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].check_time, ts(220));

    // Unknown hosts read back as empty rather than failing.
    assert!(
        database.get_checks("missing.example", ts(0), ts(1_000)).await.unwrap().is_empty()
    );
    assert!(database.get_last_check("missing.example").await.unwrap().is_none());
}

async fn exercise_params(database: &dyn Database) {
    assert!(database.get_notification_params("n.example").await.unwrap().is_none());
    assert!(matches!(
        database.upsert_notification_params(&hook_params("n.example", 3)).await,
        Err(StoreError::NoSuchHost)
    ));

    database.add_host("n.example").await.unwrap();
    database.upsert_notification_params(&hook_params("n.example", 3)).await.unwrap();
    database.upsert_notification_params(&hook_params("n.example", 5)).await.unwrap();

    let stored = database.get_notification_params("n.example").await.unwrap().unwrap();
    assert_eq!(stored.change_threshold, 5);
    assert_eq!(stored.action, "http://hook.example/?host={HOST}");

    assert_eq!(database.list_notification_params().await.unwrap().len(), 1);

    database.delete_notification_params("n.example").await.unwrap();
    assert!(database.get_notification_params("n.example").await.unwrap().is_none());
    assert!(database.list_notification_params().await.unwrap().is_empty());
}

async fn exercise_remove_cascade(database: &dyn Database) {
    database.add_host("gone.example").await.unwrap();
    database.save_check("gone.example", ts(100), 10, true).await.unwrap();
    database.upsert_notification_params(&hook_params("gone.example", 1)).await.unwrap();

    database.remove_host("gone.example").await.unwrap();
    assert!(
        database.get_checks("gone.example", ts(0), ts(1_000)).await.unwrap().is_empty()
    );
    assert!(database.get_notification_params("gone.example").await.unwrap().is_none());
}

#[tokio::test]
async fn test_memory_database_contract() {
    let database = MemoryDatabase::new();
    exercise_hosts(&database).await;
    exercise_checks(&database).await;
    exercise_params(&database).await;
    exercise_remove_cascade(&database).await;
}

#[tokio::test]
async fn test_libsql_database_contract() {
    let dir = TempDir::new().unwrap();
    let database = create_test_database(&dir).await;
    exercise_hosts(&database).await;
    exercise_checks(&database).await;
    exercise_params(&database).await;
    exercise_remove_cascade(&database).await;
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("checks.db");
    let database = Builder::new_local(&path).build().await.unwrap();
    let conn = database.connect().unwrap();

    migrations::run_migrations(&conn).await.unwrap();
    migrations::run_migrations(&conn).await.unwrap();

    let mut rows = conn
        .query("SELECT COUNT(*) FROM schema_migrations", ())
        .await
        .unwrap();
    let row = rows.next().await.unwrap().unwrap();
    assert_eq!(row.get::<i64>(0).unwrap(), 1);
}
