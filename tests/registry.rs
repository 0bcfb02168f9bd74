//! Integration tests for the channel registry.

use chatkeeper::db::{Database, StoreError};
use chrono::{TimeZone, Utc};
use std::time::Duration;

async fn test_db() -> Database {
    Database::connect(":memory:", 1, Duration::from_millis(10))
        .await
        .expect("in-memory database")
}

#[tokio::test]
async fn test_add_channel_is_idempotent() {
    let db = test_db().await;
    let registry = db.registry();

    assert!(registry.add_channel("Foo").await.expect("first add"));
    assert!(!registry.add_channel("foo").await.expect("second add"));
    assert!(!registry.add_channel("#FOO").await.expect("third add"));

    let row = registry
        .get_channel("foo")
        .await
        .expect("lookup")
        .expect("channel exists");
    assert_eq!(row.name, "foo");
    assert!(row.is_active);
}

#[tokio::test]
async fn test_add_channel_concurrent_creates_one_record() {
    let db = test_db().await;

    let (a, b) = tokio::join!(
        async {
            db.registry().add_channel("Foo").await.expect("add a")
        },
        async {
            db.registry().add_channel("foo").await.expect("add b")
        }
    );

    // Exactly one of the two concurrent registrations created the record.
    assert!(a ^ b, "expected exactly one creation, got a={a} b={b}");

    let row = db
        .registry()
        .get_channel("Foo")
        .await
        .expect("lookup")
        .expect("channel exists");
    assert_eq!(row.name, "foo");
}

#[tokio::test]
async fn test_update_activity() {
    let db = test_db().await;
    let registry = db.registry();

    let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    assert!(
        !registry
            .update_activity("ghost", ts)
            .await
            .expect("update on absent channel"),
        "absent channel must be a no-op"
    );

    registry.add_channel("foo").await.expect("add");
    assert!(registry.update_activity("foo", ts).await.expect("update"));

    let row = registry
        .get_channel("foo")
        .await
        .expect("lookup")
        .expect("channel exists");
    assert_eq!(row.last_activity, ts.timestamp());
}

#[tokio::test]
async fn test_list_active_sorted_and_filtered() {
    let db = test_db().await;
    let registry = db.registry();

    registry.add_channel("zeta").await.expect("add");
    registry.add_channel("alpha").await.expect("add");
    registry.add_channel("mid").await.expect("add");
    registry.deactivate("mid").await.expect("deactivate");

    let epoch = Utc.timestamp_opt(0, 0).unwrap();
    let active = registry.list_active(epoch).await.expect("list");
    let names: Vec<&str> = active.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "zeta"]);

    // A cutoff in the future filters everything out.
    let far_future = Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap();
    assert!(registry.list_active(far_future).await.expect("list").is_empty());
}

#[tokio::test]
async fn test_deactivate_keeps_record() {
    let db = test_db().await;
    let registry = db.registry();

    registry.add_channel("foo").await.expect("add");
    assert!(registry.deactivate("foo").await.expect("deactivate"));

    let row = registry
        .get_channel("foo")
        .await
        .expect("lookup")
        .expect("record still present");
    assert!(!row.is_active);
}

#[tokio::test]
async fn test_remove_channel() {
    let db = test_db().await;
    let registry = db.registry();

    registry.add_channel("foo").await.expect("add");
    assert!(registry.remove("foo").await.expect("remove"));
    assert!(registry.get_channel("foo").await.expect("lookup").is_none());
    assert!(!registry.remove("foo").await.expect("second remove"));
}

#[tokio::test]
async fn test_operations_fail_when_handle_closed() {
    let db = test_db().await;
    db.close().await;
    // close is idempotent
    db.close().await;

    let err = db.registry().add_channel("foo").await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable));

    let err = db.ping().await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable));
}
