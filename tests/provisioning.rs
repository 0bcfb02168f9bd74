//! Integration tests for namespace provisioning and isolation.

use chatkeeper::db::{ChatMessageRecord, Database, Provisioner};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

async fn test_provisioner(default_retention_days: u32) -> Provisioner {
    let db = Database::connect(":memory:", 1, Duration::from_millis(10))
        .await
        .expect("in-memory database");
    Provisioner::new(db, default_retention_days)
}

fn record(channel: &str, user: &str, text: &str) -> ChatMessageRecord {
    ChatMessageRecord {
        channel: channel.to_string(),
        user: user.to_string(),
        text: text.to_string(),
        timestamp: Utc::now(),
        user_id: None,
        message_id: None,
        is_mod: false,
        is_subscriber: false,
    }
}

#[tokio::test]
async fn test_namespace_identity_from_normalized_name() {
    let provisioner = test_provisioner(30).await;

    let a = provisioner.namespace("#TestStream").await.expect("provision");
    let b = provisioner.namespace("teststream").await.expect("cached");

    assert_eq!(a.channel(), "teststream");
    assert_eq!(a.slug(), b.slug());
    assert!(Arc::ptr_eq(&a, &b), "handles must come from the cache");
}

#[tokio::test]
async fn test_concurrent_provisioning_converges() {
    let provisioner = Arc::new(test_provisioner(30).await);

    let p1 = Arc::clone(&provisioner);
    let p2 = Arc::clone(&provisioner);
    let (a, b) = tokio::join!(
        tokio::spawn(async move { p1.namespace("racy").await }),
        tokio::spawn(async move { p2.namespace("racy").await }),
    );

    let a = a.expect("task a").expect("provision a");
    let b = b.expect("task b").expect("provision b");
    assert_eq!(a.slug(), b.slug());

    // Exactly one config record exists.
    let config = provisioner
        .config_store()
        .get_config("racy")
        .await
        .expect("config");
    assert_eq!(config.channel, "racy");
    assert!(config.custom_commands.is_empty());
}

#[tokio::test]
async fn test_provisioning_seeds_defaults() {
    let provisioner = test_provisioner(14).await;

    let config = provisioner
        .config_store()
        .get_config("fresh")
        .await
        .expect("lazy provisioning on config read");

    assert_eq!(config.message_retention_days, 14);
    assert!(config.enabled_commands.contains("!commands"));
    assert!(config.enabled_commands.contains("!setretention"));
    assert!(config.custom_commands.is_empty());
    assert!(config.auto_mod_settings.is_empty());
    assert!(config.welcome_message.is_none());
}

#[tokio::test]
async fn test_messages_are_isolated_between_channels() {
    let provisioner = test_provisioner(30).await;
    let archive = provisioner.archive();

    archive.append(&record("alpha", "alice", "for alpha")).await.expect("append");
    archive.append(&record("alpha", "bob", "also alpha")).await.expect("append");
    archive.append(&record("beta", "carol", "for beta")).await.expect("append");

    let alpha = archive.messages("alpha").await.expect("alpha messages");
    let beta = archive.messages("beta").await.expect("beta messages");

    assert_eq!(alpha.len(), 2);
    assert_eq!(beta.len(), 1);
    assert!(alpha.iter().all(|m| m.channel == "alpha"));
    assert_eq!(beta[0].text, "for beta");

    // Differently written names resolve to the same namespace.
    assert_eq!(archive.message_count("#Alpha").await.expect("count"), 2);
}

#[tokio::test]
async fn test_similar_punctuated_names_stay_isolated() {
    let provisioner = test_provisioner(30).await;
    let archive = provisioner.archive();

    // These all normalize to distinct names that differ only in characters
    // outside the slug alphabet; each must get its own namespace.
    let a = provisioner.namespace("a-b").await.expect("provision");
    let b = provisioner.namespace("a.b").await.expect("provision");
    let c = provisioner.namespace("a_b").await.expect("provision");
    assert_ne!(a.slug(), b.slug());
    assert_ne!(a.slug(), c.slug());
    assert_ne!(b.slug(), c.slug());

    archive.append(&record("a-b", "alice", "only for a-b")).await.expect("append");

    assert!(archive.messages("a.b").await.expect("a.b messages").is_empty());
    assert!(archive.messages("a_b").await.expect("a_b messages").is_empty());
    assert_eq!(archive.message_count("a-b").await.expect("count"), 1);
}

#[tokio::test]
async fn test_retention_of_similar_names_is_independent() {
    let provisioner = test_provisioner(30).await;
    let archive = provisioner.archive();
    let store = provisioner.config_store();

    let mut old = record("a.b", "alice", "ten days old");
    old.timestamp = Utc::now() - chrono::Duration::days(10);
    archive.append(&old).await.expect("append");

    // Shortening a-b's window must not expire a.b's archive.
    store.set_retention("a-b", 2).await.expect("set retention");
    store.set_retention("a.b", 100).await.expect("set retention");

    assert_eq!(archive.sweep_expired(Utc::now()).await.expect("sweep"), 0);
    assert_eq!(archive.message_count("a.b").await.expect("count"), 1);
}

#[tokio::test]
async fn test_append_preserves_arrival_order() {
    let provisioner = test_provisioner(30).await;
    let archive = provisioner.archive();

    for i in 0..5 {
        archive
            .append(&record("ordered", "alice", &format!("msg {i}")))
            .await
            .expect("append");
    }

    let messages = archive.messages("ordered").await.expect("messages");
    let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);
}

#[tokio::test]
async fn test_duplicate_message_ids_are_ignored() {
    let provisioner = test_provisioner(30).await;
    let archive = provisioner.archive();

    let mut msg = record("dupes", "alice", "hello");
    msg.message_id = Some("abc-123".to_string());

    archive.append(&msg).await.expect("first delivery");
    archive.append(&msg).await.expect("redelivery");

    assert_eq!(archive.message_count("dupes").await.expect("count"), 1);
}
