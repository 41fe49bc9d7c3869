//! Database tests: reference cache, options, and events flowing from the
//! backend through the dispatch task.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use rtdb::{
    callback, BackendErrorPayload, BackendEvent, Database, DatabaseOptions, ErrorEvent, EventType,
    Snapshot,
};

use super::common::{data_event, database, eventually, next, value_event, Call, MockBackend};

// ============================================================================
// Reference cache
// ============================================================================

#[tokio::test]
async fn equal_paths_share_one_reference() {
    let backend = MockBackend::new();
    let db = database(&backend);

    let a = db.reference("a/b");
    let b = db.reference(["a", "b"]);
    let c = db.reference("/a//b/");

    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(db.cached_references(), 1);
    assert!(!Arc::ptr_eq(&a, &db.reference("a")));
}

#[tokio::test]
async fn release_forgets_the_cached_reference() {
    let backend = MockBackend::new();
    let db = database(&backend);

    let before = db.reference("users/u1");
    assert!(db.release("users/u1"));
    assert!(!db.release("users/u1"));

    let after = db.reference("users/u1");
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before.to_path_string(), after.to_path_string());
}

// ============================================================================
// Options and connection
// ============================================================================

#[tokio::test]
async fn open_applies_persistence_and_keep_synced() {
    let backend = MockBackend::new();
    let options: DatabaseOptions = serde_json::from_value(json!({
        "name": "chat",
        "persistence": true,
        "keep_synced": ["/rooms", "presence"]
    }))
    .unwrap();

    let db = Database::open(backend.clone(), options).await.unwrap();

    assert_eq!(db.name(), "chat");
    assert!(db.persistence_enabled());
    assert_eq!(
        backend.calls(),
        vec![
            Call::Persistence(true),
            Call::KeepSynced {
                path: "/rooms".into(),
                enabled: true,
            },
            Call::KeepSynced {
                path: "/presence".into(),
                enabled: true,
            },
        ]
    );
}

#[tokio::test]
async fn set_persistence_skips_redundant_calls() {
    let backend = MockBackend::new();
    let db = database(&backend);
    assert_eq!(db.name(), "[DEFAULT]");

    db.set_persistence(false).await.unwrap();
    db.set_persistence(true).await.unwrap();
    db.set_persistence(true).await.unwrap();

    assert_eq!(backend.calls(), vec![Call::Persistence(true)]);
}

#[tokio::test]
async fn failed_persistence_change_keeps_previous_state() {
    let backend = MockBackend::new();
    backend.fail(
        "set_persistence",
        rtdb::BackendError::new("unavailable", "storage locked"),
    );
    let db = database(&backend);

    assert!(db.set_persistence(true).await.is_err());
    assert!(!db.persistence_enabled());
}

#[tokio::test]
async fn connection_toggles_reach_the_backend() {
    let backend = MockBackend::new();
    let db = database(&backend);

    db.go_offline();
    db.go_online();
    assert_eq!(backend.calls(), vec![Call::GoOffline, Call::GoOnline]);
}

// ============================================================================
// Events through the dispatch task
// ============================================================================

#[tokio::test]
async fn chat_messages_end_to_end() {
    let backend = MockBackend::new();
    let db = database(&backend);
    let (tx, mut rx) = mpsc::unbounded_channel::<Snapshot>();

    let latest = db
        .reference("chat/messages")
        .order_by_child("ts")
        .unwrap()
        .limit_to_last(20);
    let listener = callback(move |snap| {
        let _ = tx.send(snap.clone());
    });
    latest.on(EventType::Value, listener.clone()).await.unwrap();

    let delivered = backend.emit(data_event(
        "/chat/messages",
        "orderByChild:ts|limitToLast:20",
        EventType::Value,
        json!({
            "key": "messages",
            "value": { "m1": { "ts": 1 } },
            "childKeys": ["m1"]
        }),
    ));
    assert_eq!(delivered, 1);

    let snap = next(&mut rx).await;
    assert_eq!(snap.key(), Some("messages"));
    assert!(snap.exists());
    let mut children: Vec<(String, Value)> = Vec::new();
    snap.for_each(|key, value| children.push((key.to_string(), value.clone())));
    assert_eq!(children, vec![("m1".to_string(), json!({ "ts": 1 }))]);

    latest.off(Some(EventType::Value), Some(&listener)).await.unwrap();
    assert_eq!(
        backend.unwatch_calls(),
        vec![Call::Unwatch {
            path: "/chat/messages".into(),
            modifiers_string: "orderByChild:ts|limitToLast:20".into(),
            event: Some(EventType::Value),
        }]
    );
    assert_eq!(backend.listener_count(), 0);
}

#[tokio::test]
async fn events_for_one_target_arrive_in_backend_order() {
    let backend = MockBackend::new();
    let db = database(&backend);
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();

    db.reference("counter")
        .on(
            EventType::Value,
            callback(move |snap| {
                let _ = tx.send(snap.val().clone());
            }),
        )
        .await
        .unwrap();

    for n in 1..=5 {
        backend.emit(value_event("/counter", "", json!(n)));
    }
    for n in 1..=5 {
        assert_eq!(next(&mut rx).await, json!(n));
    }
}

#[tokio::test]
async fn stale_event_from_backend_is_unwatched() {
    let backend = MockBackend::new();
    let db = database(&backend);
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();

    db.reference("live")
        .on(
            EventType::Value,
            callback(move |snap| {
                let _ = tx.send(snap.val().clone());
            }),
        )
        .await
        .unwrap();

    backend.emit(value_event("/dropped", "", json!("late")));
    backend.emit(value_event("/live", "", json!("fresh")));

    assert_eq!(next(&mut rx).await, json!("fresh"));
    eventually("defensive unwatch", || {
        backend.unwatch_calls().contains(&Call::Unwatch {
            path: "/dropped".into(),
            modifiers_string: String::new(),
            event: Some(EventType::Value),
        })
    })
    .await;
}

#[tokio::test]
async fn backend_errors_reach_database_error_listeners() {
    let backend = MockBackend::new();
    let db = database(&backend);
    let (tx, mut rx) = mpsc::unbounded_channel::<ErrorEvent>();

    db.reference("secret")
        .on(EventType::Value, callback(|_| {}))
        .await
        .unwrap();
    let id = db.on_error(move |e| {
        let _ = tx.send(e.clone());
    });

    backend.emit(BackendEvent::Error(ErrorEvent {
        path: "/secret".into(),
        modifiers_string: String::new(),
        event: Some(EventType::Value),
        error: BackendErrorPayload {
            code: "permission-denied".into(),
            message: "rules rejected read".into(),
        },
    }));

    let err = next(&mut rx).await;
    assert_eq!(err.path, "/secret");
    assert_eq!(rtdb::BackendError::from(err.error).code, "permission-denied");
    assert!(db.off_error(id));
}

#[tokio::test]
async fn cleanup_detaches_backend_listeners() {
    let backend = MockBackend::new();
    let db = database(&backend);

    db.reference("a").on(EventType::Value, callback(|_| {})).await.unwrap();
    db.reference("b")
        .limit_to_first(1)
        .on(EventType::ChildAdded, callback(|_| {}))
        .await
        .unwrap();
    assert_eq!(backend.listener_count(), 2);
    assert_eq!(db.registry().handle_count(), 2);

    db.cleanup().await.unwrap();

    assert_eq!(backend.unwatch_calls().len(), 2);
    assert_eq!(backend.listener_count(), 0);
    assert_eq!(db.registry().handle_count(), 0);
}
