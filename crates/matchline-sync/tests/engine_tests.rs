//! Integration tests for the sync engine
//!
//! Each test wires a real in-memory store and the HTTP gateway against a
//! wiremock backend, then drives full cycles through the engine.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use matchline_api::{ApiClient, HttpBackendGateway};
use matchline_core::config::Config;
use matchline_core::domain::newtypes::{EntityId, EntityKind};
use matchline_core::domain::queue::{Operation, Priority, QueueStatus, SyncQueueItem};
use matchline_core::ports::backend::StaticTokenProvider;
use matchline_core::ports::local_store::{LocalStore, META_LAST_PULL_AT};
use matchline_store::{DatabasePool, SqliteLocalStore};
use matchline_sync::{NetworkMonitor, SyncEngine, SyncOutcome, SyncScheduler};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test helpers
// ============================================================================

async fn setup(server: &MockServer, online: bool) -> (Arc<SqliteLocalStore>, SyncEngine) {
    setup_with_config(server, online, Config::default()).await
}

async fn setup_with_config(
    server: &MockServer,
    online: bool,
    config: Config,
) -> (Arc<SqliteLocalStore>, SyncEngine) {
    let pool = DatabasePool::in_memory().await.unwrap();
    let store = Arc::new(SqliteLocalStore::new(pool.pool().clone()));

    let client = ApiClient::new(
        server.uri(),
        Arc::new(StaticTokenProvider("test-token".to_string())),
    )
    .unwrap();
    let gateway = Arc::new(HttpBackendGateway::new(client));
    let network = Arc::new(NetworkMonitor::new(online));

    let engine = SyncEngine::new(store.clone(), gateway, network, &config);
    (store, engine)
}

/// Mounts an empty pull response
async fn mount_empty_pull(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/sync/pull"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(server)
        .await;
}

fn ts(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

fn update_item(
    kind: EntityKind,
    id: &str,
    priority: Priority,
    created_at: DateTime<Utc>,
) -> SyncQueueItem {
    let mut item = SyncQueueItem::new(
        Operation::Update,
        kind,
        EntityId::server(id),
        json!({"id": id}),
        priority,
    );
    item.created_at = created_at;
    item
}

// ============================================================================
// Offline gating and busy guard
// ============================================================================

#[tokio::test]
async fn test_offline_trigger_is_noop() {
    let server = MockServer::start().await;
    // No mocks mounted: any request would fail the test via 404 handling.
    let (store, engine) = setup(&server, false).await;

    store
        .enqueue(&update_item(
            EntityKind::Swipe,
            "s1",
            Priority::High,
            Utc::now(),
        ))
        .await
        .unwrap();

    let outcome = engine.try_sync().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::SkippedOffline));
    assert!(server.received_requests().await.unwrap().is_empty());

    // The queued mutation is untouched.
    let counts = store.queue_counts().await.unwrap();
    assert_eq!(counts.pending, 1);
}

// ============================================================================
// Pull application
// ============================================================================

#[tokio::test]
async fn test_pull_applies_rows_and_records_watermark() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/sync/pull"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "profiles": [
                {"id": "profile-1", "userId": "u1", "bio": "hi", "updatedAt": 1_000},
            ],
            "jobs": [
                {"id": "job-1", "companyId": "acme", "title": "Engineer",
                 "status": "open", "updatedAt": 2_000},
            ],
        })))
        .mount(&server)
        .await;

    let (store, engine) = setup(&server, true).await;
    let outcome = engine.try_sync().await.unwrap();

    let SyncOutcome::Completed(summary) = outcome else {
        panic!("Expected completed cycle");
    };
    assert_eq!(summary.pulled, 2);
    assert_eq!(summary.push_failed, 0);

    // Rows landed as synced, server timestamps intact.
    let profile = store
        .get_row(EntityKind::Profile, &EntityId::server("profile-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile["syncStatus"], "synced");
    assert_eq!(profile["updatedAt"], 1_000);

    // The watermark is the newest updatedAt across the response.
    let watermark = store.get_meta(META_LAST_PULL_AT).await.unwrap().unwrap();
    assert_eq!(watermark, json!(2_000));
}

#[tokio::test]
async fn test_pull_failure_aborts_cycle_and_leaves_queue_untouched() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/sync/pull"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let (store, engine) = setup(&server, true).await;
    let item = update_item(EntityKind::Swipe, "s1", Priority::High, Utc::now());
    store.enqueue(&item).await.unwrap();

    assert!(engine.try_sync().await.is_err());

    // Push never ran: the item has zero attempts and no metadata was written.
    let untouched = store.get_queue_item(&item.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, QueueStatus::Pending);
    assert_eq!(untouched.attempts, 0);
    assert!(store.get_meta(META_LAST_PULL_AT).await.unwrap().is_none());
}

// ============================================================================
// Push drain
// ============================================================================

#[tokio::test]
async fn test_queue_drains_in_priority_then_creation_order() {
    let server = MockServer::start().await;
    mount_empty_pull(&server).await;

    Mock::given(method("PUT"))
        .and(path_regex(r"^/api/swipe/.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let (store, engine) = setup(&server, true).await;
    let base = ts(1_700_000_000_000);

    store
        .enqueue(&update_item(EntityKind::Swipe, "e1", Priority::Medium, base))
        .await
        .unwrap();
    store
        .enqueue(&update_item(
            EntityKind::Swipe,
            "e2",
            Priority::Medium,
            base + Duration::seconds(1),
        ))
        .await
        .unwrap();
    store
        .enqueue(&update_item(
            EntityKind::Swipe,
            "e3",
            Priority::Critical,
            base + Duration::seconds(2),
        ))
        .await
        .unwrap();

    let outcome = engine.try_sync().await.unwrap();
    let SyncOutcome::Completed(summary) = outcome else {
        panic!("Expected completed cycle");
    };
    assert_eq!(summary.pushed, 3);

    // Replay order: critical first, then the two mediums by creation time.
    let pushed: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "PUT")
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(
        pushed,
        vec!["/api/swipe/e3", "/api/swipe/e1", "/api/swipe/e2"]
    );
}

#[tokio::test]
async fn test_item_failure_does_not_abort_drain() {
    let server = MockServer::start().await;
    mount_empty_pull(&server).await;

    Mock::given(method("PUT"))
        .and(path("/api/swipe/bad"))
        .respond_with(ResponseTemplate::new(500).set_body_string("rejected"))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/swipe/good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let (store, engine) = setup(&server, true).await;
    let base = ts(1_700_000_000_000);
    let bad = update_item(EntityKind::Swipe, "bad", Priority::High, base);
    let good = update_item(
        EntityKind::Swipe,
        "good",
        Priority::High,
        base + Duration::seconds(1),
    );
    store.enqueue(&bad).await.unwrap();
    store.enqueue(&good).await.unwrap();

    let SyncOutcome::Completed(summary) = engine.try_sync().await.unwrap() else {
        panic!("Expected completed cycle");
    };
    assert_eq!(summary.pushed, 1);
    assert_eq!(summary.push_failed, 1);

    // The failed item is rescheduled with backoff, not lost.
    let failed = store.get_queue_item(&bad.id).await.unwrap().unwrap();
    assert_eq!(failed.status, QueueStatus::Pending);
    assert_eq!(failed.attempts, 1);
    assert!(failed.next_retry_at.is_some());

    let pushed = store.get_queue_item(&good.id).await.unwrap().unwrap();
    assert_eq!(pushed.status, QueueStatus::Completed);
}

#[tokio::test]
async fn test_create_ack_reconciles_temporary_id() {
    let server = MockServer::start().await;
    mount_empty_pull(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/messages"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": {"id": "msg-srv-1"}
        })))
        .mount(&server)
        .await;

    let (store, engine) = setup(&server, true).await;

    // Offline create: temporary id on the row and the queued mutation.
    let local_id = EntityId::fresh_local();
    let doc = json!({
        "id": local_id.to_string(),
        "matchId": "match-1",
        "senderId": "u1",
        "recipientId": "u2",
        "body": "hello",
    });
    let item = SyncQueueItem::new(
        Operation::Create,
        EntityKind::Message,
        local_id.clone(),
        doc.clone(),
        Priority::High,
    );
    store
        .put_row_with_enqueue(EntityKind::Message, doc, item)
        .await
        .unwrap();

    let SyncOutcome::Completed(summary) = engine.try_sync().await.unwrap() else {
        panic!("Expected completed cycle");
    };
    assert_eq!(summary.pushed, 1);

    // The temporary id is gone; the server id carries the row, synced.
    assert!(store
        .get_row(EntityKind::Message, &local_id)
        .await
        .unwrap()
        .is_none());
    let migrated = store
        .get_row(EntityKind::Message, &EntityId::server("msg-srv-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(migrated["id"], "msg-srv-1");
    assert_eq!(migrated["syncStatus"], "synced");
}

#[tokio::test]
async fn test_offline_edits_replay_after_reconnect() {
    let server = MockServer::start().await;
    mount_empty_pull(&server).await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/api/swipe/.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let pool = DatabasePool::in_memory().await.unwrap();
    let store = Arc::new(SqliteLocalStore::new(pool.pool().clone()));
    let client = ApiClient::new(
        server.uri(),
        Arc::new(StaticTokenProvider("test-token".to_string())),
    )
    .unwrap();
    let network = Arc::new(NetworkMonitor::new(false));
    let engine = SyncEngine::new(
        store.clone(),
        Arc::new(HttpBackendGateway::new(client)),
        network.clone(),
        &Config::default(),
    );

    // Mutations accumulate while offline; triggers are no-ops.
    let base = ts(1_700_000_000_000);
    for (i, id) in ["s1", "s2"].iter().enumerate() {
        store
            .enqueue(&update_item(
                EntityKind::Swipe,
                id,
                Priority::High,
                base + Duration::seconds(i as i64),
            ))
            .await
            .unwrap();
    }
    assert!(matches!(
        engine.try_sync().await.unwrap(),
        SyncOutcome::SkippedOffline
    ));

    // Reconnect and replay: server state equals the mutations in creation
    // order.
    network.set_online(true);
    let SyncOutcome::Completed(summary) = engine.try_sync().await.unwrap() else {
        panic!("Expected completed cycle");
    };
    assert_eq!(summary.pushed, 2);

    let pushed: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "PUT")
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(pushed, vec!["/api/swipe/s1", "/api/swipe/s2"]);
}

// ============================================================================
// Conflict routing during pull
// ============================================================================

#[tokio::test]
async fn test_pull_conflict_merges_offline_edit() {
    let server = MockServer::start().await;

    // The server diverged at t=15 while a local profile edit (bio "X") sat
    // queued offline.
    Mock::given(method("POST"))
        .and(path("/api/sync/pull"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "profiles": [
                {"id": "profile-1", "userId": "u1", "bio": "Y", "updatedAt": 15},
            ],
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/profile/candidate/profile-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let (store, engine) = setup(&server, true).await;

    // Local row last agreed with the server at t=5, edited at t=10.
    store
        .bulk_put(
            EntityKind::Profile,
            vec![json!({
                "id": "profile-1", "userId": "u1", "bio": "X",
                "updatedAt": 10, "lastSyncedAt": 5, "syncStatus": "pending",
            })],
        )
        .await
        .unwrap();
    // The queued write happened after the server's t=15 version.
    let mut item = SyncQueueItem::new(
        Operation::Update,
        EntityKind::Profile,
        EntityId::server("profile-1"),
        json!({"id": "profile-1", "bio": "X"}),
        Priority::High,
    );
    item.created_at = ts(18);
    store.enqueue(&item).await.unwrap();

    let SyncOutcome::Completed(summary) = engine.try_sync().await.unwrap() else {
        panic!("Expected completed cycle");
    };
    assert_eq!(summary.conflicts_resolved, 1);
    assert!(summary.deferred_conflicts.is_empty());

    // merge-fields kept the newer local bio; the row is back in agreement.
    let row = store
        .get_row(EntityKind::Profile, &EntityId::server("profile-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["bio"], "X");
    assert_eq!(row["syncStatus"], "synced");
}

#[tokio::test]
async fn test_manual_strategy_defers_and_flags_row() {
    let server = MockServer::start().await;

    // Only the pull endpoint is mounted; the queued profile push will fail
    // (and reschedule) rather than overwrite the conflict flag.
    Mock::given(method("POST"))
        .and(path("/api/sync/pull"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "profiles": [
                {"id": "profile-1", "userId": "u1", "bio": "Y", "updatedAt": 15},
            ],
        })))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config
        .conflicts
        .strategies
        .insert("profiles".to_string(), "manual".to_string());
    let (store, engine) = setup_with_config(&server, true, config).await;

    store
        .bulk_put(
            EntityKind::Profile,
            vec![json!({
                "id": "profile-1", "userId": "u1", "bio": "X",
                "updatedAt": 10, "lastSyncedAt": 5, "syncStatus": "pending",
            })],
        )
        .await
        .unwrap();
    let mut item = SyncQueueItem::new(
        Operation::Update,
        EntityKind::Profile,
        EntityId::server("profile-1"),
        json!({"id": "profile-1", "bio": "X"}),
        Priority::High,
    );
    item.created_at = ts(18);
    store.enqueue(&item).await.unwrap();

    let SyncOutcome::Completed(summary) = engine.try_sync().await.unwrap() else {
        panic!("Expected completed cycle");
    };
    assert_eq!(summary.conflicts_resolved, 0);
    assert_eq!(summary.deferred_conflicts.len(), 1);
    assert_eq!(summary.push_failed, 1);

    // The engine never silently picks a winner: the local bio stands and
    // the row is flagged for the caller.
    let row = store
        .get_row(EntityKind::Profile, &EntityId::server("profile-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["bio"], "X");
    assert_eq!(row["syncStatus"], "conflict");
}

// ============================================================================
// Scheduler
// ============================================================================

/// Polls until the queue drains or the deadline passes
async fn wait_for_drain(store: &SqliteLocalStore, expected_completed: u64) -> bool {
    for _ in 0..100 {
        let counts = store.queue_counts().await.unwrap();
        if counts.pending == 0 && counts.processing == 0 && counts.completed == expected_completed
        {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_scheduler_bootstrap_and_manual_trigger() {
    let server = MockServer::start().await;
    mount_empty_pull(&server).await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/api/swipe/.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let (store, engine) = setup(&server, true).await;
    store
        .enqueue(&update_item(
            EntityKind::Swipe,
            "s1",
            Priority::High,
            Utc::now(),
        ))
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let scheduler = Arc::new(SyncScheduler::new(
        Arc::new(engine),
        Arc::new(NetworkMonitor::new(true)),
        std::time::Duration::from_secs(3600), // out of the way for this test
        shutdown.clone(),
    ));

    let run = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run().await }
    });

    // The application-launch bootstrap cycle drains the first item.
    assert!(wait_for_drain(&store, 1).await, "bootstrap sync never ran");

    // A manual trigger picks up work enqueued later.
    store
        .enqueue(&update_item(
            EntityKind::Swipe,
            "s2",
            Priority::High,
            Utc::now(),
        ))
        .await
        .unwrap();
    scheduler.request_sync();
    assert!(wait_for_drain(&store, 2).await, "manual sync never ran");

    shutdown.cancel();
    run.await.unwrap();
}

// ============================================================================
// Status surface
// ============================================================================

#[tokio::test]
async fn test_status_counts_and_subscription() {
    let server = MockServer::start().await;
    mount_empty_pull(&server).await;

    let (store, engine) = setup(&server, true).await;
    store
        .enqueue(&update_item(
            EntityKind::Swipe,
            "s1",
            Priority::High,
            Utc::now(),
        ))
        .await
        .unwrap();

    let status = engine.status().await.unwrap();
    assert!(status.is_online);
    assert!(!status.is_syncing);
    assert_eq!(status.pending, 1);
    assert_eq!(status.failed, 0);
    assert!(status.last_successful_sync_at.is_none());

    // Push endpoint for the queued swipe.
    Mock::given(method("PUT"))
        .and(path("/api/swipe/s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let mut events = engine.subscribe();
    engine.try_sync().await.unwrap();

    // First event marks the cycle start, second its end.
    let started = events.recv().await.unwrap();
    assert!(started.is_syncing);
    let finished = events.recv().await.unwrap();
    assert!(!finished.is_syncing);
    assert_eq!(finished.pending, 0);
    assert!(finished.last_successful_sync_at.is_some());
}
