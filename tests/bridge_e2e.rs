//! End-to-end: mock NVR -> poller -> tree -> reconciler -> store

use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use protect_bridge::poller::Poller;
use protect_bridge::protect::{Credentials, ProtectClient};
use protect_bridge::reconciler::ReconciliationQueue;
use protect_bridge::settings::{SettingsStore, DEFAULT_SECRET};
use protect_bridge::tree::WritablePaths;
use protect_bridge::value_store::{MemoryStore, StateValue, ValueStore};

async fn mount_auth(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/auth"))
        .respond_with(ResponseTemplate::new(200).insert_header("authorization", "tok"))
        .mount(server)
        .await;
}

async fn build_poller(server: &MockServer, store: Arc<MemoryStore>, name: &str) -> Arc<Poller> {
    let settings_path =
        PathBuf::from(std::env::temp_dir()).join(format!("pb-{}-{}.json", name, std::process::id()));
    let settings = Arc::new(
        SettingsStore::load(settings_path, DEFAULT_SECRET.to_string())
            .await
            .unwrap(),
    );

    let client = Arc::new(
        ProtectClient::new(
            server.uri(),
            Credentials {
                username: "admin".to_string(),
                password: "secret".to_string(),
            },
        )
        .unwrap(),
    );

    let queue = Arc::new(ReconciliationQueue::new(store.clone() as Arc<dyn ValueStore>));

    Arc::new(Poller::new(
        client,
        store as Arc<dyn ValueStore>,
        queue,
        WritablePaths::default(),
        settings,
    ))
}

#[tokio::test]
async fn camera_mirror_writes_only_actual_changes() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/bootstrap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cameras": [{"id": "c1", "name": "Front"}]
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let poller = build_poller(&server, store.clone(), "cameras").await;

    // First sync: fresh entity, everything written
    let report = poller.sync_cameras().await.unwrap();
    assert!(report.written >= 1);
    let name = store.get_state("cameras.c1.name").await.unwrap().unwrap();
    assert_eq!(name.value, StateValue::Str("Front".to_string()));
    assert!(name.ack);
    assert!(store.object_exists("cameras").await.unwrap());
    assert!(store.object_exists("cameras.c1").await.unwrap());

    // Second sync against unchanged data: zero writes
    let report = poller.sync_cameras().await.unwrap();
    assert_eq!(report.written, 0);

    // Rename upstream: exactly one write
    server.reset().await;
    mount_auth(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/bootstrap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cameras": [{"id": "c1", "name": "Back"}]
        })))
        .mount(&server)
        .await;

    let report = poller.sync_cameras().await.unwrap();
    assert_eq!(report.written, 1);
    let name = store.get_state("cameras.c1.name").await.unwrap().unwrap();
    assert_eq!(name.value, StateValue::Str("Back".to_string()));
}

#[tokio::test]
async fn motion_events_flatten_arrays_and_mirror_last_motion() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "m1", "camera": "c1", "score": [1, 2, 3]},
            {"id": "m2", "camera": "c1", "score": 77}
        ])))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let poller = build_poller(&server, store.clone(), "motions").await;

    poller.sync_motions().await.unwrap();

    // Array collapsed to one joined scalar, not three states
    let score = store.get_state("motions.c1.m1.score").await.unwrap().unwrap();
    assert_eq!(score.value, StateValue::Str("1,2,3".to_string()));

    // lastMotion mirrors the newest event
    let last = store
        .get_state("motions.c1.lastMotion.id")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.value, StateValue::Str("m2".to_string()));
}

#[tokio::test]
async fn stale_motion_channels_are_deleted() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "m1", "camera": "c1", "score": 10}
        ])))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let poller = build_poller(&server, store.clone(), "stale").await;
    poller.sync_motions().await.unwrap();
    assert!(store.object_exists("motions.c1.m1").await.unwrap());

    // m1 fell out of the window; m2 replaces it
    server.reset().await;
    mount_auth(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "m2", "camera": "c1", "score": 20}
        ])))
        .mount(&server)
        .await;

    poller.sync_motions().await.unwrap();
    assert!(!store.object_exists("motions.c1.m1").await.unwrap());
    assert!(store.get_state("motions.c1.m1.score").await.unwrap().is_none());
    assert!(store.object_exists("motions.c1.m2").await.unwrap());
    // The lastMotion mirror is not subject to cleanup
    assert!(store.object_exists("motions.c1.lastMotion").await.unwrap());
}

#[tokio::test]
async fn writable_setting_is_patched_and_echoed() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("PATCH"))
        .and(path("/api/cameras/c1"))
        .and(body_json(json!({"recordingSettings": {"mode": "never"}})))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let poller = build_poller(&server, store.clone(), "patch").await;

    poller
        .apply_setting("cameras.c1.recordingSettings.mode", json!("never"))
        .await
        .unwrap();

    let mode = store
        .get_state("cameras.c1.recordingSettings.mode")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mode.value, StateValue::Str("never".to_string()));
    assert!(mode.ack);
}

#[tokio::test]
async fn non_writable_path_is_rejected_without_nvr_traffic() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let poller = build_poller(&server, store.clone(), "forbidden").await;

    let err = poller
        .apply_setting("cameras.c1.type", json!("UVC G3"))
        .await
        .unwrap_err();
    assert!(matches!(err, protect_bridge::Error::Forbidden(_)));
    assert!(store.get_state("cameras.c1.type").await.unwrap().is_none());
}

#[tokio::test]
async fn stop_joins_the_loop_and_restart_stays_single() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/bootstrap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "cameras": [] })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let poller = build_poller(&server, store.clone(), "lifecycle").await;

    poller.clone().start().await;
    assert!(poller.is_running().await);

    // A second start while the loop is alive is a no-op
    poller.clone().start().await;
    assert!(poller.is_running().await);

    // Default period is 60s: stop must exit the loop without waiting
    // for the next tick
    tokio::time::timeout(Duration::from_secs(5), poller.stop())
        .await
        .expect("stop() blocked on the poll interval");
    assert!(!poller.is_running().await);

    // The old loop is joined, so an immediate restart is clean
    poller.clone().start().await;
    assert!(poller.is_running().await);
    tokio::time::timeout(Duration::from_secs(5), poller.stop())
        .await
        .expect("stop() blocked after restart");
    assert!(!poller.is_running().await);
}
