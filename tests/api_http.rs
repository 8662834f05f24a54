// tests/api_http.rs
//
// HTTP-level tests for the router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /jobs/ingest/run (auth, body normalization, response shape,
//   runs surviving a dropped client)

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt as _; // for `oneshot`

use vip_news_ingest::api::{create_router, AppState};
use vip_news_ingest::fetch::{Method, ScriptedResponse, ScriptedTransport};
use vip_news_ingest::query::QueryBuilder;
use vip_news_ingest::storage::MemoryStore;
use vip_news_ingest::{Ingestor, PipelineConfig, Vip};

const BODY_LIMIT: usize = 1024 * 1024;

/// Router over an in-memory store. The scripted transport has no routes, so
/// every feed fetch fails fast and counts as an error.
fn test_app(api_key: Option<&str>, store: Arc<MemoryStore>) -> Router {
    let ingestor = Ingestor::from_config(
        store,
        Arc::new(ScriptedTransport::new()),
        Arc::new(PipelineConfig::default()),
    )
    .expect("ingestor");
    create_router(AppState::new(Arc::new(ingestor), api_key.map(str::to_string)))
}

fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_vips(vec![
        Vip::new("vip-123", "Christine Lagarde", &["ラガルド"]),
        Vip::new("vip-456", "Jerome Powell", &["Powell"]),
    ]))
}

fn trigger(key: Option<&str>, body: &str) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri("/jobs/ingest/run")
        .header("content-type", "application/json");
    if let Some(k) = key {
        req = req.header("x-admin-key", k);
    }
    req.body(Body::from(body.to_string())).expect("build trigger request")
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn health_returns_ok() {
    let app = test_app(Some("k"), store());
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn wrong_key_is_rejected_before_touching_storage() {
    let store = store();
    let app = test_app(Some("correct-key"), store.clone());

    let resp = app.oneshot(trigger(Some("wrong-key"), "{}")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(resp).await, json!({"ok": false, "error": "unauthorized"}));
    assert_eq!(store.calls().active_vips, 0);
}

#[tokio::test]
async fn missing_key_or_unconfigured_secret_is_rejected() {
    let resp = test_app(Some("k"), store())
        .oneshot(trigger(None, "{}"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test_app(None, store())
        .oneshot(trigger(Some("anything"), "{}"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn authorized_run_returns_summary() {
    let app = test_app(Some("test-key"), store());
    let resp = app
        .oneshot(trigger(
            Some("test-key"),
            r#"{"vipIds":["vip-123",""],"recentHours":48,"dryRun":"true"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let v = json_body(resp).await;
    assert_eq!(v["ok"], json!(true));
    assert!(v["jobId"].as_str().unwrap().starts_with("ingest-"));
    assert!(v["startedAt"].is_string());
    assert!(v["endedAt"].is_string());
    assert_eq!(v["totals"], json!({"new": 0, "skip": 0, "error": 2, "seen": 0}));
    let per_vip = v["perVip"].as_object().unwrap();
    assert_eq!(per_vip.keys().collect::<Vec<_>>(), vec!["vip-123"]);
    assert_eq!(per_vip["vip-123"]["queries"], json!(2));
}

#[tokio::test]
async fn malformed_body_is_treated_as_empty() {
    let app = test_app(Some("test-key"), store());
    let resp = app
        .oneshot(trigger(Some("test-key"), "{not json"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["perVip"].as_object().unwrap().len(), 2);
}

#[tokio::test]
async fn storage_outage_maps_to_internal_error() {
    let store = store();
    store.fail_vip_loads(true);
    let app = test_app(Some("test-key"), store);
    let resp = app.oneshot(trigger(Some("test-key"), "{}")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(resp).await,
        json!({"ok": false, "error": "internal_error"})
    );
}

#[serial_test::serial]
#[tokio::test]
async fn state_reads_secret_from_env() {
    std::env::set_var("API_KEY", "env-key");
    let ingestor = Ingestor::from_config(
        store(),
        Arc::new(ScriptedTransport::new()),
        Arc::new(PipelineConfig::default()),
    )
    .unwrap();
    let app = create_router(AppState::from_env(Arc::new(ingestor)));
    std::env::remove_var("API_KEY");

    let resp = app.oneshot(trigger(Some("env-key"), "{}")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn dropped_client_does_not_abort_the_run() {
    let vip = Vip::new("vip-123", "Christine Lagarde", &["ラガルド"]);
    let store = Arc::new(MemoryStore::with_vips(vec![vip.clone()]));
    let cfg = Arc::new(PipelineConfig::default());

    let empty = ScriptedResponse::xml("<rss><channel></channel></rss>")
        .with_delay(Duration::from_secs(2));
    let mut transport = ScriptedTransport::new();
    for q in QueryBuilder::new(&cfg.search).unwrap().build(&vip) {
        transport = transport.on(Method::Get, &q.url, empty.clone());
    }
    let ingestor = Ingestor::from_config(store.clone(), Arc::new(transport), cfg).unwrap();
    let app = create_router(AppState::new(Arc::new(ingestor), Some("k".into())));

    // client gives up while the first feed fetch is still in flight
    let res = tokio::time::timeout(
        Duration::from_secs(1),
        app.oneshot(trigger(Some("k"), "{}")),
    )
    .await;
    assert!(res.is_err());
    assert!(store.run_logs().is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    let logs = store.run_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].totals.error, 0);
    assert_eq!(logs[0].per_vip["vip-123"].queries, 2);
}
