//! HTTP tests for the lifecycle endpoints.
//!
//! The router runs over the in-memory store, so no MongoDB deployment is
//! needed.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use keel_engine::{MemoryStore, Provider, ProviderData, StoreError, StoreHandle};
use keel_server::handlers::TIMEOUT_HEADER;
use keel_server::{app, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn setup() -> (Router, MemoryStore) {
    let store = MemoryStore::new();
    let data: ProviderData = Arc::new(StoreHandle::new(store.clone()));
    let provider = Provider::configure(Some(data)).unwrap();
    (app(AppState::new(provider, Duration::from_secs(5))), store)
}

async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, request).await
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn email_index() -> Value {
    json!({
        "database": "app",
        "collection": "users",
        "name": "users_email",
        "keys": [{"field": "email", "order": 1}],
        "unique": true
    })
}

#[tokio::test]
async fn health_reports_ok() {
    let (router, _) = setup();
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let (router, _) = setup();
    let (status, body) = post(&router, "/v1/users/create", json!({})).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("/v1/users/create"));
}

#[tokio::test]
async fn database_create_read_delete() {
    let (router, _) = setup();

    let (status, created) = post(
        &router,
        "/v1/databases/create",
        json!({"desired": {"name": "inventory"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["id"], "inventory");
    assert_eq!(created["state"]["keepPlaceholder"], true);

    let recorded = created["state"].clone();
    let (status, read) = post(
        &router,
        "/v1/databases/read",
        json!({"recorded": recorded}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["present"], true);
    assert_eq!(read["recorded"]["id"], "inventory");

    let (status, _) = post(
        &router,
        "/v1/databases/delete",
        json!({"recorded": recorded}),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, read) = post(
        &router,
        "/v1/databases/read",
        json!({"recorded": recorded}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["present"], false);
    assert!(read.get("recorded").is_none());
}

#[tokio::test]
async fn duplicate_index_is_a_conflict() {
    let (router, _) = setup();

    let (status, created) = post(
        &router,
        "/v1/indexes/create",
        json!({"desired": email_index()}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["id"], "app/users/users_email");

    let (status, body) = post(
        &router,
        "/v1/indexes/create",
        json!({"desired": email_index()}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn malformed_identity_is_rejected() {
    let (router, _) = setup();

    let (status, _) = post(
        &router,
        "/v1/collections/import",
        json!({"id": "app/users/extra"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, seed) = post(
        &router,
        "/v1/collections/import",
        json!({"id": "app/users"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seed["database"], "app");
    assert_eq!(seed["name"], "users");
}

#[tokio::test]
async fn lookup_of_missing_collection_is_not_found() {
    let (router, _) = setup();

    let (status, _) = post(
        &router,
        "/v1/collections/lookup",
        json!({"id": "app/ghost"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn store_failure_on_create_is_bad_gateway() {
    let (router, store) = setup();
    store.fail_next(
        "create_collection",
        StoreError::Transport("connection reset".into()),
    );

    let (status, body) = post(
        &router,
        "/v1/collections/create",
        json!({"desired": {"database": "app", "name": "users"}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("connection reset"));
}

#[tokio::test]
async fn invalid_timeout_header_is_rejected() {
    let (router, _) = setup();
    let request = Request::post("/v1/databases/create")
        .header("content-type", "application/json")
        .header(TIMEOUT_HEADER, "0")
        .body(Body::from(json!({"desired": {"name": "app"}}).to_string()))
        .unwrap();

    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn plan_reports_replace_for_time_series_change() {
    let (router, _) = setup();

    let recorded = json!({
        "database": "metrics",
        "name": "readings",
        "timeSeries": {"timeField": "ts"}
    });
    let desired = json!({
        "database": "metrics",
        "name": "readings",
        "timeSeries": {"timeField": "at"}
    });

    let (status, plan) = post(
        &router,
        "/v1/collections/plan",
        json!({"desired": desired, "recorded": recorded}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plan["action"], "replace");

    let (status, plan) = post(&router, "/v1/collections/plan", json!({"desired": desired})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plan["action"], "create");
}

#[tokio::test]
async fn reconcile_creates_then_settles() {
    let (router, _) = setup();
    let desired = email_index();

    let (status, first) = post(
        &router,
        "/v1/indexes/reconcile",
        json!({"desired": desired}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["action"], "create");

    let recorded = first["state"]["state"].clone();
    let (status, second) = post(
        &router,
        "/v1/indexes/reconcile",
        json!({"desired": desired, "recorded": recorded}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["action"], "noop");
    assert_eq!(second["drifted"], false);
}

#[tokio::test]
async fn collection_update_in_place() {
    let (router, store) = setup();

    let (status, created) = post(
        &router,
        "/v1/collections/create",
        json!({"desired": {"database": "app", "name": "users"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let recorded = created["state"].clone();
    let desired = json!({
        "database": "app",
        "name": "users",
        "validationAction": "warn"
    });
    let (status, updated) = post(
        &router,
        "/v1/collections/update",
        json!({"desired": desired, "recorded": recorded}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["state"]["validationAction"], "warn");

    let options = store.collection_options("app", "users").unwrap();
    assert_eq!(options.get_str("validationAction").unwrap(), "warn");
}
