//! Admin and namespace routes served by the ECS

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use common::cluster;
use ringkv::coordination::{Coordination, MemoryCoordination};
use ringkv::coordinator::server::build_router;
use ringkv::coordinator::{NodeRecord, RingSnapshot};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn app(n: u16) -> (Router, Arc<MemoryCoordination>) {
    let (ecs, coord) = cluster(n).await;
    let dyn_coord: Arc<dyn Coordination> = coord.clone();
    (build_router(ecs, dyn_coord), coord)
}

async fn call(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let resp = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 1 << 20).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let (router, coord) = app(1).await;
    let (status, body) = call(&router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["coordination"], "connected");
    assert_eq!(body["active_nodes"], 0);

    coord.disconnect();
    let (status, body) = call(&router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_add_list_and_resolve() {
    let (router, _) = app(3).await;

    let (status, body) = call(
        &router,
        Method::POST,
        "/admin/nodes",
        Some(json!({"count": 2, "cache_capacity": 128, "eviction_policy": "LFU"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let added: Vec<NodeRecord> = serde_json::from_value(body).unwrap();
    assert_eq!(added.len(), 2);
    assert_eq!(added[0].cache_capacity, 128);

    let (_, body) = call(&router, Method::GET, "/admin/nodes", None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = call(&router, Method::GET, "/admin/available", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = call(&router, Method::GET, "/admin/owner/some%20key", None).await;
    assert_eq!(status, StatusCode::OK);
    let owner: NodeRecord = serde_json::from_value(body).unwrap();
    assert!(owner.is_responsible_for("some key"));

    let (status, body) = call(&router, Method::GET, "/admin/ring", None).await;
    assert_eq!(status, StatusCode::OK);
    let snapshot: RingSnapshot = serde_json::from_value(body).unwrap();
    assert_eq!(snapshot.nodes.len(), 2);
}

#[tokio::test]
async fn test_lifecycle_routes() {
    let (router, _) = app(2).await;
    call(
        &router,
        Method::POST,
        "/admin/nodes",
        Some(json!({"count": 2, "cache_capacity": 16})),
    )
    .await;

    let (status, body) = call(&router, Method::POST, "/admin/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .all(|n| n["state"] == "STARTED"));

    let (_, body) = call(&router, Method::POST, "/admin/stop", None).await;
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .all(|n| n["state"] == "STOPPED"));

    let (status, _) = call(&router, Method::POST, "/admin/shutdown", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = call(&router, Method::GET, "/admin/available", None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_errors_map_to_kinds() {
    let (router, _) = app(2).await;

    let (status, body) = call(&router, Method::GET, "/admin/owner/k", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "empty_ring");

    let (status, body) = call(
        &router,
        Method::POST,
        "/admin/nodes",
        Some(json!({"count": 0, "cache_capacity": 16})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "pool_exhausted");

    call(
        &router,
        Method::POST,
        "/admin/nodes",
        Some(json!({"count": 1, "cache_capacity": 16})),
    )
    .await;
    let (status, body) = call(
        &router,
        Method::DELETE,
        "/admin/nodes",
        Some(json!({"names": ["nope"]})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_node_name");

    let (status, body) = call(
        &router,
        Method::DELETE,
        "/admin/nodes",
        Some(json!({"names": ["server_1", "server_1"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "duplicate_node_name");

    let (status, _) = call(
        &router,
        Method::DELETE,
        "/admin/nodes",
        Some(json!({"names": ["server_1"]})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_await_route() {
    let (router, coord) = app(1).await;
    let (status, body) = call(
        &router,
        Method::POST,
        "/admin/await",
        Some(json!({"count": 1, "timeout_ms": 30})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], false);

    common::register(&coord, common::BASE_PORT).await;
    let (_, body) = call(
        &router,
        Method::POST,
        "/admin/await",
        Some(json!({"count": 1, "timeout_ms": 30})),
    )
    .await;
    assert_eq!(body["ready"], true);
}

#[tokio::test]
async fn test_namespace_is_served_alongside() {
    let (router, _) = app(1).await;
    call(
        &router,
        Method::POST,
        "/admin/nodes",
        Some(json!({"count": 1, "cache_capacity": 16})),
    )
    .await;

    // what a storage node reads on boot
    let resp = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/ns/data/server/50000/op")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 1024).await.unwrap();
    assert_eq!(&bytes[..], b"INIT");

    let (status, body) = call(&router, Method::GET, "/ns/children/server", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["50000"]));
}
