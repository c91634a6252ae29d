//! HTTP access to a coordination namespace
//!
//! Storage node processes do not link this crate; they read their command
//! znodes, post `TRANSFER_FINISH` and register themselves through these
//! routes.

use super::{Coordination, WatchEvent};
use crate::common::{Error, Result};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub const VERSION_HEADER: &str = "x-znode-version";

const DEFAULT_WATCH_TIMEOUT_MS: u64 = 30_000;

#[derive(Clone)]
pub struct NamespaceState {
    pub coord: Arc<dyn Coordination>,
}

#[derive(Debug, Deserialize)]
pub struct VersionQuery {
    pub version: Option<i32>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchKind {
    Data,
    Children,
}

#[derive(Debug, Deserialize)]
pub struct WatchQuery {
    pub kind: WatchKind,
    pub timeout_ms: Option<u64>,
}

pub fn create_router(state: NamespaceState) -> Router {
    Router::new()
        .route(
            "/ns/data/*path",
            get(get_data).post(create).put(set_data).delete(delete),
        )
        .route("/ns/children", get(root_children))
        .route("/ns/children/*path", get(children))
        .route("/ns/watch/*path", get(watch))
        .with_state(state)
}

fn znode_path(raw: &str) -> String {
    format!("/{}", raw.trim_start_matches('/'))
}

fn version_headers(version: i32) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(VERSION_HEADER, HeaderValue::from(version));
    headers
}

async fn get_data(
    State(state): State<NamespaceState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse> {
    let (data, stat) = state.coord.get_data(&znode_path(&path)).await?;
    Ok((version_headers(stat.version), data))
}

async fn create(
    State(state): State<NamespaceState>,
    Path(path): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    state.coord.create(&znode_path(&path), body.to_vec()).await?;
    Ok((StatusCode::CREATED, version_headers(0)))
}

async fn set_data(
    State(state): State<NamespaceState>,
    Path(path): Path<String>,
    Query(query): Query<VersionQuery>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let stat = state
        .coord
        .set_data(&znode_path(&path), body.to_vec(), query.version)
        .await?;
    Ok(version_headers(stat.version))
}

async fn delete(
    State(state): State<NamespaceState>,
    Path(path): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<StatusCode> {
    state.coord.delete(&znode_path(&path), query.version).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn root_children(State(state): State<NamespaceState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.coord.get_children("/").await?))
}

async fn children(
    State(state): State<NamespaceState>,
    Path(path): Path<String>,
) -> Result<Json<Vec<String>>> {
    Ok(Json(state.coord.get_children(&znode_path(&path)).await?))
}

/// Long-poll a one-shot watch
async fn watch(
    State(state): State<NamespaceState>,
    Path(path): Path<String>,
    Query(query): Query<WatchQuery>,
) -> Result<Json<WatchEvent>> {
    let path = znode_path(&path);
    let registered = match query.kind {
        WatchKind::Data => state.coord.watch_data(&path).await?,
        WatchKind::Children => state.coord.watch_children(&path).await?,
    };
    let timeout = Duration::from_millis(query.timeout_ms.unwrap_or(DEFAULT_WATCH_TIMEOUT_MS));
    tokio::time::timeout(timeout, registered.fired())
        .await
        .map(Json)
        .map_err(|_| Error::Timeout(format!("no change on {} within {:?}", path, timeout)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::MemoryCoordination;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    fn router() -> (Router, Arc<MemoryCoordination>) {
        let coord = Arc::new(MemoryCoordination::new());
        let router = create_router(NamespaceState {
            coord: coord.clone(),
        });
        (router, coord)
    }

    fn request(method: Method, uri: &str, body: &'static [u8]) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_read_update() {
        let (router, _) = router();

        let resp = router
            .clone()
            .oneshot(request(Method::POST, "/ns/data/awaitNodes", b""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = router
            .clone()
            .oneshot(request(Method::POST, "/ns/data/awaitNodes/50000", b"up"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = router
            .clone()
            .oneshot(request(Method::PUT, "/ns/data/awaitNodes/50000?version=0", b"ready"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[VERSION_HEADER], "1");

        let resp = router
            .clone()
            .oneshot(request(Method::GET, "/ns/data/awaitNodes/50000", b""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"ready");

        let resp = router
            .oneshot(request(Method::GET, "/ns/children/awaitNodes", b""))
            .await
            .unwrap();
        let body = to_bytes(resp.into_body(), 1024).await.unwrap();
        let children: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(children, vec!["50000"]);
    }

    #[tokio::test]
    async fn test_errors_carry_kind() {
        let (router, coord) = router();
        coord.create("/op", Vec::new()).await.unwrap();

        let resp = router
            .clone()
            .oneshot(request(Method::PUT, "/ns/data/op?version=7", b"START"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "version_conflict");

        let resp = router
            .oneshot(request(Method::GET, "/ns/data/missing", b""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_long_poll_watch() {
        let (router, coord) = router();
        coord.create("/op", Vec::new()).await.unwrap();

        let pending = tokio::spawn(router.clone().oneshot(request(
            Method::GET,
            "/ns/watch/op?kind=data&timeout_ms=2000",
            b"",
        )));
        // give the handler a moment to register its watch
        tokio::time::sleep(Duration::from_millis(50)).await;
        coord.set_data("/op", b"TRANSFER_FINISH".to_vec(), None).await.unwrap();

        let resp = pending.await.unwrap().unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), 1024).await.unwrap();
        let event: WatchEvent = serde_json::from_slice(&body).unwrap();
        assert_eq!(event, WatchEvent::DataChanged("/op".into()));

        let resp = router
            .oneshot(request(Method::GET, "/ns/watch/op?kind=data&timeout_ms=20", b""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
