//! Admin HTTP API of the coordinator
//!
//! Every handler forwards to [`Coordinator`]; failures become
//! `{"error": <kind>, "message": <text>}` with a status derived from the kind.

use crate::common::Result;
use crate::coordination::{is_connected, Coordination};
use crate::coordinator::ecs::Coordinator;
use crate::coordinator::inventory::ServerEntry;
use crate::coordinator::metadata::{NodeRecord, RingSnapshot};
use crate::coordinator::node::EvictionPolicy;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AdminState {
    pub ecs: Arc<Coordinator>,
    pub coord: Arc<dyn Coordination>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddNodesRequest {
    pub count: usize,
    pub cache_capacity: usize,
    #[serde(default = "default_policy")]
    pub eviction_policy: EvictionPolicy,
}

fn default_policy() -> EvictionPolicy {
    EvictionPolicy::None
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveNodesRequest {
    pub names: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AwaitRequest {
    pub count: usize,
    #[serde(default = "default_await_timeout")]
    pub timeout_ms: u64,
}

fn default_await_timeout() -> u64 {
    30_000
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AwaitResponse {
    pub ready: bool,
}

pub fn create_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/admin/nodes",
            get(list_nodes).post(add_nodes).delete(remove_nodes),
        )
        .route("/admin/start", post(start))
        .route("/admin/stop", post(stop))
        .route("/admin/shutdown", post(shutdown))
        .route("/admin/await", post(await_nodes))
        .route("/admin/available", get(available))
        .route("/admin/owner/:key", get(owner))
        .route("/admin/ring", get(ring))
        .with_state(state)
}

async fn health(State(state): State<AdminState>) -> impl IntoResponse {
    let connected = is_connected(state.coord.as_ref());
    let status = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if connected { "healthy" } else { "degraded" },
            "coordination": if connected { "connected" } else { "disconnected" },
            "active_nodes": state.ecs.list_active_nodes().await.len(),
            "version": crate::VERSION,
        })),
    )
}

async fn list_nodes(State(state): State<AdminState>) -> Json<Vec<NodeRecord>> {
    Json(state.ecs.list_active_nodes().await)
}

async fn add_nodes(
    State(state): State<AdminState>,
    Json(req): Json<AddNodesRequest>,
) -> Result<(StatusCode, Json<Vec<NodeRecord>>)> {
    let added = state
        .ecs
        .add_nodes(req.count, req.cache_capacity, req.eviction_policy)
        .await?;
    Ok((StatusCode::CREATED, Json(added)))
}

async fn remove_nodes(
    State(state): State<AdminState>,
    Json(req): Json<RemoveNodesRequest>,
) -> Result<StatusCode> {
    state.ecs.remove_nodes(&req.names).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start(State(state): State<AdminState>) -> Result<Json<Vec<NodeRecord>>> {
    state.ecs.start().await?;
    Ok(Json(state.ecs.list_active_nodes().await))
}

async fn stop(State(state): State<AdminState>) -> Result<Json<Vec<NodeRecord>>> {
    state.ecs.stop().await?;
    Ok(Json(state.ecs.list_active_nodes().await))
}

async fn shutdown(State(state): State<AdminState>) -> Result<StatusCode> {
    state.ecs.shutdown().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn await_nodes(
    State(state): State<AdminState>,
    Json(req): Json<AwaitRequest>,
) -> Result<Json<AwaitResponse>> {
    let ready = state
        .ecs
        .await_nodes(req.count, Duration::from_millis(req.timeout_ms))
        .await?;
    Ok(Json(AwaitResponse { ready }))
}

async fn available(State(state): State<AdminState>) -> Json<Vec<ServerEntry>> {
    Json(state.ecs.available().await)
}

async fn owner(
    State(state): State<AdminState>,
    Path(key): Path<String>,
) -> Result<Json<NodeRecord>> {
    Ok(Json(state.ecs.resolve_key_owner(&key).await?))
}

async fn ring(State(state): State<AdminState>) -> Result<Json<RingSnapshot>> {
    Ok(Json(state.ecs.persisted_snapshot().await?))
}
