//! ECS server
//!
//! Hosts the coordination namespace, the coordinator and the admin API on a
//! single listener.

use crate::common::{EcsConfig, Result};
use crate::coordination::{self, ConnectionState, Coordination, MemoryCoordination};
use crate::coordinator::ecs::Coordinator;
use crate::coordinator::http::{create_router, AdminState};
use axum::Router;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub struct EcsServer {
    config: EcsConfig,
}

impl EcsServer {
    pub fn new(config: EcsConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting ECS");
        tracing::info!("  Listen: {}", self.config.bind_addr);
        tracing::info!("  Advertised: {}", self.config.advertise_addr);
        tracing::info!("  Servers file: {}", self.config.servers_file.display());
        tracing::info!("  Launcher: {:?}", self.config.launcher);

        let coord: Arc<dyn Coordination> = Arc::new(MemoryCoordination::new());
        let ecs = Arc::new(Coordinator::from_config(coord.clone(), &self.config).await?);

        tokio::spawn(monitor_connection(coord.connection_state()));

        let app = build_router(ecs, coord);
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("✓ ECS ready");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("ECS stopped");
        Ok(())
    }
}

/// Admin API plus the namespace routes storage nodes use
pub fn build_router(ecs: Arc<Coordinator>, coord: Arc<dyn Coordination>) -> Router {
    let admin = create_router(AdminState {
        ecs,
        coord: coord.clone(),
    });
    let namespace = coordination::http::create_router(coordination::http::NamespaceState { coord });

    admin
        .merge(namespace)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}

async fn monitor_connection(mut state: watch::Receiver<ConnectionState>) {
    while state.changed().await.is_ok() {
        let current = *state.borrow_and_update();
        match current {
            ConnectionState::Connected => tracing::info!("Coordination session connected"),
            ConnectionState::Disconnected => {
                tracing::error!("Coordination session lost; operations fail until it returns")
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
