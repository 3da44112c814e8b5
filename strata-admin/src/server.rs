use crate::handlers;
use axum::Router as AxumRouter;
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;
use strata_cluster::ListenerCluster;
use strata_saga::ConfigService;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared state for the admin API.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ConfigService>,
    pub cluster: Arc<ListenerCluster>,
}

/// Admin REST API server: config ingress plus health introspection.
pub struct AdminServer {
    addr: SocketAddr,
    state: AppState,
}

impl AdminServer {
    pub fn new(addr: SocketAddr, service: Arc<ConfigService>, cluster: Arc<ListenerCluster>) -> Self {
        Self {
            addr,
            state: AppState { service, cluster },
        }
    }

    /// Build the Axum router with all admin routes.
    pub fn build_router(&self) -> AxumRouter {
        AxumRouter::new()
            .route("/health", get(handlers::health::health))
            .route("/config", get(handlers::config::get_config))
            .route("/config", post(handlers::config::update_config))
            .route("/transactions", get(handlers::health::transactions))
            .with_state(self.state.clone())
    }

    /// Serve until the token cancels, then shut down gracefully.
    pub async fn start(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let app = self.build_router();
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "Admin API listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await?;
        Ok(())
    }
}
