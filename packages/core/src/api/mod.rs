//! Optional HTTP status server.
//!
//! Routes:
//! - `GET /health`  liveness
//! - `GET /metrics` Prometheus metrics
//! - `GET /status`  latest rendered report as JSON

pub mod health;
pub mod metrics;
pub mod status;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::metrics::AppMetrics;
use crate::scheduler::StatusBoard;

/// Shared state for every route.
#[derive(Clone)]
pub struct ApiState {
    pub metrics: Arc<AppMetrics>,
    pub status: StatusBoard,
}

/// Create the status server router.
pub fn create_router(metrics: Arc<AppMetrics>, status: StatusBoard) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(metrics::metrics))
        .route("/status", get(status::status))
        .with_state(ApiState { metrics, status })
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve `router` until the process exits.
pub async fn serve(addr: SocketAddr, router: Router) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Status server listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await
}
