//! `GET /metrics` in Prometheus text exposition format.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};

use super::ApiState;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub async fn metrics(State(state): State<ApiState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            body,
        ),
        Err(err) => {
            tracing::error!("Failed to render metrics: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                "error".to_string(),
            )
        }
    }
}
