//! `GET /status`: the most recent rendered report.
//!
//! Answers `503` until the first poll or heartbeat has completed.

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use super::ApiState;

pub async fn status(State(state): State<ApiState>) -> Response {
    let latest = state.status.read().await.clone();
    match latest {
        Some(report) => (
            [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
            Json(report),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "no report produced yet" })),
        )
            .into_response(),
    }
}
