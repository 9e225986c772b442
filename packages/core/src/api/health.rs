use axum::{
    http::{header, HeaderValue},
    response::IntoResponse,
};

/// Liveness probe. Always `200 ok` while the process is serving.
pub async fn health() -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        "ok",
    )
}
