use axum::http::StatusCode;
use axum::response::IntoResponse;

/// GET liveness probe for load balancers and the test client.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "healthy")
}
