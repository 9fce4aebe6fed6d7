use axum::Json;
use embr_shared::types::api::HealthResponse;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy("embr-realtime", env!("CARGO_PKG_VERSION")))
}
