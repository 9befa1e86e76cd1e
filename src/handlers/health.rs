use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{ApiResponse, AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus {
    pub status: &'static str,
    pub database: &'static str,
}

/// Liveness probe; degrades rather than errors when the database is down.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service health", body = ApiResponse<HealthStatus>)),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let database = match state.db.ping().await {
        Ok(()) => "up",
        Err(_) => "down",
    };
    Json(ApiResponse::success(HealthStatus {
        status: "ok",
        database,
    }))
}
