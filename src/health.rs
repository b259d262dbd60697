use axum::{Json, extract::State};
use serde::Serialize;

use crate::response::{ApiResponse, success};
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResponse {
    status: &'static str,
    database: &'static str,
    version: &'static str,
}

pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthCheckResponse>> {
    let database = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => "connected",
        Err(e) => {
            tracing::warn!("Health check database query failed: {}", e);
            "unavailable"
        }
    };

    success(HealthCheckResponse {
        status: "Server is running",
        database,
        version: env!("CARGO_PKG_VERSION"),
    })
}
