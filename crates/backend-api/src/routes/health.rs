use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;

use crate::{ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct PoolResponse {
    pub total: u32,
    pub active: u32,
    pub idle: u32,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub strategy: String,
    pub pool: PoolResponse,
    pub timestamp: String,
}

pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let source = state.data_source();
    source.test_connection().await?;

    let stats = source.stats();
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        strategy: source.strategy().to_string(),
        pool: PoolResponse {
            total: stats.total,
            active: stats.active,
            idle: stats.idle,
        },
        timestamp: Utc::now().to_rfc3339(),
    }))
}
