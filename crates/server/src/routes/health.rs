//! Liveness endpoint with a cheap dependency probe.

use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct HealthStatus {
    pub database: bool,
    pub registered_forms: usize,
    pub registered_syncs: usize,
}

pub async fn health(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<HealthStatus>>, ApiError> {
    let database = sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.db.pool)
        .await
        .is_ok();

    Ok(ResponseJson(ApiResponse::success(HealthStatus {
        database,
        registered_forms: state.registry.forms().len(),
        registered_syncs: state.sync_manager.keys().len(),
    })))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
