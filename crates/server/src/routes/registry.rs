//! Registry administration.

use axum::{
    Router,
    body::Bytes,
    extract::{Query, State},
    response::Json as ResponseJson,
    routing::post,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ReloadParams {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct RegistryInfo {
    pub forms: Vec<String>,
}

/// POST /api/registry/reload?token=<t>
///
/// Re-reads the registry file and swaps the mapping atomically. In-flight
/// requests keep the snapshot they already resolved against.
pub async fn reload_registry(
    State(state): State<AppState>,
    Query(params): Query<ReloadParams>,
    body: Bytes,
) -> Result<ResponseJson<ApiResponse<RegistryInfo>>, ApiError> {
    state
        .webhook_security
        .verify(&body, None, params.token.as_deref())?;

    state
        .registry
        .reload()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let forms = state.registry.forms();
    info!(forms = forms.len(), "registry reloaded");
    Ok(ResponseJson(ApiResponse::success(RegistryInfo { forms })))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/registry/reload", post(reload_registry))
}
