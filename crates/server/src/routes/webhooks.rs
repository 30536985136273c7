//! Ragic webhook and sync management routes.
//!
//! Ragic notifies on record changes with a form-urlencoded or JSON body.
//! Authentication happens against the raw bytes before anything is parsed,
//! so a rejected request can have no side effects.

use std::collections::BTreeMap;

use axum::{
    Router,
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::Json as ResponseJson,
    routing::{get, post},
};
use ragic::record::extract_ragic_id;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use services::services::{sync::SyncResult, sync_manager::WebhookAction};
use tracing::info;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

const SIGNATURE_HEADER: &str = "x-hub-signature-256";

#[derive(Debug, Deserialize)]
pub struct WebhookParams {
    pub source: String,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SyncParams {
    pub source: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
    pub ragic_id: Option<i64>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SyncTriggerResponse {
    pub success: bool,
    pub message: String,
    pub results: BTreeMap<String, SyncResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SyncStatusResponse {
    pub services: Vec<services::services::sync_manager::SyncServiceStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct WebhookSourceInfo {
    pub key: String,
    pub name: String,
    pub module: String,
    pub webhook_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AvailableServicesResponse {
    pub webhook_url_format: String,
    pub available_sources: Vec<WebhookSourceInfo>,
}

/// Decode the webhook body: JSON when it parses, form-urlencoded otherwise.
fn parse_payload(body: &[u8]) -> Result<Value, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("empty webhook payload".to_string()));
    }
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        if value.is_object() {
            return Ok(value);
        }
    }

    let map: serde_json::Map<String, Value> = url::form_urlencoded::parse(body)
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect();
    if map.is_empty() {
        return Err(ApiError::BadRequest(
            "webhook payload is neither JSON nor form data".to_string(),
        ));
    }
    Ok(Value::Object(map))
}

fn parse_action(payload: &Value) -> Result<WebhookAction, ApiError> {
    match payload.get("action").and_then(Value::as_str) {
        None => Ok(WebhookAction::default()),
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("invalid action '{raw}'"))),
    }
}

/// POST /api/webhooks/ragic?source=<key>&token=<t>
pub async fn ragic_webhook(
    State(state): State<AppState>,
    Query(params): Query<WebhookParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ResponseJson<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    state
        .webhook_security
        .verify(&body, signature, params.token.as_deref())?;

    if !state.sync_manager.contains(&params.source) {
        return Err(ApiError::NotFound(format!(
            "sync service '{}' not found",
            params.source
        )));
    }

    let payload = parse_payload(&body)?;
    let ragic_id = extract_ragic_id(&payload)
        .ok_or_else(|| ApiError::BadRequest("missing ragic_id".to_string()))?;
    let action = parse_action(&payload)?;

    info!(source = %params.source, ragic_id, %action, "received Ragic webhook");

    let result = state
        .sync_manager
        .handle_webhook(&params.source, ragic_id, action)
        .await?;

    if !result.is_ok() {
        return Err(ApiError::Sync(result.error_messages.join("; ")));
    }

    let message = if result.deleted > 0 {
        format!("Deleted record {ragic_id}")
    } else if result.synced > 0 {
        format!("Synced record {ragic_id}")
    } else {
        format!("Record {ragic_id} skipped")
    };

    Ok(ResponseJson(WebhookResponse {
        success: true,
        message,
        ragic_id: Some(ragic_id),
        source: Some(params.source),
    }))
}

/// POST /api/webhooks/ragic/sync?source=<key?>&token=<t>
///
/// Manual full resync of one service, or all of them in registration order
/// when no source is given. Runs in place; large sheets take a while.
pub async fn trigger_sync(
    State(state): State<AppState>,
    Query(params): Query<SyncParams>,
    body: Bytes,
) -> Result<ResponseJson<ApiResponse<SyncTriggerResponse>>, ApiError> {
    state
        .webhook_security
        .verify(&body, None, params.token.as_deref())?;

    let results: BTreeMap<String, SyncResult> = match &params.source {
        Some(source) => {
            let result = state.sync_manager.sync_service(source).await?;
            BTreeMap::from([(source.clone(), result)])
        }
        None => state.sync_manager.sync_all(false).await.into_iter().collect(),
    };

    let success = results.values().all(SyncResult::is_ok);
    let message = format!("Synced {} service(s)", results.len());

    Ok(ResponseJson(ApiResponse::success(SyncTriggerResponse {
        success,
        message,
        results,
    })))
}

/// GET /api/webhooks/ragic/status
pub async fn sync_status(
    State(state): State<AppState>,
) -> ResponseJson<ApiResponse<SyncStatusResponse>> {
    ResponseJson(ApiResponse::success(SyncStatusResponse {
        services: state.sync_manager.statuses(),
    }))
}

/// GET /api/webhooks/ragic/services
pub async fn list_available_services(
    State(state): State<AppState>,
) -> ResponseJson<ApiResponse<AvailableServicesResponse>> {
    let available_sources = state
        .sync_manager
        .statuses()
        .into_iter()
        .map(|status| WebhookSourceInfo {
            webhook_url: format!("/api/webhooks/ragic?source={}", status.key),
            key: status.key,
            name: status.name,
            module: status.module,
        })
        .collect();

    ResponseJson(ApiResponse::success(AvailableServicesResponse {
        webhook_url_format: "/api/webhooks/ragic?source={source_key}".to_string(),
        available_sources,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/webhooks/ragic",
        Router::new()
            .route("/", post(ragic_webhook))
            .route("/sync", post(trigger_sync))
            .route("/status", get(sync_status))
            .route("/services", get(list_available_services)),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_payload_accepts_json_objects() {
        let payload = parse_payload(br#"{"_ragicId": 42, "action": "delete"}"#).unwrap();
        assert_eq!(payload["_ragicId"], json!(42));
    }

    #[test]
    fn parse_payload_falls_back_to_form_encoding() {
        let payload = parse_payload(b"_ragicId=42&action=update").unwrap();
        assert_eq!(payload["_ragicId"], json!("42"));
        assert_eq!(extract_ragic_id(&payload), Some(42));
    }

    #[test]
    fn parse_payload_rejects_garbage() {
        assert!(parse_payload(b"").is_err());
    }

    #[test]
    fn parse_action_defaults_to_update() {
        assert_eq!(
            parse_action(&json!({"_ragicId": 1})).unwrap(),
            WebhookAction::Update
        );
        assert_eq!(
            parse_action(&json!({"action": "delete"})).unwrap(),
            WebhookAction::Delete
        );
        assert!(parse_action(&json!({"action": "explode"})).is_err());
    }
}
