//! HTTP server for the Ragic sync backend.

use std::sync::Arc;

use db::DBService;
use ragic::RagicRegistry;
use services::services::{sync_manager::SyncManager, webhook_security::WebhookSecurity};

pub mod config;
pub mod error;
pub mod routes;

/// Application context constructed once at startup and handed to every
/// handler through axum state. No ambient global services.
#[derive(Clone)]
pub struct AppState {
    pub db: DBService,
    pub registry: Arc<RagicRegistry>,
    pub sync_manager: Arc<SyncManager>,
    pub webhook_security: Arc<WebhookSecurity>,
}
