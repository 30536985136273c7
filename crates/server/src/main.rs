use std::sync::Arc;

use anyhow::Context;
use db::DBService;
use ragic::{RagicClient, RagicRegistry, RecordStore};
use secrecy::ExposeSecret;
use server::{AppState, config::ServerConfig, routes};
use services::services::{
    account_sync::{self, AccountSyncService},
    crypto::FieldCipher,
    leave_type_sync::{self, LeaveTypeSyncService},
    sync_manager::SyncManager,
    user_sync::{self, UserSyncService},
    webhook_security::WebhookSecurity,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    utils::log::init("info,server=debug,services=debug");

    let config = ServerConfig::from_env()?;

    let registry = Arc::new(
        RagicRegistry::load(&config.registry_path)
            .context("failed to load Ragic registry")?,
    );

    let db = DBService::new(&config.database_url)
        .await
        .context("failed to open request database")?;
    db.migrate().await?;

    // The sync services run off the request loop; they get their own pool.
    let sync_db = DBService::new(&config.sync_database_url)
        .await
        .context("failed to open sync database")?;
    sync_db.migrate().await?;

    let cipher = Arc::new(FieldCipher::new(
        config.field_encryption_key.expose_secret(),
        config.blind_index_key.expose_secret(),
    )?);

    let settings = registry.config().settings.clone();
    let base_url = config
        .ragic_base_url
        .clone()
        .unwrap_or_else(|| settings.base_url.clone());
    let store: Arc<dyn RecordStore> = Arc::new(RagicClient::new(
        base_url,
        config.ragic_api_key.clone(),
        settings.naming.clone(),
    )?);

    let sync_manager = Arc::new(SyncManager::new());
    sync_manager.register(
        user_sync::FORM_KEY,
        "User Identity",
        "core",
        Arc::new(UserSyncService::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            sync_db.clone(),
            Arc::clone(&cipher),
        )?),
        true,
    )?;
    sync_manager.register(
        account_sync::FORM_KEY,
        "Employee Accounts",
        "administrative",
        Arc::new(AccountSyncService::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            sync_db.clone(),
            Arc::clone(&cipher),
        )?),
        true,
    )?;
    sync_manager.register(
        leave_type_sync::FORM_KEY,
        "Leave Types",
        "administrative",
        Arc::new(LeaveTypeSyncService::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            sync_db.clone(),
        )?),
        true,
    )?;

    sync_manager
        .spawn_startup_sync()
        .context("failed to spawn startup sync worker")?;

    let state = AppState {
        db,
        registry,
        sync_manager,
        webhook_security: Arc::new(WebhookSecurity::new(config.webhook_secret.clone())),
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, routes::router(state)).await?;

    Ok(())
}
