//! Registry and orchestrator for all sync services.
//!
//! Services run in registration order, one at a time, which bounds load on
//! the Ragic API and the local database. The startup full sync runs on a
//! dedicated worker thread with its own runtime; the services it drives are
//! constructed over their own database pool, never the request-path one.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tracing::{error, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::sync::{RecordSync, SyncPhase, SyncResult};

#[derive(Debug, Clone, Error)]
pub enum SyncManagerError {
    #[error("sync service already registered under key '{0}'")]
    DuplicateKey(String),
    #[error("sync service '{0}' not found")]
    UnknownKey(String),
}

/// Webhook action verb; anything Ragic does not name defaults to update.
#[derive(Debug, Clone, Copy, Default, PartialEq, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum WebhookAction {
    Create,
    #[default]
    Update,
    Delete,
}

#[derive(Debug, Clone, Default)]
struct RunState {
    last_sync_time: Option<DateTime<Utc>>,
    last_result: Option<SyncResult>,
    last_run_id: Option<Uuid>,
}

struct SyncRegistration {
    key: String,
    name: String,
    module: String,
    auto_sync_on_startup: bool,
    service: Arc<dyn RecordSync>,
    state: RwLock<RunState>,
}

/// One row of the operational dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SyncServiceStatus {
    pub key: String,
    pub name: String,
    pub module: String,
    pub status: SyncPhase,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_result: Option<SyncResult>,
    pub last_run_id: Option<Uuid>,
}

#[derive(Default)]
pub struct SyncManager {
    registrations: RwLock<Vec<Arc<SyncRegistration>>>,
}

impl SyncManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sync service under a unique key. Registration order is
    /// the sync order.
    pub fn register(
        &self,
        key: impl Into<String>,
        name: impl Into<String>,
        module: impl Into<String>,
        service: Arc<dyn RecordSync>,
        auto_sync_on_startup: bool,
    ) -> Result<(), SyncManagerError> {
        let key = key.into();
        let mut registrations = self.registrations.write().unwrap_or_else(|e| e.into_inner());
        if registrations.iter().any(|r| r.key == key) {
            return Err(SyncManagerError::DuplicateKey(key));
        }

        let name = name.into();
        info!(key = %key, name = %name, "registered sync service");
        registrations.push(Arc::new(SyncRegistration {
            key,
            name,
            module: module.into(),
            auto_sync_on_startup,
            service,
            state: RwLock::new(RunState::default()),
        }));
        Ok(())
    }

    fn find(&self, key: &str) -> Option<Arc<SyncRegistration>> {
        self.registrations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|r| r.key == key)
            .cloned()
    }

    fn snapshot(&self) -> Vec<Arc<SyncRegistration>> {
        self.registrations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.snapshot().iter().map(|r| r.key.clone()).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    async fn run(&self, registration: &SyncRegistration) -> SyncResult {
        let run_id = Uuid::new_v4();
        info!(key = %registration.key, %run_id, "running full sync");

        let result = registration.service.sync_all_data().await;

        let mut state = registration.state.write().unwrap_or_else(|e| e.into_inner());
        state.last_sync_time = Some(Utc::now());
        state.last_result = Some(result.clone());
        state.last_run_id = Some(run_id);
        result
    }

    /// Trigger a full sync of one registered service.
    pub async fn sync_service(&self, key: &str) -> Result<SyncResult, SyncManagerError> {
        let registration = self
            .find(key)
            .ok_or_else(|| SyncManagerError::UnknownKey(key.to_string()))?;
        Ok(self.run(&registration).await)
    }

    /// Run all registered services sequentially in registration order.
    pub async fn sync_all(&self, auto_only: bool) -> Vec<(String, SyncResult)> {
        let mut results = Vec::new();
        for registration in self.snapshot() {
            if auto_only && !registration.auto_sync_on_startup {
                continue;
            }
            let result = self.run(&registration).await;
            if !result.is_ok() {
                warn!(
                    key = %registration.key,
                    errors = result.errors,
                    "sync finished with errors"
                );
            }
            results.push((registration.key.clone(), result));
        }
        results
    }

    pub fn statuses(&self) -> Vec<SyncServiceStatus> {
        self.snapshot()
            .iter()
            .map(|registration| {
                let state = registration
                    .state
                    .read()
                    .unwrap_or_else(|e| e.into_inner())
                    .clone();
                SyncServiceStatus {
                    key: registration.key.clone(),
                    name: registration.name.clone(),
                    module: registration.module.clone(),
                    status: registration.service.phase(),
                    last_sync_time: state.last_sync_time,
                    last_result: state.last_result,
                    last_run_id: state.last_run_id,
                }
            })
            .collect()
    }

    /// Dispatch one webhook notification to the owning service.
    pub async fn handle_webhook(
        &self,
        key: &str,
        ragic_id: i64,
        action: WebhookAction,
    ) -> Result<SyncResult, SyncManagerError> {
        let registration = self
            .find(key)
            .ok_or_else(|| SyncManagerError::UnknownKey(key.to_string()))?;

        let mut result = SyncResult::default();
        match action {
            WebhookAction::Delete => match registration.service.delete_record(ragic_id).await {
                Ok(true) => result.deleted = 1,
                Ok(false) => result.skipped = 1,
                Err(e) => {
                    result.record_error(e.to_string());
                    error!(key = %key, ragic_id, error = %e, "webhook delete failed");
                }
            },
            WebhookAction::Create | WebhookAction::Update => {
                match registration.service.sync_record(ragic_id).await {
                    Ok(()) => result.synced = 1,
                    Err(e) => {
                        result.record_error(format!("failed to sync record {ragic_id}: {e}"));
                        error!(key = %key, ragic_id, error = %e, "webhook sync failed");
                    }
                }
            }
        }
        Ok(result)
    }

    /// Run the ordered startup sync on a worker thread with its own
    /// runtime, keeping the request loop free for the whole duration.
    pub fn spawn_startup_sync(
        self: &Arc<Self>,
    ) -> std::io::Result<std::thread::JoinHandle<()>> {
        let manager = Arc::clone(self);
        std::thread::Builder::new()
            .name("ragic-sync-worker".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(error = %e, "failed to build sync worker runtime");
                        return;
                    }
                };

                info!("startup sync worker started");
                let results = runtime.block_on(manager.sync_all(true));
                for (key, result) in results {
                    info!(
                        key = %key,
                        synced = result.synced,
                        skipped = result.skipped,
                        errors = result.errors,
                        "startup sync finished"
                    );
                }
            })
    }
}
