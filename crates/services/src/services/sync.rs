//! Shared sync primitives: run results, phase tracking, the sync trait.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use ragic::{ConfigurationError, MapError, RagicError, RepositoryError};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use ts_rs::TS;

use super::crypto::CryptoError;

/// Detail strings kept per run; the rest is summarized by the counters.
const MAX_DETAIL_MESSAGES: usize = 10;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("remote error: {0}")]
    Remote(#[from] RagicError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Config(#[from] ConfigurationError),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("record {0} not found in remote store")]
    RecordNotFound(i64),
    #[error("record {ragic_id} rejected: {reason}")]
    RecordRejected { ragic_id: i64, reason: String },
}

/// Summary of one sync run. Created fresh per run and only survives in the
/// triggering response, the status cache, and the log line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct SyncResult {
    pub synced: u32,
    pub skipped: u32,
    pub errors: u32,
    pub deleted: u32,
    pub duration_ms: u64,
    pub error_messages: Vec<String>,
    pub warnings: Vec<String>,
}

impl SyncResult {
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors += 1;
        if self.error_messages.len() < MAX_DETAIL_MESSAGES {
            self.error_messages.push(message.into());
        }
    }

    pub fn record_warning(&mut self, message: impl Into<String>) {
        if self.warnings.len() < MAX_DETAIL_MESSAGES {
            self.warnings.push(message.into());
        }
    }
}

/// Where a sync run currently is. `failed` is sticky until the next run.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SyncPhase {
    #[default]
    Idle,
    Fetching,
    Validating,
    Upserting,
    Failed,
}

/// Shared handle a service updates during a run and the status endpoint
/// reads concurrently.
#[derive(Debug, Clone, Default)]
pub struct PhaseCell(Arc<RwLock<SyncPhase>>);

impl PhaseCell {
    pub fn set(&self, phase: SyncPhase) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    pub fn get(&self) -> SyncPhase {
        *self.0.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// One registered sync domain: full sync, webhook-targeted single-record
/// sync, and webhook-triggered local deletion.
#[async_trait]
pub trait RecordSync: Send + Sync {
    /// Registry form key this service syncs.
    fn form_key(&self) -> &'static str;

    fn phase(&self) -> SyncPhase;

    /// Fetch, validate, and upsert the whole remote record set. Per-record
    /// failures are absorbed into the result; a fetch failure aborts the
    /// run with the phase left at `failed`.
    async fn sync_all_data(&self) -> SyncResult;

    /// Sync a single record by remote ID.
    async fn sync_record(&self, ragic_id: i64) -> Result<(), SyncError>;

    /// Delete the local cache row for a remote ID. Returns whether a row
    /// existed.
    async fn delete_record(&self, ragic_id: i64) -> Result<bool, SyncError>;
}
