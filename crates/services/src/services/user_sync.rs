//! Sync service for the user identity form.
//!
//! Ragic is the master and stores plain text; the local cache stores
//! ciphertext plus blind indexes regenerated from the plain values on every
//! sync, so stale hashes in Ragic never poison local lookups.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use db::{DBService, models::user::{CachedUser, UpsertCachedUser}};
use ragic::{
    ConfigurationError, FormConfig, ListQuery, MapError, RagicEntity, RagicRecord, RagicRegistry,
    RagicRepository, RecordStore, mapper,
};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use super::{
    crypto::FieldCipher,
    sync::{PhaseCell, RecordSync, SyncError, SyncPhase, SyncResult},
};

pub const FORM_KEY: &str = "core_user";

const FIELDS: [&str; 6] = [
    "LINE_USER_ID",
    "EMAIL",
    "EMPLOYEE_REF",
    "DISPLAY_NAME",
    "IS_ACTIVE",
    "LAST_LOGIN_AT",
];

/// Typed view of one identity record as Ragic serves it. Required fields
/// stay optional here; presence is a sync-time decision so one blank record
/// cannot fail the whole batch.
#[derive(Debug, Clone, Default)]
pub struct RagicUser {
    pub ragic_id: Option<i64>,
    pub line_user_id: Option<String>,
    pub email: Option<String>,
    pub employee_ref: Option<String>,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<NaiveDateTime>,
}

impl RagicEntity for RagicUser {
    fn form_key() -> &'static str {
        FORM_KEY
    }

    fn from_record(form: &FormConfig, record: &RagicRecord) -> Result<Self, MapError> {
        let text = |name: &str| -> Result<Option<String>, MapError> {
            Ok(record.text(form.field_id_strict(FORM_KEY, name)?))
        };

        Ok(Self {
            ragic_id: (record.ragic_id > 0).then_some(record.ragic_id),
            line_user_id: text("LINE_USER_ID")?,
            email: text("EMAIL")?,
            employee_ref: text("EMPLOYEE_REF")?,
            display_name: text("DISPLAY_NAME")?,
            // Blank checkbox means active; Ragic omits unchecked defaults.
            is_active: mapper::parse_bool("IS_ACTIVE", text("IS_ACTIVE")?)
                .map_err(MapError::from)?
                .unwrap_or(true),
            last_login_at: mapper::parse_datetime("LAST_LOGIN_AT", text("LAST_LOGIN_AT")?)
                .map_err(MapError::from)?,
        })
    }

    fn to_payload(&self, form: &FormConfig) -> Result<Map<String, Value>, ConfigurationError> {
        let mut payload = Map::new();
        let mut put = |name: &str, value: Option<&str>| -> Result<(), ConfigurationError> {
            if let Some(value) = value {
                payload.insert(
                    form.field_id_strict(FORM_KEY, name)?.to_string(),
                    Value::String(value.to_string()),
                );
            }
            Ok(())
        };

        put("LINE_USER_ID", self.line_user_id.as_deref())?;
        put("EMAIL", self.email.as_deref())?;
        put("EMPLOYEE_REF", self.employee_ref.as_deref())?;
        put("DISPLAY_NAME", self.display_name.as_deref())?;
        put("IS_ACTIVE", Some(if self.is_active { "1" } else { "0" }))?;
        put(
            "LAST_LOGIN_AT",
            self.last_login_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .as_deref(),
        )?;
        Ok(payload)
    }

    fn ragic_id(&self) -> Option<i64> {
        self.ragic_id
    }

    fn set_ragic_id(&mut self, ragic_id: i64) {
        self.ragic_id = Some(ragic_id);
    }
}

pub struct UserSyncService {
    repo: RagicRepository<RagicUser>,
    db: DBService,
    cipher: Arc<FieldCipher>,
    phase: PhaseCell,
}

impl UserSyncService {
    /// Fails fast when any mapped field is missing from the registry.
    pub fn new(
        store: Arc<dyn RecordStore>,
        registry: Arc<RagicRegistry>,
        db: DBService,
        cipher: Arc<FieldCipher>,
    ) -> Result<Self, ConfigurationError> {
        registry.require_fields(FORM_KEY, &FIELDS)?;
        Ok(Self {
            repo: RagicRepository::new(store, registry),
            db,
            cipher,
            phase: PhaseCell::default(),
        })
    }

    /// Write-back path for identity provisioning flows.
    pub fn repository(&self) -> &RagicRepository<RagicUser> {
        &self.repo
    }

    /// Validate presence of required fields, then build the cache row with
    /// freshly regenerated blind indexes and encrypted columns.
    fn to_cache_row(&self, user: &RagicUser) -> Result<UpsertCachedUser, SyncError> {
        let Some(ragic_id) = user.ragic_id else {
            return Err(SyncError::RecordRejected {
                ragic_id: 0,
                reason: "missing ragic_id".to_string(),
            });
        };
        let Some(line_user_id) = user.line_user_id.as_deref() else {
            return Err(SyncError::RecordRejected {
                ragic_id,
                reason: "missing line_user_id".to_string(),
            });
        };
        let Some(email) = user.email.as_deref() else {
            return Err(SyncError::RecordRejected {
                ragic_id,
                reason: "missing email".to_string(),
            });
        };

        Ok(UpsertCachedUser {
            ragic_id,
            line_user_id: self.cipher.encrypt(line_user_id)?,
            line_user_id_hash: self.cipher.blind_index(line_user_id),
            email: self.cipher.encrypt(email)?,
            email_hash: self.cipher.blind_index(email),
            display_name: user.display_name.clone(),
            employee_ref: user.employee_ref.clone(),
            is_active: user.is_active,
            last_login_at: user.last_login_at,
        })
    }

    async fn upsert_user(&self, user: &RagicUser, result: &mut SyncResult) {
        let row = match self.to_cache_row(user) {
            Ok(row) => row,
            Err(SyncError::RecordRejected { ragic_id, reason }) => {
                result.skipped += 1;
                result.record_warning(format!("record {ragic_id} skipped: {reason}"));
                warn!(form = FORM_KEY, ragic_id, %reason, "skipping record");
                return;
            }
            Err(e) => {
                result.record_error(format!("record {:?}: {e}", user.ragic_id));
                error!(form = FORM_KEY, ragic_id = ?user.ragic_id, error = %e, "mapping failed");
                return;
            }
        };

        match CachedUser::upsert(&self.db.pool, &row).await {
            Ok(_) => result.synced += 1,
            Err(e) => {
                result.record_error(format!("record {}: {e}", row.ragic_id));
                error!(form = FORM_KEY, ragic_id = row.ragic_id, error = %e, "upsert failed");
            }
        }
    }
}

#[async_trait]
impl RecordSync for UserSyncService {
    fn form_key(&self) -> &'static str {
        FORM_KEY
    }

    fn phase(&self) -> SyncPhase {
        self.phase.get()
    }

    async fn sync_all_data(&self) -> SyncResult {
        let started = Instant::now();
        let mut result = SyncResult::default();

        self.phase.set(SyncPhase::Fetching);
        info!(form = FORM_KEY, "starting full sync");

        let outcomes = match self.repo.find_all(&ListQuery::default()).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                self.phase.set(SyncPhase::Failed);
                result.record_error(format!("fetch failed: {e}"));
                error!(form = FORM_KEY, error = %e, "full sync aborted");
                result.duration_ms = started.elapsed().as_millis() as u64;
                return result;
            }
        };

        self.phase.set(SyncPhase::Validating);
        let mut users = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(user) => users.push(user),
                Err(e) => {
                    result.record_error(e.to_string());
                    warn!(form = FORM_KEY, error = %e, "record failed validation");
                }
            }
        }

        self.phase.set(SyncPhase::Upserting);
        for user in &users {
            self.upsert_user(user, &mut result).await;
        }

        self.phase.set(SyncPhase::Idle);
        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            form = FORM_KEY,
            synced = result.synced,
            skipped = result.skipped,
            errors = result.errors,
            duration_ms = result.duration_ms,
            "full sync completed"
        );
        result
    }

    async fn sync_record(&self, ragic_id: i64) -> Result<(), SyncError> {
        let user = self
            .repo
            .get(ragic_id)
            .await?
            .ok_or(SyncError::RecordNotFound(ragic_id))??;

        let mut user = user;
        // Single-record fetches do not carry the listing key.
        user.ragic_id.get_or_insert(ragic_id);

        let row = self.to_cache_row(&user)?;
        CachedUser::upsert(&self.db.pool, &row).await?;
        info!(form = FORM_KEY, ragic_id, "synced single record");
        Ok(())
    }

    async fn delete_record(&self, ragic_id: i64) -> Result<bool, SyncError> {
        let deleted = CachedUser::delete_by_ragic_id(&self.db.pool, ragic_id).await?;
        if deleted > 0 {
            info!(form = FORM_KEY, ragic_id, "deleted cached record");
        } else {
            warn!(form = FORM_KEY, ragic_id, "delete requested for unknown record");
        }
        Ok(deleted > 0)
    }
}
