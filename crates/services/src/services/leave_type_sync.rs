//! Sync service for the leave type catalog.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use db::{DBService, models::leave_type::{LeaveType, UpsertLeaveType}};
use ragic::{
    ConfigurationError, FormConfig, ListQuery, MapError, RagicEntity, RagicRecord, RagicRegistry,
    RagicRepository, RecordStore, mapper,
};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use super::sync::{PhaseCell, RecordSync, SyncError, SyncPhase, SyncResult};

pub const FORM_KEY: &str = "administrative_leave_type";

const FIELDS: [&str; 4] = [
    "LEAVE_TYPE_NAME",
    "ANNUAL_QUOTA",
    "REQUIRES_PROOF",
    "DISPLAY_ORDER",
];

#[derive(Debug, Clone, Default)]
pub struct RagicLeaveType {
    pub ragic_id: Option<i64>,
    pub leave_type_name: Option<String>,
    pub annual_quota: Option<f64>,
    pub requires_proof: bool,
    pub display_order: Option<i64>,
}

impl RagicEntity for RagicLeaveType {
    fn form_key() -> &'static str {
        FORM_KEY
    }

    fn from_record(form: &FormConfig, record: &RagicRecord) -> Result<Self, MapError> {
        let text = |name: &str| -> Result<Option<String>, MapError> {
            Ok(record.text(form.field_id_strict(FORM_KEY, name)?))
        };

        Ok(Self {
            ragic_id: (record.ragic_id > 0).then_some(record.ragic_id),
            leave_type_name: text("LEAVE_TYPE_NAME")?,
            annual_quota: mapper::parse_float("ANNUAL_QUOTA", text("ANNUAL_QUOTA")?)?,
            requires_proof: mapper::parse_bool("REQUIRES_PROOF", text("REQUIRES_PROOF")?)?
                .unwrap_or(false),
            display_order: mapper::parse_int("DISPLAY_ORDER", text("DISPLAY_ORDER")?)?,
        })
    }

    fn to_payload(&self, form: &FormConfig) -> Result<Map<String, Value>, ConfigurationError> {
        let mut payload = Map::new();
        let mut put = |name: &str, value: Option<String>| -> Result<(), ConfigurationError> {
            if let Some(value) = value {
                payload.insert(
                    form.field_id_strict(FORM_KEY, name)?.to_string(),
                    Value::String(value),
                );
            }
            Ok(())
        };

        put("LEAVE_TYPE_NAME", self.leave_type_name.clone())?;
        put("ANNUAL_QUOTA", self.annual_quota.map(|q| q.to_string()))?;
        put(
            "REQUIRES_PROOF",
            Some(if self.requires_proof { "1" } else { "0" }.to_string()),
        )?;
        put("DISPLAY_ORDER", self.display_order.map(|o| o.to_string()))?;
        Ok(payload)
    }

    fn ragic_id(&self) -> Option<i64> {
        self.ragic_id
    }

    fn set_ragic_id(&mut self, ragic_id: i64) {
        self.ragic_id = Some(ragic_id);
    }
}

pub struct LeaveTypeSyncService {
    repo: RagicRepository<RagicLeaveType>,
    db: DBService,
    phase: PhaseCell,
}

impl LeaveTypeSyncService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        registry: Arc<RagicRegistry>,
        db: DBService,
    ) -> Result<Self, ConfigurationError> {
        registry.require_fields(FORM_KEY, &FIELDS)?;
        Ok(Self {
            repo: RagicRepository::new(store, registry),
            db,
            phase: PhaseCell::default(),
        })
    }

    fn to_cache_row(&self, leave_type: &RagicLeaveType) -> Result<UpsertLeaveType, SyncError> {
        let Some(ragic_id) = leave_type.ragic_id else {
            return Err(SyncError::RecordRejected {
                ragic_id: 0,
                reason: "missing ragic_id".to_string(),
            });
        };
        let Some(name) = leave_type.leave_type_name.clone() else {
            return Err(SyncError::RecordRejected {
                ragic_id,
                reason: "missing leave_type_name".to_string(),
            });
        };

        Ok(UpsertLeaveType {
            ragic_id,
            leave_type_name: name,
            annual_quota: leave_type.annual_quota,
            requires_proof: leave_type.requires_proof,
            display_order: leave_type.display_order,
        })
    }

    async fn upsert_leave_type(&self, leave_type: &RagicLeaveType, result: &mut SyncResult) {
        let row = match self.to_cache_row(leave_type) {
            Ok(row) => row,
            Err(SyncError::RecordRejected { ragic_id, reason }) => {
                result.skipped += 1;
                result.record_warning(format!("record {ragic_id} skipped: {reason}"));
                warn!(form = FORM_KEY, ragic_id, %reason, "skipping record");
                return;
            }
            Err(e) => {
                result.record_error(format!("record {:?}: {e}", leave_type.ragic_id));
                return;
            }
        };

        match LeaveType::upsert(&self.db.pool, &row).await {
            Ok(_) => result.synced += 1,
            Err(e) => {
                result.record_error(format!("record {}: {e}", row.ragic_id));
                error!(form = FORM_KEY, ragic_id = row.ragic_id, error = %e, "upsert failed");
            }
        }
    }
}

#[async_trait]
impl RecordSync for LeaveTypeSyncService {
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
        let mut leave_types = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(leave_type) => leave_types.push(leave_type),
                Err(e) => {
                    result.record_error(e.to_string());
                    warn!(form = FORM_KEY, error = %e, "record failed validation");
                }
            }
        }

        self.phase.set(SyncPhase::Upserting);
        for leave_type in &leave_types {
            self.upsert_leave_type(leave_type, &mut result).await;
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
        let leave_type = self
            .repo
            .get(ragic_id)
            .await?
            .ok_or(SyncError::RecordNotFound(ragic_id))??;

        let mut leave_type = leave_type;
        leave_type.ragic_id.get_or_insert(ragic_id);

        let row = self.to_cache_row(&leave_type)?;
        LeaveType::upsert(&self.db.pool, &row).await?;
        info!(form = FORM_KEY, ragic_id, "synced single record");
        Ok(())
    }

    async fn delete_record(&self, ragic_id: i64) -> Result<bool, SyncError> {
        let deleted = LeaveType::delete_by_ragic_id(&self.db.pool, ragic_id).await?;
        if deleted > 0 {
            info!(form = FORM_KEY, ragic_id, "deleted cached record");
        } else {
            warn!(form = FORM_KEY, ragic_id, "delete requested for unknown record");
        }
        Ok(deleted > 0)
    }
}
