//! Sync service for employee account profiles.
//!
//! Accounts carry a free-form multi-valued emails field. When it is blank
//! the service falls back to the separately synced identity cache, matching
//! on exact display name. Duplicate names make that match ambiguous, so
//! every fallback hit is logged for audit and multi-matches are skipped.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use db::{
    DBService,
    models::{account::{Account, UpsertAccount}, user::CachedUser},
};
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

pub const FORM_KEY: &str = "administrative_account";

const FIELDS: [&str; 12] = [
    "ACCOUNT_ID",
    "EMPLOYEE_ID",
    "STATUS",
    "NAME",
    "EMAILS",
    "ORG_CODE",
    "ORG_NAME",
    "RANK_NAME",
    "SALES_DEPT_MANAGER",
    "APPROVAL_DATE",
    "EFFECTIVE_DATE",
    "RESIGNATION_DATE",
];

#[derive(Debug, Clone, Default)]
pub struct RagicAccount {
    pub ragic_id: Option<i64>,
    pub account_id: Option<String>,
    pub employee_id: Option<String>,
    pub name: Option<String>,
    pub status: bool,
    /// Raw multi-valued cell, e.g. "a@x.com, b@x.com".
    pub emails: Option<String>,
    pub org_code: Option<String>,
    pub org_name: Option<String>,
    pub rank_name: Option<String>,
    pub sales_dept_manager: Option<String>,
    pub approval_date: Option<NaiveDate>,
    pub effective_date: Option<NaiveDate>,
    pub resignation_date: Option<NaiveDate>,
}

impl RagicAccount {
    /// First non-empty entry of the multi-valued emails cell.
    pub fn primary_email(&self) -> Option<String> {
        self.emails
            .as_deref()?
            .split([',', ';', '\n'])
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }
}

impl RagicEntity for RagicAccount {
    fn form_key() -> &'static str {
        FORM_KEY
    }

    fn from_record(form: &FormConfig, record: &RagicRecord) -> Result<Self, MapError> {
        let text = |name: &str| -> Result<Option<String>, MapError> {
            Ok(record.text(form.field_id_strict(FORM_KEY, name)?))
        };
        let date = |name: &str| -> Result<Option<NaiveDate>, MapError> {
            Ok(mapper::parse_date(name, text(name)?)?)
        };

        Ok(Self {
            ragic_id: (record.ragic_id > 0).then_some(record.ragic_id),
            account_id: text("ACCOUNT_ID")?,
            employee_id: text("EMPLOYEE_ID")?,
            name: text("NAME")?,
            status: mapper::parse_bool("STATUS", text("STATUS")?)?.unwrap_or(true),
            emails: text("EMAILS")?,
            org_code: text("ORG_CODE")?,
            org_name: text("ORG_NAME")?,
            rank_name: text("RANK_NAME")?,
            sales_dept_manager: text("SALES_DEPT_MANAGER")?,
            approval_date: date("APPROVAL_DATE")?,
            effective_date: date("EFFECTIVE_DATE")?,
            resignation_date: date("RESIGNATION_DATE")?,
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

        put("ACCOUNT_ID", self.account_id.clone())?;
        put("EMPLOYEE_ID", self.employee_id.clone())?;
        put("NAME", self.name.clone())?;
        put("STATUS", Some(if self.status { "1" } else { "0" }.to_string()))?;
        put("EMAILS", self.emails.clone())?;
        put("ORG_CODE", self.org_code.clone())?;
        put("ORG_NAME", self.org_name.clone())?;
        put("RANK_NAME", self.rank_name.clone())?;
        put("SALES_DEPT_MANAGER", self.sales_dept_manager.clone())?;
        put("APPROVAL_DATE", self.approval_date.map(|d| d.to_string()))?;
        put("EFFECTIVE_DATE", self.effective_date.map(|d| d.to_string()))?;
        put(
            "RESIGNATION_DATE",
            self.resignation_date.map(|d| d.to_string()),
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

pub struct AccountSyncService {
    repo: RagicRepository<RagicAccount>,
    db: DBService,
    cipher: Arc<FieldCipher>,
    phase: PhaseCell,
}

impl AccountSyncService {
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

    pub fn repository(&self) -> &RagicRepository<RagicAccount> {
        &self.repo
    }

    /// Resolve the account's email, falling back to the identity cache by
    /// exact display-name match. Best effort: no match or an ambiguous
    /// match yields `None`.
    async fn resolve_email(
        &self,
        ragic_id: i64,
        account: &RagicAccount,
    ) -> Result<Option<String>, SyncError> {
        if let Some(email) = account.primary_email() {
            return Ok(Some(email));
        }
        let Some(name) = account.name.as_deref() else {
            return Ok(None);
        };

        let matches = CachedUser::find_active_by_display_name(&self.db.pool, name).await?;
        match matches.as_slice() {
            [user] => {
                let email = self.cipher.decrypt(&user.email)?;
                // Name-based matching can misassign on duplicate names, so
                // every hit leaves an audit trail.
                info!(
                    form = FORM_KEY,
                    ragic_id,
                    identity_ragic_id = user.ragic_id,
                    display_name = name,
                    "filled blank email from identity cache"
                );
                Ok(Some(email))
            }
            [] => Ok(None),
            _ => {
                warn!(
                    form = FORM_KEY,
                    ragic_id,
                    display_name = name,
                    candidates = matches.len(),
                    "ambiguous identity match, leaving email blank"
                );
                Ok(None)
            }
        }
    }

    async fn to_cache_row(&self, account: &RagicAccount) -> Result<UpsertAccount, SyncError> {
        let Some(ragic_id) = account.ragic_id else {
            return Err(SyncError::RecordRejected {
                ragic_id: 0,
                reason: "missing ragic_id".to_string(),
            });
        };
        let Some(account_id) = account.account_id.clone() else {
            return Err(SyncError::RecordRejected {
                ragic_id,
                reason: "missing account_id".to_string(),
            });
        };
        let Some(name) = account.name.clone() else {
            return Err(SyncError::RecordRejected {
                ragic_id,
                reason: "missing name".to_string(),
            });
        };

        let Some(email) = self.resolve_email(ragic_id, account).await? else {
            return Err(SyncError::RecordRejected {
                ragic_id,
                reason: format!("no email and no identity match for '{name}'"),
            });
        };

        Ok(UpsertAccount {
            ragic_id,
            account_id,
            employee_id: account.employee_id.clone(),
            name,
            status: account.status,
            primary_email: Some(self.cipher.encrypt(&email)?),
            primary_email_hash: Some(self.cipher.blind_index(&email)),
            org_code: account.org_code.clone(),
            org_name: account.org_name.clone(),
            rank_name: account.rank_name.clone(),
            sales_dept_manager: account.sales_dept_manager.clone(),
            approval_date: account.approval_date,
            effective_date: account.effective_date,
            resignation_date: account.resignation_date,
        })
    }

    async fn upsert_account(&self, account: &RagicAccount, result: &mut SyncResult) {
        let row = match self.to_cache_row(account).await {
            Ok(row) => row,
            Err(SyncError::RecordRejected { ragic_id, reason }) => {
                result.skipped += 1;
                result.record_warning(format!("record {ragic_id} skipped: {reason}"));
                warn!(form = FORM_KEY, ragic_id, %reason, "skipping record");
                return;
            }
            Err(e) => {
                result.record_error(format!("record {:?}: {e}", account.ragic_id));
                error!(form = FORM_KEY, ragic_id = ?account.ragic_id, error = %e, "mapping failed");
                return;
            }
        };

        match Account::upsert(&self.db.pool, &row).await {
            Ok(_) => result.synced += 1,
            Err(e) => {
                result.record_error(format!("record {}: {e}", row.ragic_id));
                error!(form = FORM_KEY, ragic_id = row.ragic_id, error = %e, "upsert failed");
            }
        }
    }
}

#[async_trait]
impl RecordSync for AccountSyncService {
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
        let mut accounts = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(account) => accounts.push(account),
                Err(e) => {
                    result.record_error(e.to_string());
                    warn!(form = FORM_KEY, error = %e, "record failed validation");
                }
            }
        }

        self.phase.set(SyncPhase::Upserting);
        for account in &accounts {
            self.upsert_account(account, &mut result).await;
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
        let account = self
            .repo
            .get(ragic_id)
            .await?
            .ok_or(SyncError::RecordNotFound(ragic_id))??;

        let mut account = account;
        account.ragic_id.get_or_insert(ragic_id);

        let row = self.to_cache_row(&account).await?;
        Account::upsert(&self.db.pool, &row).await?;
        info!(form = FORM_KEY, ragic_id, "synced single record");
        Ok(())
    }

    async fn delete_record(&self, ragic_id: i64) -> Result<bool, SyncError> {
        let deleted = Account::delete_by_ragic_id(&self.db.pool, ragic_id).await?;
        if deleted > 0 {
            info!(form = FORM_KEY, ragic_id, "deleted cached record");
        } else {
            warn!(form = FORM_KEY, ragic_id, "delete requested for unknown record");
        }
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_email_takes_first_non_empty_entry() {
        let account = RagicAccount {
            emails: Some(" , a@x.com, b@x.com".to_string()),
            ..Default::default()
        };
        assert_eq!(account.primary_email().as_deref(), Some("a@x.com"));

        let blank = RagicAccount {
            emails: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(blank.primary_email(), None);
        assert_eq!(RagicAccount::default().primary_email(), None);
    }
}
