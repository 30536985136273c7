//! Shared fixtures: an in-memory record store standing in for the Ragic
//! API, a registry file, a cipher with fixed keys, and a fresh database.

use std::{
    collections::{BTreeMap, HashMap},
    io::Write as _,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicI64, Ordering},
    },
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use db::DBService;
use ragic::{ListQuery, RagicError, RagicRecord, RagicRegistry, RecordStore};
use serde_json::{Map, Value, json};
use services::services::crypto::FieldCipher;
use std::sync::Arc;

// Field IDs mirror ragic_registry.json at the workspace root.
pub const USER_LINE_ID: &str = "1006071";
pub const USER_EMAIL: &str = "1006073";
pub const USER_DISPLAY_NAME: &str = "1006076";
pub const USER_IS_ACTIVE: &str = "1006077";
pub const ACCOUNT_ID: &str = "1005971";
pub const ACCOUNT_STATUS: &str = "1005974";
pub const ACCOUNT_NAME: &str = "1005975";
pub const ACCOUNT_EMAILS: &str = "1005977";
pub const ACCOUNT_APPROVAL_DATE: &str = "1005991";

pub const USER_SHEET: &str = "/HSIBAdmSys/user-identity/9";
pub const ACCOUNT_SHEET: &str = "/HSIBAdmSys/ychn-test/11";

const REGISTRY_JSON: &str = r#"{
    "schema_version": "1.0",
    "settings": { "base_url": "https://ap13.ragic.com" },
    "forms": {
        "core_user": {
            "ragic_path": "/HSIBAdmSys/user-identity/9",
            "webhook_key": "core_user",
            "field_mapping": {
                "LINE_USER_ID": "1006071",
                "EMAIL": "1006073",
                "EMPLOYEE_REF": "1006075",
                "DISPLAY_NAME": "1006076",
                "IS_ACTIVE": "1006077",
                "LAST_LOGIN_AT": "1006078"
            }
        },
        "administrative_account": {
            "ragic_path": "/HSIBAdmSys/ychn-test/11",
            "webhook_key": "administrative_account",
            "field_mapping": {
                "ACCOUNT_ID": "1005971",
                "EMPLOYEE_ID": "1005972",
                "STATUS": "1005974",
                "NAME": "1005975",
                "EMAILS": "1005977",
                "ORG_CODE": "1005983",
                "ORG_NAME": "1005984",
                "RANK_NAME": "1005986",
                "SALES_DEPT_MANAGER": "1005988",
                "APPROVAL_DATE": "1005991",
                "EFFECTIVE_DATE": "1005992",
                "RESIGNATION_DATE": "1005993"
            }
        },
        "administrative_leave_type": {
            "ragic_path": "/HSIBAdmSys/ychn-test/21",
            "webhook_key": "administrative_leave_type",
            "field_mapping": {
                "LEAVE_TYPE_NAME": "1006201",
                "ANNUAL_QUOTA": "1006202",
                "REQUIRES_PROOF": "1006203",
                "DISPLAY_ORDER": "1006204"
            }
        }
    }
}"#;

pub fn test_registry() -> Arc<RagicRegistry> {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(REGISTRY_JSON.as_bytes()).unwrap();
    file.flush().unwrap();
    Arc::new(RagicRegistry::load(file.path()).unwrap())
}

pub fn test_cipher() -> Arc<FieldCipher> {
    let enc = BASE64.encode([7u8; 32]);
    let idx = BASE64.encode([9u8; 32]);
    Arc::new(FieldCipher::new(&enc, &idx).unwrap())
}

pub async fn test_db() -> DBService {
    let db = DBService::new("sqlite::memory:").await.unwrap();
    db.migrate().await.unwrap();
    db
}

/// In-memory stand-in for the Ragic API, keyed by sheet path.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<String, BTreeMap<i64, Map<String, Value>>>>,
    next_id: AtomicI64,
    pub fail_listings: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1000),
            ..Self::default()
        }
    }

    pub fn insert(&self, sheet_path: &str, ragic_id: i64, fields: Map<String, Value>) {
        self.records
            .lock()
            .unwrap()
            .entry(sheet_path.to_string())
            .or_default()
            .insert(ragic_id, fields);
    }

    pub fn remove(&self, sheet_path: &str, ragic_id: i64) {
        if let Some(sheet) = self.records.lock().unwrap().get_mut(sheet_path) {
            sheet.remove(&ragic_id);
        }
    }

    pub fn fail_listings(&self, fail: bool) {
        self.fail_listings.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn list_records(
        &self,
        sheet_path: &str,
        query: &ListQuery,
    ) -> Result<Vec<RagicRecord>, RagicError> {
        if self.fail_listings.load(Ordering::SeqCst) {
            return Err(RagicError::Http {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }

        let records = self.records.lock().unwrap();
        let Some(sheet) = records.get(sheet_path) else {
            return Ok(Vec::new());
        };

        Ok(sheet
            .iter()
            .filter(|(_, fields)| {
                query.filters.iter().all(|(field_id, value)| {
                    fields
                        .get(field_id)
                        .and_then(Value::as_str)
                        .is_some_and(|v| v == value)
                })
            })
            .take(query.limit as usize)
            .map(|(id, fields)| RagicRecord::new(*id, fields.clone()))
            .collect())
    }

    async fn get_record(
        &self,
        sheet_path: &str,
        ragic_id: i64,
    ) -> Result<Option<RagicRecord>, RagicError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .get(sheet_path)
            .and_then(|sheet| sheet.get(&ragic_id))
            .map(|fields| RagicRecord::new(ragic_id, fields.clone())))
    }

    async fn create_record(
        &self,
        sheet_path: &str,
        fields: &Map<String, Value>,
    ) -> Result<i64, RagicError> {
        let ragic_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.insert(sheet_path, ragic_id, fields.clone());
        Ok(ragic_id)
    }

    async fn update_record(
        &self,
        sheet_path: &str,
        ragic_id: i64,
        fields: &Map<String, Value>,
    ) -> Result<(), RagicError> {
        let mut records = self.records.lock().unwrap();
        let sheet = records.entry(sheet_path.to_string()).or_default();
        match sheet.get_mut(&ragic_id) {
            Some(existing) => {
                for (key, value) in fields {
                    existing.insert(key.clone(), value.clone());
                }
                Ok(())
            }
            None => Err(RagicError::Http {
                status: 404,
                body: format!("record {ragic_id} not found"),
            }),
        }
    }

    async fn delete_record(&self, sheet_path: &str, ragic_id: i64) -> Result<(), RagicError> {
        self.remove(sheet_path, ragic_id);
        Ok(())
    }
}

pub fn object(entries: &[(&str, &str)]) -> Map<String, Value> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
}

pub fn user_record(line_id: &str, email: &str, display_name: &str) -> Map<String, Value> {
    object(&[
        (USER_LINE_ID, line_id),
        (USER_EMAIL, email),
        (USER_DISPLAY_NAME, display_name),
        (USER_IS_ACTIVE, "1"),
    ])
}

pub fn account_record(account_id: &str, name: &str, emails: &str) -> Map<String, Value> {
    object(&[
        (ACCOUNT_ID, account_id),
        (ACCOUNT_STATUS, "1"),
        (ACCOUNT_NAME, name),
        (ACCOUNT_EMAILS, emails),
    ])
}
