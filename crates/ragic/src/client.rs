//! Ragic HTTP client.
//!
//! Low-level CRUD against Ragic sheets. Transient failures are retried a
//! bounded number of times with backoff; 4xx responses surface immediately
//! with status and body. The API key is held as a secret and never logged.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::record::{RagicRecord, extract_ragic_id};

const API_MARKER_PARAM: &str = "api";

#[derive(Debug, Clone, Error)]
pub enum RagicError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("json error: {0}")]
    Serde(String),
    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(String),
}

impl RagicError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

/// Listing parameters for [`RecordStore::list_records`].
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub limit: u32,
    pub offset: u32,
    /// Field-ID keyed equality filters, sent as `where_<field_id>=value`.
    pub filters: Vec<(String, String)>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: 1000,
            offset: 0,
            filters: Vec::new(),
        }
    }
}

impl ListQuery {
    pub fn filtered(field_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            filters: vec![(field_id.into(), value.into())],
            ..Self::default()
        }
    }
}

/// Transport seam for everything that talks to the record store. Sync
/// services and repositories depend on this trait so tests can substitute
/// an in-memory store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_records(
        &self,
        sheet_path: &str,
        query: &ListQuery,
    ) -> Result<Vec<RagicRecord>, RagicError>;

    async fn get_record(
        &self,
        sheet_path: &str,
        ragic_id: i64,
    ) -> Result<Option<RagicRecord>, RagicError>;

    async fn create_record(
        &self,
        sheet_path: &str,
        fields: &Map<String, Value>,
    ) -> Result<i64, RagicError>;

    async fn update_record(
        &self,
        sheet_path: &str,
        ragic_id: i64,
        fields: &Map<String, Value>,
    ) -> Result<(), RagicError>;

    async fn delete_record(&self, sheet_path: &str, ragic_id: i64) -> Result<(), RagicError>;
}

/// Reqwest-backed Ragic API client.
pub struct RagicClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    naming: String,
}

impl RagicClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    const MAX_RETRIES: usize = 3;

    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        naming: impl Into<String>,
    ) -> Result<Self, RagicError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("ragic-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RagicError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            naming: naming.into(),
        })
    }

    fn record_url(&self, sheet_path: &str, ragic_id: Option<i64>) -> String {
        let path = if sheet_path.starts_with('/') {
            sheet_path.to_string()
        } else {
            format!("/{sheet_path}")
        };
        match ragic_id {
            Some(id) => format!("{}{}/{}", self.base_url, path, id),
            None => format!("{}{}", self.base_url, path),
        }
    }

    fn auth_header(&self) -> String {
        format!("Basic {}", self.api_key.expose_secret())
    }

    async fn retried<T, F, Fut>(&self, op: &'static str, call: F) -> Result<T, RagicError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RagicError>>,
    {
        call.retry(
            &ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(500))
                .with_max_delay(Duration::from_secs(5))
                .with_max_times(Self::MAX_RETRIES)
                .with_jitter(),
        )
        .when(RagicError::should_retry)
        .notify(|e, dur| {
            warn!(
                operation = op,
                "Ragic request failed, retrying after {:.2}s: {}",
                dur.as_secs_f64(),
                e
            );
        })
        .await
    }

    async fn read_json(res: reqwest::Response) -> Result<Value, RagicError> {
        match res.status() {
            s if s.is_success() => res
                .json::<Value>()
                .await
                .map_err(|e| RagicError::Serde(e.to_string())),
            StatusCode::UNAUTHORIZED => Err(RagicError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(RagicError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(RagicError::Http { status, body })
            }
        }
    }

    /// Ragic listings come back as an object keyed by record ID with a
    /// `_metaData` entry to skip.
    fn parse_listing(data: Value) -> Result<Vec<RagicRecord>, RagicError> {
        match data {
            Value::Object(map) => {
                let mut records = Vec::with_capacity(map.len());
                for (key, value) in map {
                    if key == "_metaData" {
                        continue;
                    }
                    let Value::Object(fields) = value else {
                        continue;
                    };
                    let ragic_id = key
                        .trim()
                        .parse::<i64>()
                        .ok()
                        .or_else(|| extract_ragic_id(&Value::Object(fields.clone())));
                    let Some(ragic_id) = ragic_id else {
                        warn!(key = %key, "skipping Ragic record with unparsable id");
                        continue;
                    };
                    records.push(RagicRecord::new(ragic_id, fields));
                }
                records.sort_by_key(|r| r.ragic_id);
                Ok(records)
            }
            Value::Array(items) => {
                let mut records = Vec::with_capacity(items.len());
                for item in items {
                    let Some(ragic_id) = extract_ragic_id(&item) else {
                        warn!("skipping Ragic record without _ragicId");
                        continue;
                    };
                    if let Value::Object(fields) = item {
                        records.push(RagicRecord::new(ragic_id, fields));
                    }
                }
                Ok(records)
            }
            other => Err(RagicError::UnexpectedResponse(format!(
                "expected object or array listing, got {other}"
            ))),
        }
    }
}

#[async_trait]
impl RecordStore for RagicClient {
    async fn list_records(
        &self,
        sheet_path: &str,
        query: &ListQuery,
    ) -> Result<Vec<RagicRecord>, RagicError> {
        let url = self.record_url(sheet_path, None);
        let data = self
            .retried("list_records", || async {
                let mut params: Vec<(String, String)> = vec![
                    (API_MARKER_PARAM.to_string(), String::new()),
                    ("naming".to_string(), self.naming.clone()),
                    ("limit".to_string(), query.limit.to_string()),
                    ("offset".to_string(), query.offset.to_string()),
                ];
                for (field_id, value) in &query.filters {
                    params.push((format!("where_{field_id}"), value.clone()));
                }

                let res = self
                    .http
                    .get(&url)
                    .query(&params)
                    .header(reqwest::header::AUTHORIZATION, self.auth_header())
                    .send()
                    .await
                    .map_err(map_reqwest_error)?;
                Self::read_json(res).await
            })
            .await?;

        Self::parse_listing(data)
    }

    async fn get_record(
        &self,
        sheet_path: &str,
        ragic_id: i64,
    ) -> Result<Option<RagicRecord>, RagicError> {
        let url = self.record_url(sheet_path, Some(ragic_id));
        let result = self
            .retried("get_record", || async {
                let res = self
                    .http
                    .get(&url)
                    .query(&[
                        (API_MARKER_PARAM, ""),
                        ("naming", self.naming.as_str()),
                    ])
                    .header(reqwest::header::AUTHORIZATION, self.auth_header())
                    .send()
                    .await
                    .map_err(map_reqwest_error)?;
                Self::read_json(res).await
            })
            .await;

        match result {
            Ok(Value::Object(fields)) if !fields.is_empty() => {
                Ok(Some(RagicRecord::new(ragic_id, fields)))
            }
            Ok(_) => Ok(None),
            Err(RagicError::Http { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_record(
        &self,
        sheet_path: &str,
        fields: &Map<String, Value>,
    ) -> Result<i64, RagicError> {
        let url = self.record_url(sheet_path, None);
        let data = self
            .retried("create_record", || async {
                let res = self
                    .http
                    .post(&url)
                    .query(&[(API_MARKER_PARAM, "")])
                    .header(reqwest::header::AUTHORIZATION, self.auth_header())
                    .json(fields)
                    .send()
                    .await
                    .map_err(map_reqwest_error)?;
                Self::read_json(res).await
            })
            .await?;

        extract_ragic_id(&data).ok_or_else(|| {
            RagicError::UnexpectedResponse("create response carried no record id".to_string())
        })
    }

    async fn update_record(
        &self,
        sheet_path: &str,
        ragic_id: i64,
        fields: &Map<String, Value>,
    ) -> Result<(), RagicError> {
        // Ragic updates existing records via POST to the record URL.
        let url = self.record_url(sheet_path, Some(ragic_id));
        self.retried("update_record", || async {
            let res = self
                .http
                .post(&url)
                .query(&[(API_MARKER_PARAM, "")])
                .header(reqwest::header::AUTHORIZATION, self.auth_header())
                .json(fields)
                .send()
                .await
                .map_err(map_reqwest_error)?;
            Self::read_json(res).await
        })
        .await?;
        Ok(())
    }

    async fn delete_record(&self, sheet_path: &str, ragic_id: i64) -> Result<(), RagicError> {
        let url = self.record_url(sheet_path, Some(ragic_id));
        self.retried("delete_record", || async {
            let res = self
                .http
                .delete(&url)
                .query(&[(API_MARKER_PARAM, "")])
                .header(reqwest::header::AUTHORIZATION, self.auth_header())
                .send()
                .await
                .map_err(map_reqwest_error)?;
            Self::read_json(res).await
        })
        .await?;
        Ok(())
    }
}

fn map_reqwest_error(e: reqwest::Error) -> RagicError {
    if e.is_timeout() {
        RagicError::Timeout
    } else {
        RagicError::Transport(e.to_string())
    }
}
