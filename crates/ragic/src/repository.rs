//! Typed repository over the record store.
//!
//! An entity declares which form it belongs to and how it maps to and from
//! raw records; the repository handles logical-name filter translation,
//! create-vs-update on save, and per-record mapping outcomes so a caller
//! can skip bad records without losing the batch.

use std::{marker::PhantomData, sync::Arc};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use crate::{
    client::{ListQuery, RagicError, RecordStore},
    mapper::MapError,
    record::RagicRecord,
    registry::{ConfigurationError, FormConfig, RagicRegistry},
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Remote(#[from] RagicError),
    #[error(transparent)]
    Config(#[from] ConfigurationError),
    #[error("entity has no ragic_id; save it first")]
    MissingRagicId,
}

/// A typed view of one Ragic form's records.
pub trait RagicEntity: Send + Sync + Sized {
    /// Registry form key this entity belongs to.
    fn form_key() -> &'static str;

    /// Build the entity from a raw record, resolving field IDs through the
    /// form config. A failed cast surfaces as `MapError::Validation`.
    fn from_record(form: &FormConfig, record: &RagicRecord) -> Result<Self, MapError>;

    /// Serialize the entity into a field-ID keyed payload for write-back.
    fn to_payload(&self, form: &FormConfig) -> Result<Map<String, Value>, ConfigurationError>;

    fn ragic_id(&self) -> Option<i64>;
    fn set_ragic_id(&mut self, ragic_id: i64);
}

pub struct RagicRepository<T: RagicEntity> {
    store: Arc<dyn RecordStore>,
    registry: Arc<RagicRegistry>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: RagicEntity> RagicRepository<T> {
    pub fn new(store: Arc<dyn RecordStore>, registry: Arc<RagicRegistry>) -> Self {
        Self {
            store,
            registry,
            _entity: PhantomData,
        }
    }

    pub fn sheet_path(&self) -> Result<String, ConfigurationError> {
        self.registry.sheet_path(T::form_key())
    }

    fn map_records(
        &self,
        records: Vec<RagicRecord>,
    ) -> Result<Vec<Result<T, MapError>>, ConfigurationError> {
        let config = self.registry.config();
        let form = config.form_strict(T::form_key())?;
        Ok(records
            .iter()
            .map(|record| T::from_record(form, record))
            .collect())
    }

    /// Fetch every record of the form. Mapping failures are returned per
    /// record; the caller decides whether to skip or abort.
    pub async fn find_all(
        &self,
        query: &ListQuery,
    ) -> Result<Vec<Result<T, MapError>>, RepositoryError> {
        let sheet_path = self.sheet_path()?;
        let records = self.store.list_records(&sheet_path, query).await?;
        Ok(self.map_records(records)?)
    }

    /// Fetch records where a logical field equals `value`. The field name
    /// is translated to its Ragic field ID through the registry.
    pub async fn find_by(
        &self,
        field_name: &str,
        value: &str,
    ) -> Result<Vec<Result<T, MapError>>, RepositoryError> {
        let field_id = self.registry.field_id(T::form_key(), field_name)?;
        let sheet_path = self.sheet_path()?;
        let records = self
            .store
            .list_records(&sheet_path, &ListQuery::filtered(field_id, value))
            .await?;
        Ok(self.map_records(records)?)
    }

    pub async fn find_one_by(
        &self,
        field_name: &str,
        value: &str,
    ) -> Result<Option<Result<T, MapError>>, RepositoryError> {
        let mut results = self.find_by(field_name, value).await?;
        Ok(if results.is_empty() {
            None
        } else {
            Some(results.swap_remove(0))
        })
    }

    pub async fn get(
        &self,
        ragic_id: i64,
    ) -> Result<Option<Result<T, MapError>>, RepositoryError> {
        let sheet_path = self.sheet_path()?;
        let Some(record) = self.store.get_record(&sheet_path, ragic_id).await? else {
            return Ok(None);
        };
        let config = self.registry.config();
        let form = config.form_strict(T::form_key())?;
        Ok(Some(T::from_record(form, &record)))
    }

    /// Create the entity remotely when it has no `ragic_id` yet, otherwise
    /// update the existing record. On create the assigned ID is written
    /// back into the returned entity.
    pub async fn save(&self, mut entity: T) -> Result<T, RepositoryError> {
        let sheet_path = self.sheet_path()?;
        let config = self.registry.config();
        let form = config.form_strict(T::form_key())?;
        let payload = entity.to_payload(form)?;

        match entity.ragic_id() {
            Some(ragic_id) => {
                self.store
                    .update_record(&sheet_path, ragic_id, &payload)
                    .await?;
                info!(form = T::form_key(), ragic_id, "updated record");
            }
            None => {
                let ragic_id = self.store.create_record(&sheet_path, &payload).await?;
                entity.set_ragic_id(ragic_id);
                info!(form = T::form_key(), ragic_id, "created record");
            }
        }
        Ok(entity)
    }

    pub async fn delete(&self, entity: &T) -> Result<(), RepositoryError> {
        let ragic_id = entity.ragic_id().ok_or(RepositoryError::MissingRagicId)?;
        self.delete_by_id(ragic_id).await
    }

    pub async fn delete_by_id(&self, ragic_id: i64) -> Result<(), RepositoryError> {
        let sheet_path = self.sheet_path()?;
        self.store.delete_record(&sheet_path, ragic_id).await?;
        info!(form = T::form_key(), ragic_id, "deleted record");
        Ok(())
    }
}
