//! Ragic integration layer.
//!
//! The only crate that knows raw Ragic URLs, field IDs, or wire quirks.
//! Higher layers go through [`registry::RagicRegistry`] for configuration,
//! [`client::RecordStore`] for transport, and [`repository::RagicRepository`]
//! for typed access.

pub mod client;
pub mod mapper;
pub mod record;
pub mod registry;
pub mod repository;

pub use client::{ListQuery, RagicClient, RagicError, RecordStore};
pub use mapper::{FieldValidationError, MapError};
pub use record::RagicRecord;
pub use registry::{ConfigurationError, FormConfig, RagicRegistry};
pub use repository::{RagicEntity, RagicRepository, RepositoryError};
