//! Environment-driven server configuration.

use secrecy::SecretString;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for environment variable {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The startup sync worker gets its own pool from this URL, never the
    /// request-path engine.
    pub sync_database_url: String,
    pub registry_path: String,
    pub ragic_api_key: SecretString,
    /// Overrides the registry's `settings.base_url` when set.
    pub ragic_base_url: Option<String>,
    pub webhook_secret: SecretString,
    pub field_encryption_key: SecretString,
    pub blind_index_key: SecretString,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = require("DATABASE_URL")?;
        let sync_database_url =
            optional("SYNC_DATABASE_URL").unwrap_or_else(|| database_url.clone());
        let port = optional("PORT")
            .map(|p| p.parse::<u16>().map_err(|_| ConfigError::Invalid("PORT")))
            .transpose()?
            .unwrap_or(8120);

        Ok(Self {
            host: optional("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            database_url,
            sync_database_url,
            registry_path: optional("RAGIC_REGISTRY_PATH")
                .unwrap_or_else(|| "ragic_registry.json".to_string()),
            ragic_api_key: SecretString::from(require("RAGIC_API_KEY")?),
            ragic_base_url: optional("RAGIC_BASE_URL"),
            webhook_secret: SecretString::from(require("WEBHOOK_SECRET")?),
            field_encryption_key: SecretString::from(require("FIELD_ENCRYPTION_KEY")?),
            blind_index_key: SecretString::from(require("BLIND_INDEX_KEY")?),
        })
    }
}

fn optional(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}
