//! Registry of Ragic form configurations.
//!
//! Loads `ragic_registry.json` once at startup and hands out sheet paths and
//! field IDs by logical name. Reload parses the whole file before swapping
//! the shared snapshot, so readers never see a half-updated mapping.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    #[error("registry file not found: {0}")]
    FileNotFound(String),
    #[error("invalid registry file {path}: {reason}")]
    Invalid { path: String, reason: String },
    #[error("form key '{0}' not registered")]
    UnknownForm(String),
    #[error("field '{field}' not registered for form '{form_key}'")]
    UnknownField { form_key: String, field: String },
}

/// Global Ragic settings from the registry file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default = "GlobalSettings::default_base_url")]
    pub base_url: String,
    #[serde(default = "GlobalSettings::default_timeout")]
    pub default_timeout: f64,
    #[serde(default = "GlobalSettings::default_naming")]
    pub naming: String,
}

impl GlobalSettings {
    fn default_base_url() -> String {
        "https://ap13.ragic.com".to_string()
    }

    fn default_timeout() -> f64 {
        30.0
    }

    fn default_naming() -> String {
        "EID".to_string()
    }
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            default_timeout: Self::default_timeout(),
            naming: Self::default_naming(),
        }
    }
}

/// Configuration for one Ragic form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormConfig {
    #[serde(default)]
    pub description: String,
    pub ragic_path: String,
    #[serde(default)]
    pub key_field: Option<String>,
    #[serde(default)]
    pub webhook_key: Option<String>,
    #[serde(default)]
    pub field_mapping: HashMap<String, String>,
}

impl FormConfig {
    pub fn field_id(&self, field_name: &str) -> Option<&str> {
        self.field_mapping.get(field_name).map(String::as_str)
    }

    pub fn field_id_strict(
        &self,
        form_key: &str,
        field_name: &str,
    ) -> Result<&str, ConfigurationError> {
        self.field_id(field_name)
            .ok_or_else(|| ConfigurationError::UnknownField {
                form_key: form_key.to_string(),
                field: field_name.to_string(),
            })
    }
}

/// Parsed contents of the registry file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub schema_version: String,
    #[serde(default)]
    pub settings: GlobalSettings,
    #[serde(default)]
    pub forms: HashMap<String, FormConfig>,
}

impl RegistryConfig {
    pub fn form(&self, form_key: &str) -> Option<&FormConfig> {
        self.forms.get(form_key)
    }

    pub fn form_strict(&self, form_key: &str) -> Result<&FormConfig, ConfigurationError> {
        self.forms
            .get(form_key)
            .ok_or_else(|| ConfigurationError::UnknownForm(form_key.to_string()))
    }

    pub fn form_by_webhook_key(&self, webhook_key: &str) -> Option<(&str, &FormConfig)> {
        self.forms
            .iter()
            .find(|(_, form)| form.webhook_key.as_deref() == Some(webhook_key))
            .map(|(key, form)| (key.as_str(), form))
    }
}

/// Shared, reloadable registry handle.
pub struct RagicRegistry {
    path: PathBuf,
    config: RwLock<Arc<RegistryConfig>>,
}

impl RagicRegistry {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref().to_path_buf();
        let config = Self::parse_file(&path)?;
        info!(
            path = %path.display(),
            forms = config.forms.len(),
            "loaded Ragic registry"
        );
        Ok(Self {
            path,
            config: RwLock::new(Arc::new(config)),
        })
    }

    /// Re-read the registry file and atomically swap the snapshot.
    pub fn reload(&self) -> Result<(), ConfigurationError> {
        let config = Self::parse_file(&self.path)?;
        let forms = config.forms.len();
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(config);
        info!(path = %self.path.display(), forms, "reloaded Ragic registry");
        Ok(())
    }

    fn parse_file(path: &Path) -> Result<RegistryConfig, ConfigurationError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|_| ConfigurationError::FileNotFound(path.display().to_string()))?;

        let mut value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| ConfigurationError::Invalid {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        // Editor conveniences, not part of the config.
        if let Some(obj) = value.as_object_mut() {
            obj.remove("$schema");
            obj.remove("$comment");
        }

        let mut config: RegistryConfig =
            serde_json::from_value(value).map_err(|e| ConfigurationError::Invalid {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config.settings.base_url = config.settings.base_url.trim_end_matches('/').to_string();
        for form in config.forms.values_mut() {
            if !form.ragic_path.starts_with('/') {
                form.ragic_path = format!("/{}", form.ragic_path);
            }
        }

        Ok(config)
    }

    /// Current immutable snapshot.
    pub fn config(&self) -> Arc<RegistryConfig> {
        Arc::clone(&self.config.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn base_url(&self) -> String {
        self.config().settings.base_url.clone()
    }

    pub fn forms(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.config().forms.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn sheet_path(&self, form_key: &str) -> Result<String, ConfigurationError> {
        Ok(self.config().form_strict(form_key)?.ragic_path.clone())
    }

    pub fn field_id(
        &self,
        form_key: &str,
        field_name: &str,
    ) -> Result<String, ConfigurationError> {
        Ok(self
            .config()
            .form_strict(form_key)?
            .field_id_strict(form_key, field_name)?
            .to_string())
    }

    /// Fail-fast validation for a service's field set at construction time.
    pub fn require_fields(
        &self,
        form_key: &str,
        field_names: &[&str],
    ) -> Result<(), ConfigurationError> {
        let config = self.config();
        let form = config.form_strict(form_key)?;
        for name in field_names {
            form.field_id_strict(form_key, name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    const SAMPLE: &str = r#"{
        "$schema": "ignored",
        "$comment": "ignored",
        "schema_version": "1.0",
        "settings": { "base_url": "https://ap13.ragic.com/", "default_timeout": 10.0 },
        "forms": {
            "core_user": {
                "description": "users",
                "ragic_path": "HSIBAdmSys/user-identity/9",
                "webhook_key": "core_user",
                "field_mapping": { "EMAIL": "1006073", "DISPLAY_NAME": "1006076" }
            }
        }
    }"#;

    fn write_registry(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn load_normalizes_base_url_and_sheet_path() {
        let file = write_registry(SAMPLE);
        let registry = RagicRegistry::load(file.path()).unwrap();

        assert_eq!(registry.base_url(), "https://ap13.ragic.com");
        assert_eq!(
            registry.sheet_path("core_user").unwrap(),
            "/HSIBAdmSys/user-identity/9"
        );
    }

    #[test]
    fn field_id_resolves_registered_pairs() {
        let file = write_registry(SAMPLE);
        let registry = RagicRegistry::load(file.path()).unwrap();

        assert_eq!(registry.field_id("core_user", "EMAIL").unwrap(), "1006073");
    }

    #[test]
    fn unknown_form_and_field_fail_with_configuration_error() {
        let file = write_registry(SAMPLE);
        let registry = RagicRegistry::load(file.path()).unwrap();

        assert!(matches!(
            registry.field_id("missing_form", "EMAIL"),
            Err(ConfigurationError::UnknownForm(_))
        ));
        assert!(matches!(
            registry.field_id("core_user", "NOPE"),
            Err(ConfigurationError::UnknownField { .. })
        ));
        assert!(registry.require_fields("core_user", &["EMAIL", "NOPE"]).is_err());
    }

    #[test]
    fn reload_swaps_in_the_new_mapping() {
        let mut file = write_registry(SAMPLE);
        let registry = RagicRegistry::load(file.path()).unwrap();
        assert!(registry.field_id("core_user", "IS_ACTIVE").is_err());

        let updated = SAMPLE.replace(
            r#""DISPLAY_NAME": "1006076""#,
            r#""DISPLAY_NAME": "1006076", "IS_ACTIVE": "1006077""#,
        );
        file.as_file_mut().set_len(0).unwrap();
        std::fs::write(file.path(), updated).unwrap();

        registry.reload().unwrap();
        assert_eq!(
            registry.field_id("core_user", "IS_ACTIVE").unwrap(),
            "1006077"
        );
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        assert!(matches!(
            RagicRegistry::load("/nonexistent/registry.json"),
            Err(ConfigurationError::FileNotFound(_))
        ));
    }

    #[test]
    fn webhook_key_lookup_finds_the_owning_form() {
        let file = write_registry(SAMPLE);
        let registry = RagicRegistry::load(file.path()).unwrap();
        let config = registry.config();

        let (key, form) = config.form_by_webhook_key("core_user").unwrap();
        assert_eq!(key, "core_user");
        assert_eq!(form.ragic_path, "/HSIBAdmSys/user-identity/9");
        assert!(config.form_by_webhook_key("other").is_none());
    }
}
