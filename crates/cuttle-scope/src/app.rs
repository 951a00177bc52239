//! Application identity and configuration

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use cuttle_core::{ConnectionArguments, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Configuration keys starting with this prefix become connection arguments
pub const CONFIG_PREFIX: &str = "CUTTLEPOOL_";

/// Unique identifier of an application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppId(Uuid);

impl AppId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AppId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Flat key/value application configuration
///
/// Usually loaded from a TOML file:
///
/// ```toml
/// CUTTLEPOOL_PATH = "/var/lib/app/app.db"
/// CUTTLEPOOL_CAPACITY = 4
/// CUTTLEPOOL_TIMEOUT = 2.5
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppConfig {
    values: BTreeMap<String, serde_json::Value>,
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading application config");
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Builder-style [`set`](Self::set)
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The `CUTTLEPOOL_*` entries with the prefix stripped and the rest
    /// lower-cased, so `CUTTLEPOOL_HOST` becomes `host`
    pub fn connection_arguments(&self) -> ConnectionArguments {
        self.values
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(CONFIG_PREFIX)
                    .map(|name| (name.to_lowercase(), value.clone()))
            })
            .collect()
    }
}

/// An application that owns a connection pool
///
/// Identity is the [`AppId`]; two apps with the same name and configuration
/// still get separate pools.
#[derive(Debug)]
pub struct App {
    id: AppId,
    name: String,
    config: AppConfig,
}

impl App {
    pub fn new(name: impl Into<String>, config: AppConfig) -> Arc<Self> {
        Arc::new(Self {
            id: AppId::new(),
            name: name.into(),
            config,
        })
    }

    pub fn id(&self) -> AppId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_connection_arguments_translation() {
        let config = AppConfig::new()
            .with("CUTTLEPOOL_USER", "paul_hollywood")
            .with("CUTTLEPOOL_Host", "an_ip_address_in_england")
            .with("SECRET_KEY", "not_for_the_driver")
            .with("cuttlepool_lower", "ignored");

        let args = config.connection_arguments();
        assert_eq!(args.len(), 2);
        assert_eq!(args.get_string("user").as_deref(), Some("paul_hollywood"));
        assert_eq!(
            args.get_string("host").as_deref(),
            Some("an_ip_address_in_england")
        );
        assert!(!args.contains("secret_key"));
    }

    #[test]
    fn test_config_from_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            CUTTLEPOOL_PATH = "bakery.db"
            CUTTLEPOOL_CAPACITY = 4
            CUTTLEPOOL_TIMEOUT = 2.5
            DEBUG = true
            "#,
        )
        .unwrap();

        assert_eq!(config.len(), 4);
        assert_eq!(config.get("CUTTLEPOOL_CAPACITY"), Some(&serde_json::json!(4)));
        assert_eq!(config.get("DEBUG"), Some(&serde_json::json!(true)));

        let args = config.connection_arguments();
        assert_eq!(args.get_string("path").as_deref(), Some("bakery.db"));
        assert_eq!(args.get("timeout"), Some(&serde_json::json!(2.5)));
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(&path, "CUTTLEPOOL_DATABASE = \"steakhouse\"\n").unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(
            config.connection_arguments().get_string("database").as_deref(),
            Some("steakhouse")
        );

        let err = AppConfig::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, cuttle_core::CuttleError::Io(_)));
    }

    #[test]
    fn test_invalid_toml() {
        let err = AppConfig::from_toml_str("CUTTLEPOOL_PATH = ").unwrap_err();
        assert!(matches!(err, cuttle_core::CuttleError::Toml(_)));
    }

    #[test]
    fn test_app_identity() {
        let a = App::new("bakery", AppConfig::new());
        let b = App::new("bakery", AppConfig::new());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.name(), "bakery");
        assert!(a.config().is_empty());
    }
}
