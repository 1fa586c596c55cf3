//! Store configuration.
//!
//! Configuration is limited to the logical store name, an optional schema
//! version and the key of the resource-mapping record. It can be built in code
//! with the `with_*` setters or loaded from `MIRRORDB_*` environment variables.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Fixed internal database name. Infrastructure-level events are published
/// under this namespace instead of the configured store name.
pub const DATABASE_NAME: &str = "_mirrordb_";

/// Fixed logical name of the single durable container.
pub const CONTAINER_NAME: &str = "_mirrordb_store_";

/// Schema version used when none is configured.
pub const DEFAULT_VERSION: u32 = 1;

/// Default key of the resource-mapping record re-persisted on database rename.
pub const DEFAULT_RESOURCE_KEY: &str = "_resources_";

/// Configuration for a mirror store instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Logical store name; namespace for table-level events.
    pub name: String,
    /// Schema version requested when opening the container.
    pub version: Option<u32>,
    /// Key of the index/resource-mapping record.
    pub resource_key: String,
}

impl StoreConfig {
    /// Create a config for the given store name with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            resource_key: DEFAULT_RESOURCE_KEY.to_string(),
        }
    }

    /// Set the schema version.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Set the resource-mapping record key.
    pub fn with_resource_key(mut self, key: impl Into<String>) -> Self {
        self.resource_key = key.into();
        self
    }

    /// The version passed to the adapter on open.
    pub fn effective_version(&self) -> u32 {
        self.version.unwrap_or(DEFAULT_VERSION)
    }

    /// Load configuration from the process environment.
    ///
    /// - `MIRRORDB_NAME` (required)
    /// - `MIRRORDB_VERSION` (optional, positive integer)
    /// - `MIRRORDB_RESOURCE_KEY` (optional)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = lookup("MIRRORDB_NAME")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "MIRRORDB_NAME".to_string(),
            })?;

        let mut config = Self::new(name);

        if let Some(raw) = lookup("MIRRORDB_VERSION") {
            let version = raw.trim().parse::<u32>().map_err(|e| ConfigError::InvalidValue {
                field: "MIRRORDB_VERSION".to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            config.version = Some(version);
        }

        if let Some(key) = lookup("MIRRORDB_RESOURCE_KEY") {
            config.resource_key = key;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - name is not empty and does not shadow the internal database name
    /// - version, when set, is at least 1
    /// - resource_key is not empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "name".to_string(),
            });
        }

        if self.name == DATABASE_NAME {
            return Err(ConfigError::InvalidValue {
                field: "name".to_string(),
                value: self.name.clone(),
                reason: "reserved for infrastructure events".to_string(),
            });
        }

        if self.version == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "version".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if self.resource_key.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "resource_key".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::new("library");
        assert_eq!(config.name, "library");
        assert_eq!(config.version, None);
        assert_eq!(config.effective_version(), DEFAULT_VERSION);
        assert_eq!(config.resource_key, DEFAULT_RESOURCE_KEY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::new("library")
            .with_version(3)
            .with_resource_key("mapping");
        assert_eq!(config.effective_version(), 3);
        assert_eq!(config.resource_key, "mapping");
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let err = StoreConfig::new("  ").validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    fn test_validate_rejects_reserved_name() {
        let err = StoreConfig::new(DATABASE_NAME).validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_version() {
        let err = StoreConfig::new("library").with_version(0).validate().unwrap_err();
        assert!(format!("{}", err).contains("version"));
    }

    #[test]
    fn test_from_vars() {
        let config = StoreConfig::from_vars(vars(&[
            ("MIRRORDB_NAME", "library"),
            ("MIRRORDB_VERSION", "2"),
            ("MIRRORDB_RESOURCE_KEY", "_map_"),
        ]))
        .expect("config should load");
        assert_eq!(config.name, "library");
        assert_eq!(config.version, Some(2));
        assert_eq!(config.resource_key, "_map_");
    }

    #[test]
    fn test_from_vars_missing_name() {
        let err = StoreConfig::from_vars(vars(&[])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingRequired {
                field: "MIRRORDB_NAME".to_string()
            }
        );
    }

    #[test]
    fn test_from_vars_bad_version() {
        let err = StoreConfig::from_vars(vars(&[
            ("MIRRORDB_NAME", "library"),
            ("MIRRORDB_VERSION", "two"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref value, .. } if value == "two"));
    }
}
