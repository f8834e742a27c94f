//! Configuration lookup used by the adapter factories.
//!
//! Values resolve in this order: explicit override, process environment, defaults.

use crate::error::{DataError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, error};

/// Anything that can produce string configuration values by key
pub trait ConfigSource: Send + Sync {
    /// Value for `key`, `DataError::MissingConfigKey` if no source has it
    fn get_value(&self, key: &str) -> Result<String>;

    /// Parse the value for `key` into `T`
    fn get_parsed<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
        Self: Sized,
    {
        let raw = self.get_value(key)?;
        raw.parse::<T>().map_err(|e| {
            DataError::invalid_configuration(format!("{} has invalid value '{}': {}", key, raw, e))
        })
    }

    /// Value for `key` if present
    fn get_optional(&self, key: &str) -> Option<String> {
        self.get_value(key).ok()
    }
}

/// Environment-backed configuration with defaults and in-process overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigManager {
    defaults: HashMap<String, String>,
    overrides: HashMap<String, String>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults<I, K, V>(defaults: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            defaults: defaults
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            overrides: HashMap::new(),
        }
    }

    /// Load a dotenv file into the process environment.
    ///
    /// Variables already set in the environment keep their value. A missing or
    /// unreadable file is logged and otherwise ignored.
    pub fn with_env_file(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.is_file() {
            error!("env file is not found: {}", path.display());
            return self;
        }

        match dotenvy::from_path(path) {
            Ok(()) => debug!("Loaded environment from {}", path.display()),
            Err(e) => error!("Failed to load env file {}: {}", path.display(), e),
        }
        self
    }

    /// Override a value for the lifetime of this manager
    pub fn override_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.overrides.insert(key.into(), value.into());
    }

    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.override_value(key, value);
        self
    }
}

impl ConfigSource for ConfigManager {
    fn get_value(&self, key: &str) -> Result<String> {
        if let Some(value) = self.overrides.get(key) {
            return Ok(value.clone());
        }
        if let Ok(value) = std::env::var(key) {
            return Ok(value);
        }
        self.defaults
            .get(key)
            .cloned()
            .ok_or_else(|| DataError::MissingConfigKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_precedence_override_env_default() {
        std::env::set_var("STRATA_TEST_PRECEDENCE", "from-env");

        let manager = ConfigManager::with_defaults([
            ("STRATA_TEST_PRECEDENCE", "from-default"),
            ("STRATA_TEST_ONLY_DEFAULT", "default"),
        ]);
        assert_eq!(manager.get_value("STRATA_TEST_PRECEDENCE").unwrap(), "from-env");
        assert_eq!(manager.get_value("STRATA_TEST_ONLY_DEFAULT").unwrap(), "default");

        let manager = manager.with_override("STRATA_TEST_PRECEDENCE", "from-override");
        assert_eq!(
            manager.get_value("STRATA_TEST_PRECEDENCE").unwrap(),
            "from-override"
        );
    }

    #[test]
    fn test_missing_key() {
        let manager = ConfigManager::new();
        let err = manager.get_value("STRATA_TEST_DOES_NOT_EXIST").unwrap_err();
        assert!(
            matches!(err, DataError::MissingConfigKey(key) if key == "STRATA_TEST_DOES_NOT_EXIST")
        );
        assert!(manager.get_optional("STRATA_TEST_DOES_NOT_EXIST").is_none());
    }

    #[test]
    fn test_get_parsed() {
        let manager = ConfigManager::new()
            .with_override("PORT", "5432")
            .with_override("BAD_PORT", "fivefour");

        assert_eq!(manager.get_parsed::<u16>("PORT").unwrap(), 5432);
        assert!(matches!(
            manager.get_parsed::<u16>("BAD_PORT"),
            Err(DataError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_env_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "STRATA_TEST_FROM_FILE=loaded").unwrap();

        let manager = ConfigManager::new().with_env_file(file.path());
        assert_eq!(manager.get_value("STRATA_TEST_FROM_FILE").unwrap(), "loaded");
    }

    #[test]
    fn test_missing_env_file_is_not_fatal() {
        let manager = ConfigManager::new().with_env_file("/nonexistent/strata.env");
        assert!(manager.get_value("STRATA_TEST_NOT_SET_ANYWHERE").is_err());
    }
}
