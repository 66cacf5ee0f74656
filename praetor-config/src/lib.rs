//! Configuration management for Praetor applications.
//!
//! [`ConfigManager`] is a thread-safe key/value store fed from environment
//! variables, `.env` files and JSON/TOML/env documents. Later sources
//! override earlier ones key by key. [`AppConfig`] reads the framework's own
//! settings out of it.
//!
//! ```
//! use praetor_config::ConfigManager;
//!
//! let config = ConfigManager::new();
//! config.set("max_upload_bytes", "1048576").unwrap();
//!
//! // String values from the environment are re-read as JSON when needed
//! let limit: u64 = config.get("max_upload_bytes").unwrap();
//! assert_eq!(limit, 1_048_576);
//! ```

pub mod app;
pub mod env;
pub mod error;
pub mod loader;
pub mod validation;

pub use app::{AppConfig, AppEnv};
pub use env::{EnvLoader, load_dotenv};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use validation::{ConfigValidator, Validate};

use parking_lot::RwLock;
use praetor_core::{Arguments, Construct, Injectable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Shared configuration store
#[derive(Clone, Default)]
pub struct ConfigManager {
    values: Arc<RwLock<Map<String, Value>>>,
    env_prefix: Option<String>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only environment variables named `<prefix>_*` are loaded
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            values: Arc::default(),
            env_prefix: Some(prefix.into()),
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Copy matching environment variables in as strings
    pub fn load_env(&self) {
        let vars = EnvLoader::new(self.env_prefix.clone()).load();
        debug!(count = vars.len(), prefix = ?self.env_prefix, "Loaded environment variables");

        let mut values = self.values.write();
        for (key, value) in vars {
            values.insert(key, Value::String(value));
        }
    }

    /// Load a `.env` file (see [`load_dotenv`]), then the environment
    pub fn load_dotenv(&self, path: Option<&Path>) -> Result<()> {
        load_dotenv(path)?;
        self.load_env();
        Ok(())
    }

    /// Merge a configuration file; the format is taken from its name when
    /// `format` is `None`
    pub fn load_file(&self, path: &Path, format: Option<FileFormat>) -> Result<()> {
        let loader = match format {
            Some(format) => ConfigLoader::new(format),
            None => ConfigLoader::auto(path)?,
        };
        let map = loader.load_file(path)?;
        debug!(path = %path.display(), keys = map.len(), "Loaded configuration file");

        self.values.write().extend(map);
        Ok(())
    }

    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    /// Typed lookup. A string value that does not fit `T` is parsed as JSON
    /// once more, so `"42"` read from the environment serves a `u64`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .values
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        let direct_err = match serde_json::from_value::<T>(value.clone()) {
            Ok(typed) => return Ok(typed),
            Err(e) => e,
        };

        let reparsed = match &value {
            Value::String(raw) => serde_json::from_str::<T>(raw).ok(),
            _ => None,
        };
        reparsed.ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: direct_err.to_string(),
        })
    }

    /// Missing keys yield `default`; present but invalid ones are an error
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            Err(ConfigError::KeyNotFound(_)) => Ok(default),
            other => other,
        }
    }

    pub fn get_optional<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigError::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get(key)
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.read().keys().cloned().collect()
    }

    /// Copy every key of `other` over this one
    pub fn merge(&self, other: &ConfigManager) {
        if Arc::ptr_eq(&self.values, &other.values) {
            return;
        }
        let theirs = other.values.read().clone();
        self.values.write().extend(theirs);
    }

    /// Deserialize the whole store into `T` and validate it
    pub fn load_validated<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let snapshot = Value::Object(self.values.read().clone());
        let typed: T = serde_json::from_value(snapshot).map_err(|e| ConfigError::InvalidValue {
            key: std::any::type_name::<T>().to_string(),
            message: e.to_string(),
        })?;
        typed.validate()?;
        Ok(typed)
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("keys", &self.keys())
            .field("env_prefix", &self.env_prefix)
            .finish()
    }
}

/// Built from the process environment when nothing was seeded
impl Construct for ConfigManager {
    fn construct(_: &mut Arguments<'_>) -> praetor_core::Result<Self> {
        let manager = ConfigManager::new();
        manager.load_env();
        Ok(manager)
    }
}

impl Injectable for ConfigManager {
    fn singleton() -> bool {
        true
    }
}

/// Assembles a [`ConfigManager`] from several sources, in this order:
/// `.env`, environment, then files in the order given.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    prefix: Option<String>,
    dotenv: Option<Option<String>>,
    env: bool,
    files: Vec<(String, Option<FileFormat>)>,
}

impl ConfigBuilder {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// `None` searches for `.env` and tolerates its absence
    pub fn dotenv(mut self, path: Option<String>) -> Self {
        self.dotenv = Some(path);
        self
    }

    pub fn env(mut self) -> Self {
        self.env = true;
        self
    }

    pub fn file(mut self, path: impl Into<String>) -> Self {
        self.files.push((path.into(), None));
        self
    }

    pub fn file_with_format(mut self, path: impl Into<String>, format: FileFormat) -> Self {
        self.files.push((path.into(), Some(format)));
        self
    }

    pub fn build(self) -> Result<ConfigManager> {
        let manager = match self.prefix {
            Some(prefix) => ConfigManager::with_prefix(prefix),
            None => ConfigManager::new(),
        };

        if let Some(path) = &self.dotenv {
            load_dotenv(path.as_deref().map(Path::new))?;
        }
        if self.env {
            manager.load_env();
        }
        for (path, format) in &self.files {
            manager.load_file(Path::new(path), *format)?;
        }

        Ok(manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use praetor_core::{Injector, RequestContext, SharedInstanceCache};

    #[test]
    fn test_set_and_get() {
        let manager = ConfigManager::new();
        manager.set("name", "praetor").unwrap();

        assert_eq!(manager.get_string("name").unwrap(), "praetor");
        assert!(manager.has("name"));
        assert!(!manager.has("missing"));
    }

    #[test]
    fn test_string_values_are_reparsed() {
        let manager = ConfigManager::new();
        manager.set("port", "8080").unwrap();
        manager.set("debug", "true").unwrap();
        manager.set("word", "hello").unwrap();

        assert_eq!(manager.get_int("port").unwrap(), 8080);
        assert!(manager.get_bool("debug").unwrap());
        assert_eq!(manager.get_string("port").unwrap(), "8080");
        assert!(matches!(
            manager.get_int("word"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_get_or_only_defaults_missing_keys() {
        let manager = ConfigManager::new();
        manager.set("limit", "lots").unwrap();

        assert_eq!(manager.get_or("missing", 5u64).unwrap(), 5);
        assert!(manager.get_or("limit", 5u64).is_err());
        assert_eq!(manager.get_optional::<u64>("missing").unwrap(), None);
    }

    #[test]
    fn test_merge() {
        let base = ConfigManager::new();
        base.set("a", 1).unwrap();
        base.set("b", 1).unwrap();

        let overrides = ConfigManager::new();
        overrides.set("b", 2).unwrap();

        base.merge(&overrides);
        base.merge(&base.clone());

        assert_eq!(base.get_int("a").unwrap(), 1);
        assert_eq!(base.get_int("b").unwrap(), 2);
    }

    #[test]
    fn test_injected_as_singleton() {
        let cache = SharedInstanceCache::new();
        let seeded = ConfigManager::new();
        seeded.set("app_namespace", "Shop").unwrap();
        cache.insert(Arc::new(seeded));

        let injector = Injector::new(cache);
        let resolved: Arc<ConfigManager> = injector.instance(&RequestContext::new()).unwrap();

        assert_eq!(resolved.get_string("app_namespace").unwrap(), "Shop");
    }
}
