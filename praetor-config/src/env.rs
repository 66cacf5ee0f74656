// Environment variable and .env loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads process environment variables, optionally restricted to a prefix.
///
/// With prefix `PRAETOR`, `PRAETOR_UPLOAD_DIR=/srv/up` becomes the key
/// `upload_dir`. Variables without the prefix are ignored.
#[derive(Debug, Clone, Default)]
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Every matching variable, keyed by its lowercased name
    pub fn load(&self) -> HashMap<String, String> {
        env::vars()
            .filter_map(|(name, value)| self.key_for(&name).map(|key| (key, value)))
            .collect()
    }

    /// A single variable, `key` given without prefix
    pub fn load_var(&self, key: &str) -> Result<String> {
        env::var(self.var_name(key)).map_err(ConfigError::from)
    }

    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }

    /// `upload_dir` -> `PRAETOR_UPLOAD_DIR`
    pub fn var_name(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }

    fn key_for(&self, name: &str) -> Option<String> {
        let stripped = match &self.prefix {
            Some(prefix) => name.strip_prefix(prefix.as_str())?.strip_prefix('_')?,
            None => name,
        };
        (!stripped.is_empty()).then(|| stripped.to_lowercase())
    }
}

/// Load a `.env` file into the process environment.
///
/// An explicit path must exist. Without one, `.env` is looked up from the
/// current directory upwards and a missing file is not an error. Variables
/// already set are never overridden.
pub fn load_dotenv(path: Option<&Path>) -> Result<Option<PathBuf>> {
    match path {
        Some(path) => {
            dotenvy::from_path(path)?;
            debug!(path = %path.display(), "Loaded .env file");
            Ok(Some(path.to_path_buf()))
        }
        None => match dotenvy::dotenv() {
            Ok(found) => {
                debug!(path = %found.display(), "Loaded .env file");
                Ok(Some(found))
            }
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(e.into()),
        },
    }
}
