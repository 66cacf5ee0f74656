// Configuration file loaders

use crate::{ConfigError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
    /// `KEY=value` lines, as in `.env` files
    Env,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "env" => Some(FileFormat::Env),
            _ => None,
        }
    }

    /// Detect from a path; `.env` itself counts as the env format
    pub fn detect(path: &Path) -> Option<Self> {
        if path.file_name().and_then(|n| n.to_str()) == Some(".env") {
            return Some(FileFormat::Env);
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    fn name(&self) -> &'static str {
        match self {
            FileFormat::Json => "JSON",
            FileFormat::Toml => "TOML",
            FileFormat::Env => "env",
        }
    }
}

/// Parses a configuration document into a flat-or-nested key map
#[derive(Debug, Clone, Copy)]
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Pick the format from the file name
    pub fn auto(path: &Path) -> Result<Self> {
        FileFormat::detect(path).map(Self::new).ok_or_else(|| ConfigError::Parse {
            format: "unknown",
            message: format!("Cannot tell the format of {}", path.display()),
        })
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn load_file(&self, path: &Path) -> Result<Map<String, Value>> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        self.parse(&content)
    }

    /// Parse a document. The top level must be a table/object.
    pub fn parse(&self, content: &str) -> Result<Map<String, Value>> {
        let value = match self.format {
            FileFormat::Json => serde_json::from_str(content).map_err(|e| self.error(e))?,
            FileFormat::Toml => toml::from_str(content).map_err(|e| self.error(e))?,
            FileFormat::Env => self.parse_env(content)?,
        };

        match value {
            Value::Object(map) => Ok(map),
            other => Err(self.error(format!("expected a table at the top level, got {}", other))),
        }
    }

    fn parse_env(&self, content: &str) -> Result<Value> {
        let mut map = Map::new();
        for item in dotenvy::from_read_iter(content.as_bytes()) {
            let (key, value) = item.map_err(|e| self.error(e))?;
            map.insert(key.to_lowercase(), Value::String(value));
        }
        Ok(Value::Object(map))
    }

    fn error(&self, message: impl ToString) -> ConfigError {
        ConfigError::Parse {
            format: self.format.name(),
            message: message.to_string(),
        }
    }
}
