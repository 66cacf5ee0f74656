// Framework settings read from a ConfigManager

use crate::{ConfigError, ConfigManager, ConfigValidator, Result, Validate};
use praetor_core::logging::{LogConfig, LogFormat, LogLevel, LogOutput};
use praetor_core::{BodyOptions, DEFAULT_NAMESPACE, DispatcherOptions, MultipartLimits};
use std::fmt;
use std::path::PathBuf;

/// Deployment flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppEnv {
    #[default]
    Dev,
    Prod,
}

impl AppEnv {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "dev" | "development" => Some(AppEnv::Dev),
            "prod" | "production" => Some(AppEnv::Prod),
            _ => None,
        }
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, AppEnv::Prod)
    }
}

impl fmt::Display for AppEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AppEnv::Dev => "dev",
            AppEnv::Prod => "prod",
        })
    }
}

/// Settings the dispatch core is assembled from.
///
/// | key | default |
/// |-----|---------|
/// | `app_namespace` | `App` |
/// | `app_env` | `dev` |
/// | `upload_dir` | system temp dir |
/// | `max_upload_bytes` | unlimited |
/// | `log_level` | `debug` in dev, `info` in prod |
/// | `log_format` | `pretty` in dev, `json` in prod |
/// | `log_dir` | none (log to stdout) |
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub namespace: String,
    pub env: AppEnv,
    pub upload_dir: Option<PathBuf>,
    pub max_upload_bytes: Option<u64>,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            env: AppEnv::Dev,
            upload_dir: None,
            max_upload_bytes: None,
            log_level: LogLevel::Debug,
            log_format: LogFormat::Pretty,
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Prefix of the log files written to `log_dir`
    pub const LOG_FILE_PREFIX: &'static str = "praetor.log";

    /// Read and validate the settings; absent keys take their defaults
    pub fn from_manager(config: &ConfigManager) -> Result<Self> {
        let env_name: String = config.get_or("app_env", AppEnv::default().to_string())?;
        let env = AppEnv::parse(&env_name).ok_or_else(|| ConfigError::InvalidValue {
            key: "app_env".into(),
            message: format!("expected dev or prod, got '{}'", env_name),
        })?;

        let default_level = if env.is_prod() { "info" } else { "debug" };
        let level_name: String = config.get_or("log_level", default_level.to_string())?;
        let log_level = LogLevel::parse(&level_name).ok_or_else(|| ConfigError::InvalidValue {
            key: "log_level".into(),
            message: format!("unknown level '{}'", level_name),
        })?;

        let default_format = if env.is_prod() { "json" } else { "pretty" };
        let format_name: String = config.get_or("log_format", default_format.to_string())?;
        let log_format = LogFormat::parse(&format_name).ok_or_else(|| ConfigError::InvalidValue {
            key: "log_format".into(),
            message: format!("unknown format '{}'", format_name),
        })?;

        let app = Self {
            namespace: config.get_or("app_namespace", DEFAULT_NAMESPACE.to_string())?,
            env,
            upload_dir: config.get_optional::<String>("upload_dir")?.map(PathBuf::from),
            max_upload_bytes: config.get_optional("max_upload_bytes")?,
            log_level,
            log_format,
            log_dir: config.get_optional::<String>("log_dir")?.map(PathBuf::from),
        };

        app.validate()?;
        Ok(app)
    }

    pub fn dispatcher_options(&self) -> DispatcherOptions {
        DispatcherOptions {
            namespace: self.namespace.clone(),
        }
    }

    pub fn body_options(&self) -> BodyOptions {
        BodyOptions {
            multipart: MultipartLimits {
                max_file_size: self.max_upload_bytes,
                temp_dir: self.upload_dir.clone(),
                ..MultipartLimits::default()
            },
        }
    }

    /// Daily rolling files under `log_dir` when set, stdout otherwise
    pub fn log_config(&self) -> LogConfig {
        let output = match &self.log_dir {
            Some(dir) => LogOutput::RollingFile {
                directory: dir.display().to_string(),
                prefix: Self::LOG_FILE_PREFIX.to_string(),
            },
            None => LogOutput::Stdout,
        };

        LogConfig::new()
            .level(self.log_level)
            .format(self.log_format)
            .output(output)
            .with_colors(self.log_dir.is_none() && !self.env.is_prod())
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        ConfigValidator::identifier(&self.namespace, "app_namespace")?;
        if let Some(limit) = self.max_upload_bytes {
            ConfigValidator::in_range(limit, 1, u64::MAX, "max_upload_bytes")?;
        }
        if let Some(dir) = &self.upload_dir {
            ConfigValidator::not_empty(&dir.display().to_string(), "upload_dir")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let app = AppConfig::from_manager(&ConfigManager::new()).unwrap();

        assert_eq!(app, AppConfig::default());
        assert_eq!(app.dispatcher_options().namespace, "App");
        assert_eq!(app.body_options().multipart.max_file_size, None);
        assert_eq!(app.log_config().output, LogOutput::Stdout);
    }

    #[test]
    fn test_prod_defaults() {
        let config = ConfigManager::new();
        config.set("app_env", "production").unwrap();

        let app = AppConfig::from_manager(&config).unwrap();

        assert_eq!(app.env, AppEnv::Prod);
        assert_eq!(app.log_level, LogLevel::Info);
        assert_eq!(app.log_format, LogFormat::Json);
    }

    #[test]
    fn test_string_settings_from_environment() {
        let config = ConfigManager::new();
        config.set("app_namespace", "Shop").unwrap();
        config.set("max_upload_bytes", "2048").unwrap();
        config.set("upload_dir", "/srv/uploads").unwrap();
        config.set("log_dir", "/var/log/shop").unwrap();
        config.set("log_level", "WARNING").unwrap();

        let app = AppConfig::from_manager(&config).unwrap();
        let body = app.body_options();

        assert_eq!(app.dispatcher_options().namespace, "Shop");
        assert_eq!(body.multipart.max_file_size, Some(2048));
        assert_eq!(body.multipart.temp_dir, Some(PathBuf::from("/srv/uploads")));
        assert_eq!(app.log_level, LogLevel::Warn);
        assert_eq!(
            app.log_config().output,
            LogOutput::RollingFile {
                directory: "/var/log/shop".into(),
                prefix: "praetor.log".into(),
            }
        );
    }

    #[test]
    fn test_invalid_settings() {
        let bad_env = ConfigManager::new();
        bad_env.set("app_env", "staging").unwrap();
        assert!(matches!(
            AppConfig::from_manager(&bad_env),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "app_env"
        ));

        let bad_namespace = ConfigManager::new();
        bad_namespace.set("app_namespace", "App::Admin").unwrap();
        assert!(matches!(
            AppConfig::from_manager(&bad_namespace),
            Err(ConfigError::Validation(_))
        ));

        let zero_limit = ConfigManager::new();
        zero_limit.set("max_upload_bytes", 0).unwrap();
        assert!(AppConfig::from_manager(&zero_limit).is_err());
    }
}
