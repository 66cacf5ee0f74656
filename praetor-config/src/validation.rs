// Configuration validation

use crate::{ConfigError, Result};
use std::fmt::Display;

/// Checked once after a typed configuration is loaded
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Field-level rules
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", field)));
        }
        Ok(())
    }

    pub fn in_range<T: PartialOrd + Display>(value: T, min: T, max: T, field: &str) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::Validation(format!(
                "{} must be between {} and {}, got {}",
                field, min, max, value
            )));
        }
        Ok(())
    }

    /// A namespace is a `::`-free identifier
    pub fn identifier(value: &str, field: &str) -> Result<()> {
        Self::not_empty(value, field)?;
        if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::Validation(format!(
                "{} must only contain letters, digits and underscores, got '{}'",
                field, value
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_empty() {
        assert!(ConfigValidator::not_empty("value", "field").is_ok());
        assert!(ConfigValidator::not_empty("  ", "field").is_err());
    }

    #[test]
    fn test_in_range() {
        assert!(ConfigValidator::in_range(5, 1, 10, "field").is_ok());
        assert!(ConfigValidator::in_range(0, 1, 10, "field").is_err());

        let err = ConfigValidator::in_range(11, 1, 10, "limit").unwrap_err();
        assert_eq!(err.to_string(), "Validation error: limit must be between 1 and 10, got 11");
    }

    #[test]
    fn test_identifier() {
        assert!(ConfigValidator::identifier("App_2", "ns").is_ok());
        assert!(ConfigValidator::identifier("App::Admin", "ns").is_err());
        assert!(ConfigValidator::identifier("", "ns").is_err());
    }
}
