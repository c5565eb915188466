//! Configuration parsing and validation for playtimed
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Per-tier daily budgets
//! - Timer cadences
//! - Live-presence gate settings
//! - Capability grants per identity
//! - Validation with clear error messages

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Policy> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Policy> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Policy::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_minimal_config() {
        let config = r#"
            config_version = 1

            [budget]
            standard_max_budget_minutes = 60
            privileged_max_budget_minutes = 120
        "#;

        let policy = parse_config(config).unwrap();
        assert_eq!(policy.budget.standard_seconds, 3600);
        assert_eq!(policy.grant_count(), 0);
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_toml() {
        let result = parse_config("config_version = [");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn validation_errors_are_collected() {
        let config = r#"
            config_version = 1
            [cadence]
            short_feedback_seconds = 0
            persistent_feedback_seconds = 0
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "config_version = 1").unwrap();
        writeln!(file, "[budget]").unwrap();
        writeln!(file, "standard_max_budget_minutes = 30").unwrap();

        let policy = load_config(file.path()).unwrap();
        assert_eq!(policy.budget.standard_seconds, 1800);
    }

    #[test]
    fn missing_file_is_read_error() {
        let result = load_config("/nonexistent/playtimed/config.toml");
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
