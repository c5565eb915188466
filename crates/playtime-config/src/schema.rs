//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    #[serde(default)]
    pub service: RawServiceConfig,

    #[serde(default)]
    pub budget: RawBudgetConfig,

    #[serde(default)]
    pub cadence: RawCadenceConfig,

    #[serde(default)]
    pub live_gate: RawLiveGateConfig,

    /// Capability grants per identity
    #[serde(default)]
    pub grants: Vec<RawGrant>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Data directory for the budget database
    pub data_dir: Option<PathBuf>,

    /// How often the scheduler is polled, in milliseconds
    pub tick_interval_ms: Option<u64>,
}

/// Daily budgets per tier, in minutes.
///
/// Kept as raw TOML values so a non-numeric entry degrades to a zero budget
/// with a warning instead of failing the whole file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawBudgetConfig {
    pub standard_max_budget_minutes: Option<toml::Value>,
    pub privileged_max_budget_minutes: Option<toml::Value>,
}

/// Timer cadences, in seconds
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawCadenceConfig {
    pub budget_check_seconds: Option<u64>,
    pub short_feedback_seconds: Option<u64>,
    pub persistent_feedback_seconds: Option<u64>,
}

/// Live-presence gate settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawLiveGateConfig {
    /// URL template; `{handle}` is replaced by the linked external handle
    pub check_url: Option<String>,

    pub timeout_seconds: Option<u64>,
}

/// Capabilities granted to one identity
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawGrant {
    pub identity: String,

    /// "privileged" and/or "bypass"
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            config_version = 1

            [service]
            socket_path = "/run/playtimed/playtimed.sock"
            tick_interval_ms = 500

            [budget]
            standard_max_budget_minutes = 60
            privileged_max_budget_minutes = 180

            [cadence]
            budget_check_seconds = 60

            [live_gate]
            check_url = "https://live.example.com/status/{handle}"
            timeout_seconds = 3

            [[grants]]
            identity = "069a79f4-44e9-4726-a5be-fca90e38aaf5"
            capabilities = ["privileged"]

            [[grants]]
            identity = "admin"
            capabilities = ["bypass"]
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.service.tick_interval_ms, Some(500));
        assert_eq!(
            config.budget.standard_max_budget_minutes,
            Some(toml::Value::Integer(60))
        );
        assert_eq!(config.cadence.budget_check_seconds, Some(60));
        assert_eq!(config.cadence.short_feedback_seconds, None);
        assert_eq!(config.grants.len(), 2);
        assert_eq!(config.grants[1].capabilities, vec!["bypass".to_string()]);
    }

    #[test]
    fn non_numeric_budget_still_parses() {
        let toml_str = r#"
            config_version = 1

            [budget]
            standard_max_budget_minutes = "sixty"
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert!(matches!(
            config.budget.standard_max_budget_minutes,
            Some(toml::Value::String(_))
        ));
    }
}
