//! Validated policy structures

use crate::schema::{
    RawBudgetConfig, RawCadenceConfig, RawConfig, RawLiveGateConfig, RawServiceConfig,
};
use crate::validation::parse_capability;
use playtime_api::Tier;
use playtime_util::UserId;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BUDGET_CHECK_SECONDS: u64 = 60;
pub const DEFAULT_FEEDBACK_SECONDS: u64 = 1;
pub const DEFAULT_GATE_TIMEOUT_SECONDS: u64 = 5;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 250;

/// Validated policy ready for use by the core engine
#[derive(Debug, Clone)]
pub struct Policy {
    pub service: ServiceConfig,
    pub budget: BudgetLimits,
    pub cadence: Cadence,
    pub live_gate: LiveGateConfig,
    grants: HashMap<UserId, Grant>,
    /// Non-fatal problems found while building the policy
    pub warnings: Vec<String>,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let mut warnings = Vec::new();
        let budget = BudgetLimits::from_raw(&raw.budget, &mut warnings);

        let mut grants: HashMap<UserId, Grant> = HashMap::new();
        for raw_grant in raw.grants {
            let grant = grants.entry(UserId::new(raw_grant.identity)).or_default();
            for cap in raw_grant.capabilities.iter().filter_map(|c| parse_capability(c)) {
                grant.insert(cap);
            }
        }

        for warning in &warnings {
            tracing::warn!(warning = %warning, "Configuration warning");
        }

        Self {
            service: ServiceConfig::from_raw(raw.service),
            budget,
            cadence: Cadence::from_raw(&raw.cadence),
            live_gate: LiveGateConfig::from_raw(raw.live_gate),
            grants,
            warnings,
        }
    }

    /// Whether `identity` holds `capability` in the grant table
    pub fn has_capability(&self, identity: &UserId, capability: Capability) -> bool {
        self.grants
            .get(identity)
            .is_some_and(|g| g.contains(capability))
    }

    /// Daily budget for a tier, in seconds
    pub fn max_budget_seconds(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Standard => self.budget.standard_seconds,
            Tier::Privileged => self.budget.privileged_seconds,
        }
    }

    pub fn grant_count(&self) -> usize {
        self.grants.len()
    }
}

/// Capability that can be granted to an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Member of the privileged tier
    Privileged,
    /// Never enforced
    Bypass,
}

/// Capabilities granted to one identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Grant {
    pub privileged: bool,
    pub bypass: bool,
}

impl Grant {
    fn insert(&mut self, capability: Capability) {
        match capability {
            Capability::Privileged => self.privileged = true,
            Capability::Bypass => self.bypass = true,
        }
    }

    pub fn contains(&self, capability: Capability) -> bool {
        match capability {
            Capability::Privileged => self.privileged,
            Capability::Bypass => self.bypass,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub tick_interval: Duration,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw
                .socket_path
                .unwrap_or_else(playtime_util::socket_path_without_env),
            data_dir: raw
                .data_dir
                .unwrap_or_else(playtime_util::data_dir_without_env),
            tick_interval: Duration::from_millis(
                raw.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS),
            ),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// Daily budgets, already converted to seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetLimits {
    pub standard_seconds: u64,
    pub privileged_seconds: u64,
}

impl BudgetLimits {
    fn from_raw(raw: &RawBudgetConfig, warnings: &mut Vec<String>) -> Self {
        Self {
            standard_seconds: budget_minutes(
                "standard_max_budget_minutes",
                raw.standard_max_budget_minutes.as_ref(),
                warnings,
            ) * 60,
            privileged_seconds: budget_minutes(
                "privileged_max_budget_minutes",
                raw.privileged_max_budget_minutes.as_ref(),
                warnings,
            ) * 60,
        }
    }
}

/// Interpret a budget entry. Anything but a non-negative integer is a zero
/// budget plus a warning.
fn budget_minutes(name: &str, value: Option<&toml::Value>, warnings: &mut Vec<String>) -> u64 {
    match value {
        Some(toml::Value::Integer(n)) if *n >= 0 => *n as u64,
        Some(toml::Value::Integer(n)) => {
            warnings.push(format!("budget.{name} is negative ({n}); using 0"));
            0
        }
        Some(other) => {
            warnings.push(format!(
                "budget.{name} is not a whole number ({other}); using 0"
            ));
            0
        }
        None => {
            warnings.push(format!("budget.{name} is not set; using 0"));
            0
        }
    }
}

/// Timer cadences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub budget_check: Duration,
    pub short_feedback: Duration,
    pub persistent_feedback: Duration,
}

impl Cadence {
    fn from_raw(raw: &RawCadenceConfig) -> Self {
        let secs = |v: Option<u64>, default| Duration::from_secs(v.unwrap_or(default));
        Self {
            budget_check: secs(raw.budget_check_seconds, DEFAULT_BUDGET_CHECK_SECONDS),
            short_feedback: secs(raw.short_feedback_seconds, DEFAULT_FEEDBACK_SECONDS),
            persistent_feedback: secs(raw.persistent_feedback_seconds, DEFAULT_FEEDBACK_SECONDS),
        }
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self::from_raw(&RawCadenceConfig::default())
    }
}

/// Live-presence gate configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveGateConfig {
    /// `None` means no gate is configured and every check fails closed
    pub check_url: Option<String>,
    pub timeout: Duration,
}

impl LiveGateConfig {
    fn from_raw(raw: RawLiveGateConfig) -> Self {
        Self {
            check_url: raw.check_url,
            timeout: Duration::from_secs(
                raw.timeout_seconds.unwrap_or(DEFAULT_GATE_TIMEOUT_SECONDS),
            ),
        }
    }

    /// The check URL for `handle`, if a gate is configured
    pub fn url_for(&self, handle: &str) -> Option<String> {
        self.check_url
            .as_ref()
            .map(|template| template.replace(crate::HANDLE_PLACEHOLDER, handle))
    }
}

impl Default for LiveGateConfig {
    fn default() -> Self {
        Self::from_raw(RawLiveGateConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_config;

    #[test]
    fn budgets_are_converted_to_seconds() {
        let policy = parse_config(
            r#"
            config_version = 1
            [budget]
            standard_max_budget_minutes = 60
            privileged_max_budget_minutes = 120
        "#,
        )
        .unwrap();

        assert_eq!(policy.max_budget_seconds(Tier::Standard), 3600);
        assert_eq!(policy.max_budget_seconds(Tier::Privileged), 7200);
        assert!(policy.warnings.is_empty());
    }

    #[test]
    fn bad_budget_values_fall_back_to_zero_with_warning() {
        let policy = parse_config(
            r#"
            config_version = 1
            [budget]
            standard_max_budget_minutes = "lots"
            privileged_max_budget_minutes = -5
        "#,
        )
        .unwrap();

        assert_eq!(policy.max_budget_seconds(Tier::Standard), 0);
        assert_eq!(policy.max_budget_seconds(Tier::Privileged), 0);
        assert_eq!(policy.warnings.len(), 2);
    }

    #[test]
    fn missing_budget_is_zero() {
        let policy = parse_config("config_version = 1").unwrap();
        assert_eq!(policy.budget.standard_seconds, 0);
        assert_eq!(policy.warnings.len(), 2);
    }

    #[test]
    fn cadence_defaults() {
        let policy = parse_config("config_version = 1").unwrap();
        assert_eq!(policy.cadence.budget_check, Duration::from_secs(60));
        assert_eq!(policy.cadence.short_feedback, Duration::from_secs(1));
        assert_eq!(policy.cadence.persistent_feedback, Duration::from_secs(1));
        assert_eq!(policy.service.tick_interval, Duration::from_millis(250));
        assert_eq!(policy.live_gate.timeout, Duration::from_secs(5));
    }

    #[test]
    fn grants_are_looked_up_by_identity() {
        let policy = parse_config(
            r#"
            config_version = 1
            [[grants]]
            identity = "streamer"
            capabilities = ["privileged"]

            [[grants]]
            identity = "op"
            capabilities = ["privileged", "bypass"]
        "#,
        )
        .unwrap();

        let streamer = UserId::new("streamer");
        let op = UserId::new("op");
        let nobody = UserId::new("nobody");

        assert!(policy.has_capability(&streamer, Capability::Privileged));
        assert!(!policy.has_capability(&streamer, Capability::Bypass));
        assert!(policy.has_capability(&op, Capability::Bypass));
        assert!(!policy.has_capability(&nobody, Capability::Privileged));
        assert_eq!(policy.grant_count(), 2);
    }

    #[test]
    fn live_gate_url_substitutes_handle() {
        let policy = parse_config(
            r#"
            config_version = 1
            [live_gate]
            check_url = "https://live.example.com/api/{handle}/status"
        "#,
        )
        .unwrap();

        assert_eq!(
            policy.live_gate.url_for("some_streamer").as_deref(),
            Some("https://live.example.com/api/some_streamer/status")
        );
        assert_eq!(LiveGateConfig::default().url_for("x"), None);
    }
}
