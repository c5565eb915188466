//! Configuration validation

use crate::schema::{RawConfig, RawGrant};
use std::collections::HashSet;
use thiserror::Error;

/// Placeholder substituted with the external handle in `live_gate.check_url`
pub const HANDLE_PLACEHOLDER: &str = "{handle}";

/// Recognized capability names in `[[grants]]`
pub const KNOWN_CAPABILITIES: [&str; 2] = ["privileged", "bypass"];

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Grant for '{identity}': {message}")]
    GrantError { identity: String, message: String },

    #[error("Duplicate grant for identity: {0}")]
    DuplicateGrant(String),

    #[error("Cadence '{name}' must be greater than zero")]
    ZeroCadence { name: &'static str },

    #[error("Live gate: {0}")]
    LiveGateError(String),

    #[error("Service config error: {0}")]
    ServiceError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for grant in &config.grants {
        if !seen.insert(grant.identity.as_str()) {
            errors.push(ValidationError::DuplicateGrant(grant.identity.clone()));
        }
        errors.extend(validate_grant(grant));
    }

    let cadence = &config.cadence;
    for (name, value) in [
        ("budget_check_seconds", cadence.budget_check_seconds),
        ("short_feedback_seconds", cadence.short_feedback_seconds),
        ("persistent_feedback_seconds", cadence.persistent_feedback_seconds),
    ] {
        if value == Some(0) {
            errors.push(ValidationError::ZeroCadence { name });
        }
    }

    if let Some(url) = &config.live_gate.check_url {
        errors.extend(validate_check_url(url));
    }
    if config.live_gate.timeout_seconds == Some(0) {
        errors.push(ValidationError::LiveGateError(
            "timeout_seconds must be greater than zero".into(),
        ));
    }

    if config.service.tick_interval_ms == Some(0) {
        errors.push(ValidationError::ServiceError(
            "tick_interval_ms must be greater than zero".into(),
        ));
    }

    errors
}

fn validate_grant(grant: &RawGrant) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if grant.identity.trim().is_empty() {
        errors.push(ValidationError::GrantError {
            identity: grant.identity.clone(),
            message: "identity cannot be empty".into(),
        });
    }

    for cap in &grant.capabilities {
        if parse_capability(cap).is_none() {
            errors.push(ValidationError::GrantError {
                identity: grant.identity.clone(),
                message: format!(
                    "unknown capability '{}' (expected one of {:?})",
                    cap, KNOWN_CAPABILITIES
                ),
            });
        }
    }

    errors
}

fn validate_check_url(url: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(ValidationError::LiveGateError(format!(
            "check_url must be an http(s) URL, got '{}'",
            url
        )));
    }
    if !url.contains(HANDLE_PLACEHOLDER) {
        errors.push(ValidationError::LiveGateError(format!(
            "check_url must contain the {} placeholder",
            HANDLE_PLACEHOLDER
        )));
    }

    errors
}

/// Parse a capability name (case-insensitive)
pub fn parse_capability(s: &str) -> Option<crate::Capability> {
    match s.trim().to_lowercase().as_str() {
        "privileged" => Some(crate::Capability::Privileged),
        "bypass" => Some(crate::Capability::Bypass),
        _ => None,
    }
}
