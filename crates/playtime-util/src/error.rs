//! Error types for playtimed

use thiserror::Error;

use crate::UserId;

/// Errors surfaced to clients by engine and service operations.
///
/// Store and live-gate failures never reach here: the ledger and the gate
/// verdict degrade them before they leave their crates.
#[derive(Debug, Error)]
pub enum PlaytimeError {
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("No active session for {0}")]
    NoActiveSession(UserId),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

impl PlaytimeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }
}
