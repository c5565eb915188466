//! Presentation and live-gate traits

use async_trait::async_trait;
use playtime_api::{PersistentFeedback, ShortFeedback, TerminationReason};
use playtime_util::UserId;
use thiserror::Error;

/// Errors from a live-presence check
#[derive(Debug, Error)]
pub enum GateError {
    #[error("No live gate configured")]
    NotConfigured,

    #[error("Live check timed out")]
    Timeout,

    #[error("Live check request failed: {0}")]
    Transport(String),

    #[error("Live check returned status {0}")]
    Status(u16),

    #[error("Malformed live check response: {0}")]
    Decode(String),
}

pub type GateResult<T> = Result<T, GateError>;

/// Outbound calls from the engine to whatever shows feedback to users.
///
/// Calls are fire-and-forget; an implementation must not block.
pub trait Presenter: Send + Sync {
    /// Show a transient remaining-budget notification
    fn push_short_feedback(&self, identity: &UserId, feedback: &ShortFeedback);

    /// Create the persistent indicator, or update it if `indicator_id` is
    /// already on screen
    fn show_or_update_persistent_feedback(&self, identity: &UserId, indicator: &PersistentFeedback);

    fn remove_persistent_feedback(&self, identity: &UserId);

    /// Ask the host to end the user's session
    fn terminate_session(&self, identity: &UserId, reason: TerminationReason, message: &str);
}

/// "Is this identity broadcasting right now?"
#[async_trait]
pub trait LiveGate: Send + Sync {
    /// An absent handle is never live and must not trigger any external call
    async fn is_live_now(&self, external_handle: Option<&str>) -> GateResult<bool>;

    fn is_configured(&self) -> bool {
        true
    }
}

/// Outcome of the gate as seen by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    /// The gate did not apply to this identity
    NotChecked,
    Live,
    /// Not live, or the check failed
    NotLive,
}

impl GateVerdict {
    /// Collapse a gate result; errors count as not live
    pub fn from_result(result: &GateResult<bool>) -> Self {
        match result {
            Ok(true) => GateVerdict::Live,
            Ok(false) | Err(_) => GateVerdict::NotLive,
        }
    }
}
