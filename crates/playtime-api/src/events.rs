//! Event types for playtimed -> client streaming

use chrono::{DateTime, Local};
use playtime_util::{SessionId, UserId};
use serde::{Deserialize, Serialize};

use crate::{PersistentFeedback, ServiceStateSnapshot, ShortFeedback, TerminationReason, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: playtime_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Full state snapshot (sent on subscribe)
    StateChanged(ServiceStateSnapshot),

    /// Show a transient remaining-budget notification
    ShortFeedback {
        identity: UserId,
        feedback: ShortFeedback,
    },

    /// Create or update the persistent indicator (keyed by `indicator_id`)
    PersistentFeedback {
        identity: UserId,
        indicator: PersistentFeedback,
    },

    /// Remove the persistent indicator
    PersistentFeedbackRemoved { identity: UserId },

    /// The host must end this user's session
    TerminateSession {
        identity: UserId,
        reason: TerminationReason,
        message: String,
    },

    SessionStarted {
        identity: UserId,
        session_id: SessionId,
    },

    SessionSettled {
        identity: UserId,
        session_id: SessionId,
        settled_seconds: u64,
    },

    PolicyReloaded,

    /// Service is shutting down
    Shutdown,
}

impl EventPayload {
    /// The identity this event concerns, if any
    pub fn identity(&self) -> Option<&UserId> {
        match self {
            EventPayload::ShortFeedback { identity, .. }
            | EventPayload::PersistentFeedback { identity, .. }
            | EventPayload::PersistentFeedbackRemoved { identity }
            | EventPayload::TerminateSession { identity, .. }
            | EventPayload::SessionStarted { identity, .. }
            | EventPayload::SessionSettled { identity, .. } => Some(identity),
            EventPayload::StateChanged(_)
            | EventPayload::PolicyReloaded
            | EventPayload::Shutdown => None,
        }
    }
}
