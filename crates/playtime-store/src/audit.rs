//! Audit event types

use chrono::{DateTime, Local};
use playtime_api::{TerminationReason, Tier};
use playtime_util::{SessionId, UserId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    ServiceStarted,

    ServiceStopped,

    /// Policy loaded at startup
    PolicyLoaded { grant_count: usize },

    /// Config reload requested
    ConfigReloaded { success: bool },

    SessionStarted {
        session_id: SessionId,
        identity: UserId,
        tier: Tier,
        bypass_exempt: bool,
    },

    SessionDenied {
        identity: UserId,
        reason: TerminationReason,
    },

    /// Session ended and its remaining elapsed time was written
    SessionSettled {
        session_id: SessionId,
        identity: UserId,
        settled_seconds: u64,
        used_seconds: i64,
    },

    BudgetExhausted {
        identity: UserId,
        used_seconds: i64,
        max_budget_seconds: u64,
    },

    /// Daily usage reset because the stored date was not today
    DayRollover { identity: UserId },

    // Administrative overrides
    BudgetAdded { identity: UserId, seconds: u64 },

    BudgetReset { identity: UserId },

    ExternalHandleLinked {
        identity: UserId,
        handle: Option<String>,
    },

    ClientConnected {
        client_id: String,
        role: String,
        uid: Option<u32>,
    },

    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Row id, assigned by the store
    pub id: i64,
    pub timestamp: DateTime<Local>,
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0,
            timestamp: playtime_util::now(),
            event,
        }
    }
}
