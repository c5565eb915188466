//! Core events emitted by the engine

use playtime_api::TerminationReason;
use playtime_util::{SessionId, UserId};

/// Lifecycle events emitted by the engine.
///
/// Feedback goes straight to the presenter; these are for the service to
/// log, audit and broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    SessionStarted {
        identity: UserId,
        session_id: SessionId,
    },

    SessionDenied {
        identity: UserId,
        reason: TerminationReason,
    },

    SessionSettled {
        identity: UserId,
        session_id: SessionId,
        settled_seconds: u64,
    },

    /// Enforcement tick found the budget used up and asked for termination
    BudgetExhausted {
        identity: UserId,
        used_seconds: i64,
        max_budget_seconds: u64,
    },

    /// Usage was reset because the stored day was not today
    DayRollover { identity: UserId },

    PolicyReloaded { grant_count: usize },
}
