//! Session lifecycle types

use chrono::{DateTime, Local};
use playtime_api::{SessionInfo, TimerKind};
use playtime_util::{IndicatorId, MonotonicInstant, SessionId, UserId};
use std::time::Duration;

use crate::ResolvedUser;

/// Whether session start has to pass the live-presence gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateRequirement {
    NotRequired,
    /// Check the gate with this handle (if any is linked)
    Required { external_handle: Option<String> },
}

/// First phase of session start: rollover done, gate requirement known.
///
/// The caller runs the gate (outside any engine lock) and hands the plan back
/// to [`crate::BudgetEngine::start_session`].
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub identity: UserId,
    pub user: ResolvedUser,
    pub gate: GateRequirement,
}

impl SessionPlan {
    pub fn requires_gate(&self) -> bool {
        matches!(self.gate, GateRequirement::Required { .. })
    }

    pub fn external_handle(&self) -> Option<&str> {
        match &self.gate {
            GateRequirement::Required { external_handle } => external_handle.as_deref(),
            GateRequirement::NotRequired => None,
        }
    }
}

/// An active session
#[derive(Debug)]
pub struct ActiveSession {
    pub session_id: SessionId,
    pub identity: UserId,

    /// Wall-clock start time (for display/logging)
    pub started_at: DateTime<Local>,

    /// Monotonic start time
    pub started_at_mono: MonotonicInstant,

    /// Elapsed time up to this instant is already in the store
    accounted_until: MonotonicInstant,
}

impl ActiveSession {
    pub fn new(identity: UserId, now: DateTime<Local>, now_mono: MonotonicInstant) -> Self {
        Self {
            session_id: SessionId::new(),
            identity,
            started_at: now,
            started_at_mono: now_mono,
            accounted_until: now_mono,
        }
    }

    /// Record that one enforcement tick wrote `cadence` worth of usage
    pub fn advance_accounted(&mut self, cadence: Duration) {
        self.accounted_until = self.accounted_until + cadence;
    }

    /// Whole seconds elapsed since the last accounted instant
    pub fn unaccounted_seconds(&self, now_mono: MonotonicInstant) -> u64 {
        now_mono.duration_since(self.accounted_until).as_secs()
    }

    /// Seconds already written by enforcement ticks
    pub fn accounted_seconds(&self) -> u64 {
        self.accounted_until
            .duration_since(self.started_at_mono)
            .as_secs()
    }

    pub fn duration_so_far(&self, now_mono: MonotonicInstant) -> Duration {
        now_mono.duration_since(self.started_at_mono)
    }

    pub fn to_session_info(
        &self,
        user: &ResolvedUser,
        armed_timers: Vec<TimerKind>,
        persistent_indicator: Option<IndicatorId>,
    ) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            identity: self.identity.clone(),
            tier: user.tier,
            bypass_exempt: user.bypass_exempt,
            started_at: self.started_at,
            max_budget_seconds: user.max_budget_seconds,
            accounted_seconds: self.accounted_seconds(),
            armed_timers,
            persistent_indicator,
        }
    }
}

/// Result of the second phase of session start
#[derive(Debug, Clone)]
pub enum StartDecision {
    Started {
        session_id: SessionId,
        user: ResolvedUser,
        first_session: bool,
    },
    Denied {
        reason: playtime_api::TerminationReason,
    },
}

/// Result of settling a session
#[derive(Debug, Clone)]
pub struct SettleResult {
    pub session_id: SessionId,
    pub identity: UserId,
    /// Seconds written at settlement (on top of what ticks already wrote)
    pub settled_seconds: u64,
    pub used_seconds: i64,
    pub duration: Duration,
}
