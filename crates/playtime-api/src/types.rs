//! Shared types for the playtimed API

use chrono::{DateTime, Local, NaiveDate};
use playtime_util::{IndicatorId, SessionId, UserId};
use serde::{Deserialize, Serialize};

/// Permission tier. Resolution order is fixed: `Privileged` is checked first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Standard,
    Privileged,
}

impl Tier {
    /// All tiers in resolution priority order
    pub const PRIORITY: [Tier; 2] = [Tier::Privileged, Tier::Standard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Standard => "standard",
            Tier::Privileged => "privileged",
        }
    }
}

/// Coarse color band of the persistent indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Low,
    Mid,
    High,
}

/// Kinds of per-user periodic timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    BudgetCheck,
    ShortFeedback,
    PersistentFeedback,
}

/// User-toggleable feedback channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackChannel {
    /// Transient notification (e.g. an action bar line)
    Short,
    /// Progress indicator that stays on screen (e.g. a boss bar)
    Persistent,
}

impl FeedbackChannel {
    pub fn timer_kind(&self) -> TimerKind {
        match self {
            FeedbackChannel::Short => TimerKind::ShortFeedback,
            FeedbackChannel::Persistent => TimerKind::PersistentFeedback,
        }
    }
}

/// Per-user feedback preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackPreferences {
    pub short_feedback_enabled: bool,
    pub persistent_feedback_enabled: bool,
}

impl Default for FeedbackPreferences {
    fn default() -> Self {
        Self {
            short_feedback_enabled: true,
            persistent_feedback_enabled: true,
        }
    }
}

impl FeedbackPreferences {
    pub fn is_enabled(&self, channel: FeedbackChannel) -> bool {
        match channel {
            FeedbackChannel::Short => self.short_feedback_enabled,
            FeedbackChannel::Persistent => self.persistent_feedback_enabled,
        }
    }

    pub fn set(&mut self, channel: FeedbackChannel, enabled: bool) {
        match channel {
            FeedbackChannel::Short => self.short_feedback_enabled = enabled,
            FeedbackChannel::Persistent => self.persistent_feedback_enabled = enabled,
        }
    }
}

/// Value pushed on every short-feedback tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortFeedback {
    /// Seconds left today. `None` means unlimited (bypass-exempt).
    pub remaining_seconds: Option<u64>,
    pub text: String,
}

/// Persistent progress indicator state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentFeedback {
    pub indicator_id: IndicatorId,
    pub text: String,
    /// Fraction of the budget left, in `[0, 1]`
    pub progress: f64,
    pub band: Band,
    /// Set when nothing is left and the session is about to be cut off
    pub critical: bool,
}

/// Why the engine asked the host to end a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    BudgetExhausted,
    MustBeLive,
}

/// Information about one active session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub identity: UserId,
    pub tier: Tier,
    pub bypass_exempt: bool,
    pub started_at: DateTime<Local>,
    pub max_budget_seconds: u64,
    /// Seconds already written to the store during this session
    pub accounted_seconds: u64,
    pub armed_timers: Vec<TimerKind>,
    pub persistent_indicator: Option<IndicatorId>,
}

/// Remaining budget for one identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemainingBudget {
    pub identity: UserId,
    pub tier: Tier,
    pub bypass_exempt: bool,
    /// May be negative after an allowance grant
    pub used_seconds: i64,
    pub max_budget_seconds: u64,
    /// `None` means unlimited
    pub remaining_seconds: Option<u64>,
    pub last_reset_date: Option<NaiveDate>,
}

/// Full service state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStateSnapshot {
    pub api_version: u32,
    pub policy_loaded: bool,
    pub today: NaiveDate,
    pub active_sessions: Vec<SessionInfo>,
}

/// Role for authorization, ordered from least to most trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Peer whose credentials could not be read - health, state and events only
    Observer,
    /// Host application - reports sessions and preference toggles
    Host,
    /// Local admin - can also query and adjust budgets and reload config
    Admin,
}

impl ClientRole {
    /// Whether this role may run a command that needs `required`
    pub fn allows(&self, required: ClientRole) -> bool {
        *self >= required
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub policy_loaded: bool,
    pub store_ok: bool,
    pub live_gate_configured: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_priority_checks_privileged_first() {
        assert_eq!(Tier::PRIORITY[0], Tier::Privileged);
        assert_eq!(Tier::PRIORITY.len(), 2);
    }

    #[test]
    fn preferences_default_to_enabled() {
        let prefs = FeedbackPreferences::default();
        assert!(prefs.is_enabled(FeedbackChannel::Short));
        assert!(prefs.is_enabled(FeedbackChannel::Persistent));
    }

    #[test]
    fn preferences_toggle_single_channel() {
        let mut prefs = FeedbackPreferences::default();
        prefs.set(FeedbackChannel::Persistent, false);
        assert!(prefs.short_feedback_enabled);
        assert!(!prefs.persistent_feedback_enabled);
    }

    #[test]
    fn channel_maps_to_timer_kind() {
        assert_eq!(FeedbackChannel::Short.timer_kind(), TimerKind::ShortFeedback);
        assert_eq!(
            FeedbackChannel::Persistent.timer_kind(),
            TimerKind::PersistentFeedback
        );
    }

    #[test]
    fn termination_reason_wire_format() {
        let json = serde_json::to_string(&TerminationReason::MustBeLive).unwrap();
        assert_eq!(json, "\"must_be_live\"");
    }

    #[test]
    fn roles_are_ordered() {
        assert!(ClientRole::Admin.allows(ClientRole::Admin));
        assert!(ClientRole::Admin.allows(ClientRole::Host));
        assert!(!ClientRole::Host.allows(ClientRole::Admin));
        assert!(ClientRole::Host.allows(ClientRole::Observer));
        assert!(!ClientRole::Observer.allows(ClientRole::Host));
    }
}
