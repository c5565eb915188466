//! Core budget engine

use chrono::{DateTime, Local, NaiveDate};
use playtime_api::{
    FeedbackChannel, FeedbackPreferences, RemainingBudget, ServiceStateSnapshot,
    TerminationReason, TimerKind, API_VERSION,
};
use playtime_config::Policy;
use playtime_host_api::{GateVerdict, PersistentFeedbackHandle, Presenter};
use playtime_store::{AuditEventType, BudgetLedger, BudgetRecord};
use playtime_util::{MonotonicInstant, PlaytimeError, UserId};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    ActiveSession, CoreEvent, GateRequirement, ResolvedUser, SessionPlan, SessionScheduler,
    SettleResult, StartDecision, BUDGET_EXHAUSTED_TEXT, MUST_BE_LIVE_TEXT,
};

/// The budget engine.
///
/// Owns the active sessions, their timers and their persistent indicators.
/// Not thread-safe on its own; the service keeps it behind one lock.
pub struct BudgetEngine {
    policy: Policy,
    ledger: BudgetLedger,
    presenter: Arc<dyn Presenter>,
    scheduler: SessionScheduler,
    sessions: HashMap<UserId, ActiveSession>,
    indicators: HashMap<UserId, PersistentFeedbackHandle>,
    events: Vec<CoreEvent>,
}

impl BudgetEngine {
    pub fn new(policy: Policy, ledger: BudgetLedger, presenter: Arc<dyn Presenter>) -> Self {
        info!(
            grant_count = policy.grant_count(),
            standard_secs = policy.budget.standard_seconds,
            privileged_secs = policy.budget.privileged_seconds,
            "Budget engine initialized"
        );

        ledger.audit(AuditEventType::PolicyLoaded {
            grant_count: policy.grant_count(),
        });

        Self {
            policy,
            ledger,
            presenter,
            scheduler: SessionScheduler::new(),
            sessions: HashMap::new(),
            indicators: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn ledger(&self) -> &BudgetLedger {
        &self.ledger
    }

    pub fn resolve(&self, identity: &UserId) -> ResolvedUser {
        crate::resolve(&self.policy, identity)
    }

    /// Drain lifecycle events produced since the last call
    pub fn take_events(&mut self) -> Vec<CoreEvent> {
        std::mem::take(&mut self.events)
    }

    /// Reset usage if the stored day is not `today`.
    /// Returns true if an existing record rolled over.
    fn roll_over_if_new_day(&self, identity: &UserId, today: NaiveDate) -> bool {
        if !self.ledger.is_new_day(identity, today) {
            return false;
        }

        let existed = self.ledger.has_record(identity);
        self.ledger.reset_today(identity, today);
        if existed {
            info!(identity = %identity, %today, "Daily budget rolled over");
            self.ledger.audit(AuditEventType::DayRollover {
                identity: identity.clone(),
            });
        }
        existed
    }

    /// First phase of session start: roll the day over and work out whether
    /// the live gate applies
    pub fn request_session(&self, identity: &UserId, today: NaiveDate) -> SessionPlan {
        self.roll_over_if_new_day(identity, today);

        let user = self.resolve(identity);
        let gate = if user.requires_live_gate() {
            GateRequirement::Required {
                external_handle: self.ledger.external_handle(identity),
            }
        } else {
            GateRequirement::NotRequired
        };

        debug!(
            identity = %identity,
            tier = user.tier.as_str(),
            bypass = user.bypass_exempt,
            gate_required = matches!(gate, GateRequirement::Required { .. }),
            "Session requested"
        );

        SessionPlan {
            identity: identity.clone(),
            user,
            gate,
        }
    }

    /// Second phase of session start, after the gate (if any) has answered
    pub fn start_session(
        &mut self,
        plan: SessionPlan,
        verdict: GateVerdict,
        now: DateTime<Local>,
        now_mono: MonotonicInstant,
        today: NaiveDate,
    ) -> StartDecision {
        let identity = plan.identity;

        if plan.gate != GateRequirement::NotRequired && verdict != GateVerdict::Live {
            info!(identity = %identity, ?verdict, "Session denied: not live");
            let reason = TerminationReason::MustBeLive;
            self.presenter
                .terminate_session(&identity, reason, MUST_BE_LIVE_TEXT);
            self.ledger.audit(AuditEventType::SessionDenied {
                identity: identity.clone(),
                reason,
            });
            self.events.push(CoreEvent::SessionDenied { identity, reason });
            return StartDecision::Denied { reason };
        }

        if self.sessions.contains_key(&identity) {
            warn!(identity = %identity, "Session already active; settling it first");
            self.end_session(&identity, now_mono, today);
        }

        let user = plan.user;
        let session = ActiveSession::new(identity.clone(), now, now_mono);
        let session_id = session.session_id.clone();
        let first_session = self.ledger.mark_joined(&identity);
        self.sessions.insert(identity.clone(), session);

        let preferences = self.ledger.preferences(&identity);
        self.arm_session_timers(&identity, &user, preferences, now_mono);

        info!(
            identity = %identity,
            session_id = %session_id,
            tier = user.tier.as_str(),
            bypass = user.bypass_exempt,
            max_budget_secs = user.max_budget_seconds,
            first_session,
            "Session started"
        );

        self.ledger.audit(AuditEventType::SessionStarted {
            session_id: session_id.clone(),
            identity: identity.clone(),
            tier: user.tier,
            bypass_exempt: user.bypass_exempt,
        });
        self.events.push(CoreEvent::SessionStarted {
            identity,
            session_id: session_id.clone(),
        });

        StartDecision::Started {
            session_id,
            user,
            first_session,
        }
    }

    fn feedback_cadence(&self, channel: FeedbackChannel) -> Duration {
        match channel {
            FeedbackChannel::Short => self.policy.cadence.short_feedback,
            FeedbackChannel::Persistent => self.policy.cadence.persistent_feedback,
        }
    }

    fn arm_budget_check(&mut self, identity: &UserId, now: MonotonicInstant) {
        let cadence = self.policy.cadence.budget_check;
        self.scheduler
            .arm(identity, TimerKind::BudgetCheck, cadence, cadence, now);
    }

    fn arm_feedback(&mut self, identity: &UserId, channel: FeedbackChannel, now: MonotonicInstant) {
        let cadence = self.feedback_cadence(channel);
        self.scheduler
            .arm(identity, channel.timer_kind(), cadence, Duration::ZERO, now);
    }

    fn arm_session_timers(
        &mut self,
        identity: &UserId,
        user: &ResolvedUser,
        preferences: FeedbackPreferences,
        now: MonotonicInstant,
    ) {
        if !user.bypass_exempt {
            self.arm_budget_check(identity, now);
        }
        for channel in [FeedbackChannel::Short, FeedbackChannel::Persistent] {
            if preferences.is_enabled(channel) {
                self.arm_feedback(identity, channel, now);
            }
        }
    }

    /// Dispatch every timer due at `now`. Returns how many fires ran.
    pub fn tick(&mut self, now: MonotonicInstant, today: NaiveDate) -> usize {
        let mut dispatched = 0;

        for fire in self.scheduler.due(now) {
            // Cancelled or replaced by an earlier fire in this batch
            if !self.scheduler.is_current(&fire) {
                continue;
            }

            if !self.sessions.contains_key(&fire.identity) {
                debug!(identity = %fire.identity, kind = ?fire.kind, "Timer fired without a session");
                self.scheduler.cancel_all(&fire.identity);
                continue;
            }

            match fire.kind {
                TimerKind::BudgetCheck => self.enforce_budget(&fire.identity, today),
                TimerKind::ShortFeedback => self.push_short_feedback(&fire.identity, today),
                TimerKind::PersistentFeedback => {
                    self.push_persistent_feedback(&fire.identity, today)
                }
            }
            dispatched += 1;
        }

        dispatched
    }

    fn enforce_budget(&mut self, identity: &UserId, today: NaiveDate) {
        let user = self.resolve(identity);
        if user.bypass_exempt {
            self.scheduler.cancel(identity, TimerKind::BudgetCheck);
            return;
        }

        if self.roll_over_if_new_day(identity, today) {
            self.events.push(CoreEvent::DayRollover {
                identity: identity.clone(),
            });
        }

        let used = self.ledger.used_seconds(identity);
        let max = i64::try_from(user.max_budget_seconds).unwrap_or(i64::MAX);

        if used >= max {
            info!(identity = %identity, used_secs = used, max_secs = max, "Budget exhausted");
            self.presenter.terminate_session(
                identity,
                TerminationReason::BudgetExhausted,
                BUDGET_EXHAUSTED_TEXT,
            );
            self.ledger.audit(AuditEventType::BudgetExhausted {
                identity: identity.clone(),
                used_seconds: used,
                max_budget_seconds: user.max_budget_seconds,
            });
            self.events.push(CoreEvent::BudgetExhausted {
                identity: identity.clone(),
                used_seconds: used,
                max_budget_seconds: user.max_budget_seconds,
            });
            return;
        }

        let cadence = self.policy.cadence.budget_check;
        let increment = i64::try_from(cadence.as_secs()).unwrap_or(i64::MAX);
        let new_used = used.saturating_add(increment);
        self.ledger.set_used_seconds(identity, new_used, today);
        if let Some(session) = self.sessions.get_mut(identity) {
            session.advance_accounted(cadence);
        }

        debug!(identity = %identity, used_secs = new_used, max_secs = max, "Budget charged");
    }

    /// Usage that counts against `today`. Feedback ticks read this rather than
    /// rolling over, so only enforcement and settlement write the new day.
    fn used_today(&self, identity: &UserId, today: NaiveDate) -> i64 {
        self.ledger
            .record(identity)
            .map_or(0, |record| used_on(&record, today))
    }

    fn push_short_feedback(&self, identity: &UserId, today: NaiveDate) {
        let user = self.resolve(identity);
        let used = self.used_today(identity, today);
        let feedback = crate::short_feedback(&user, used);
        self.presenter.push_short_feedback(identity, &feedback);
    }

    fn push_persistent_feedback(&mut self, identity: &UserId, today: NaiveDate) {
        let user = self.resolve(identity);
        let used = self.used_today(identity, today);
        let value = crate::persistent_value(&user, used);

        let handle = match self.indicators.entry(identity.clone()) {
            Entry::Occupied(entry) => {
                let handle = entry.into_mut();
                handle.update(value.text, value.progress, value.band, value.critical);
                handle
            }
            Entry::Vacant(entry) => {
                debug!(identity = %identity, "Creating persistent indicator");
                entry.insert(PersistentFeedbackHandle::new(
                    value.text,
                    value.progress,
                    value.band,
                    value.critical,
                ))
            }
        };

        let feedback = handle.to_feedback();
        self.presenter
            .show_or_update_persistent_feedback(identity, &feedback);
    }

    fn discard_indicator(&mut self, identity: &UserId) {
        if self.indicators.remove(identity).is_some() {
            self.presenter.remove_persistent_feedback(identity);
        }
    }

    /// End the session and write the elapsed time not yet charged by ticks
    pub fn end_session(
        &mut self,
        identity: &UserId,
        now: MonotonicInstant,
        today: NaiveDate,
    ) -> Option<SettleResult> {
        let session = self.sessions.remove(identity)?;

        // Time played before midnight is charged to the new day
        if self.roll_over_if_new_day(identity, today) {
            self.events.push(CoreEvent::DayRollover {
                identity: identity.clone(),
            });
        }

        let settled_seconds = session.unaccounted_seconds(now);
        let used_seconds = self
            .ledger
            .used_seconds(identity)
            .saturating_add(i64::try_from(settled_seconds).unwrap_or(i64::MAX));
        self.ledger.set_used_seconds(identity, used_seconds, today);

        let cancelled = self.scheduler.cancel_all(identity);
        self.discard_indicator(identity);

        let duration = session.duration_so_far(now);
        info!(
            identity = %identity,
            session_id = %session.session_id,
            settled_secs = settled_seconds,
            used_secs = used_seconds,
            duration_secs = duration.as_secs(),
            cancelled_timers = cancelled,
            "Session settled"
        );

        self.ledger.audit(AuditEventType::SessionSettled {
            session_id: session.session_id.clone(),
            identity: identity.clone(),
            settled_seconds,
            used_seconds,
        });
        self.events.push(CoreEvent::SessionSettled {
            identity: identity.clone(),
            session_id: session.session_id.clone(),
            settled_seconds,
        });

        Some(SettleResult {
            session_id: session.session_id,
            identity: identity.clone(),
            settled_seconds,
            used_seconds,
            duration,
        })
    }

    pub fn preferences(&self, identity: &UserId) -> FeedbackPreferences {
        self.ledger.preferences(identity)
    }

    /// Persist a channel toggle and apply it to the running session, if any
    pub fn set_preference(
        &mut self,
        identity: &UserId,
        channel: FeedbackChannel,
        enabled: bool,
        now: MonotonicInstant,
    ) -> FeedbackPreferences {
        let mut preferences = self.ledger.preferences(identity);
        preferences.set(channel, enabled);
        self.ledger.set_preferences(identity, preferences);

        debug!(identity = %identity, ?channel, enabled, "Feedback preference changed");

        if self.sessions.contains_key(identity) {
            let kind = channel.timer_kind();
            if enabled {
                if !self.scheduler.is_armed(identity, kind) {
                    self.arm_feedback(identity, channel, now);
                }
            } else {
                self.scheduler.cancel(identity, kind);
                if channel == FeedbackChannel::Persistent {
                    self.discard_indicator(identity);
                }
            }
        }

        preferences
    }

    fn remaining_budget(
        &self,
        identity: &UserId,
        used_seconds: i64,
        last_reset_date: Option<NaiveDate>,
    ) -> RemainingBudget {
        let user = self.resolve(identity);
        RemainingBudget {
            identity: identity.clone(),
            tier: user.tier,
            bypass_exempt: user.bypass_exempt,
            used_seconds,
            max_budget_seconds: user.max_budget_seconds,
            remaining_seconds: crate::short_feedback(&user, used_seconds).remaining_seconds,
            last_reset_date,
        }
    }

    /// Read-only view of today's budget
    pub fn query_remaining(
        &self,
        identity: &UserId,
        today: NaiveDate,
    ) -> Result<RemainingBudget, PlaytimeError> {
        let record = self
            .ledger
            .record(identity)
            .ok_or_else(|| PlaytimeError::UserNotFound(identity.clone()))?;

        let used = used_on(&record, today);
        Ok(self.remaining_budget(identity, used, record.reset_date()))
    }

    /// Grant extra allowance for today. Usage may go negative.
    pub fn add_budget(
        &mut self,
        identity: &UserId,
        seconds: u64,
        today: NaiveDate,
    ) -> Result<RemainingBudget, PlaytimeError> {
        if !self.ledger.has_record(identity) {
            return Err(PlaytimeError::UserNotFound(identity.clone()));
        }
        let delta = i64::try_from(seconds)
            .map_err(|_| PlaytimeError::invalid(format!("{seconds} seconds is out of range")))?;

        self.roll_over_if_new_day(identity, today);
        let used = self.ledger.used_seconds(identity).saturating_sub(delta);
        self.ledger.set_used_seconds(identity, used, today);

        info!(identity = %identity, added_secs = seconds, used_secs = used, "Budget added");
        self.ledger.audit(AuditEventType::BudgetAdded {
            identity: identity.clone(),
            seconds,
        });

        Ok(self.remaining_budget(identity, used, Some(today)))
    }

    /// Zero today's usage
    pub fn reset_budget(
        &mut self,
        identity: &UserId,
        today: NaiveDate,
    ) -> Result<RemainingBudget, PlaytimeError> {
        if !self.ledger.has_record(identity) {
            return Err(PlaytimeError::UserNotFound(identity.clone()));
        }

        self.ledger.reset_today(identity, today);
        info!(identity = %identity, "Budget reset");
        self.ledger.audit(AuditEventType::BudgetReset {
            identity: identity.clone(),
        });

        Ok(self.remaining_budget(identity, 0, Some(today)))
    }

    /// Link (or with `None`, unlink) the handle the live gate checks
    pub fn link_external_handle(
        &mut self,
        identity: &UserId,
        handle: Option<String>,
    ) -> Result<(), PlaytimeError> {
        let handle = match handle {
            Some(h) if h.trim().is_empty() => {
                return Err(PlaytimeError::invalid("external handle must not be empty"));
            }
            Some(h) => Some(h.trim().to_string()),
            None => None,
        };

        self.ledger.set_external_handle(identity, handle.as_deref());
        info!(identity = %identity, handle = ?handle, "External handle linked");
        self.ledger.audit(AuditEventType::ExternalHandleLinked {
            identity: identity.clone(),
            handle,
        });
        Ok(())
    }

    /// Swap in a new policy. Active sessions pick up new grants and cadences
    /// immediately.
    pub fn reload_policy(&mut self, policy: Policy, now: MonotonicInstant) {
        let grant_count = policy.grant_count();
        let cadence_changed = policy.cadence != self.policy.cadence;
        self.policy = policy;

        let identities: Vec<UserId> = self.sessions.keys().cloned().collect();
        for identity in identities {
            let user = self.resolve(&identity);

            if cadence_changed {
                self.scheduler.cancel_all(&identity);
                let preferences = self.ledger.preferences(&identity);
                self.arm_session_timers(&identity, &user, preferences, now);
                continue;
            }

            let armed = self.scheduler.is_armed(&identity, TimerKind::BudgetCheck);
            if user.bypass_exempt && armed {
                info!(identity = %identity, "Now bypass-exempt; enforcement stopped");
                self.scheduler.cancel(&identity, TimerKind::BudgetCheck);
            } else if !user.bypass_exempt && !armed {
                info!(identity = %identity, "No longer bypass-exempt; enforcement started");
                self.arm_budget_check(&identity, now);
            }
        }

        info!(grant_count, cadence_changed, "Policy reloaded");
        self.ledger
            .audit(AuditEventType::PolicyLoaded { grant_count });
        self.events.push(CoreEvent::PolicyReloaded { grant_count });
    }

    pub fn is_active(&self, identity: &UserId) -> bool {
        self.sessions.contains_key(identity)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn armed_kinds(&self, identity: &UserId) -> Vec<TimerKind> {
        self.scheduler.armed_kinds(identity)
    }

    pub fn armed_timer_count(&self) -> usize {
        self.scheduler.armed_count()
    }

    pub fn indicator(&self, identity: &UserId) -> Option<&PersistentFeedbackHandle> {
        self.indicators.get(identity)
    }

    pub fn get_state(&self, today: NaiveDate) -> ServiceStateSnapshot {
        let mut active_sessions: Vec<_> = self
            .sessions
            .values()
            .map(|session| {
                let user = self.resolve(&session.identity);
                session.to_session_info(
                    &user,
                    self.scheduler.armed_kinds(&session.identity),
                    self.indicators
                        .get(&session.identity)
                        .map(|h| h.indicator_id().clone()),
                )
            })
            .collect();
        active_sessions.sort_by(|a, b| a.identity.cmp(&b.identity));

        ServiceStateSnapshot {
            api_version: API_VERSION,
            policy_loaded: true,
            today,
            active_sessions,
        }
    }

    /// Settle every active session
    pub fn shutdown(&mut self, now: MonotonicInstant, today: NaiveDate) -> Vec<SettleResult> {
        let mut identities: Vec<UserId> = self.sessions.keys().cloned().collect();
        identities.sort();

        let settled: Vec<_> = identities
            .iter()
            .filter_map(|identity| self.end_session(identity, now, today))
            .collect();

        info!(settled = settled.len(), "Engine shut down");
        settled
    }
}

/// Usage from an earlier day no longer counts
fn used_on(record: &BudgetRecord, today: NaiveDate) -> i64 {
    if record.reset_date() == Some(today) {
        record.used_seconds
    } else {
        0
    }
}
