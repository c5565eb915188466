//! Per-user periodic timers
//!
//! The scheduler never runs anything itself. The service loop polls
//! [`SessionScheduler::due`] and dispatches each returned fire, so all timer
//! callbacks run one at a time on that loop.

use playtime_api::TimerKind;
use playtime_util::{MonotonicInstant, UserId};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::trace;

/// Identifies one arming of a timer. Re-arming a kind yields a new handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone)]
struct ArmedTimer {
    handle: TimerHandle,
    cadence: Duration,
    next_due: MonotonicInstant,
}

/// Timers of one user, at most one per kind
#[derive(Debug, Default)]
pub struct SessionTimerSet {
    timers: BTreeMap<TimerKind, ArmedTimer>,
}

impl SessionTimerSet {
    pub fn kinds(&self) -> Vec<TimerKind> {
        self.timers.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

/// A timer whose deadline has passed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFire {
    pub identity: UserId,
    pub kind: TimerKind,
    pub handle: TimerHandle,
}

/// Owner of every user's timer set
#[derive(Debug, Default)]
pub struct SessionScheduler {
    next_handle: u64,
    users: HashMap<UserId, SessionTimerSet>,
}

impl SessionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` for `identity`, replacing any timer of that kind.
    ///
    /// The first fire is due `initial_delay` after `now`, then every `cadence`.
    pub fn arm(
        &mut self,
        identity: &UserId,
        kind: TimerKind,
        cadence: Duration,
        initial_delay: Duration,
        now: MonotonicInstant,
    ) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);

        let set = self.users.entry(identity.clone()).or_default();
        let replaced = set.timers.insert(
            kind,
            ArmedTimer {
                handle,
                cadence,
                next_due: now + initial_delay,
            },
        );

        trace!(
            identity = %identity,
            ?kind,
            cadence_ms = cadence.as_millis() as u64,
            replaced = replaced.is_some(),
            "Timer armed"
        );
        handle
    }

    /// Cancel one timer. Returns whether anything was armed.
    pub fn cancel(&mut self, identity: &UserId, kind: TimerKind) -> bool {
        let Some(set) = self.users.get_mut(identity) else {
            return false;
        };
        let removed = set.timers.remove(&kind).is_some();
        if set.is_empty() {
            self.users.remove(identity);
        }
        if removed {
            trace!(identity = %identity, ?kind, "Timer cancelled");
        }
        removed
    }

    /// Cancel every timer of `identity`. Returns how many were armed.
    pub fn cancel_all(&mut self, identity: &UserId) -> usize {
        self.users
            .remove(identity)
            .map(|set| set.timers.len())
            .unwrap_or(0)
    }

    pub fn is_armed(&self, identity: &UserId, kind: TimerKind) -> bool {
        self.users
            .get(identity)
            .is_some_and(|set| set.timers.contains_key(&kind))
    }

    pub fn armed_kinds(&self, identity: &UserId) -> Vec<TimerKind> {
        self.users
            .get(identity)
            .map(SessionTimerSet::kinds)
            .unwrap_or_default()
    }

    /// Number of armed timers across all users
    pub fn armed_count(&self) -> usize {
        self.users.values().map(|set| set.timers.len()).sum()
    }

    /// Whether `fire` still refers to the live arming of its timer
    pub fn is_current(&self, fire: &TimerFire) -> bool {
        self.users
            .get(&fire.identity)
            .and_then(|set| set.timers.get(&fire.kind))
            .is_some_and(|timer| timer.handle == fire.handle)
    }

    /// Collect timers due at `now`, advancing each by one cadence.
    ///
    /// Each timer fires at most once per call; a timer that fell several
    /// cadences behind catches up one fire per call.
    pub fn due(&mut self, now: MonotonicInstant) -> Vec<TimerFire> {
        let mut fires = Vec::new();

        for (identity, set) in &mut self.users {
            for (kind, timer) in &mut set.timers {
                if timer.next_due <= now {
                    timer.next_due = timer.next_due + timer.cadence;
                    fires.push(TimerFire {
                        identity: identity.clone(),
                        kind: *kind,
                        handle: timer.handle,
                    });
                }
            }
        }

        fires.sort_by(|a, b| (&a.identity, a.kind).cmp(&(&b.identity, b.kind)));
        fires
    }
}
