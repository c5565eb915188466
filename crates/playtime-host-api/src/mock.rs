//! Test doubles for the presentation and live-gate boundaries

use async_trait::async_trait;
use playtime_api::{PersistentFeedback, ShortFeedback, TerminationReason};
use playtime_util::UserId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::{GateError, GateResult, LiveGate, Presenter};

/// One call made to a [`RecordingPresenter`]
#[derive(Debug, Clone, PartialEq)]
pub enum PresenterCall {
    ShortFeedback {
        identity: UserId,
        feedback: ShortFeedback,
    },
    PersistentFeedback {
        identity: UserId,
        indicator: PersistentFeedback,
    },
    RemovePersistentFeedback {
        identity: UserId,
    },
    Terminate {
        identity: UserId,
        reason: TerminationReason,
        message: String,
    },
}

/// Presenter that records every call for later assertions
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    calls: Mutex<Vec<PresenterCall>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: PresenterCall) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }

    /// Snapshot of all calls so far
    pub fn calls(&self) -> Vec<PresenterCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Forget recorded calls
    pub fn clear(&self) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    pub fn short_feedback(&self) -> Vec<ShortFeedback> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PresenterCall::ShortFeedback { feedback, .. } => Some(feedback),
                _ => None,
            })
            .collect()
    }

    pub fn persistent_feedback(&self) -> Vec<PersistentFeedback> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PresenterCall::PersistentFeedback { indicator, .. } => Some(indicator),
                _ => None,
            })
            .collect()
    }

    pub fn removals(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, PresenterCall::RemovePersistentFeedback { .. }))
            .count()
    }

    pub fn terminations(&self) -> Vec<TerminationReason> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PresenterCall::Terminate { reason, .. } => Some(reason),
                _ => None,
            })
            .collect()
    }
}

impl Presenter for RecordingPresenter {
    fn push_short_feedback(&self, identity: &UserId, feedback: &ShortFeedback) {
        self.record(PresenterCall::ShortFeedback {
            identity: identity.clone(),
            feedback: feedback.clone(),
        });
    }

    fn show_or_update_persistent_feedback(&self, identity: &UserId, indicator: &PersistentFeedback) {
        self.record(PresenterCall::PersistentFeedback {
            identity: identity.clone(),
            indicator: indicator.clone(),
        });
    }

    fn remove_persistent_feedback(&self, identity: &UserId) {
        self.record(PresenterCall::RemovePersistentFeedback {
            identity: identity.clone(),
        });
    }

    fn terminate_session(&self, identity: &UserId, reason: TerminationReason, message: &str) {
        self.record(PresenterCall::Terminate {
            identity: identity.clone(),
            reason,
            message: message.to_string(),
        });
    }
}

/// What a [`MockLiveGate`] answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockGateAnswer {
    Live,
    NotLive,
    Fail,
}

/// Live gate with a fixed answer that counts external lookups
#[derive(Debug)]
pub struct MockLiveGate {
    answer: Mutex<MockGateAnswer>,
    lookups: AtomicUsize,
}

impl MockLiveGate {
    pub fn new(answer: MockGateAnswer) -> Self {
        Self {
            answer: Mutex::new(answer),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn set_answer(&self, answer: MockGateAnswer) {
        *self
            .answer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = answer;
    }

    /// Number of checks that reached the "external" lookup
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveGate for MockLiveGate {
    async fn is_live_now(&self, external_handle: Option<&str>) -> GateResult<bool> {
        if external_handle.is_none() {
            return Ok(false);
        }
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let answer = *self
            .answer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match answer {
            MockGateAnswer::Live => Ok(true),
            MockGateAnswer::NotLive => Ok(false),
            MockGateAnswer::Fail => Err(GateError::Transport("mock failure".into())),
        }
    }
}
