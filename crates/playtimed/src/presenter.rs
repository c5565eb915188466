//! Presenter that turns engine feedback into IPC events

use playtime_api::{Event, EventPayload, PersistentFeedback, ShortFeedback, TerminationReason};
use playtime_host_api::Presenter;
use playtime_util::UserId;
use tokio::sync::broadcast;
use tracing::trace;

/// Broadcasts every presentation call to subscribed hosts
pub struct IpcPresenter {
    events: broadcast::Sender<Event>,
}

impl IpcPresenter {
    pub fn new(events: broadcast::Sender<Event>) -> Self {
        Self { events }
    }

    fn emit(&self, payload: EventPayload) {
        // No subscribers is not an error
        if self.events.send(Event::new(payload)).is_err() {
            trace!("No event subscribers");
        }
    }
}

impl Presenter for IpcPresenter {
    fn push_short_feedback(&self, identity: &UserId, feedback: &ShortFeedback) {
        self.emit(EventPayload::ShortFeedback {
            identity: identity.clone(),
            feedback: feedback.clone(),
        });
    }

    fn show_or_update_persistent_feedback(&self, identity: &UserId, indicator: &PersistentFeedback) {
        self.emit(EventPayload::PersistentFeedback {
            identity: identity.clone(),
            indicator: indicator.clone(),
        });
    }

    fn remove_persistent_feedback(&self, identity: &UserId) {
        self.emit(EventPayload::PersistentFeedbackRemoved {
            identity: identity.clone(),
        });
    }

    fn terminate_session(&self, identity: &UserId, reason: TerminationReason, message: &str) {
        self.emit(EventPayload::TerminateSession {
            identity: identity.clone(),
            reason,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_become_events() {
        let (tx, mut rx) = broadcast::channel(8);
        let presenter = IpcPresenter::new(tx);
        let alex = UserId::new("alex");

        presenter.remove_persistent_feedback(&alex);
        presenter.terminate_session(&alex, TerminationReason::BudgetExhausted, "bye");

        let first = rx.try_recv().unwrap();
        assert!(matches!(
            first.payload,
            EventPayload::PersistentFeedbackRemoved { ref identity } if identity == &alex
        ));

        match rx.try_recv().unwrap().payload {
            EventPayload::TerminateSession { reason, message, .. } => {
                assert_eq!(reason, TerminationReason::BudgetExhausted);
                assert_eq!(message, "bye");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn no_subscribers_is_fine() {
        let (tx, rx) = broadcast::channel(8);
        drop(rx);
        IpcPresenter::new(tx).remove_persistent_feedback(&UserId::new("alex"));
    }
}
