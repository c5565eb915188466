//! Command handling shared by the IPC loop

use playtime_api::{
    ClientRole, Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus, Response,
    ResponsePayload,
};
use playtime_config::{load_config, Policy};
use playtime_core::{BudgetEngine, CoreEvent, StartDecision};
use playtime_host_api::{GateVerdict, LiveGate};
use playtime_live::HttpLiveGate;
use playtime_store::{AuditEventType, BudgetLedger};
use playtime_util::{ClientId, MonotonicInstant, PlaytimeError, UserId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::presenter::IpcPresenter;

/// Orders session starts against ends that arrive while the live gate is
/// still being consulted.
///
/// Every begin and every end bumps the identity's counter; a start only
/// goes through if nothing bumped it since its own begin.
#[derive(Default)]
pub struct StartTracker {
    counters: std::sync::Mutex<HashMap<UserId, u64>>,
}

impl StartTracker {
    fn bump(&self, identity: &UserId) -> u64 {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let counter = counters.entry(identity.clone()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Ticket for a new start
    pub fn begin(&self, identity: &UserId) -> u64 {
        self.bump(identity)
    }

    /// Invalidate any start still in flight
    pub fn end(&self, identity: &UserId) {
        self.bump(identity);
    }

    pub fn is_current(&self, identity: &UserId, ticket: u64) -> bool {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(identity)
            .is_some_and(|current| *current == ticket)
    }
}

/// Service state shared between the main loop and spawned session starts
pub struct Context {
    engine: Mutex<BudgetEngine>,
    gate: RwLock<Arc<dyn LiveGate>>,
    ledger: BudgetLedger,
    events: broadcast::Sender<Event>,
    config_path: PathBuf,
    starts: StartTracker,
}

/// Check the client's role against what the command needs
pub fn authorize(
    client_id: &ClientId,
    role: ClientRole,
    command: &Command,
) -> Result<(), PlaytimeError> {
    let required = command.required_role();
    if role.allows(required) {
        return Ok(());
    }

    warn!(client_id = %client_id, ?role, ?required, ?command, "Command refused");
    Err(PlaytimeError::permission(format!(
        "{required:?} role required"
    )))
}

/// Error response for a refused command
pub fn refusal(request_id: u64, e: &PlaytimeError) -> Response {
    Response::error(request_id, error_info(e))
}

fn error_info(e: &PlaytimeError) -> ErrorInfo {
    let code = match e {
        PlaytimeError::UserNotFound(_) => ErrorCode::UserNotFound,
        PlaytimeError::NoActiveSession(_) => ErrorCode::NoActiveSession,
        PlaytimeError::InvalidInput(_) => ErrorCode::InvalidRequest,
        PlaytimeError::PermissionDenied(_) => ErrorCode::PermissionDenied,
        PlaytimeError::ConfigError(_) => ErrorCode::ConfigError,
    };
    ErrorInfo::new(code, e.to_string())
}

fn respond<T>(
    request_id: u64,
    result: Result<T, PlaytimeError>,
    payload: impl FnOnce(T) -> ResponsePayload,
) -> Response {
    match result {
        Ok(value) => Response::success(request_id, payload(value)),
        Err(e) => Response::error(request_id, error_info(&e)),
    }
}

impl Context {
    pub fn new(
        policy: Policy,
        ledger: BudgetLedger,
        gate: Arc<dyn LiveGate>,
        events: broadcast::Sender<Event>,
        config_path: PathBuf,
    ) -> Self {
        let presenter = Arc::new(IpcPresenter::new(events.clone()));
        let engine = BudgetEngine::new(policy, ledger.clone(), presenter);

        Self {
            engine: Mutex::new(engine),
            gate: RwLock::new(gate),
            ledger,
            events,
            config_path,
            starts: StartTracker::default(),
        }
    }

    pub fn ledger(&self) -> &BudgetLedger {
        &self.ledger
    }

    pub fn starts(&self) -> &StartTracker {
        &self.starts
    }

    fn broadcast(&self, payload: EventPayload) {
        let _ = self.events.send(Event::new(payload));
    }

    /// Forward the engine's lifecycle events to subscribers
    fn publish(&self, engine: &mut BudgetEngine) {
        let mut state_changed = false;

        for event in engine.take_events() {
            match event {
                CoreEvent::SessionStarted {
                    identity,
                    session_id,
                } => {
                    state_changed = true;
                    self.broadcast(EventPayload::SessionStarted {
                        identity,
                        session_id,
                    });
                }
                CoreEvent::SessionSettled {
                    identity,
                    session_id,
                    settled_seconds,
                } => {
                    state_changed = true;
                    self.broadcast(EventPayload::SessionSettled {
                        identity,
                        session_id,
                        settled_seconds,
                    });
                }
                CoreEvent::PolicyReloaded { .. } => {
                    state_changed = true;
                    self.broadcast(EventPayload::PolicyReloaded);
                }
                // The presenter already told the host
                CoreEvent::SessionDenied { identity, reason } => {
                    debug!(identity = %identity, ?reason, "Session denied");
                }
                CoreEvent::BudgetExhausted { identity, .. } => {
                    debug!(identity = %identity, "Termination requested");
                }
                CoreEvent::DayRollover { identity } => {
                    debug!(identity = %identity, "Day rolled over mid-session");
                }
            }
        }

        if state_changed {
            let state = engine.get_state(playtime_util::today());
            self.broadcast(EventPayload::StateChanged(state));
        }
    }

    /// Run every due timer
    pub async fn tick(&self) {
        let mut engine = self.engine.lock().await;
        engine.tick(MonotonicInstant::now(), playtime_util::today());
        self.publish(&mut engine);
    }

    /// Settle every session before exit
    pub async fn shutdown(&self) -> usize {
        let mut engine = self.engine.lock().await;
        let settled = engine.shutdown(MonotonicInstant::now(), playtime_util::today());
        self.publish(&mut engine);
        self.broadcast(EventPayload::Shutdown);
        settled.len()
    }

    /// Start a session. The live gate (if it applies) runs without the
    /// engine lock held.
    pub async fn begin_session(&self, request_id: u64, identity: UserId, ticket: u64) -> Response {
        let plan = {
            let engine = self.engine.lock().await;
            engine.request_session(&identity, playtime_util::today())
        };

        let verdict = if plan.requires_gate() {
            let gate = self.gate.read().await.clone();
            let result = gate.is_live_now(plan.external_handle()).await;
            if let Err(e) = &result {
                warn!(identity = %identity, error = %e, "Live check failed; treating as not live");
            }
            GateVerdict::from_result(&result)
        } else {
            GateVerdict::NotChecked
        };

        let mut engine = self.engine.lock().await;
        if !self.starts.is_current(&identity, ticket) {
            info!(identity = %identity, "Session ended before it could start");
            return Response::error(
                request_id,
                error_info(&PlaytimeError::NoActiveSession(identity)),
            );
        }

        let decision = engine.start_session(
            plan,
            verdict,
            playtime_util::now(),
            MonotonicInstant::now(),
            playtime_util::today(),
        );
        self.publish(&mut engine);

        let payload = match decision {
            StartDecision::Started {
                session_id,
                user,
                first_session,
            } => ResponsePayload::SessionStarted {
                session_id,
                identity,
                tier: user.tier,
                bypass_exempt: user.bypass_exempt,
                first_session,
            },
            StartDecision::Denied { reason } => ResponsePayload::SessionDenied { identity, reason },
        };
        Response::success(request_id, payload)
    }

    /// Reload the config file. The previous policy stays on any error.
    async fn reload_config(&self) -> Result<usize, PlaytimeError> {
        let loaded = load_config(&self.config_path)
            .map_err(|e| PlaytimeError::config(e.to_string()))
            .and_then(|policy| {
                let gate = HttpLiveGate::new(policy.live_gate.clone())
                    .map_err(|e| PlaytimeError::config(e.to_string()))?;
                Ok((policy, gate))
            });

        let (policy, gate) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(path = %self.config_path.display(), error = %e, "Config reload failed");
                self.ledger
                    .audit(AuditEventType::ConfigReloaded { success: false });
                return Err(e);
            }
        };

        let grant_count = policy.grant_count();
        *self.gate.write().await = Arc::new(gate);

        let mut engine = self.engine.lock().await;
        engine.reload_policy(policy, MonotonicInstant::now());
        self.publish(&mut engine);

        self.ledger
            .audit(AuditEventType::ConfigReloaded { success: true });
        Ok(grant_count)
    }

    pub async fn handle_command(
        &self,
        client_id: &ClientId,
        role: ClientRole,
        request_id: u64,
        command: Command,
    ) -> Response {
        if let Err(e) = authorize(client_id, role, &command) {
            return refusal(request_id, &e);
        }

        let today = playtime_util::today();
        let now_mono = MonotonicInstant::now();

        match command {
            Command::BeginSession { identity } => {
                let ticket = self.starts.begin(&identity);
                self.begin_session(request_id, identity, ticket).await
            }

            Command::EndSession { identity } => {
                self.starts.end(&identity);
                let mut engine = self.engine.lock().await;
                let settled = engine.end_session(&identity, now_mono, today);
                self.publish(&mut engine);

                match settled {
                    Some(result) => Response::success(
                        request_id,
                        ResponsePayload::SessionEnded {
                            identity,
                            settled_seconds: result.settled_seconds,
                        },
                    ),
                    None => Response::error(
                        request_id,
                        error_info(&PlaytimeError::NoActiveSession(identity)),
                    ),
                }
            }

            Command::SetFeedbackPreference {
                identity,
                channel,
                enabled,
            } => {
                let preferences = self
                    .engine
                    .lock()
                    .await
                    .set_preference(&identity, channel, enabled, now_mono);
                Response::success(
                    request_id,
                    ResponsePayload::FeedbackPreferences {
                        identity,
                        preferences,
                    },
                )
            }

            Command::GetFeedbackPreferences { identity } => {
                let preferences = self.engine.lock().await.preferences(&identity);
                Response::success(
                    request_id,
                    ResponsePayload::FeedbackPreferences {
                        identity,
                        preferences,
                    },
                )
            }

            Command::QueryRemaining { identity } => {
                let result = self.engine.lock().await.query_remaining(&identity, today);
                respond(request_id, result, ResponsePayload::Remaining)
            }

            Command::AddBudget { identity, seconds } => {
                let result = self
                    .engine
                    .lock()
                    .await
                    .add_budget(&identity, seconds, today);
                respond(request_id, result, ResponsePayload::BudgetAdjusted)
            }

            Command::ResetBudget { identity } => {
                let result = self.engine.lock().await.reset_budget(&identity, today);
                respond(request_id, result, ResponsePayload::BudgetAdjusted)
            }

            Command::LinkExternalHandle { identity, handle } => {
                let result = self
                    .engine
                    .lock()
                    .await
                    .link_external_handle(&identity, handle.clone());
                respond(request_id, result, |()| {
                    ResponsePayload::ExternalHandleLinked { identity, handle }
                })
            }

            Command::ReloadConfig => {
                let result = self.reload_config().await;
                respond(request_id, result, |_| ResponsePayload::ConfigReloaded)
            }

            Command::GetState => {
                let state = self.engine.lock().await.get_state(today);
                Response::success(request_id, ResponsePayload::State(state))
            }

            Command::GetHealth => {
                let live_gate_configured = self.gate.read().await.is_configured();
                let store_ok = self.ledger.is_healthy();
                Response::success(
                    request_id,
                    ResponsePayload::Health(HealthStatus {
                        live: true,
                        ready: store_ok,
                        policy_loaded: true,
                        store_ok,
                        live_gate_configured,
                    }),
                )
            }

            Command::SubscribeEvents => {
                // Fresh subscribers start from a full snapshot
                let state = self.engine.lock().await.get_state(today);
                self.broadcast(EventPayload::StateChanged(state));
                Response::success(
                    request_id,
                    ResponsePayload::Subscribed {
                        client_id: client_id.clone(),
                    },
                )
            }

            Command::UnsubscribeEvents => {
                Response::success(request_id, ResponsePayload::Unsubscribed)
            }

            Command::Ping => Response::success(request_id, ResponsePayload::Pong),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playtime_api::{FeedbackChannel, ResponseResult, TerminationReason, Tier};
    use playtime_config::parse_config;
    use playtime_host_api::{MockGateAnswer, MockLiveGate};
    use playtime_store::SqliteStore;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
        config_version = 1

        [budget]
        standard_max_budget_minutes = 60
        privileged_max_budget_minutes = 180

        [[grants]]
        identity = "streamer"
        capabilities = ["privileged"]
    "#;

    struct Harness {
        ctx: Context,
        gate: Arc<MockLiveGate>,
        events: broadcast::Receiver<Event>,
        client: ClientId,
        dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, CONFIG).unwrap();

        let ledger = BudgetLedger::new(Arc::new(SqliteStore::in_memory().unwrap()));
        let gate = Arc::new(MockLiveGate::new(MockGateAnswer::NotLive));
        let (tx, events) = broadcast::channel(256);
        let ctx = Context::new(
            parse_config(CONFIG).unwrap(),
            ledger,
            gate.clone(),
            tx,
            config_path,
        );

        Harness {
            ctx,
            gate,
            events,
            client: ClientId::new(),
            dir,
        }
    }

    impl Harness {
        async fn admin(&self, command: Command) -> Response {
            self.ctx
                .handle_command(&self.client, ClientRole::Admin, 1, command)
                .await
        }

        async fn host(&self, command: Command) -> Response {
            self.ctx
                .handle_command(&self.client, ClientRole::Host, 1, command)
                .await
        }

        async fn observer(&self, command: Command) -> Response {
            self.ctx
                .handle_command(&self.client, ClientRole::Observer, 1, command)
                .await
        }

        fn drain(&mut self) -> Vec<EventPayload> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event.payload);
            }
            out
        }
    }

    fn ok(response: Response) -> ResponsePayload {
        match response.result {
            ResponseResult::Ok(payload) => payload,
            ResponseResult::Err(e) => panic!("unexpected error: {e:?}"),
        }
    }

    fn err(response: Response) -> ErrorCode {
        match response.result {
            ResponseResult::Err(e) => e.code,
            ResponseResult::Ok(payload) => panic!("unexpected success: {payload:?}"),
        }
    }

    fn begin(who: &str) -> Command {
        Command::BeginSession {
            identity: UserId::new(who),
        }
    }

    #[tokio::test]
    async fn standard_user_session_lifecycle() {
        let mut h = harness();

        match ok(h.host(begin("alex")).await) {
            ResponsePayload::SessionStarted {
                tier,
                bypass_exempt,
                first_session,
                ..
            } => {
                assert_eq!(tier, Tier::Standard);
                assert!(!bypass_exempt);
                assert!(first_session);
            }
            other => panic!("unexpected payload: {other:?}"),
        }

        let events = h.drain();
        assert!(events
            .iter()
            .any(|e| matches!(e, EventPayload::SessionStarted { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, EventPayload::StateChanged(s) if s.active_sessions.len() == 1)));

        assert!(matches!(
            ok(h.host(Command::EndSession {
                identity: UserId::new("alex")
            })
            .await),
            ResponsePayload::SessionEnded { .. }
        ));
        assert_eq!(
            err(h
                .host(Command::EndSession {
                    identity: UserId::new("alex")
                })
                .await),
            ErrorCode::NoActiveSession
        );
    }

    #[tokio::test]
    async fn host_cannot_run_admin_commands() {
        let h = harness();
        h.host(begin("alex")).await;

        let code = err(h
            .host(Command::AddBudget {
                identity: UserId::new("alex"),
                seconds: 600,
            })
            .await);
        assert_eq!(code, ErrorCode::PermissionDenied);
        assert_eq!(err(h.host(Command::ReloadConfig).await), ErrorCode::PermissionDenied);

        // Nothing changed
        assert_eq!(h.ctx.ledger().used_seconds(&UserId::new("alex")), 0);
    }

    #[tokio::test]
    async fn remaining_budget_needs_admin() {
        let h = harness();
        h.host(begin("alex")).await;

        let query = || Command::QueryRemaining {
            identity: UserId::new("alex"),
        };
        assert_eq!(err(h.host(query()).await), ErrorCode::PermissionDenied);
        assert!(matches!(
            ok(h.admin(query()).await),
            ResponsePayload::Remaining(_)
        ));
    }

    #[tokio::test]
    async fn observer_is_read_only() {
        let h = harness();

        assert_eq!(
            err(h.observer(begin("alex")).await),
            ErrorCode::PermissionDenied
        );
        assert_eq!(h.ctx.engine.lock().await.active_count(), 0);
        assert_eq!(
            err(h
                .observer(Command::SetFeedbackPreference {
                    identity: UserId::new("alex"),
                    channel: FeedbackChannel::Short,
                    enabled: false,
                })
                .await),
            ErrorCode::PermissionDenied
        );

        assert!(matches!(
            ok(h.observer(Command::GetState).await),
            ResponsePayload::State(_)
        ));
        assert!(matches!(
            ok(h.observer(Command::Ping).await),
            ResponsePayload::Pong
        ));
    }

    #[test]
    fn authorize_checks_every_command() {
        let client = ClientId::new();
        let start = begin("alex");
        assert!(authorize(&client, ClientRole::Host, &start).is_ok());
        assert!(matches!(
            authorize(&client, ClientRole::Observer, &start),
            Err(PlaytimeError::PermissionDenied(_))
        ));
        assert!(authorize(&client, ClientRole::Admin, &Command::ReloadConfig).is_ok());
    }

    #[tokio::test]
    async fn admin_overrides_unknown_identity() {
        let h = harness();
        let code = err(h
            .admin(Command::ResetBudget {
                identity: UserId::new("ghost"),
            })
            .await);
        assert_eq!(code, ErrorCode::UserNotFound);
    }

    #[tokio::test]
    async fn privileged_user_must_be_live() {
        let mut h = harness();

        // No handle linked: denied without any lookup
        assert!(matches!(
            ok(h.host(begin("streamer")).await),
            ResponsePayload::SessionDenied {
                reason: TerminationReason::MustBeLive,
                ..
            }
        ));
        assert_eq!(h.gate.lookups(), 0);
        assert!(h.drain().iter().any(|e| matches!(
            e,
            EventPayload::TerminateSession {
                reason: TerminationReason::MustBeLive,
                ..
            }
        )));

        ok(h
            .admin(Command::LinkExternalHandle {
                identity: UserId::new("streamer"),
                handle: Some("streamer_tv".into()),
            })
            .await);

        // Gate failure is not live
        h.gate.set_answer(MockGateAnswer::Fail);
        assert!(matches!(
            ok(h.host(begin("streamer")).await),
            ResponsePayload::SessionDenied { .. }
        ));

        h.gate.set_answer(MockGateAnswer::Live);
        match ok(h.host(begin("streamer")).await) {
            ResponsePayload::SessionStarted { tier, .. } => assert_eq!(tier, Tier::Privileged),
            other => panic!("unexpected payload: {other:?}"),
        }
        assert_eq!(h.gate.lookups(), 2);
    }

    #[tokio::test]
    async fn end_during_gate_check_cancels_start() {
        let h = harness();
        let alex = UserId::new("alex");

        let ticket = h.ctx.starts().begin(&alex);
        h.ctx.starts().end(&alex);

        let code = err(h.ctx.begin_session(1, alex.clone(), ticket).await);
        assert_eq!(code, ErrorCode::NoActiveSession);

        let state = ok(h.host(Command::GetState).await);
        assert!(matches!(state, ResponsePayload::State(s) if s.active_sessions.is_empty()));
    }

    #[tokio::test]
    async fn preference_toggle_is_persisted() {
        let h = harness();
        let alex = UserId::new("alex");

        let response = h
            .host(Command::SetFeedbackPreference {
                identity: alex.clone(),
                channel: FeedbackChannel::Short,
                enabled: false,
            })
            .await;
        assert!(matches!(
            ok(response),
            ResponsePayload::FeedbackPreferences { preferences, .. }
                if !preferences.short_feedback_enabled && preferences.persistent_feedback_enabled
        ));

        match ok(h
            .host(Command::GetFeedbackPreferences { identity: alex })
            .await)
        {
            ResponsePayload::FeedbackPreferences { preferences, .. } => {
                assert!(!preferences.short_feedback_enabled)
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn reload_keeps_old_policy_on_error() {
        let mut h = harness();
        let config_path = h.dir.path().join("config.toml");

        std::fs::write(&config_path, "config_version = 99").unwrap();
        assert_eq!(err(h.admin(Command::ReloadConfig).await), ErrorCode::ConfigError);

        // Still privileged under the old grants
        h.host(begin("streamer")).await;
        assert!(h.drain().iter().any(|e| matches!(
            e,
            EventPayload::TerminateSession { .. }
        )));

        // Grant removed: streamer becomes a standard user with no gate
        std::fs::write(
            &config_path,
            "config_version = 1\n[budget]\nstandard_max_budget_minutes = 30\n",
        )
        .unwrap();
        ok(h.admin(Command::ReloadConfig).await);
        assert!(h
            .drain()
            .iter()
            .any(|e| matches!(e, EventPayload::PolicyReloaded)));

        match ok(h.host(begin("streamer")).await) {
            ResponsePayload::SessionStarted { tier, .. } => assert_eq!(tier, Tier::Standard),
            other => panic!("unexpected payload: {other:?}"),
        }
        match ok(h
            .admin(Command::QueryRemaining {
                identity: UserId::new("streamer"),
            })
            .await)
        {
            ResponsePayload::Remaining(r) => assert_eq!(r.max_budget_seconds, 1800),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn health_reports_store_and_gate() {
        let h = harness();
        match ok(h.host(Command::GetHealth).await) {
            ResponsePayload::Health(health) => {
                assert!(health.live);
                assert!(health.store_ok);
                assert!(health.live_gate_configured);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_settles_and_announces() {
        let mut h = harness();
        h.host(begin("alex")).await;
        h.drain();

        assert_eq!(h.ctx.shutdown().await, 1);
        let events = h.drain();
        assert!(events
            .iter()
            .any(|e| matches!(e, EventPayload::SessionSettled { .. })));
        assert!(matches!(events.last(), Some(EventPayload::Shutdown)));
    }
}
