//! Service wiring and the main event loop

use anyhow::{Context as _, Result};
use playtime_api::{Command, ErrorCode, ErrorInfo, Response, API_VERSION};
use playtime_config::load_config;
use playtime_ipc::{IpcServer, ServerMessage};
use playtime_live::HttpLiveGate;
use playtime_store::{AuditEventType, BudgetLedger, SqliteStore};
use playtime_util::{database_path, RateLimiter};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::handler::{authorize, refusal, Context};
use crate::Args;

/// Requests per second allowed per client
const RATE_LIMIT_PER_SECOND: u32 = 30;

/// Main service state
pub struct Service {
    ctx: Arc<Context>,
    ipc: Arc<IpcServer>,
    rate_limiter: RateLimiter,
    tick_interval: Duration,
}

impl Service {
    pub async fn new(args: &Args) -> Result<Self> {
        let policy = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            grant_count = policy.grant_count(),
            warnings = policy.warnings.len(),
            "Configuration loaded"
        );

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| policy.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| policy.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = database_path(&data_dir);
        let store = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );
        let ledger = BudgetLedger::new(store);

        info!(db_path = %db_path.display(), "Store initialized");
        ledger.audit(AuditEventType::ServiceStarted);

        let gate = HttpLiveGate::new(policy.live_gate.clone())
            .context("Failed to create live gate client")?;
        if policy.live_gate.check_url.is_none() {
            warn!("No live gate URL configured; privileged users cannot start sessions");
        }

        let tick_interval = policy.service.tick_interval;

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        let ctx = Context::new(
            policy,
            ledger,
            Arc::new(gate),
            ipc.event_sender(),
            args.config.clone(),
        );

        Ok(Self {
            ctx: Arc::new(ctx),
            ipc: Arc::new(ipc),
            rate_limiter: RateLimiter::new(RATE_LIMIT_PER_SECOND, Duration::from_secs(1)),
            tick_interval,
        })
    }

    pub async fn run(self) -> Result<()> {
        let ipc = self.ipc.clone();
        let ctx = self.ctx.clone();
        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;
        let rate_limiter = Arc::new(Mutex::new(self.rate_limiter));

        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        let mut tick_timer = tokio::time::interval(self.tick_interval);

        info!(
            socket = %ipc.socket_path().display(),
            tick_ms = self.tick_interval.as_millis() as u64,
            "Service running"
        );

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                _ = tick_timer.tick() => {
                    ctx.tick().await;
                }

                Some(msg) = ipc_messages.recv() => {
                    Self::handle_ipc_message(&ctx, &ipc, &rate_limiter, msg).await;
                }
            }
        }

        info!("Shutting down playtimed");

        let settled = ctx.shutdown().await;
        info!(settled, "Active sessions settled");

        ctx.ledger().audit(AuditEventType::ServiceStopped);

        // Let writers flush the shutdown event
        tokio::time::sleep(Duration::from_millis(50)).await;
        ipc.shutdown();

        info!("Shutdown complete");
        Ok(())
    }

    async fn handle_ipc_message(
        ctx: &Arc<Context>,
        ipc: &Arc<IpcServer>,
        rate_limiter: &Arc<Mutex<RateLimiter>>,
        msg: ServerMessage,
    ) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                let request_id = request.request_id;

                {
                    let mut limiter = rate_limiter.lock().await;
                    if !limiter.check(&client_id) {
                        let response = Response::error(
                            request_id,
                            ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                        );
                        let _ = ipc.send_response(&client_id, response).await;
                        return;
                    }
                }

                if request.api_version != API_VERSION {
                    let response = Response::error(
                        request_id,
                        ErrorInfo::new(
                            ErrorCode::InvalidRequest,
                            format!(
                                "Unsupported API version {} (expected {API_VERSION})",
                                request.api_version
                            ),
                        ),
                    );
                    let _ = ipc.send_response(&client_id, response).await;
                    return;
                }

                let Some(info) = ipc.get_client_info(&client_id).await else {
                    debug!(client_id = %client_id, "Request from a client that already left");
                    return;
                };

                if let Err(e) = authorize(&client_id, info.role, &request.command) {
                    let _ = ipc.send_response(&client_id, refusal(request_id, &e)).await;
                    return;
                }

                match request.command {
                    // The live gate may take a while; don't stall the loop on it
                    Command::BeginSession { identity } => {
                        let ticket = ctx.starts().begin(&identity);
                        let ctx = ctx.clone();
                        let ipc = ipc.clone();
                        tokio::spawn(async move {
                            let response = ctx.begin_session(request_id, identity, ticket).await;
                            let _ = ipc.send_response(&client_id, response).await;
                        });
                    }
                    command => {
                        let response = ctx
                            .handle_command(&client_id, info.role, request_id, command)
                            .await;
                        let _ = ipc.send_response(&client_id, response).await;
                    }
                }
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(
                    client_id = %client_id,
                    role = ?info.role,
                    uid = ?info.uid,
                    "Client connected"
                );

                ctx.ledger().audit(AuditEventType::ClientConnected {
                    client_id: client_id.to_string(),
                    role: format!("{:?}", info.role),
                    uid: info.uid,
                });
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(
                    client_id = %client_id,
                    remaining = ipc.client_count().await,
                    "Client disconnected"
                );

                ctx.ledger().audit(AuditEventType::ClientDisconnected {
                    client_id: client_id.to_string(),
                });

                rate_limiter.lock().await.remove(&client_id);
            }
        }
    }
}
