//! playtimectl - talk to a running playtimed
//!
//! Budget overrides and reload need the admin role: run as root or as the
//! user playtimed runs as.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use playtime_api::{
    Command, EventPayload, RemainingBudget, Response, ResponsePayload, ResponseResult,
};
use playtime_ipc::{IpcClient, IpcError};
use playtime_util::{default_socket_path, format_duration, UserId, PLAYTIME_SOCKET_ENV};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "playtimectl", version, about = "Control the playtimed budget service")]
struct Cli {
    /// Socket path
    #[arg(short, long, env = PLAYTIME_SOCKET_ENV, default_value_os_t = default_socket_path())]
    socket: PathBuf,

    /// Print raw JSON responses
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show active sessions
    Status,
    /// Service health
    Health,
    /// Remaining budget for a user today
    Remaining { identity: String },
    /// Grant extra time for today
    Add {
        identity: String,
        /// Amount in minutes (or seconds with --seconds)
        amount: u64,
        #[arg(long)]
        seconds: bool,
    },
    /// Reset today's usage to zero
    Reset { identity: String },
    /// Link the handle used for the live check; omit it to unlink
    Link {
        identity: String,
        handle: Option<String>,
    },
    /// Reload the configuration file
    Reload,
    /// Stream events, optionally for one user
    Watch { identity: Option<String> },
    /// Check the service is reachable
    Ping,
}

impl Commands {
    /// The protocol command for a one-shot request. `None` for `watch`.
    fn to_command(&self) -> Option<Command> {
        let command = match self {
            Commands::Status => Command::GetState,
            Commands::Health => Command::GetHealth,
            Commands::Remaining { identity } => Command::QueryRemaining {
                identity: UserId::new(identity.as_str()),
            },
            Commands::Add {
                identity,
                amount,
                seconds,
            } => Command::AddBudget {
                identity: UserId::new(identity.as_str()),
                seconds: if *seconds {
                    *amount
                } else {
                    amount.saturating_mul(60)
                },
            },
            Commands::Reset { identity } => Command::ResetBudget {
                identity: UserId::new(identity.as_str()),
            },
            Commands::Link { identity, handle } => Command::LinkExternalHandle {
                identity: UserId::new(identity.as_str()),
                handle: handle.clone(),
            },
            Commands::Reload => Command::ReloadConfig,
            Commands::Ping => Command::Ping,
            Commands::Watch { .. } => return None,
        };
        Some(command)
    }
}

fn describe_remaining(r: &RemainingBudget) -> String {
    let remaining = match r.remaining_seconds {
        Some(secs) => format_duration(Duration::from_secs(secs)),
        None => "unlimited".to_string(),
    };
    format!(
        "{} ({}): {} remaining, {}s used of {}s",
        r.identity,
        r.tier.as_str(),
        remaining,
        r.used_seconds,
        r.max_budget_seconds
    )
}

fn describe(payload: &ResponsePayload) -> String {
    match payload {
        ResponsePayload::State(state) => {
            if state.active_sessions.is_empty() {
                return format!("{}: no active sessions", state.today);
            }
            let mut lines = vec![format!(
                "{}: {} active session(s)",
                state.today,
                state.active_sessions.len()
            )];
            for s in &state.active_sessions {
                lines.push(format!(
                    "  {} [{}{}] since {} ({}s charged)",
                    s.identity,
                    s.tier.as_str(),
                    if s.bypass_exempt { ", bypass" } else { "" },
                    s.started_at.format("%H:%M:%S"),
                    s.accounted_seconds
                ));
            }
            lines.join("\n")
        }
        ResponsePayload::Health(h) => format!(
            "ready: {}, store: {}, live gate configured: {}",
            h.ready, h.store_ok, h.live_gate_configured
        ),
        ResponsePayload::Remaining(r) | ResponsePayload::BudgetAdjusted(r) => {
            describe_remaining(r)
        }
        ResponsePayload::ExternalHandleLinked { identity, handle } => match handle {
            Some(h) => format!("{identity} linked to {h}"),
            None => format!("{identity} unlinked"),
        },
        ResponsePayload::ConfigReloaded => "Configuration reloaded".to_string(),
        ResponsePayload::Pong => "pong".to_string(),
        other => format!("{other:?}"),
    }
}

fn describe_event(payload: &EventPayload) -> String {
    match payload {
        EventPayload::ShortFeedback { identity, feedback } => {
            format!("{identity}: {}", feedback.text)
        }
        EventPayload::PersistentFeedback {
            identity,
            indicator,
        } => format!(
            "{identity}: [{:?} {:.0}%] {}",
            indicator.band,
            indicator.progress * 100.0,
            indicator.text
        ),
        EventPayload::PersistentFeedbackRemoved { identity } => {
            format!("{identity}: indicator removed")
        }
        EventPayload::TerminateSession {
            identity, message, ..
        } => format!("{identity}: terminated: {message}"),
        EventPayload::SessionStarted { identity, .. } => format!("{identity}: session started"),
        EventPayload::SessionSettled {
            identity,
            settled_seconds,
            ..
        } => format!("{identity}: session settled (+{settled_seconds}s)"),
        EventPayload::StateChanged(state) => {
            format!("state: {} active", state.active_sessions.len())
        }
        EventPayload::PolicyReloaded => "policy reloaded".to_string(),
        EventPayload::Shutdown => "service shutting down".to_string(),
    }
}

fn print_response(response: &Response, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
    }
    match &response.result {
        ResponseResult::Ok(payload) => {
            if !json {
                println!("{}", describe(payload));
            }
            Ok(())
        }
        ResponseResult::Err(e) => {
            let err = IpcError::from(e.clone());
            if err.is_permission_denied() {
                bail!("{err}; run as root or as the user playtimed runs as");
            }
            Err(err.into())
        }
    }
}

async fn watch(cli: &Cli, identity: Option<&str>) -> Result<()> {
    let client = IpcClient::connect(&cli.socket)
        .await
        .with_context(|| format!("Failed to connect to {}", cli.socket.display()))?;
    let mut events = client.subscribe().await?;

    loop {
        let event = events.next().await?;
        if let Some(filter) = identity
            && event.payload.identity().is_some_and(|id| id.as_str() != filter)
        {
            continue;
        }

        if cli.json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!(
                "{} {}",
                event.timestamp.format("%H:%M:%S"),
                describe_event(&event.payload)
            );
        }

        if matches!(event.payload, EventPayload::Shutdown) {
            return Ok(());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command.to_command() else {
        let identity = match &cli.command {
            Commands::Watch { identity } => identity.as_deref(),
            _ => None,
        };
        return watch(&cli, identity).await;
    };

    let mut client = IpcClient::connect(&cli.socket)
        .await
        .with_context(|| format!("Failed to connect to {}", cli.socket.display()))?;
    let response = client.send(command).await?;
    print_response(&response, cli.json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use playtime_api::Tier;

    #[test]
    fn add_defaults_to_minutes() {
        let cli = Cli::parse_from(["playtimectl", "add", "alex", "15"]);
        match cli.command.to_command() {
            Some(Command::AddBudget { identity, seconds }) => {
                assert_eq!(identity.as_str(), "alex");
                assert_eq!(seconds, 900);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::parse_from(["playtimectl", "add", "alex", "45", "--seconds"]);
        assert!(matches!(
            cli.command.to_command(),
            Some(Command::AddBudget { seconds: 45, .. })
        ));
    }

    #[test]
    fn link_without_handle_unlinks() {
        let cli = Cli::parse_from(["playtimectl", "link", "streamer"]);
        assert!(matches!(
            cli.command.to_command(),
            Some(Command::LinkExternalHandle { handle: None, .. })
        ));
    }

    #[test]
    fn refusal_explains_the_admin_role() {
        use playtime_api::{ErrorCode, ErrorInfo};

        let refused = Response::error(
            1,
            ErrorInfo::new(ErrorCode::PermissionDenied, "Admin role required"),
        );
        let err = print_response(&refused, false).unwrap_err().to_string();
        assert!(err.contains("Admin role required"), "{err}");
        assert!(err.contains("run as root"), "{err}");

        let missing = Response::error(2, ErrorInfo::new(ErrorCode::UserNotFound, "ghost"));
        let err = print_response(&missing, false).unwrap_err().to_string();
        assert!(!err.contains("run as root"), "{err}");
    }

    #[test]
    fn watch_is_not_a_request() {
        let cli = Cli::parse_from(["playtimectl", "watch", "alex"]);
        assert!(cli.command.to_command().is_none());
    }

    #[test]
    fn remaining_is_human_readable() {
        let r = RemainingBudget {
            identity: UserId::new("alex"),
            tier: Tier::Standard,
            bypass_exempt: false,
            used_seconds: 180,
            max_budget_seconds: 3600,
            remaining_seconds: Some(3420),
            last_reset_date: None,
        };
        assert_eq!(
            describe_remaining(&r),
            "alex (standard): 57m 0s remaining, 180s used of 3600s"
        );

        let unlimited = RemainingBudget {
            bypass_exempt: true,
            remaining_seconds: None,
            ..r
        };
        assert!(describe_remaining(&unlimited).contains("unlimited"));
    }
}
