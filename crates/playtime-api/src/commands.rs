//! Command types for the playtimed protocol

use playtime_util::{ClientId, SessionId, UserId};
use serde::{Deserialize, Serialize};

use crate::{
    ClientRole, FeedbackChannel, FeedbackPreferences, HealthStatus, RemainingBudget,
    ServiceStateSnapshot, TerminationReason, Tier, API_VERSION,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    pub api_version: u32,
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    pub api_version: u32,
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    UserNotFound,
    NoActiveSession,
    PermissionDenied,
    RateLimited,
    ConfigError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// A user's session started in the host
    BeginSession { identity: UserId },

    /// A user's session ended in the host (disconnect, quit)
    EndSession { identity: UserId },

    /// Toggle one feedback channel for a user
    SetFeedbackPreference {
        identity: UserId,
        channel: FeedbackChannel,
        enabled: bool,
    },

    GetFeedbackPreferences { identity: UserId },

    // Admin commands
    /// Remaining budget for a user, without side effects (admin only)
    QueryRemaining { identity: UserId },

    /// Grant extra allowance for today (admin only)
    AddBudget { identity: UserId, seconds: u64 },

    /// Reset today's usage to zero (admin only)
    ResetBudget { identity: UserId },

    /// Link or unlink the handle used for the live-presence check (admin only)
    LinkExternalHandle {
        identity: UserId,
        handle: Option<String>,
    },

    /// Reload configuration (admin only)
    ReloadConfig,

    GetState,
    GetHealth,

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,
    UnsubscribeEvents,

    /// Ping for keepalive
    Ping,
}

impl Command {
    /// Least trusted role allowed to run this command
    pub fn required_role(&self) -> ClientRole {
        match self {
            Command::QueryRemaining { .. }
            | Command::AddBudget { .. }
            | Command::ResetBudget { .. }
            | Command::LinkExternalHandle { .. }
            | Command::ReloadConfig => ClientRole::Admin,

            Command::BeginSession { .. }
            | Command::EndSession { .. }
            | Command::SetFeedbackPreference { .. }
            | Command::GetFeedbackPreferences { .. } => ClientRole::Host,

            Command::GetState
            | Command::GetHealth
            | Command::SubscribeEvents
            | Command::UnsubscribeEvents
            | Command::Ping => ClientRole::Observer,
        }
    }
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    SessionStarted {
        session_id: SessionId,
        identity: UserId,
        tier: Tier,
        bypass_exempt: bool,
        /// True the first time this identity ever starts a session
        first_session: bool,
    },
    SessionDenied {
        identity: UserId,
        reason: TerminationReason,
    },
    SessionEnded {
        identity: UserId,
        settled_seconds: u64,
    },
    FeedbackPreferences {
        identity: UserId,
        preferences: FeedbackPreferences,
    },
    Remaining(RemainingBudget),
    BudgetAdjusted(RemainingBudget),
    ExternalHandleLinked {
        identity: UserId,
        handle: Option<String>,
    },
    ConfigReloaded,
    State(ServiceStateSnapshot),
    Health(HealthStatus),
    Subscribed {
        client_id: ClientId,
    },
    Unsubscribed,
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: ClientRole,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new(role: ClientRole) -> Self {
        Self {
            client_id: ClientId::new(),
            role,
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_format_is_tagged() {
        let req = Request::new(
            7,
            Command::AddBudget {
                identity: UserId::new("steve"),
                seconds: 600,
            },
        );
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["request_id"], 7);
        assert_eq!(json["api_version"], API_VERSION);
        assert_eq!(json["command"]["type"], "add_budget");
        assert_eq!(json["command"]["identity"], "steve");
    }

    #[test]
    fn negative_add_budget_is_rejected_at_decode() {
        let raw = r#"{"request_id":1,"api_version":1,"command":{"type":"add_budget","identity":"a","seconds":-5}}"#;
        assert!(serde_json::from_str::<Request>(raw).is_err());
    }

    #[test]
    fn error_response_carries_code() {
        let resp = Response::error(3, ErrorInfo::new(ErrorCode::UserNotFound, "nobody"));
        let json = serde_json::to_string(&resp).unwrap();
        let parsed: Response = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.request_id, 3);
        match parsed.result {
            ResponseResult::Err(e) => assert_eq!(e.code, ErrorCode::UserNotFound),
            ResponseResult::Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn commands_carry_their_required_role() {
        let alex = || UserId::new("a");
        assert_eq!(Command::ReloadConfig.required_role(), ClientRole::Admin);
        assert_eq!(
            Command::ResetBudget { identity: alex() }.required_role(),
            ClientRole::Admin
        );
        assert_eq!(
            Command::QueryRemaining { identity: alex() }.required_role(),
            ClientRole::Admin
        );
        assert_eq!(
            Command::BeginSession { identity: alex() }.required_role(),
            ClientRole::Host
        );
        assert_eq!(Command::GetHealth.required_role(), ClientRole::Observer);
    }
}
