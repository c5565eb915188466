//! NDJSON over a Unix socket between playtimed, its hosts and playtimectl.
//!
//! The server reads each peer's uid with `SO_PEERCRED` and tags the
//! connection with a [`ClientRole`](playtime_api::ClientRole); the daemon
//! checks that role against every command. Subscribed clients also receive
//! the daemon's event stream on the same connection.

mod client;
mod server;

pub use client::*;
pub use server::*;

use playtime_api::{ErrorCode, ErrorInfo};
use thiserror::Error;

/// IPC errors
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Server error: {0}")]
    ServerError(String),

    /// The daemon answered with an error, e.g. the role was too weak
    #[error("Refused ({code:?}): {message}")]
    Refused { code: ErrorCode, message: String },
}

impl From<ErrorInfo> for IpcError {
    fn from(e: ErrorInfo) -> Self {
        IpcError::Refused {
            code: e.code,
            message: e.message,
        }
    }
}

impl IpcError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            IpcError::Refused {
                code: ErrorCode::PermissionDenied,
                ..
            }
        )
    }
}

pub type IpcResult<T> = Result<T, IpcError>;
