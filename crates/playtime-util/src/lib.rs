//! Shared utilities for playtimed
//!
//! This crate provides:
//! - ID types (UserId, SessionId, IndicatorId, ClientId)
//! - Time utilities (monotonic time, calendar dates, mock time)
//! - Error types
//! - Rate limiting helpers
//! - Default paths for the socket, data directory and config file

mod error;
mod ids;
mod paths;
mod rate_limit;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
