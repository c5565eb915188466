//! Protocol types for playtimed IPC
//!
//! This crate defines the stable API between playtimed and its clients
//! (host applications and the admin CLI):
//! - Commands (requests from clients)
//! - Responses
//! - Events (service -> clients)
//! - Shared budget and feedback types
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
