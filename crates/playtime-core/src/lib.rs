//! Session time-budget engine for playtimed
//!
//! This crate is the heart of playtimed, containing:
//! - Tier and bypass resolution against the configured grants
//! - Remaining-budget and progress computation for the feedback channels
//! - A per-user timer table driven by the service tick
//! - Session lifecycle (Unstarted -> Active -> Settled) with day rollover
//!   and exactly-once settlement of elapsed time

mod engine;
mod events;
mod feedback;
mod policy;
mod scheduler;
mod session;

pub use engine::*;
pub use events::*;
pub use feedback::*;
pub use policy::*;
pub use scheduler::*;
pub use session::*;
