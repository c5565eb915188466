//! Boundary traits for the playtime engine
//!
//! This crate defines the interface between the budget engine and the outside
//! world: the presentation layer it pushes feedback to and the live-presence
//! gate it consults at session start. It contains no transport code itself.

mod handle;
mod mock;
mod traits;

pub use handle::*;
pub use mock::*;
pub use traits::*;
