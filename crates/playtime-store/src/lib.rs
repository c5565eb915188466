//! Persistence layer for playtimed
//!
//! Provides:
//! - Daily budget usage per identity, with the date of the last reset
//! - Feedback preferences per identity
//! - Linked external handles for the live-presence gate
//! - Audit log (append-only)
//! - [`BudgetLedger`], the fail-open view the engine uses

mod audit;
mod ledger;
mod sqlite;
mod traits;

pub use audit::*;
pub use ledger::*;
pub use sqlite::*;
pub use traits::*;

use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
