//! SQLite-based store implementation

use chrono::{DateTime, Local, NaiveDate};
use playtime_api::FeedbackPreferences;
use playtime_util::{format_iso_date, UserId};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{AuditEvent, BudgetRecord, Store, StoreError, StoreResult, UserSettings};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Daily budget usage
            CREATE TABLE IF NOT EXISTS budget_usage (
                identity TEXT PRIMARY KEY,
                used_seconds INTEGER NOT NULL DEFAULT 0,
                last_reset_date TEXT NOT NULL
            );

            -- Feedback preferences
            CREATE TABLE IF NOT EXISTS feedback_settings (
                identity TEXT PRIMARY KEY,
                short_feedback_enabled INTEGER NOT NULL DEFAULT 1,
                persistent_feedback_enabled INTEGER NOT NULL DEFAULT 1,
                joined_before INTEGER NOT NULL DEFAULT 0
            );

            -- Handles passed to the live-presence gate
            CREATE TABLE IF NOT EXISTS external_handles (
                identity TEXT PRIMARY KEY,
                handle TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| playtime_util::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn get_budget_record(&self, identity: &UserId) -> StoreResult<Option<BudgetRecord>> {
        let conn = self.conn()?;

        let record = conn
            .query_row(
                "SELECT used_seconds, last_reset_date FROM budget_usage WHERE identity = ?",
                [identity.as_str()],
                |row| {
                    Ok(BudgetRecord {
                        used_seconds: row.get(0)?,
                        last_reset_date: row.get(1)?,
                    })
                },
            )
            .optional()?;

        Ok(record)
    }

    fn put_budget_record(
        &self,
        identity: &UserId,
        used_seconds: i64,
        reset_date: NaiveDate,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        let date_str = format_iso_date(reset_date);

        conn.execute(
            r#"
            INSERT INTO budget_usage (identity, used_seconds, last_reset_date)
            VALUES (?, ?, ?)
            ON CONFLICT(identity)
            DO UPDATE SET used_seconds = excluded.used_seconds,
                          last_reset_date = excluded.last_reset_date
            "#,
            params![identity.as_str(), used_seconds, date_str],
        )?;

        debug!(identity = %identity, used_seconds, date = %date_str, "Budget usage written");
        Ok(())
    }

    fn get_settings(&self, identity: &UserId) -> StoreResult<Option<UserSettings>> {
        let conn = self.conn()?;

        let settings = conn
            .query_row(
                r#"
                SELECT short_feedback_enabled, persistent_feedback_enabled, joined_before
                FROM feedback_settings WHERE identity = ?
                "#,
                [identity.as_str()],
                |row| {
                    Ok(UserSettings {
                        preferences: FeedbackPreferences {
                            short_feedback_enabled: row.get(0)?,
                            persistent_feedback_enabled: row.get(1)?,
                        },
                        joined_before: row.get(2)?,
                    })
                },
            )
            .optional()?;

        Ok(settings)
    }

    fn put_settings(&self, identity: &UserId, settings: &UserSettings) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO feedback_settings
                (identity, short_feedback_enabled, persistent_feedback_enabled, joined_before)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(identity)
            DO UPDATE SET short_feedback_enabled = excluded.short_feedback_enabled,
                          persistent_feedback_enabled = excluded.persistent_feedback_enabled,
                          joined_before = excluded.joined_before
            "#,
            params![
                identity.as_str(),
                settings.preferences.short_feedback_enabled,
                settings.preferences.persistent_feedback_enabled,
                settings.joined_before,
            ],
        )?;

        debug!(identity = %identity, ?settings, "Settings written");
        Ok(())
    }

    fn get_external_handle(&self, identity: &UserId) -> StoreResult<Option<String>> {
        let conn = self.conn()?;

        let handle = conn
            .query_row(
                "SELECT handle FROM external_handles WHERE identity = ?",
                [identity.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(handle)
    }

    fn set_external_handle(&self, identity: &UserId, handle: Option<&str>) -> StoreResult<()> {
        let conn = self.conn()?;

        match handle {
            Some(handle) => {
                conn.execute(
                    r#"
                    INSERT INTO external_handles (identity, handle)
                    VALUES (?, ?)
                    ON CONFLICT(identity)
                    DO UPDATE SET handle = excluded.handle
                    "#,
                    params![identity.as_str(), handle],
                )?;
            }
            None => {
                conn.execute(
                    "DELETE FROM external_handles WHERE identity = ?",
                    [identity.as_str()],
                )?;
            }
        }

        debug!(identity = %identity, ?handle, "External handle updated");
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
