//! Fail-open budget ledger over a [`Store`]
//!
//! Every operation here swallows persistence errors: it logs them and falls
//! back to a safe default so a storage hiccup never takes a session down.

use chrono::NaiveDate;
use playtime_api::FeedbackPreferences;
use playtime_util::UserId;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::{AuditEvent, AuditEventType, BudgetRecord, Store, UserSettings};

/// Budget bookkeeping used by the engine
#[derive(Clone)]
pub struct BudgetLedger {
    store: Arc<dyn Store>,
}

impl BudgetLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The raw record, or `None` if there is none or it could not be read
    pub fn record(&self, identity: &UserId) -> Option<BudgetRecord> {
        match self.store.get_budget_record(identity) {
            Ok(record) => record,
            Err(e) => {
                error!(identity = %identity, error = %e, "Failed to read budget record");
                None
            }
        }
    }

    /// Seconds used today. 0 when there is no record or the read fails.
    pub fn used_seconds(&self, identity: &UserId) -> i64 {
        self.record(identity).map(|r| r.used_seconds).unwrap_or(0)
    }

    /// Overwrite today's usage. The reset date becomes `today`.
    pub fn set_used_seconds(&self, identity: &UserId, seconds: i64, today: NaiveDate) {
        if let Err(e) = self.store.put_budget_record(identity, seconds, today) {
            error!(identity = %identity, seconds, error = %e, "Failed to write budget usage");
        }
    }

    /// Zero today's usage without reading it first
    pub fn reset_today(&self, identity: &UserId, today: NaiveDate) {
        self.set_used_seconds(identity, 0, today);
        debug!(identity = %identity, %today, "Budget reset for today");
    }

    /// Whether the stored usage belongs to an earlier day.
    ///
    /// True when there is no record or the stored date is unparsable. A failed
    /// read reports false so existing usage is not wiped.
    pub fn is_new_day(&self, identity: &UserId, today: NaiveDate) -> bool {
        match self.store.get_budget_record(identity) {
            Ok(None) => true,
            Ok(Some(record)) => match record.reset_date() {
                Some(date) => date != today,
                None => {
                    info!(
                        identity = %identity,
                        stored = %record.last_reset_date,
                        "Unparsable reset date; treating as a new day"
                    );
                    true
                }
            },
            Err(e) => {
                error!(identity = %identity, error = %e, "Failed to check reset date");
                false
            }
        }
    }

    /// Whether the identity has ever been seen. False on read failure.
    pub fn has_record(&self, identity: &UserId) -> bool {
        match self.store.get_budget_record(identity) {
            Ok(record) => record.is_some(),
            Err(e) => {
                error!(identity = %identity, error = %e, "Failed to look up identity");
                false
            }
        }
    }

    /// Settings for an identity; the first read writes the defaults
    pub fn settings(&self, identity: &UserId) -> UserSettings {
        match self.store.get_settings(identity) {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                let defaults = UserSettings::default();
                self.put_settings(identity, &defaults);
                defaults
            }
            Err(e) => {
                error!(identity = %identity, error = %e, "Failed to read settings; using defaults");
                UserSettings::default()
            }
        }
    }

    pub fn preferences(&self, identity: &UserId) -> FeedbackPreferences {
        self.settings(identity).preferences
    }

    pub fn set_preferences(&self, identity: &UserId, preferences: FeedbackPreferences) {
        let mut settings = self.settings(identity);
        settings.preferences = preferences;
        self.put_settings(identity, &settings);
    }

    /// Record that the identity has started a session.
    /// Returns true if this is its first one.
    pub fn mark_joined(&self, identity: &UserId) -> bool {
        let mut settings = self.settings(identity);
        if settings.joined_before {
            return false;
        }
        settings.joined_before = true;
        self.put_settings(identity, &settings);
        true
    }

    fn put_settings(&self, identity: &UserId, settings: &UserSettings) {
        if let Err(e) = self.store.put_settings(identity, settings) {
            error!(identity = %identity, error = %e, "Failed to write settings");
        }
    }

    pub fn external_handle(&self, identity: &UserId) -> Option<String> {
        match self.store.get_external_handle(identity) {
            Ok(handle) => handle,
            Err(e) => {
                error!(identity = %identity, error = %e, "Failed to read external handle");
                None
            }
        }
    }

    pub fn set_external_handle(&self, identity: &UserId, handle: Option<&str>) {
        if let Err(e) = self.store.set_external_handle(identity, handle) {
            error!(identity = %identity, error = %e, "Failed to write external handle");
        }
    }

    pub fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            error!(error = %e, "Failed to append audit event");
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.store.is_healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SqliteStore, StoreError, StoreResult};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ledger() -> BudgetLedger {
        BudgetLedger::new(Arc::new(SqliteStore::in_memory().unwrap()))
    }

    /// Store whose every operation fails
    struct BrokenStore;

    impl Store for BrokenStore {
        fn append_audit(&self, _: AuditEvent) -> StoreResult<()> {
            Err(StoreError::Database("disk on fire".into()))
        }
        fn get_recent_audits(&self, _: usize) -> StoreResult<Vec<AuditEvent>> {
            Err(StoreError::Database("disk on fire".into()))
        }
        fn get_budget_record(&self, _: &UserId) -> StoreResult<Option<BudgetRecord>> {
            Err(StoreError::Database("disk on fire".into()))
        }
        fn put_budget_record(&self, _: &UserId, _: i64, _: NaiveDate) -> StoreResult<()> {
            Err(StoreError::Database("disk on fire".into()))
        }
        fn get_settings(&self, _: &UserId) -> StoreResult<Option<UserSettings>> {
            Err(StoreError::Database("disk on fire".into()))
        }
        fn put_settings(&self, _: &UserId, _: &UserSettings) -> StoreResult<()> {
            Err(StoreError::Database("disk on fire".into()))
        }
        fn get_external_handle(&self, _: &UserId) -> StoreResult<Option<String>> {
            Err(StoreError::Database("disk on fire".into()))
        }
        fn set_external_handle(&self, _: &UserId, _: Option<&str>) -> StoreResult<()> {
            Err(StoreError::Database("disk on fire".into()))
        }
        fn is_healthy(&self) -> bool {
            false
        }
    }

    #[test]
    fn unknown_identity_has_zero_usage_and_is_new_day() {
        let ledger = ledger();
        let id = UserId::new("fresh");

        assert_eq!(ledger.used_seconds(&id), 0);
        assert!(ledger.is_new_day(&id, day(2025, 6, 1)));
        assert!(!ledger.has_record(&id));
    }

    #[test]
    fn reset_today_is_idempotent() {
        let ledger = ledger();
        let id = UserId::new("alex");
        let today = day(2025, 6, 1);

        ledger.set_used_seconds(&id, 900, today);
        ledger.reset_today(&id, today);
        let once = ledger.record(&id);
        ledger.reset_today(&id, today);

        assert_eq!(ledger.record(&id), once);
        assert_eq!(ledger.used_seconds(&id), 0);
        assert!(!ledger.is_new_day(&id, today));
    }

    #[test]
    fn day_rollover_detected() {
        let ledger = ledger();
        let id = UserId::new("alex");

        ledger.set_used_seconds(&id, 1200, day(2025, 6, 1));
        assert!(!ledger.is_new_day(&id, day(2025, 6, 1)));
        assert!(ledger.is_new_day(&id, day(2025, 6, 2)));
    }

    #[test]
    fn unparsable_date_counts_as_new_day() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let id = UserId::new("alex");
        store.put_budget_record(&id, 10, day(2025, 6, 1)).unwrap();

        // Stand-in for a row written by something else with a broken date
        struct CorruptDate(Arc<SqliteStore>);
        impl Store for CorruptDate {
            fn append_audit(&self, e: AuditEvent) -> StoreResult<()> {
                self.0.append_audit(e)
            }
            fn get_recent_audits(&self, n: usize) -> StoreResult<Vec<AuditEvent>> {
                self.0.get_recent_audits(n)
            }
            fn get_budget_record(&self, id: &UserId) -> StoreResult<Option<BudgetRecord>> {
                Ok(self.0.get_budget_record(id)?.map(|r| BudgetRecord {
                    last_reset_date: "not-a-date".into(),
                    ..r
                }))
            }
            fn put_budget_record(&self, id: &UserId, s: i64, d: NaiveDate) -> StoreResult<()> {
                self.0.put_budget_record(id, s, d)
            }
            fn get_settings(&self, id: &UserId) -> StoreResult<Option<UserSettings>> {
                self.0.get_settings(id)
            }
            fn put_settings(&self, id: &UserId, s: &UserSettings) -> StoreResult<()> {
                self.0.put_settings(id, s)
            }
            fn get_external_handle(&self, id: &UserId) -> StoreResult<Option<String>> {
                self.0.get_external_handle(id)
            }
            fn set_external_handle(&self, id: &UserId, h: Option<&str>) -> StoreResult<()> {
                self.0.set_external_handle(id, h)
            }
            fn is_healthy(&self) -> bool {
                true
            }
        }

        let ledger = BudgetLedger::new(Arc::new(CorruptDate(store)));
        assert!(ledger.is_new_day(&id, day(2025, 6, 1)));
    }

    #[test]
    fn broken_store_degrades_instead_of_failing() {
        let ledger = BudgetLedger::new(Arc::new(BrokenStore));
        let id = UserId::new("alex");

        assert_eq!(ledger.used_seconds(&id), 0);
        assert!(!ledger.is_new_day(&id, day(2025, 6, 1)));
        assert!(!ledger.has_record(&id));
        assert_eq!(ledger.settings(&id), UserSettings::default());
        assert!(ledger.external_handle(&id).is_none());
        ledger.set_used_seconds(&id, 60, day(2025, 6, 1));
        ledger.audit(AuditEventType::ServiceStarted);
        assert!(!ledger.is_healthy());
    }

    #[test]
    fn first_settings_read_materializes_defaults() {
        let ledger = ledger();
        let id = UserId::new("alex");

        assert!(ledger.store().get_settings(&id).unwrap().is_none());
        let settings = ledger.settings(&id);
        assert_eq!(settings, UserSettings::default());
        assert_eq!(ledger.store().get_settings(&id).unwrap(), Some(settings));
    }

    #[test]
    fn mark_joined_reports_first_time_only() {
        let ledger = ledger();
        let id = UserId::new("alex");

        assert!(ledger.mark_joined(&id));
        assert!(!ledger.mark_joined(&id));
    }

    #[test]
    fn preference_update_keeps_joined_flag() {
        let ledger = ledger();
        let id = UserId::new("alex");
        ledger.mark_joined(&id);

        let mut prefs = ledger.preferences(&id);
        prefs.short_feedback_enabled = false;
        ledger.set_preferences(&id, prefs);

        let settings = ledger.settings(&id);
        assert!(settings.joined_before);
        assert!(!settings.preferences.short_feedback_enabled);
    }
}
