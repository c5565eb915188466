//! Store trait definitions

use chrono::NaiveDate;
use playtime_api::FeedbackPreferences;
use playtime_util::UserId;

use crate::{AuditEvent, StoreResult};

/// Raw storage operations. Errors are returned as-is; see
/// [`crate::BudgetLedger`] for the degrade-on-error view.
pub trait Store: Send + Sync {
    // Audit log

    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Most recent events first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Budget usage

    fn get_budget_record(&self, identity: &UserId) -> StoreResult<Option<BudgetRecord>>;

    /// Upsert the usage counter and the reset date
    fn put_budget_record(
        &self,
        identity: &UserId,
        used_seconds: i64,
        reset_date: NaiveDate,
    ) -> StoreResult<()>;

    // Feedback settings

    fn get_settings(&self, identity: &UserId) -> StoreResult<Option<UserSettings>>;

    fn put_settings(&self, identity: &UserId, settings: &UserSettings) -> StoreResult<()>;

    // External handles

    fn get_external_handle(&self, identity: &UserId) -> StoreResult<Option<String>>;

    /// `None` removes the link
    fn set_external_handle(&self, identity: &UserId, handle: Option<&str>) -> StoreResult<()>;

    // Health

    fn is_healthy(&self) -> bool;
}

/// One row of daily usage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetRecord {
    /// Seconds used today; negative after an allowance grant
    pub used_seconds: i64,
    /// Stored date text, kept raw so a corrupt value can be detected
    pub last_reset_date: String,
}

impl BudgetRecord {
    /// The reset date, or `None` if the stored text is not a valid date
    pub fn reset_date(&self) -> Option<NaiveDate> {
        playtime_util::parse_iso_date(&self.last_reset_date)
    }
}

/// Per-identity settings row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserSettings {
    pub preferences: FeedbackPreferences,
    /// Set once the identity has started its first session
    pub joined_before: bool,
}
