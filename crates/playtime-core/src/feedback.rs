//! Feedback value computation
//!
//! Pure functions shared by the short and persistent feedback ticks and by
//! the read-only remaining-budget query.

use playtime_api::{Band, ShortFeedback};
use tracing::warn;

use crate::ResolvedUser;

/// Progress shown for bypass-exempt users
pub const UNLIMITED_PROGRESS: f64 = 0.01;

/// Progress below this is the low band
pub const LOW_BAND_BELOW: f64 = 0.33;

/// Progress below this (and not low) is the mid band
pub const MID_BAND_BELOW: f64 = 0.66;

pub const UNLIMITED_TEXT: &str = "You have unlimited playtime!";
pub const ABOUT_TO_BE_CUT_OFF_TEXT: &str = "You will be disconnected in a few seconds!";
pub const BUDGET_EXHAUSTED_TEXT: &str =
    "You have reached your daily playtime limit! You can play again tomorrow.";
pub const MUST_BE_LIVE_TEXT: &str = "You must be live to join the server!";

/// Seconds left today: `clamp(max - used, 0, max)`
pub fn remaining_seconds(used_seconds: i64, max_budget_seconds: u64) -> u64 {
    let max = i128::from(max_budget_seconds);
    let remaining = (max - i128::from(used_seconds)).clamp(0, max);
    remaining as u64
}

/// Fraction of the budget left, in `[0, 1]`.
///
/// A zero budget is reported as full (1) to avoid dividing by zero; nothing
/// left is reported as 0.
pub fn progress(remaining_seconds: u64, max_budget_seconds: u64) -> f64 {
    if max_budget_seconds == 0 {
        warn!("Budget is zero; reporting full progress");
        return 1.0;
    }
    if remaining_seconds == 0 {
        return 0.0;
    }
    (remaining_seconds as f64 / max_budget_seconds as f64).clamp(0.0, 1.0)
}

/// Low below 0.33, mid below 0.66, high otherwise
pub fn band(progress: f64) -> Band {
    if progress < LOW_BAND_BELOW {
        Band::Low
    } else if progress < MID_BAND_BELOW {
        Band::Mid
    } else {
        Band::High
    }
}

pub fn remaining_text(remaining_seconds: u64) -> String {
    format!("You have {} minutes remaining!", remaining_seconds / 60)
}

/// Value for one short-feedback tick
pub fn short_feedback(user: &ResolvedUser, used_seconds: i64) -> ShortFeedback {
    if user.bypass_exempt {
        return ShortFeedback {
            remaining_seconds: None,
            text: UNLIMITED_TEXT.to_string(),
        };
    }

    let remaining = remaining_seconds(used_seconds, user.max_budget_seconds);
    ShortFeedback {
        remaining_seconds: Some(remaining),
        text: remaining_text(remaining),
    }
}

/// Value for one persistent-feedback tick
#[derive(Debug, Clone, PartialEq)]
pub struct PersistentValue {
    pub text: String,
    pub progress: f64,
    pub band: Band,
    /// Nothing left: the indicator switches to the "about to be cut off" state
    pub critical: bool,
}

pub fn persistent_value(user: &ResolvedUser, used_seconds: i64) -> PersistentValue {
    if user.bypass_exempt {
        return PersistentValue {
            text: UNLIMITED_TEXT.to_string(),
            progress: UNLIMITED_PROGRESS,
            band: Band::Low,
            critical: false,
        };
    }

    let remaining = remaining_seconds(used_seconds, user.max_budget_seconds);
    let progress = progress(remaining, user.max_budget_seconds);
    let critical = progress == 0.0;
    let text = if critical {
        ABOUT_TO_BE_CUT_OFF_TEXT.to_string()
    } else {
        remaining_text(remaining)
    };

    PersistentValue {
        text,
        progress,
        band: band(progress),
        critical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playtime_api::Tier;

    fn standard(max: u64) -> ResolvedUser {
        ResolvedUser {
            tier: Tier::Standard,
            bypass_exempt: false,
            max_budget_seconds: max,
        }
    }

    #[test]
    fn remaining_is_clamped() {
        assert_eq!(remaining_seconds(0, 3600), 3600);
        assert_eq!(remaining_seconds(180, 3600), 3420);
        assert_eq!(remaining_seconds(3600, 3600), 0);
        assert_eq!(remaining_seconds(9000, 3600), 0);
        // Allowance grants push used below zero; remaining never exceeds max
        assert_eq!(remaining_seconds(-600, 3600), 3600);
        assert_eq!(remaining_seconds(i64::MIN, u64::MAX), u64::MAX);
        assert_eq!(remaining_seconds(i64::MAX, 0), 0);
    }

    #[test]
    fn progress_edge_cases() {
        assert_eq!(progress(0, 0), 1.0);
        assert_eq!(progress(500, 0), 1.0);
        assert_eq!(progress(0, 3600), 0.0);
        assert_eq!(progress(3600, 3600), 1.0);
        assert_eq!(progress(1800, 3600), 0.5);
    }

    #[test]
    fn progress_is_monotonic_and_in_range() {
        let max = 3600;
        let mut last = -1.0;
        for remaining in (0..=max).step_by(37) {
            let p = progress(remaining, max);
            assert!((0.0..=1.0).contains(&p));
            assert!(p >= last, "progress decreased at remaining={remaining}");
            last = p;
        }
    }

    #[test]
    fn band_boundaries() {
        assert_eq!(band(0.0), Band::Low);
        assert_eq!(band(0.3299), Band::Low);
        assert_eq!(band(0.33), Band::Mid);
        assert_eq!(band(0.6599), Band::Mid);
        assert_eq!(band(0.66), Band::High);
        assert_eq!(band(1.0), Band::High);
    }

    #[test]
    fn short_feedback_reports_minutes() {
        let fb = short_feedback(&standard(3600), 180);
        assert_eq!(fb.remaining_seconds, Some(3420));
        assert_eq!(fb.text, "You have 57 minutes remaining!");
    }

    #[test]
    fn bypass_feedback_is_fixed() {
        let user = ResolvedUser {
            bypass_exempt: true,
            ..standard(0)
        };

        let fb = short_feedback(&user, 99_999);
        assert_eq!(fb.remaining_seconds, None);
        assert_eq!(fb.text, UNLIMITED_TEXT);

        let value = persistent_value(&user, 99_999);
        assert_eq!(value.progress, UNLIMITED_PROGRESS);
        assert_eq!(value.band, Band::Low);
        assert!(!value.critical);
    }

    #[test]
    fn exhausted_budget_is_critical() {
        let value = persistent_value(&standard(3600), 3600);
        assert_eq!(value.progress, 0.0);
        assert!(value.critical);
        assert_eq!(value.text, ABOUT_TO_BE_CUT_OFF_TEXT);
    }

    #[test]
    fn zero_budget_shows_full_bar() {
        let value = persistent_value(&standard(0), 0);
        assert_eq!(value.progress, 1.0);
        assert_eq!(value.band, Band::High);
        assert!(!value.critical);
    }
}
