//! Persistent feedback handle

use playtime_api::{Band, PersistentFeedback};
use playtime_util::IndicatorId;

/// The persistent indicator currently shown to one user.
///
/// Created on the first persistent tick and kept until the session ends or
/// the user turns the channel off, so later ticks update it in place.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistentFeedbackHandle {
    indicator_id: IndicatorId,
    text: String,
    progress: f64,
    band: Band,
    critical: bool,
}

impl PersistentFeedbackHandle {
    pub fn new(text: String, progress: f64, band: Band, critical: bool) -> Self {
        Self {
            indicator_id: IndicatorId::new(),
            text,
            progress,
            band,
            critical,
        }
    }

    pub fn indicator_id(&self) -> &IndicatorId {
        &self.indicator_id
    }

    /// Update in place, keeping the indicator id
    pub fn update(&mut self, text: String, progress: f64, band: Band, critical: bool) {
        self.text = text;
        self.progress = progress;
        self.band = band;
        self.critical = critical;
    }

    /// Wire representation for the presentation layer
    pub fn to_feedback(&self) -> PersistentFeedback {
        PersistentFeedback {
            indicator_id: self.indicator_id.clone(),
            text: self.text.clone(),
            progress: self.progress,
            band: self.band,
            critical: self.critical,
        }
    }
}
