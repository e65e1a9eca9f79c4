use chrono::{DateTime, Duration, Utc};

use crate::booking::domain::{ServiceTier, TierTag};
use crate::config::BookingConfig;

/// Policy deciding whether a chosen schedule time falls inside the
/// emergency window. Evaluated once, when the user confirms the pick;
/// clock drift between pick and submit is tolerated.
#[derive(Debug, Clone)]
pub struct EmergencyWindow {
    window: Duration,
}

impl Default for EmergencyWindow {
    fn default() -> Self {
        Self {
            window: Duration::hours(4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyAssessment {
    pub is_emergency: bool,
}

impl EmergencyWindow {
    pub fn from_config(config: &BookingConfig) -> Self {
        Self {
            window: Duration::hours(config.emergency_window_hours),
        }
    }

    /// `schedule_time <= now + window` counts as emergency; the boundary is
    /// inclusive.
    pub fn classify(&self, schedule_time: DateTime<Utc>, now: DateTime<Utc>) -> EmergencyAssessment {
        EmergencyAssessment {
            is_emergency: schedule_time <= now + self.window,
        }
    }

    /// An emergency-window pick on a schedulable, non-Emergency tier needs an
    /// explicit user confirmation before the tier is forced to Emergency.
    pub fn requires_confirmation(
        &self,
        schedule_time: DateTime<Utc>,
        now: DateTime<Utc>,
        tier: &ServiceTier,
    ) -> bool {
        self.classify(schedule_time, now).is_emergency
            && tier.is_schedulable
            && tier.tag != TierTag::Emergency
    }
}
