//! Temporal window check for a claim against its session.

use chrono::{DateTime, Duration, Utc};

use crate::assessment::{Assessment, ReasonCode};
use crate::domain::SessionWindow;

pub const EARLY_TOLERANCE_MINUTES: i64 = 15;
pub const LATE_TOLERANCE_MINUTES: i64 = 30;
pub const EARLY_PENALTY: u32 = 25;
pub const LATE_PENALTY: u32 = 30;

/// Scores how far outside the session window a claim was made.
///
/// Tolerances are asymmetric: 15 minutes before the start, 30 minutes after the end.
/// Without a window there is nothing to compare against and the result is clean;
/// the aggregator penalizes the missing session separately.
pub fn validate_timing(claim_time: DateTime<Utc>, window: Option<&SessionWindow>) -> Assessment {
    let mut assessment = Assessment::new();
    let Some(window) = window else {
        return assessment;
    };

    if window.start_time - claim_time > Duration::minutes(EARLY_TOLERANCE_MINUTES) {
        assessment.flag(ReasonCode::MarkedTooEarly, EARLY_PENALTY, "Attendance marked too early");
    }
    if claim_time - window.end_time > Duration::minutes(LATE_TOLERANCE_MINUTES) {
        assessment.flag(ReasonCode::MarkedTooLate, LATE_PENALTY, "Attendance marked too late");
    }

    assessment
}
