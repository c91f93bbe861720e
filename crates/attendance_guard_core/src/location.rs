//! Location verification: geofence, impossible travel and GPS accuracy.
//!
//! Each step is scored on its own and the results are summed. An unreadable
//! registered location counts against the claim rather than passing silently.

use chrono::{DateTime, Duration, Utc};

use crate::assessment::{Assessment, ReasonCode};
use crate::domain::{ClaimedLocation, LocationHistoryEntry, RegisteredLocation, SessionWindow};
use crate::geo::distance_meters;

pub const GEOFENCE_RADIUS_M: f64 = 200.0;
pub const GEOFENCE_PENALTY: u32 = 35;
pub const UNVERIFIABLE_LOCATION_PENALTY: u32 = 10;

pub const TRAVEL_LOOKBACK_HOURS: i64 = 24;
pub const TRAVEL_WINDOW_MINUTES: i64 = 5;
pub const MAX_TRAVEL_SPEED_KMH: f64 = 100.0;
pub const IMPOSSIBLE_TRAVEL_PENALTY: u32 = 50;

pub const MAX_GPS_ACCURACY_M: f64 = 100.0;
pub const LOW_ACCURACY_PENALTY: u32 = 15;

/// Verifies a claimed location against the session and the claimant's recent marks.
///
/// `accuracy` is the effective accuracy in meters (the claim's own figure, or the
/// device signal's when the claim has none).
pub fn verify_location(
    claim: &ClaimedLocation,
    accuracy: Option<f64>,
    session: &SessionWindow,
    history: &[LocationHistoryEntry],
    claim_time: DateTime<Utc>,
) -> Assessment {
    let mut assessment = Assessment::new();
    let here = claim.coordinate();

    match &session.registered_location {
        Some(RegisteredLocation::Coordinates(registered)) => {
            let distance = distance_meters(here, *registered);
            if distance > GEOFENCE_RADIUS_M {
                assessment.flag(
                    ReasonCode::OutsideGeofence,
                    GEOFENCE_PENALTY,
                    format!("Location too far from classroom ({}m away)", distance.round()),
                );
            }
        }
        Some(RegisteredLocation::Unparseable(_)) => {
            assessment.flag(
                ReasonCode::SessionLocationUnverifiable,
                UNVERIFIABLE_LOCATION_PENALTY,
                "Unable to verify session location",
            );
        }
        None => {}
    }

    if let Some(speed_kmh) = travel_speed_kmh(claim, history, claim_time) {
        if speed_kmh > MAX_TRAVEL_SPEED_KMH {
            assessment.flag(
                ReasonCode::ImpossibleTravel,
                IMPOSSIBLE_TRAVEL_PENALTY,
                format!("Impossible travel distance detected ({} km/h)", speed_kmh.round()),
            );
        }
    }

    if let Some(accuracy) = accuracy {
        if accuracy > MAX_GPS_ACCURACY_M {
            assessment.flag(
                ReasonCode::LowGpsAccuracy,
                LOW_ACCURACY_PENALTY,
                format!("Low GPS accuracy detected ({}m)", accuracy.round()),
            );
        }
    }

    assessment
}

/// Speed implied by moving from the most recent mark in the last 24h to this claim.
/// Only computed when that mark is within five minutes of the claim.
fn travel_speed_kmh(
    claim: &ClaimedLocation,
    history: &[LocationHistoryEntry],
    claim_time: DateTime<Utc>,
) -> Option<f64> {
    let lookback = claim_time - Duration::hours(TRAVEL_LOOKBACK_HOURS);
    let last = history
        .iter()
        .filter(|entry| entry.recorded_at >= lookback)
        .max_by_key(|entry| entry.recorded_at)?;

    let elapsed = (claim_time - last.recorded_at).abs();
    if elapsed >= Duration::minutes(TRAVEL_WINDOW_MINUTES) {
        return None;
    }

    // Two marks in the same second still imply a speed; floor the divisor there.
    let elapsed_ms = elapsed.num_milliseconds().max(1000) as f64;
    let elapsed_hours = elapsed_ms / 3_600_000.0;
    let distance_km = distance_meters(claim.coordinate(), last.location) / 1000.0;

    Some(distance_km / elapsed_hours)
}
