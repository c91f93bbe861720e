//! crates/attendance_guard_core/src/domain.rs
//!
//! Defines the pure, core data structures for the attendance guard.
//! These structs are independent of any database or transport format; serde derives
//! exist only so adapters can move them across the wire unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assessment::{Finding, ReasonCode};

/// A point on the earth's surface, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both components are finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// The GPS fix a claimant submitted with a scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClaimedLocation {
    pub lat: f64,
    pub lng: f64,
    /// Reported horizontal accuracy in meters.
    #[serde(default)]
    pub accuracy: Option<f64>,
}

impl ClaimedLocation {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

/// Browser/device fingerprint captured by the scanner. Untrusted input: only ever
/// used for anomaly heuristics, never for identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSignal {
    pub user_agent: String,
    pub screen_resolution: String,
    pub color_depth: Option<u32>,
    pub timezone: String,
    pub language: String,
    pub platform: String,
    pub canvas_fingerprint: Option<String>,
    pub cookies_enabled: bool,
    pub online_status: bool,
    pub scan_duration_ms: Option<u64>,
    pub gps_accuracy_m: Option<f64>,
}

impl Default for DeviceSignal {
    /// An unremarkable device: online, nothing else reported.
    fn default() -> Self {
        Self {
            user_agent: String::new(),
            screen_resolution: String::new(),
            color_depth: None,
            timezone: String::new(),
            language: String::new(),
            platform: String::new(),
            canvas_fingerprint: None,
            cookies_enabled: false,
            online_status: true,
            scan_duration_ms: None,
            gps_accuracy_m: None,
        }
    }
}

/// A single scan attempt. Ephemeral: only its outcome is ever persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInClaim {
    pub claimant_id: Uuid,
    pub session_id: Uuid,
    pub claimed_code: String,
    pub claimed_location: Option<ClaimedLocation>,
    pub device_signal: Option<DeviceSignal>,
    pub client_timestamp: DateTime<Utc>,
}

/// Where a session says it takes place, as stored by the session collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisteredLocation {
    Coordinates(Coordinate),
    /// Stored text that could not be read as a coordinate (kept for the audit trail).
    Unparseable(String),
}

#[derive(Deserialize)]
struct StoredCoordinate {
    lat: f64,
    lng: f64,
}

impl RegisteredLocation {
    /// Reads the stored `{"lat": .., "lng": ..}` text. Anything else, including
    /// out-of-range numbers, is kept as `Unparseable`.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<StoredCoordinate>(raw) {
            Ok(stored) => {
                let coordinate = Coordinate::new(stored.lat, stored.lng);
                if coordinate.is_valid() {
                    RegisteredLocation::Coordinates(coordinate)
                } else {
                    RegisteredLocation::Unparseable(raw.to_string())
                }
            }
            Err(_) => RegisteredLocation::Unparseable(raw.to_string()),
        }
    }
}

/// A class session as seen by the engine. Owned by the session store; read-only here.
#[derive(Debug, Clone)]
pub struct SessionWindow {
    pub session_id: Uuid,
    pub registered_location: Option<RegisteredLocation>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub active: bool,
    pub qr_code: Option<String>,
}

impl SessionWindow {
    /// A session accepts a claim only while active and, when it has a QR code on
    /// record, only for that exact code.
    pub fn accepts_code(&self, claimed_code: &str) -> bool {
        self.active
            && self
                .qr_code
                .as_deref()
                .map_or(true, |code| code == claimed_code)
    }
}

/// A past attendance mark with a location, used for impossible-travel checks.
#[derive(Debug, Clone)]
pub struct LocationHistoryEntry {
    pub claimant_id: Uuid,
    pub location: Coordinate,
    pub recorded_at: DateTime<Utc>,
    pub session_id: Uuid,
}

/// The engine's answer for one claim. Computed fresh and never stored as an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudVerdict {
    pub fraud_score: u32,
    pub reasons: Vec<String>,
    pub reason_codes: Vec<ReasonCode>,
    pub is_suspicious: bool,
    pub location_verified: bool,
    /// Set when a lookup failed and the verdict fell back to trusting the claim.
    pub degraded: bool,
}

impl FraudVerdict {
    pub const SUSPICIOUS_ABOVE: u32 = 50;
    pub const VERIFIED_BELOW: u32 = 30;

    pub fn from_findings(findings: Vec<Finding>) -> Self {
        let fraud_score = findings.iter().map(|f| f.penalty).sum();
        let (reasons, reason_codes) = findings.into_iter().map(|f| (f.message, f.code)).unzip();
        Self {
            fraud_score,
            reasons,
            reason_codes,
            is_suspicious: fraud_score > Self::SUSPICIOUS_ABOVE,
            location_verified: fraud_score < Self::VERIFIED_BELOW,
            degraded: false,
        }
    }

    /// Fail-open verdict: nothing was verified, nothing is held against the claimant.
    pub fn unavailable(detail: impl std::fmt::Display) -> Self {
        Self {
            fraud_score: 0,
            reasons: vec![format!("Fraud detection unavailable: {detail}")],
            reason_codes: vec![ReasonCode::DetectionUnavailable],
            is_suspicious: false,
            location_verified: false,
            degraded: true,
        }
    }

    /// Whether the attendance write may proceed under the given reject threshold.
    pub fn permits_write(&self, reject_threshold: u32) -> bool {
        self.fraud_score < reject_threshold
    }

    pub fn joined_reasons(&self) -> String {
        self.reasons.join("; ")
    }
}

/// The write requested once a claim has passed the gate.
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub claimant_id: Uuid,
    pub session_id: Uuid,
    pub claimed_code: String,
    pub location: Option<Coordinate>,
    pub marked_at: DateTime<Utc>,
}

/// A persisted attendance record.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub claimant_id: Uuid,
    pub session_id: Uuid,
    pub status: String,
    pub marked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_location_reads_stored_json() {
        let parsed = RegisteredLocation::parse(r#"{"lat": -1.2921, "lng": 36.8219}"#);
        assert_eq!(
            parsed,
            RegisteredLocation::Coordinates(Coordinate::new(-1.2921, 36.8219))
        );
    }

    #[test]
    fn free_text_and_out_of_range_locations_are_unparseable() {
        assert!(matches!(
            RegisteredLocation::parse("Room 201"),
            RegisteredLocation::Unparseable(_)
        ));
        assert!(matches!(
            RegisteredLocation::parse(r#"{"lat": 120.0, "lng": 0.0}"#),
            RegisteredLocation::Unparseable(_)
        ));
    }

    #[test]
    fn verdict_bands_leave_a_gray_zone() {
        let verdict = FraudVerdict::from_findings(vec![Finding::new(
            ReasonCode::OutsideGeofence,
            35,
            "far",
        )]);
        assert_eq!(verdict.fraud_score, 35);
        assert!(!verdict.is_suspicious);
        assert!(!verdict.location_verified);
        assert!(verdict.permits_write(70));
    }

    #[test]
    fn inactive_session_or_wrong_code_is_not_accepted() {
        let mut window = SessionWindow {
            session_id: Uuid::new_v4(),
            registered_location: None,
            start_time: Utc::now(),
            end_time: Utc::now(),
            active: true,
            qr_code: Some("SESSION_CS101".to_string()),
        };
        assert!(window.accepts_code("SESSION_CS101"));
        assert!(!window.accepts_code("SESSION_CS102"));
        window.active = false;
        assert!(!window.accepts_code("SESSION_CS101"));
    }

    #[test]
    fn default_device_is_online() {
        assert!(DeviceSignal::default().online_status);

        let partial: DeviceSignal =
            serde_json::from_str(r#"{"user_agent": "Mozilla/5.0"}"#).unwrap();
        assert!(partial.online_status);
        assert_eq!(
            partial,
            DeviceSignal {
                user_agent: "Mozilla/5.0".to_string(),
                ..Default::default()
            }
        );
    }
}
