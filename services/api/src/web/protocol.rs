//! services/api/src/web/protocol.rs
//!
//! Defines the JSON request and response bodies exchanged between the scanner
//! client and the API server.

use attendance_guard_core::domain::{CheckInClaim, ClaimedLocation, DeviceSignal, FraudVerdict};
use attendance_guard_core::patterns::PatternReport;
use attendance_guard_core::{CheckInOutcome, ReasonCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Payloads Sent FROM the Client TO the Server
//=========================================================================================

/// A GPS fix as reported by the browser geolocation API.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, ToSchema)]
pub struct LocationPayload {
    pub lat: f64,
    pub lng: f64,
    /// Horizontal accuracy in meters.
    #[serde(default)]
    pub accuracy: Option<f64>,
}

impl From<LocationPayload> for ClaimedLocation {
    fn from(p: LocationPayload) -> Self {
        ClaimedLocation {
            lat: p.lat,
            lng: p.lng,
            accuracy: p.accuracy,
        }
    }
}

/// A scan submitted by the claimant.
#[derive(Deserialize, Debug, Clone, ToSchema)]
pub struct CheckInRequest {
    /// Raw text decoded from the QR image.
    pub qr_payload: String,
    /// Session the scanner believes it is in. Resolved from the code when absent.
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub location: Option<LocationPayload>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub device_signal: Option<DeviceSignal>,
    /// Client clock at scan time. Defaults to the server receive time.
    #[serde(default)]
    pub client_timestamp: Option<DateTime<Utc>>,
}

impl CheckInRequest {
    pub fn into_claim(
        self,
        claimant_id: Uuid,
        session_id: Uuid,
        claimed_code: String,
        received_at: DateTime<Utc>,
    ) -> CheckInClaim {
        CheckInClaim {
            claimant_id,
            session_id,
            claimed_code,
            claimed_location: self.location.map(ClaimedLocation::from),
            device_signal: self.device_signal,
            client_timestamp: self.client_timestamp.unwrap_or(received_at),
        }
    }
}

/// A security-relevant event observed by the client (failed scans, denied GPS).
#[derive(Deserialize, Debug, Clone, ToSchema)]
pub struct SecurityEventRequest {
    pub event_type: String,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

//=========================================================================================
// Payloads Sent FROM the Server TO the Client
//=========================================================================================

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct VerdictResponse {
    pub fraud_score: u32,
    pub reasons: Vec<String>,
    #[schema(value_type = Vec<String>)]
    pub reason_codes: Vec<ReasonCode>,
    pub is_suspicious: bool,
    pub location_verified: bool,
    /// True when detection could not run and the claim was let through.
    pub degraded: bool,
}

impl From<FraudVerdict> for VerdictResponse {
    fn from(v: FraudVerdict) -> Self {
        Self {
            fraud_score: v.fraud_score,
            reasons: v.reasons,
            reason_codes: v.reason_codes,
            is_suspicious: v.is_suspicious,
            location_verified: v.location_verified,
            degraded: v.degraded,
        }
    }
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct CheckInResponse {
    pub attendance_id: Uuid,
    pub session_id: Uuid,
    pub status: String,
    pub marked_at: DateTime<Utc>,
    pub verdict: VerdictResponse,
}

impl From<CheckInOutcome> for CheckInResponse {
    fn from(outcome: CheckInOutcome) -> Self {
        Self {
            attendance_id: outcome.record.id,
            session_id: outcome.record.session_id,
            status: outcome.record.status,
            marked_at: outcome.record.marked_at,
            verdict: outcome.verdict.into(),
        }
    }
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct PatternReportResponse {
    pub patterns: Vec<String>,
    pub risk_score: u32,
    pub total_records: usize,
}

impl From<PatternReport> for PatternReportResponse {
    fn from(r: PatternReport) -> Self {
        Self {
            patterns: r.patterns,
            risk_score: r.risk_score,
            total_records: r.total_records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn check_in_request_accepts_a_minimal_body() {
        let req: CheckInRequest = serde_json::from_str(r#"{"qr_payload":"ABC123"}"#).unwrap();
        assert_eq!(req.qr_payload, "ABC123");
        assert!(req.session_id.is_none());
        assert!(req.location.is_none());
        assert!(req.device_signal.is_none());
    }

    #[test]
    fn missing_client_timestamp_falls_back_to_receive_time() {
        let received = Utc.with_ymd_and_hms(2024, 9, 2, 9, 5, 0).unwrap();
        let req: CheckInRequest = serde_json::from_str(
            r#"{"qr_payload":"ABC123","location":{"lat":-1.28,"lng":36.82,"accuracy":12.0},
                "device_signal":{"user_agent":"Mozilla/5.0","scan_duration_ms":2400}}"#,
        )
        .unwrap();

        let claim = req.into_claim(Uuid::new_v4(), Uuid::new_v4(), "ABC123".into(), received);
        assert_eq!(claim.client_timestamp, received);
        assert_eq!(claim.claimed_location.and_then(|l| l.accuracy), Some(12.0));
        let signal = claim.device_signal.unwrap();
        assert_eq!(signal.scan_duration_ms, Some(2400));
        assert!(signal.online_status);
    }

    #[test]
    fn verdict_response_serializes_reason_codes_in_snake_case() {
        let verdict = FraudVerdict::unavailable("session lookup timed out");
        let body = serde_json::to_value(VerdictResponse::from(verdict)).unwrap();
        assert_eq!(body["fraud_score"], 0);
        assert_eq!(body["degraded"], true);
        assert_eq!(body["reason_codes"][0], "detection_unavailable");
    }
}
