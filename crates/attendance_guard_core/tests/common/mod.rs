//! In-memory port fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use attendance_guard_core::{
    AttendanceHistoryStore, AttendanceLedger, AttendanceRecord, AuditSink, CheckInClaim,
    ClaimedLocation, Coordinate, DeviceSignal, LocationHistoryEntry, NewAttendance, PortError,
    PortResult, RegisteredLocation, SecurityEvent, SessionStore, SessionWindow,
};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

pub const CLASSROOM: Coordinate = Coordinate {
    lat: -1.2921,
    lng: 36.8219,
};
pub const CODE: &str = "SESSION_CS101_1717000000000";
pub const CAMPUS_TZ: &str = "Africa/Nairobi";

pub fn north_of(origin: Coordinate, meters: f64) -> Coordinate {
    let d_lat = (meters / attendance_guard_core::geo::EARTH_RADIUS_M).to_degrees();
    Coordinate::new(origin.lat + d_lat, origin.lng)
}

/// An active session that started 20 minutes ago at the classroom.
pub fn running_session() -> SessionWindow {
    let now = Utc::now();
    SessionWindow {
        session_id: Uuid::new_v4(),
        registered_location: Some(RegisteredLocation::Coordinates(CLASSROOM)),
        start_time: now - Duration::minutes(20),
        end_time: now + Duration::minutes(40),
        active: true,
        qr_code: Some(CODE.to_string()),
    }
}

const IPHONE_SAFARI: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) \
    AppleWebKit/605.1.15 Mobile/15E148 Safari/604.1";

pub fn clean_device() -> DeviceSignal {
    DeviceSignal {
        user_agent: IPHONE_SAFARI.to_string(),
        screen_resolution: "390x844".to_string(),
        color_depth: Some(24),
        timezone: CAMPUS_TZ.to_string(),
        language: "en-KE".to_string(),
        platform: "iPhone".to_string(),
        canvas_fingerprint: Some("c4nv45".to_string()),
        cookies_enabled: true,
        online_status: true,
        scan_duration_ms: Some(2800),
        gps_accuracy_m: Some(8.0),
    }
}

pub fn claim_at(session: &SessionWindow, claimant_id: Uuid, at: Coordinate) -> CheckInClaim {
    CheckInClaim {
        claimant_id,
        session_id: session.session_id,
        claimed_code: CODE.to_string(),
        claimed_location: Some(ClaimedLocation {
            lat: at.lat,
            lng: at.lng,
            accuracy: Some(8.0),
        }),
        device_signal: Some(clean_device()),
        client_timestamp: Utc::now(),
    }
}

#[derive(Default)]
pub struct InMemorySessions {
    pub sessions: HashMap<Uuid, SessionWindow>,
}

impl InMemorySessions {
    pub fn with(sessions: impl IntoIterator<Item = SessionWindow>) -> Self {
        Self {
            sessions: sessions.into_iter().map(|s| (s.session_id, s)).collect(),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessions {
    async fn get_session(&self, session_id: Uuid) -> PortResult<SessionWindow> {
        self.sessions
            .get(&session_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))
    }

    async fn find_session_by_code(&self, code: &str) -> PortResult<SessionWindow> {
        self.sessions
            .values()
            .find(|s| s.qr_code.as_deref() == Some(code))
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Session with code {} not found", code)))
    }
}

#[derive(Default)]
pub struct InMemoryHistory {
    pub locations: Vec<LocationHistoryEntry>,
    pub timestamps: Vec<(Uuid, DateTime<Utc>)>,
}

#[async_trait]
impl AttendanceHistoryStore for InMemoryHistory {
    async fn get_recent_locations(
        &self,
        claimant_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<LocationHistoryEntry>> {
        let mut entries: Vec<_> = self
            .locations
            .iter()
            .filter(|e| e.claimant_id == claimant_id && e.recorded_at >= since)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(entries)
    }

    async fn get_attendance_timestamps(
        &self,
        claimant_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<DateTime<Utc>>> {
        let mut stamps: Vec<_> = self
            .timestamps
            .iter()
            .filter(|(id, at)| *id == claimant_id && *at >= since)
            .map(|(_, at)| *at)
            .collect();
        stamps.sort_by(|a, b| b.cmp(a));
        Ok(stamps)
    }
}

/// Every lookup fails as if the database were down.
pub struct UnavailableStore;

#[async_trait]
impl SessionStore for UnavailableStore {
    async fn get_session(&self, _session_id: Uuid) -> PortResult<SessionWindow> {
        Err(PortError::Unexpected("connection refused".to_string()))
    }

    async fn find_session_by_code(&self, _code: &str) -> PortResult<SessionWindow> {
        Err(PortError::Unexpected("connection refused".to_string()))
    }
}

#[async_trait]
impl AttendanceHistoryStore for UnavailableStore {
    async fn get_recent_locations(
        &self,
        _claimant_id: Uuid,
        _since: DateTime<Utc>,
    ) -> PortResult<Vec<LocationHistoryEntry>> {
        Err(PortError::Unexpected("connection refused".to_string()))
    }

    async fn get_attendance_timestamps(
        &self,
        _claimant_id: Uuid,
        _since: DateTime<Utc>,
    ) -> PortResult<Vec<DateTime<Utc>>> {
        Err(PortError::Unexpected("connection refused".to_string()))
    }
}

/// Answers correctly, but only after `delay`.
pub struct SlowSessions {
    pub inner: InMemorySessions,
    pub delay: StdDuration,
}

#[async_trait]
impl SessionStore for SlowSessions {
    async fn get_session(&self, session_id: Uuid) -> PortResult<SessionWindow> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_session(session_id).await
    }

    async fn find_session_by_code(&self, code: &str) -> PortResult<SessionWindow> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_session_by_code(code).await
    }
}

#[derive(Default)]
pub struct InMemoryLedger {
    pub records: Mutex<Vec<AttendanceRecord>>,
    /// When set, writes against any other session fail with `NotFound`.
    pub known_sessions: Option<Vec<Uuid>>,
}

impl InMemoryLedger {
    pub fn for_sessions(sessions: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            records: Mutex::default(),
            known_sessions: Some(sessions.into_iter().collect()),
        }
    }
}

#[async_trait]
impl AttendanceLedger for InMemoryLedger {
    async fn has_attendance(&self, claimant_id: Uuid, session_id: Uuid) -> PortResult<bool> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .any(|r| r.claimant_id == claimant_id && r.session_id == session_id))
    }

    async fn record_attendance(&self, attendance: NewAttendance) -> PortResult<AttendanceRecord> {
        if let Some(known) = &self.known_sessions {
            if !known.contains(&attendance.session_id) {
                return Err(PortError::NotFound(format!(
                    "Session {} not found",
                    attendance.session_id
                )));
            }
        }
        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            claimant_id: attendance.claimant_id,
            session_id: attendance.session_id,
            status: "present".to_string(),
            marked_at: attendance.marked_at,
        };
        self.records.lock().await.push(record.clone());
        Ok(record)
    }
}

#[derive(Default)]
pub struct CollectingSink {
    pub events: Mutex<Vec<SecurityEvent>>,
}

#[async_trait]
impl AuditSink for CollectingSink {
    async fn log_security_event(&self, event: &SecurityEvent) -> PortResult<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
