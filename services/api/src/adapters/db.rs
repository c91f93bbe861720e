//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! session, history, ledger and audit ports from the `core` crate. It handles all
//! interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use attendance_guard_core::audit::SecurityEvent;
use attendance_guard_core::domain::{
    AttendanceRecord, Coordinate, LocationHistoryEntry, NewAttendance, RegisteredLocation,
    SessionWindow,
};
use attendance_guard_core::ports::{
    AttendanceHistoryStore, AttendanceLedger, AuditSink, PortError, PortResult, SessionStore,
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Cap on location rows pulled for the impossible-travel check.
const RECENT_LOCATION_LIMIT: i64 = 5;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the core's storage ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    location: Option<String>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    is_active: bool,
    qr_code: Option<String>,
}
impl SessionRecord {
    fn to_domain(self) -> SessionWindow {
        SessionWindow {
            session_id: self.id,
            registered_location: self
                .location
                .filter(|raw| !raw.trim().is_empty())
                .map(|raw| RegisteredLocation::parse(&raw)),
            start_time: self.start_time,
            end_time: self.end_time,
            active: self.is_active,
            qr_code: self.qr_code,
        }
    }
}

#[derive(FromRow)]
struct LocationRecord {
    student_id: Uuid,
    session_id: Uuid,
    location_lat: f64,
    location_lng: f64,
    marked_at: DateTime<Utc>,
}
impl LocationRecord {
    fn to_domain(self) -> LocationHistoryEntry {
        LocationHistoryEntry {
            claimant_id: self.student_id,
            location: Coordinate::new(self.location_lat, self.location_lng),
            recorded_at: self.marked_at,
            session_id: self.session_id,
        }
    }
}

#[derive(FromRow)]
struct AttendanceRow {
    id: Uuid,
    student_id: Uuid,
    session_id: Uuid,
    status: String,
    marked_at: DateTime<Utc>,
}
impl AttendanceRow {
    fn to_domain(self) -> AttendanceRecord {
        AttendanceRecord {
            id: self.id,
            claimant_id: self.student_id,
            session_id: self.session_id,
            status: self.status,
            marked_at: self.marked_at,
        }
    }
}

const SESSION_COLUMNS: &str = "id, location, start_time, end_time, is_active, qr_code";

//=========================================================================================
// Port Implementations
//=========================================================================================

#[async_trait]
impl SessionStore for DbAdapter {
    async fn get_session(&self, session_id: Uuid) -> PortResult<SessionWindow> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))?;
        Ok(record.to_domain())
    }

    async fn find_session_by_code(&self, code: &str) -> PortResult<SessionWindow> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE qr_code = $1 AND is_active \
             ORDER BY start_time DESC LIMIT 1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("No active session for code {}", code)))?;
        Ok(record.to_domain())
    }
}

#[async_trait]
impl AttendanceHistoryStore for DbAdapter {
    async fn get_recent_locations(
        &self,
        claimant_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<LocationHistoryEntry>> {
        let records = sqlx::query_as::<_, LocationRecord>(
            "SELECT student_id, session_id, location_lat, location_lng, marked_at \
             FROM attendance \
             WHERE student_id = $1 AND marked_at >= $2 \
               AND location_lat IS NOT NULL AND location_lng IS NOT NULL \
             ORDER BY marked_at DESC LIMIT $3",
        )
        .bind(claimant_id)
        .bind(since)
        .bind(RECENT_LOCATION_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_attendance_timestamps(
        &self,
        claimant_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<DateTime<Utc>>> {
        sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT marked_at FROM attendance \
             WHERE student_id = $1 AND marked_at >= $2 \
             ORDER BY marked_at DESC",
        )
        .bind(claimant_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)
    }
}

#[async_trait]
impl AttendanceLedger for DbAdapter {
    async fn has_attendance(&self, claimant_id: Uuid, session_id: Uuid) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM attendance WHERE student_id = $1 AND session_id = $2)",
        )
        .bind(claimant_id)
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn record_attendance(&self, attendance: NewAttendance) -> PortResult<AttendanceRecord> {
        let record = sqlx::query_as::<_, AttendanceRow>(
            "INSERT INTO attendance \
               (id, student_id, session_id, class_name, faculty_id, status, qr_code_used, \
                location_lat, location_lng, marked_at) \
             SELECT $1, $2, s.id, s.class_name, s.faculty_id, 'present', $3, $4, $5, $6 \
             FROM sessions s WHERE s.id = $7 \
             RETURNING id, student_id, session_id, status, marked_at",
        )
        .bind(Uuid::new_v4())
        .bind(attendance.claimant_id)
        .bind(&attendance.claimed_code)
        .bind(attendance.location.map(|c| c.lat))
        .bind(attendance.location.map(|c| c.lng))
        .bind(attendance.marked_at)
        .bind(attendance.session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => PortError::Conflict(format!(
                "Attendance for {} in session {} already exists",
                attendance.claimant_id, attendance.session_id
            )),
            other => unexpected(other),
        })?
        .ok_or_else(|| {
            PortError::NotFound(format!("Session {} not found", attendance.session_id))
        })?;

        Ok(record.to_domain())
    }
}

#[async_trait]
impl AuditSink for DbAdapter {
    async fn log_security_event(&self, event: &SecurityEvent) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO security_events \
               (event_type, claimant_id, session_id, payload, occurred_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(event.event_type.as_str())
        .bind(event.claimant_id)
        .bind(event.session_id)
        .bind(&event.payload)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}
