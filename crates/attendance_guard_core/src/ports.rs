//! crates/attendance_guard_core/src/ports.rs
//!
//! Defines the service contracts (traits) the engine depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to stay independent of the database and transport the deployment uses.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::audit::SecurityEvent;
use crate::domain::{AttendanceRecord, LocationHistoryEntry, NewAttendance, SessionWindow};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflicting record: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Read-only view of class sessions, owned by the session-management collaborator.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self, session_id: Uuid) -> PortResult<SessionWindow>;

    /// Looks a session up by the code printed in its QR image.
    async fn find_session_by_code(&self, code: &str) -> PortResult<SessionWindow>;
}

/// Past attendance marks, which double as the claimant's location history.
#[async_trait]
pub trait AttendanceHistoryStore: Send + Sync {
    /// Marks with a recorded location since `since`, newest first.
    async fn get_recent_locations(
        &self,
        claimant_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<LocationHistoryEntry>>;

    /// Mark timestamps since `since`, newest first.
    async fn get_attendance_timestamps(
        &self,
        claimant_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<DateTime<Utc>>>;
}

/// Where accepted attendance is written.
#[async_trait]
pub trait AttendanceLedger: Send + Sync {
    async fn has_attendance(&self, claimant_id: Uuid, session_id: Uuid) -> PortResult<bool>;

    /// Persists a record. A second record for the same claimant and session is a
    /// `PortError::Conflict`.
    async fn record_attendance(&self, attendance: NewAttendance) -> PortResult<AttendanceRecord>;
}

/// Durable destination for security events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_security_event(&self, event: &SecurityEvent) -> PortResult<()>;
}
