//! crates/attendance_guard_core/src/gate.rs
//!
//! The attendance-write path: validate the claim, score it, audit the outcome and
//! only then write. Fraud scoring runs before the duplicate check, and both must
//! pass for a record to be written.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::audit::{AuditLogger, SecurityEvent, SecurityEventKind};
use crate::domain::{AttendanceRecord, CheckInClaim, FraudVerdict, NewAttendance};
use crate::engine::{Evaluation, RiskEngine, SessionStatus};
use crate::ports::{AttendanceLedger, PortError};
use crate::validation::{validate_claim, ValidationError, ValidationPolicy};

/// Default score at or above which attendance is refused.
pub const DEFAULT_REJECT_THRESHOLD: u32 = 70;

#[derive(Debug, Clone)]
pub struct GatePolicy {
    pub reject_threshold: u32,
    pub validation: ValidationPolicy,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            reject_threshold: DEFAULT_REJECT_THRESHOLD,
            validation: ValidationPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CheckInError {
    #[error("Invalid check-in: {0}")]
    Invalid(#[from] ValidationError),

    /// Routine outcome: the verdict crossed the reject threshold.
    #[error("Attendance declined: {}", .verdict.joined_reasons())]
    Rejected { verdict: FraudVerdict },

    #[error("Attendance already marked for this session")]
    AlreadyMarked { verdict: FraudVerdict },

    /// The claimed session does not exist, so there is nothing to mark.
    #[error("Invalid or expired QR code")]
    UnknownSession { verdict: FraudVerdict },

    #[error("Check-in cancelled")]
    Cancelled,

    #[error("Attendance store error: {0}")]
    Port(#[from] PortError),
}

#[derive(Debug, Clone)]
pub struct CheckInOutcome {
    pub record: AttendanceRecord,
    pub verdict: FraudVerdict,
}

pub struct AttendanceGate {
    engine: Arc<RiskEngine>,
    ledger: Arc<dyn AttendanceLedger>,
    audit: AuditLogger,
    policy: GatePolicy,
}

impl AttendanceGate {
    pub fn new(
        engine: Arc<RiskEngine>,
        ledger: Arc<dyn AttendanceLedger>,
        audit: AuditLogger,
        policy: GatePolicy,
    ) -> Self {
        Self {
            engine,
            ledger,
            audit,
            policy,
        }
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    pub async fn check_in(
        &self,
        claim: CheckInClaim,
        token: &CancellationToken,
    ) -> Result<CheckInOutcome, CheckInError> {
        if let Err(e) = validate_claim(&claim, &self.policy.validation, Utc::now()) {
            warn!(claimant_id = %claim.claimant_id, "Rejecting malformed claim: {}", e);
            self.audit.record(SecurityEvent::new(
                SecurityEventKind::InvalidClaim,
                claim.claimant_id,
                Some(claim.session_id),
                json!({ "error": e.to_string() }),
            ));
            return Err(e.into());
        }

        let Evaluation { verdict, session } = self
            .engine
            .assess_claim_cancellable(&claim, token)
            .await
            .map_err(|_| CheckInError::Cancelled)?;

        if verdict.degraded {
            self.audit.record(self.event(SecurityEventKind::DetectionDegraded, &claim, &verdict));
        }

        if !verdict.permits_write(self.policy.reject_threshold) {
            info!(
                claimant_id = %claim.claimant_id,
                session_id = %claim.session_id,
                fraud_score = verdict.fraud_score,
                "Attendance rejected"
            );
            self.audit.record(self.event(SecurityEventKind::AttendanceRejected, &claim, &verdict));
            return Err(CheckInError::Rejected { verdict });
        }

        if session == SessionStatus::Missing {
            return Err(self.unknown_session(&claim, verdict));
        }

        if self.ledger.has_attendance(claim.claimant_id, claim.session_id).await? {
            self.audit.record(self.event(SecurityEventKind::DuplicateAttendance, &claim, &verdict));
            return Err(CheckInError::AlreadyMarked { verdict });
        }

        let attendance = NewAttendance {
            claimant_id: claim.claimant_id,
            session_id: claim.session_id,
            claimed_code: claim.claimed_code.clone(),
            location: claim.claimed_location.map(|l| l.coordinate()),
            marked_at: Utc::now(),
        };
        let record = match self.ledger.record_attendance(attendance).await {
            Ok(record) => record,
            Err(PortError::Conflict(_)) => {
                let event = self.event(SecurityEventKind::DuplicateAttendance, &claim, &verdict);
                self.audit.record(event);
                return Err(CheckInError::AlreadyMarked { verdict });
            }
            // Reachable when the session lookup was degraded and the write found no session.
            Err(PortError::NotFound(_)) => return Err(self.unknown_session(&claim, verdict)),
            Err(e) => {
                error!(claimant_id = %claim.claimant_id, "Failed to record attendance: {:?}", e);
                return Err(e.into());
            }
        };

        self.audit.record(self.event(SecurityEventKind::AttendanceAccepted, &claim, &verdict));
        info!(
            claimant_id = %claim.claimant_id,
            session_id = %claim.session_id,
            attendance_id = %record.id,
            fraud_score = verdict.fraud_score,
            "Attendance recorded"
        );
        Ok(CheckInOutcome { record, verdict })
    }

    fn unknown_session(&self, claim: &CheckInClaim, verdict: FraudVerdict) -> CheckInError {
        warn!(
            claimant_id = %claim.claimant_id,
            session_id = %claim.session_id,
            "Refusing attendance for an unknown session"
        );
        self.audit.record(self.event(SecurityEventKind::InvalidClaim, claim, &verdict));
        CheckInError::UnknownSession { verdict }
    }

    /// Audit entry carrying the verdict and the raw signals it was computed from.
    fn event(
        &self,
        kind: SecurityEventKind,
        claim: &CheckInClaim,
        verdict: &FraudVerdict,
    ) -> SecurityEvent {
        SecurityEvent::new(
            kind,
            claim.claimant_id,
            Some(claim.session_id),
            json!({
                "verdict": verdict,
                "claimed_code": claim.claimed_code,
                "claimed_location": claim.claimed_location,
                "device_signal": claim.device_signal,
                "client_timestamp": claim.client_timestamp,
            }),
        )
    }
}
