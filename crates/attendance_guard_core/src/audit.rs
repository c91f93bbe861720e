//! Security audit dispatch.
//!
//! Events are handed to a bounded channel and written by a background worker, so
//! the attendance path never waits on the audit sink. A full queue or a failing sink
//! is logged locally and otherwise ignored.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::ports::AuditSink;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    AttendanceAccepted,
    AttendanceRejected,
    DuplicateAttendance,
    InvalidClaim,
    DetectionDegraded,
    /// Free-form event type reported by a client.
    Client(String),
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::AttendanceAccepted => "attendance_accepted",
            Self::AttendanceRejected => "attendance_rejected",
            Self::DuplicateAttendance => "duplicate_attendance",
            Self::InvalidClaim => "invalid_claim",
            Self::DetectionDegraded => "detection_degraded",
            Self::Client(kind) => kind,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub event_type: SecurityEventKind,
    pub claimant_id: Uuid,
    pub session_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(
        event_type: SecurityEventKind,
        claimant_id: Uuid,
        session_id: Option<Uuid>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type,
            claimant_id,
            session_id,
            payload,
            occurred_at: Utc::now(),
        }
    }
}

/// Fire-and-forget handle onto the audit worker. Cheap to clone.
#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::Sender<SecurityEvent>,
}

impl AuditLogger {
    /// Starts the worker. It runs until `shutdown` is cancelled (then drains what is
    /// queued) or until every logger handle is dropped.
    pub fn spawn(
        sink: Arc<dyn AuditSink>,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(sink, rx, shutdown));
        (Self { tx }, handle)
    }

    /// Queues an event without waiting.
    pub fn record(&self, event: SecurityEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    event_type = event.event_type.as_str(),
                    claimant_id = %event.claimant_id,
                    "Audit queue full, dropping security event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(
                    event_type = event.event_type.as_str(),
                    claimant_id = %event.claimant_id,
                    "Audit worker stopped, dropping security event"
                );
            }
        }
    }
}

async fn run_worker(
    sink: Arc<dyn AuditSink>,
    mut rx: mpsc::Receiver<SecurityEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            maybe_event = rx.recv() => match maybe_event {
                Some(event) => deliver(sink.as_ref(), &event).await,
                None => break,
            },
            _ = shutdown.cancelled() => {
                rx.close();
                while let Some(event) = rx.recv().await {
                    deliver(sink.as_ref(), &event).await;
                }
                break;
            }
        }
    }
    info!("Audit worker stopped.");
}

async fn deliver(sink: &dyn AuditSink, event: &SecurityEvent) {
    if let Err(e) = sink.log_security_event(event).await {
        error!(
            event_type = event.event_type.as_str(),
            claimant_id = %event.claimant_id,
            "Failed to write security event: {:?}",
            e
        );
    }
}
