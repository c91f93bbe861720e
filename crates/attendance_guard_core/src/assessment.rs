//! crates/attendance_guard_core/src/assessment.rs
//!
//! Penalty bookkeeping shared by every analyzer. Each finding is a named,
//! non-negative contribution, so a score can always be explained line by line.

use serde::{Deserialize, Serialize};

/// Machine-readable companion to a finding's human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    SessionInvalid,
    MarkedTooEarly,
    MarkedTooLate,
    OutsideGeofence,
    SessionLocationUnverifiable,
    ImpossibleTravel,
    LowGpsAccuracy,
    FastScan,
    AutomationMarker,
    DeviceOffline,
    TimezoneMismatch,
    RapidSuccession,
    AttendanceClustering,
    DetectionUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub code: ReasonCode,
    pub penalty: u32,
    pub message: String,
}

impl Finding {
    pub fn new(code: ReasonCode, penalty: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            penalty,
            message: message.into(),
        }
    }
}

/// The `{penalty, reasons}` result of one analyzer, in the order its checks ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assessment {
    findings: Vec<Finding>,
}

impl Assessment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(&mut self, code: ReasonCode, penalty: u32, message: impl Into<String>) {
        self.findings.push(Finding::new(code, penalty, message));
    }

    pub fn merge(&mut self, other: Assessment) {
        self.findings.extend(other.findings);
    }

    pub fn penalty(&self) -> u32 {
        self.findings.iter().map(|f| f.penalty).sum()
    }

    pub fn reasons(&self) -> Vec<&str> {
        self.findings.iter().map(|f| f.message.as_str()).collect()
    }

    pub fn has(&self, code: ReasonCode) -> bool {
        self.findings.iter().any(|f| f.code == code)
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn into_findings(self) -> Vec<Finding> {
        self.findings
    }
}
