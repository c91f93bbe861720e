pub mod assessment;
pub mod audit;
pub mod device;
pub mod domain;
pub mod engine;
pub mod gate;
pub mod geo;
pub mod location;
pub mod patterns;
pub mod ports;
pub mod qr;
pub mod timing;
pub mod validation;

pub use assessment::{Assessment, Finding, ReasonCode};
pub use audit::{AuditLogger, SecurityEvent, SecurityEventKind};
pub use domain::{
    AttendanceRecord, CheckInClaim, ClaimedLocation, Coordinate, DeviceSignal, FraudVerdict,
    LocationHistoryEntry, NewAttendance, RegisteredLocation, SessionWindow,
};
pub use engine::{
    Degradation, EngineSettings, Evaluation, EvaluationCancelled, RiskEngine, SessionStatus,
};
pub use gate::{AttendanceGate, CheckInError, CheckInOutcome, GatePolicy};
pub use ports::{
    AttendanceHistoryStore, AttendanceLedger, AuditSink, PortError, PortResult, SessionStore,
};
pub use validation::{ValidationError, ValidationPolicy};
