//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use attendance_guard_core::{AttendanceGate, AuditLogger, RiskEngine, SessionStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<dyn SessionStore>,
    pub engine: Arc<RiskEngine>,
    pub gate: Arc<AttendanceGate>,
    pub audit: AuditLogger,
    /// Root token; cancelled on shutdown. Each request works under a child of it.
    pub shutdown: CancellationToken,
}
