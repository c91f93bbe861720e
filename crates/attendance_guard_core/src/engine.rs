//! crates/attendance_guard_core/src/engine.rs
//!
//! The risk aggregator. Resolves the session and the claimant's history, runs every
//! analyzer and folds their findings into one `FraudVerdict`.
//!
//! Lookups are issued concurrently, each under its own timeout. Any lookup failure
//! fails open: the verdict carries score 0 and a "detection unavailable" reason so
//! the attendance write is never blocked by a degraded detector.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assessment::{Assessment, ReasonCode};
use crate::device::{analyze_device, DeviceRules};
use crate::domain::{CheckInClaim, FraudVerdict, LocationHistoryEntry, SessionWindow};
use crate::location::{verify_location, TRAVEL_LOOKBACK_HOURS};
use crate::patterns::{analyze_patterns, pattern_report, PatternReport, CLUSTER_LOOKBACK_DAYS};
use crate::ports::{AttendanceHistoryStore, PortError, PortResult, SessionStore};
use crate::timing::validate_timing;

pub const SESSION_INVALID_PENALTY: u32 = 40;

/// Tunables for the engine. Scoring thresholds live with each analyzer.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Upper bound for each data-store lookup.
    pub lookup_timeout: StdDuration,
    /// IANA timezone devices are expected to report; `None` disables the check.
    pub expected_timezone: Option<String>,
    pub capture_rules: DeviceRules,
    pub server_rules: DeviceRules,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            lookup_timeout: StdDuration::from_secs(2),
            expected_timezone: None,
            capture_rules: DeviceRules::capture(),
            server_rules: DeviceRules::server_recheck(),
        }
    }
}

/// Why a verdict could not be computed normally.
#[derive(Debug, thiserror::Error)]
pub enum Degradation {
    #[error("{lookup} lookup timed out")]
    Timeout { lookup: &'static str },
    #[error("{lookup} lookup failed: {source}")]
    Lookup {
        lookup: &'static str,
        #[source]
        source: PortError,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("Evaluation cancelled")]
pub struct EvaluationCancelled;

/// Whether the claimed session was found while scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Found,
    /// The store answered and has no such session.
    Missing,
    /// The session lookup itself failed or timed out.
    Unknown,
}

impl SessionStatus {
    fn of(session: &Option<SessionWindow>) -> Self {
        match session {
            Some(_) => Self::Found,
            None => Self::Missing,
        }
    }
}

/// A verdict plus what the engine learned about the claimed session.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub verdict: FraudVerdict,
    pub session: SessionStatus,
}

pub struct RiskEngine {
    sessions: Arc<dyn SessionStore>,
    history: Arc<dyn AttendanceHistoryStore>,
    settings: EngineSettings,
}

impl RiskEngine {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        history: Arc<dyn AttendanceHistoryStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            sessions,
            history,
            settings,
        }
    }

    /// Scores a claim. Never fails: a degraded detector yields a fail-open verdict.
    pub async fn evaluate(&self, claim: &CheckInClaim) -> FraudVerdict {
        self.assess_claim(claim).await.verdict
    }

    /// Like `evaluate`, but gives up as soon as `token` is cancelled.
    pub async fn evaluate_cancellable(
        &self,
        claim: &CheckInClaim,
        token: &CancellationToken,
    ) -> Result<FraudVerdict, EvaluationCancelled> {
        self.assess_claim_cancellable(claim, token)
            .await
            .map(|evaluation| evaluation.verdict)
    }

    /// Scores a claim and reports whether its session could be resolved.
    pub async fn assess_claim(&self, claim: &CheckInClaim) -> Evaluation {
        let claim_time = claim.client_timestamp;
        let (session, locations, timestamps) = tokio::join!(
            self.resolve_session(claim.session_id),
            self.bounded(
                "location history",
                self.history.get_recent_locations(
                    claim.claimant_id,
                    claim_time - Duration::hours(TRAVEL_LOOKBACK_HOURS),
                ),
            ),
            self.bounded(
                "attendance history",
                self.history.get_attendance_timestamps(
                    claim.claimant_id,
                    claim_time - Duration::days(CLUSTER_LOOKBACK_DAYS),
                ),
            ),
        );

        let (session, locations, timestamps) = match (session, locations, timestamps) {
            (Ok(s), Ok(l), Ok(t)) => (s, l, t),
            (Err(d), _, _) => return fail_open(claim, SessionStatus::Unknown, d),
            (Ok(s), Err(d), _) | (Ok(s), Ok(_), Err(d)) => {
                return fail_open(claim, SessionStatus::of(&s), d)
            }
        };

        let status = SessionStatus::of(&session);
        let assessment = self.score(claim, session.as_ref(), &locations, &timestamps);
        let verdict = FraudVerdict::from_findings(assessment.into_findings());
        info!(
            claimant_id = %claim.claimant_id,
            session_id = %claim.session_id,
            fraud_score = verdict.fraud_score,
            suspicious = verdict.is_suspicious,
            "Claim evaluated"
        );
        Evaluation {
            verdict,
            session: status,
        }
    }

    /// Like `assess_claim`, but in-flight lookups are dropped as soon as `token` is
    /// cancelled and nothing partial is returned.
    pub async fn assess_claim_cancellable(
        &self,
        claim: &CheckInClaim,
        token: &CancellationToken,
    ) -> Result<Evaluation, EvaluationCancelled> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(claimant_id = %claim.claimant_id, "Evaluation cancelled");
                Err(EvaluationCancelled)
            }
            evaluation = self.assess_claim(claim) => Ok(evaluation),
        }
    }

    /// Pattern analysis over a claimant's recorded history, for reviewers.
    pub async fn analyze_claimant(
        &self,
        claimant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PatternReport, Degradation> {
        let timestamps = self
            .bounded(
                "attendance history",
                self.history.get_attendance_timestamps(
                    claimant_id,
                    now - Duration::days(CLUSTER_LOOKBACK_DAYS),
                ),
            )
            .await?;
        Ok(pattern_report(now, &timestamps))
    }

    /// Runs the analyzers in order: session, timing, location, device, patterns.
    fn score(
        &self,
        claim: &CheckInClaim,
        session: Option<&SessionWindow>,
        locations: &[LocationHistoryEntry],
        timestamps: &[DateTime<Utc>],
    ) -> Assessment {
        let mut assessment = Assessment::new();
        let claim_time = claim.client_timestamp;

        match session.filter(|s| s.accepts_code(&claim.claimed_code)) {
            None => assessment.flag(
                ReasonCode::SessionInvalid,
                SESSION_INVALID_PENALTY,
                "Session not found or invalid",
            ),
            Some(window) => {
                assessment.merge(validate_timing(claim_time, Some(window)));
                if let Some(location) = &claim.claimed_location {
                    let accuracy = location.accuracy.or_else(|| {
                        claim.device_signal.as_ref().and_then(|d| d.gps_accuracy_m)
                    });
                    assessment.merge(verify_location(
                        location, accuracy, window, locations, claim_time,
                    ));
                }
            }
        }

        if let Some(signal) = &claim.device_signal {
            let expected_timezone = self.settings.expected_timezone.as_deref();
            for rules in [&self.settings.capture_rules, &self.settings.server_rules] {
                assessment.merge(analyze_device(signal, expected_timezone, rules));
            }
        }

        assessment.merge(analyze_patterns(claim_time, timestamps));
        assessment
    }

    /// A missing session is an ordinary outcome (`Ok(None)`); anything else that
    /// goes wrong is a degradation.
    async fn resolve_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<SessionWindow>, Degradation> {
        let lookup = self.sessions.get_session(session_id);
        match tokio::time::timeout(self.settings.lookup_timeout, lookup).await {
            Ok(Ok(window)) => Ok(Some(window)),
            Ok(Err(PortError::NotFound(_))) => Ok(None),
            Ok(Err(source)) => Err(Degradation::Lookup {
                lookup: "session",
                source,
            }),
            Err(_) => Err(Degradation::Timeout { lookup: "session" }),
        }
    }

    async fn bounded<T>(
        &self,
        lookup: &'static str,
        fut: impl Future<Output = PortResult<T>>,
    ) -> Result<T, Degradation> {
        match tokio::time::timeout(self.settings.lookup_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(Degradation::Lookup { lookup, source }),
            Err(_) => Err(Degradation::Timeout { lookup }),
        }
    }
}

fn fail_open(claim: &CheckInClaim, session: SessionStatus, degradation: Degradation) -> Evaluation {
    warn!(
        claimant_id = %claim.claimant_id,
        session_id = %claim.session_id,
        "Fraud detection degraded, failing open: {}",
        degradation
    );
    Evaluation {
        verdict: FraudVerdict::unavailable(degradation),
        session,
    }
}
