//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::protocol::{
    CheckInRequest, CheckInResponse, LocationPayload, PatternReportResponse, SecurityEventRequest,
    VerdictResponse,
};
use crate::web::state::AppState;
use attendance_guard_core::qr::decode_qr_payload;
use attendance_guard_core::validation::validate_claim;
use attendance_guard_core::{
    CheckInError, PortError, SecurityEvent, SecurityEventKind, SessionStore,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use utoipa::OpenApi;
use uuid::Uuid;

type HandlerError = (StatusCode, String);

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        check_in_handler,
        evaluate_handler,
        claimant_patterns_handler,
        security_event_handler,
    ),
    components(
        schemas(
            CheckInRequest,
            CheckInResponse,
            LocationPayload,
            VerdictResponse,
            PatternReportResponse,
            SecurityEventRequest
        )
    ),
    tags(
        (name = "Attendance Guard API", description = "Attendance check-in with fraud scoring.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Mark attendance for a scanned session QR code.
///
/// The claim is scored before anything is written. A score at or above the reject
/// threshold, a duplicate mark or a malformed claim leaves the ledger untouched.
#[utoipa::path(
    post,
    path = "/attendance",
    request_body = CheckInRequest,
    responses(
        (status = 201, description = "Attendance recorded", body = CheckInResponse),
        (status = 400, description = "Malformed claim or unknown QR code"),
        (status = 401, description = "Missing claimant header"),
        (status = 409, description = "Attendance already marked for this session"),
        (status = 422, description = "Declined by fraud detection"),
        (status = 503, description = "Request cancelled or session lookup unavailable"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The authenticated claimant.")
    )
)]
pub async fn check_in_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(claimant_id): Extension<Uuid>,
    Json(request): Json<CheckInRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let received_at = Utc::now();
    let (code, session_id) = match resolve_claim_target(&app_state, &request).await {
        Ok(target) => target,
        Err(e) => {
            app_state.audit.record(SecurityEvent::new(
                SecurityEventKind::InvalidClaim,
                claimant_id,
                request.session_id,
                json!({ "error": e.1, "qr_payload": request.qr_payload }),
            ));
            return Err(e);
        }
    };

    let claim = request.into_claim(claimant_id, session_id, code, received_at);
    let token = app_state.shutdown.child_token();

    app_state
        .gate
        .check_in(claim, &token)
        .await
        .map(|outcome| (StatusCode::CREATED, Json(CheckInResponse::from(outcome))))
        .map_err(check_in_error_response)
}

/// Score a claim without recording attendance.
#[utoipa::path(
    post,
    path = "/fraud/evaluate",
    request_body = CheckInRequest,
    responses(
        (status = 200, description = "Fraud verdict", body = VerdictResponse),
        (status = 400, description = "Malformed claim or unknown QR code"),
        (status = 401, description = "Missing claimant header"),
        (status = 503, description = "Request cancelled or session lookup unavailable")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The authenticated claimant.")
    )
)]
pub async fn evaluate_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(claimant_id): Extension<Uuid>,
    Json(request): Json<CheckInRequest>,
) -> Result<Json<VerdictResponse>, HandlerError> {
    let received_at = Utc::now();
    let (code, session_id) = resolve_claim_target(&app_state, &request).await?;
    let claim = request.into_claim(claimant_id, session_id, code, received_at);

    validate_claim(&claim, &app_state.gate.policy().validation, received_at)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let token = app_state.shutdown.child_token();
    let verdict = app_state
        .engine
        .evaluate_cancellable(&claim, &token)
        .await
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;

    Ok(Json(verdict.into()))
}

/// Attendance pattern analysis for one claimant over the last 30 days.
#[utoipa::path(
    get,
    path = "/claimants/{claimant_id}/patterns",
    responses(
        (status = 200, description = "Pattern report", body = PatternReportResponse),
        (status = 503, description = "Attendance history unavailable")
    ),
    params(
        ("claimant_id" = Uuid, Path, description = "The claimant to analyze.")
    )
)]
pub async fn claimant_patterns_handler(
    State(app_state): State<Arc<AppState>>,
    Path(claimant_id): Path<Uuid>,
) -> Result<Json<PatternReportResponse>, HandlerError> {
    match app_state.engine.analyze_claimant(claimant_id, Utc::now()).await {
        Ok(report) => Ok(Json(report.into())),
        Err(e) => {
            warn!(claimant_id = %claimant_id, "Pattern analysis unavailable: {}", e);
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                "Pattern analysis unavailable".to_string(),
            ))
        }
    }
}

/// Record a security event observed on the client.
#[utoipa::path(
    post,
    path = "/security-events",
    request_body = SecurityEventRequest,
    responses(
        (status = 202, description = "Event queued for the audit log"),
        (status = 400, description = "Missing event type"),
        (status = 401, description = "Missing claimant header")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The authenticated claimant.")
    )
)]
pub async fn security_event_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(claimant_id): Extension<Uuid>,
    Json(request): Json<SecurityEventRequest>,
) -> Result<StatusCode, HandlerError> {
    let event_type = request.event_type.trim();
    if event_type.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "event_type is required".to_string()));
    }

    app_state.audit.record(SecurityEvent::new(
        SecurityEventKind::Client(event_type.to_string()),
        claimant_id,
        request.session_id,
        request.payload,
    ));
    Ok(StatusCode::ACCEPTED)
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Decodes the scanned code and works out which session the claim targets.
async fn resolve_claim_target(
    app_state: &AppState,
    request: &CheckInRequest,
) -> Result<(String, Uuid), HandlerError> {
    let code = decode_qr_payload(&request.qr_payload)
        .map(|p| p.session_code)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "QR code is missing".to_string()))?;

    let session_id = match request.session_id {
        Some(id) => id,
        None => {
            find_session_id(
                app_state.sessions.as_ref(),
                &code,
                app_state.config.lookup_timeout,
            )
            .await?
        }
    };
    Ok((code, session_id))
}

async fn find_session_id(
    sessions: &dyn SessionStore,
    code: &str,
    timeout: Duration,
) -> Result<Uuid, HandlerError> {
    match tokio::time::timeout(timeout, sessions.find_session_by_code(code)).await {
        Ok(Ok(session)) => Ok(session.session_id),
        Ok(Err(PortError::NotFound(_))) => Err((
            StatusCode::BAD_REQUEST,
            "Invalid or expired QR code".to_string(),
        )),
        Ok(Err(e)) => {
            error!("Failed to resolve session by code: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to resolve session".to_string(),
            ))
        }
        Err(_) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Session lookup timed out".to_string(),
        )),
    }
}

pub fn check_in_error_response(err: CheckInError) -> HandlerError {
    match err {
        CheckInError::Invalid(_) | CheckInError::UnknownSession { .. } => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        CheckInError::Rejected { .. } => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        CheckInError::AlreadyMarked { .. } => (StatusCode::CONFLICT, err.to_string()),
        CheckInError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        CheckInError::Port(e) => {
            error!("Failed to mark attendance: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to mark attendance".to_string(),
            )
        }
    }
}
