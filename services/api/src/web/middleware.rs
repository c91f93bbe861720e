//! services/api/src/web/middleware.rs
//!
//! Claimant identification for the check-in routes.

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::debug;
use uuid::Uuid;

pub const CLAIMANT_HEADER: &str = "x-user-id";

/// Middleware that reads the authenticated claimant id set by the upstream auth
/// layer and inserts it into request extensions for handlers to use.
///
/// A missing or malformed header returns 401 Unauthorized.
pub async fn require_claimant(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let claimant_id = claimant_from_headers(req.headers()).ok_or_else(|| {
        debug!("Rejecting request without a valid {} header", CLAIMANT_HEADER);
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut().insert(claimant_id);
    Ok(next.run(req).await)
}

pub fn claimant_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CLAIMANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
}
