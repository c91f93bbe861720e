//! Contract checks run before any scoring. A failure here is a malformed request,
//! not a fraud signal.

use chrono::{DateTime, Duration, Utc};

use crate::domain::CheckInClaim;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("QR code is missing")]
    MissingCode,
    #[error("Location is required to mark attendance")]
    MissingLocation,
    #[error("Invalid coordinate ({lat}, {lng})")]
    InvalidCoordinate { lat: f64, lng: f64 },
    #[error("Invalid GPS accuracy: {0}")]
    InvalidAccuracy(f64),
    #[error("Client clock differs from server by {skew_secs}s")]
    ClockSkew { skew_secs: i64 },
}

#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    pub require_location: bool,
    pub max_clock_skew: Duration,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            require_location: true,
            max_clock_skew: Duration::minutes(2),
        }
    }
}

pub fn validate_claim(
    claim: &CheckInClaim,
    policy: &ValidationPolicy,
    server_now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    if claim.claimed_code.trim().is_empty() {
        return Err(ValidationError::MissingCode);
    }

    match &claim.claimed_location {
        None if policy.require_location => return Err(ValidationError::MissingLocation),
        None => {}
        Some(location) => {
            if !location.coordinate().is_valid() {
                return Err(ValidationError::InvalidCoordinate {
                    lat: location.lat,
                    lng: location.lng,
                });
            }
            if let Some(accuracy) = location.accuracy {
                if !accuracy.is_finite() || accuracy < 0.0 {
                    return Err(ValidationError::InvalidAccuracy(accuracy));
                }
            }
        }
    }

    let skew = (claim.client_timestamp - server_now).abs();
    if skew > policy.max_clock_skew {
        return Err(ValidationError::ClockSkew {
            skew_secs: skew.num_seconds(),
        });
    }

    Ok(())
}
