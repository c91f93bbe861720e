//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub log_level: Level,
    pub allowed_origin: String,
    pub expected_timezone: Option<String>,
    pub lookup_timeout: Duration,
    pub reject_threshold: u32,
    pub audit_queue_capacity: usize,
    pub max_clock_skew: Duration,
    pub require_location: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Server and Database Settings ---
        let default_bind = "0.0.0.0:3000".parse::<SocketAddr>().ok();
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", default_bind)?;
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", Some(5))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let allowed_origin =
            lookup("ALLOWED_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Fraud Detection Settings ---
        let expected_timezone = lookup("EXPECTED_TIMEZONE").filter(|tz| !tz.trim().is_empty());
        let lookup_timeout =
            Duration::from_millis(parse_or(&lookup, "FRAUD_LOOKUP_TIMEOUT_MS", Some(2000u64))?);
        let reject_threshold = parse_or(&lookup, "FRAUD_REJECT_THRESHOLD", Some(70u32))?;
        let audit_queue_capacity = parse_or(&lookup, "AUDIT_QUEUE_CAPACITY", Some(1024usize))?;
        let max_clock_skew =
            Duration::from_secs(parse_or(&lookup, "MAX_CLOCK_SKEW_SECS", Some(120u64))?);
        let require_location = parse_or(&lookup, "REQUIRE_LOCATION", Some(true))?;

        Ok(Self {
            bind_address,
            database_url,
            db_max_connections,
            log_level,
            allowed_origin,
            expected_timezone,
            lookup_timeout,
            reject_threshold,
            audit_queue_capacity,
            max_clock_skew,
            require_location,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: Option<T>,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_database_is_set() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/attendance")]).unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.reject_threshold, 70);
        assert_eq!(config.lookup_timeout, Duration::from_secs(2));
        assert_eq!(config.max_clock_skew, Duration::from_secs(120));
        assert!(config.require_location);
        assert_eq!(config.expected_timezone, None);
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingVar(name)) if name == "DATABASE_URL"));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/attendance"),
            ("EXPECTED_TIMEZONE", "Africa/Nairobi"),
            ("FRAUD_LOOKUP_TIMEOUT_MS", "750"),
            ("REQUIRE_LOCATION", "false"),
            ("RUST_LOG", "debug"),
        ])
        .unwrap();
        assert_eq!(config.expected_timezone.as_deref(), Some("Africa/Nairobi"));
        assert_eq!(config.lookup_timeout, Duration::from_millis(750));
        assert!(!config.require_location);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn malformed_numbers_are_reported_by_name() {
        let err = load(&[
            ("DATABASE_URL", "postgres://db/attendance"),
            ("FRAUD_REJECT_THRESHOLD", "seventy"),
        ])
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue(name, _) if name == "FRAUD_REJECT_THRESHOLD")
        );
    }
}
