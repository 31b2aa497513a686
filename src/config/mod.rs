//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. Sensitive values wrapped in secrecy::SecretString to prevent
//! log leaks.

pub mod secrets;

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(300);
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_STATUS_CONCURRENCY: usize = 16;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    /// How long a lease lasts before the reaper may reclaim the item.
    pub lease_duration: Duration,
    pub reaper_interval: Duration,
    /// Upper bound on concurrent lease lookups per pending-detail request.
    pub status_concurrency: usize,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            lease_duration: optional_secs("LEASE_DURATION_SECS")?
                .unwrap_or(DEFAULT_LEASE_DURATION),
            reaper_interval: optional_secs("REAPER_INTERVAL_SECS")?
                .unwrap_or(DEFAULT_REAPER_INTERVAL),
            status_concurrency: optional_positive("STATUS_CONCURRENCY")?
                .unwrap_or(DEFAULT_STATUS_CONCURRENCY),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn optional_positive<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr + PartialEq + Default,
{
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value != T::default() => Ok(Some(value)),
        _ => Err(Error::Config(format!(
            "{name} must be a positive integer, got {raw:?}"
        ))),
    }
}

fn optional_secs(name: &str) -> Result<Option<Duration>> {
    Ok(optional_positive::<u64>(name)?.map(Duration::from_secs))
}
