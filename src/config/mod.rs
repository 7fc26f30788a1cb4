//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

use std::time::Duration;

use crate::error::{Error, Result};
use secrecy::SecretString;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub queue: QueueConfig,
}

/// Queue tunables. Every field has a production default; env vars override.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long a claim grants exclusive ownership. Must exceed the longest
    /// expected report-generation run.
    pub lease_duration: Duration,
    /// Lease count bound before a failure turns terminal.
    pub max_attempts: u32,
    /// Base retry delay; the backoff policy grows it per attempt.
    pub retry_delay: Duration,
    /// How often the janitor sweeps for expired leases.
    pub janitor_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        let lease_duration = Duration::from_secs(300);
        Self {
            lease_duration,
            max_attempts: 3,
            retry_delay: Duration::from_secs(300),
            // Reclaim window stays well under the lease itself
            janitor_interval: lease_duration / 2,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            queue: QueueConfig::from_env()?,
        })
    }
}

impl QueueConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let lease_duration = optional_secs("LEASE_DURATION_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.lease_duration);

        Ok(Self {
            lease_duration,
            max_attempts: optional_secs("MAX_ATTEMPTS")?
                .map(|n| n as u32)
                .unwrap_or(defaults.max_attempts),
            retry_delay: optional_secs("RETRY_DELAY_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_delay),
            janitor_interval: optional_secs("JANITOR_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(lease_duration / 2),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn optional_secs(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name} must be a non-negative integer: {raw:?}"))),
        Err(_) => Ok(None),
    }
}
