//! Structure-lock configuration.
//!
//! Values come from environment variables (`FOLIO_*` prefixed) with
//! fallbacks in [`crate::defaults`].

use std::env;
use std::time::Duration;

use tracing::debug;

use crate::defaults::{LOCK_POLL_INTERVAL_MS, LOCK_TIMEOUT_MS, LOCK_TTL_MS};
use crate::{Error, Result};

/// Timing parameters shared by every lock provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// Maximum wait for a lock before the mutation fails.
    pub timeout: Duration,
    /// Sleep between attempts for backends that poll.
    pub poll_interval: Duration,
    /// Expiry applied by backends that support it (Redis).
    pub ttl: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(LOCK_TIMEOUT_MS),
            poll_interval: Duration::from_millis(LOCK_POLL_INTERVAL_MS),
            ttl: Duration::from_millis(LOCK_TTL_MS),
        }
    }
}

impl LockConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the acquisition timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the polling interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the lock expiry.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Load from environment variables.
    ///
    /// Reads:
    /// - `FOLIO_LOCK_TIMEOUT_MS`
    /// - `FOLIO_LOCK_POLL_MS`
    /// - `FOLIO_LOCK_TTL_MS`
    ///
    /// Unset variables keep their defaults; unparsable ones are an error.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            timeout: read_millis("FOLIO_LOCK_TIMEOUT_MS")?.unwrap_or(defaults.timeout),
            poll_interval: read_millis("FOLIO_LOCK_POLL_MS")?.unwrap_or(defaults.poll_interval),
            ttl: read_millis("FOLIO_LOCK_TTL_MS")?.unwrap_or(defaults.ttl),
        };
        config.validate()?;
        debug!(
            timeout_ms = config.timeout.as_millis() as u64,
            poll_ms = config.poll_interval.as_millis() as u64,
            ttl_ms = config.ttl.as_millis() as u64,
            "Lock configuration loaded"
        );
        Ok(config)
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::Config("lock timeout must be positive".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config(
                "lock poll interval must be positive".to_string(),
            ));
        }
        if self.ttl < self.timeout {
            return Err(Error::Config(format!(
                "lock ttl ({}ms) shorter than timeout ({}ms)",
                self.ttl.as_millis(),
                self.timeout.as_millis()
            )));
        }
        Ok(())
    }
}

fn read_millis(name: &str) -> Result<Option<Duration>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| Error::Config(format!("{}={:?}: {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}
