//! Client configuration
//!
//! The recognised options are the four knobs of the reconnection policy and
//! the request correlator. They can be given in code, parsed from the JSON
//! the dashboard ships in its settings (`camelCase` keys), or read from the
//! environment.
//!
//! ```rust
//! use wirebus_client::ClientConfig;
//!
//! let config = ClientConfig::from_json(r#"{
//!     "baseReconnectDelayMs": 250,
//!     "maxReconnectDelayMs": 8000,
//!     "maxReconnectAttempts": 6,
//!     "defaultRequestTimeoutMs": 5000
//! }"#).unwrap();
//!
//! assert_eq!(config.max_reconnect_attempts, 6);
//! ```

use crate::reconnect::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use wirebus_core::{Error, Result};

const ENV_BASE_DELAY: &str = "WIREBUS_BASE_RECONNECT_DELAY_MS";
const ENV_MAX_DELAY: &str = "WIREBUS_MAX_RECONNECT_DELAY_MS";
const ENV_MAX_ATTEMPTS: &str = "WIREBUS_MAX_RECONNECT_ATTEMPTS";
const ENV_REQUEST_TIMEOUT: &str = "WIREBUS_DEFAULT_REQUEST_TIMEOUT_MS";

/// Reconnection and request settings for a [`Client`](crate::Client)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Delay before the first reconnection attempt
    pub base_reconnect_delay_ms: u64,
    /// Upper bound for the backoff delay
    pub max_reconnect_delay_ms: u64,
    /// Consecutive failed attempts after which the client gives up
    pub max_reconnect_attempts: u32,
    /// Timeout applied by `request_default`
    pub default_request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 30_000,
            max_reconnect_attempts: 10,
            default_request_timeout_ms: 30_000,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON object; missing keys keep their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read overrides from `WIREBUS_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = env_number(ENV_BASE_DELAY)? {
            config.base_reconnect_delay_ms = v;
        }
        if let Some(v) = env_number(ENV_MAX_DELAY)? {
            config.max_reconnect_delay_ms = v;
        }
        if let Some(v) = env_number(ENV_MAX_ATTEMPTS)? {
            config.max_reconnect_attempts = u32::try_from(v)
                .map_err(|_| Error::Config(format!("{} is out of range", ENV_MAX_ATTEMPTS)))?;
        }
        if let Some(v) = env_number(ENV_REQUEST_TIMEOUT)? {
            config.default_request_timeout_ms = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the reconnection policy relies on
    pub fn validate(&self) -> Result<()> {
        if self.base_reconnect_delay_ms == 0 {
            return Err(Error::Config("baseReconnectDelayMs must be positive".into()));
        }
        if self.max_reconnect_delay_ms < self.base_reconnect_delay_ms {
            return Err(Error::Config(
                "maxReconnectDelayMs must not be below baseReconnectDelayMs".into(),
            ));
        }
        if self.default_request_timeout_ms == 0 {
            return Err(Error::Config("defaultRequestTimeoutMs must be positive".into()));
        }
        Ok(())
    }

    pub fn base_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.base_reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    pub fn default_request_timeout(&self) -> Duration {
        Duration::from_millis(self.default_request_timeout_ms)
    }

    /// Backoff strategy matching these settings
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.base_reconnect_delay(), self.max_reconnect_delay())
            .with_max_attempts(self.max_reconnect_attempts)
    }
}

fn env_number(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}: {}", key, e))),
        Err(_) => Ok(None),
    }
}
