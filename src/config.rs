//! Client and session configuration.
//!
//! Values come from command-line arguments first, then from the environment:
//!
//! - `LOCKSTEP_ADDRESS`: remote address when none is given explicitly
//! - `LOCKSTEP_TIMEOUT_MS`: request timeout in milliseconds

use std::time::Duration;

use thiserror::Error;

/// Request timeout used when nothing else is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(3000);

/// Environment variable holding the remote address.
pub const ADDRESS_ENV: &str = "LOCKSTEP_ADDRESS";

/// Environment variable holding the request timeout in milliseconds.
pub const TIMEOUT_ENV: &str = "LOCKSTEP_TIMEOUT_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no remote address given (pass one or set {})", ADDRESS_ENV)]
    MissingAddress,

    #[error("invalid timeout '{value}': {source}")]
    InvalidTimeout {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// What a caller's read loop does after a timed-out request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Report the timeout and carry on with the next request.
    #[default]
    Continue,
    /// Report the timeout and stop.
    Exit,
}

/// Address and timeout for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Opaque connection string, e.g. `tcp://127.0.0.1:5555`.
    pub address: String,
    /// Upper bound on the wait for each reply.
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a config from an optional explicit address and timeout, falling
    /// back to the process environment for whatever is missing.
    pub fn from_env_or(
        address: Option<String>,
        timeout_ms: Option<u64>,
    ) -> Result<Self, ConfigError> {
        Self::resolve(address, timeout_ms, |key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env_or`] with an injectable variable
    /// lookup.
    pub fn resolve<F>(
        address: Option<String>,
        timeout_ms: Option<u64>,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let address = address
            .or_else(|| lookup(ADDRESS_ENV))
            .ok_or(ConfigError::MissingAddress)?;

        let timeout = match timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None => match lookup(TIMEOUT_ENV) {
                Some(value) => {
                    let ms: u64 = value
                        .trim()
                        .parse()
                        .map_err(|source| ConfigError::InvalidTimeout { value, source })?;
                    Duration::from_millis(ms)
                }
                None => DEFAULT_REQUEST_TIMEOUT,
            },
        };

        Ok(Self { address, timeout })
    }
}
