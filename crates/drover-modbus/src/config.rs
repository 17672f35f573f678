// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use drover_core::error::ConfigError;

use crate::backoff::BackoffPolicy;

// =============================================================================
// ConnectionConfig
// =============================================================================

/// Configuration for one [`ConnectionManager`](crate::manager::ConnectionManager).
///
/// Built via [`ConnectionConfig::builder`]; the connection string is
/// required, everything else has defaults.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use drover_modbus::config::ConnectionConfig;
///
/// let config = ConnectionConfig::builder("modbus:tcp://10.0.0.5:502?unit-identifier=1")
///     .request_timeout(Duration::from_secs(2))
///     .max_retries(5)
///     .build()
///     .unwrap();
///
/// assert_eq!(config.max_retries(), 5);
/// assert_eq!(config.jitter(), 0.2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    connection_string: String,
    request_timeout: Duration,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    jitter: f64,
}

impl ConnectionConfig {
    /// Starts building a configuration for the given connection string.
    pub fn builder(connection_string: impl Into<String>) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            connection_string: connection_string.into(),
            request_timeout: Duration::from_secs(5),
            max_retries: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10),
            jitter: 0.2,
        }
    }

    /// Returns the connection string, passed verbatim to the transport
    /// factory.
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Returns the per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns the number of retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the initial backoff delay.
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Returns the backoff ceiling.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Returns the backoff jitter factor.
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Returns the backoff policy derived from this configuration.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.initial_backoff, self.max_backoff, self.jitter)
    }
}

// =============================================================================
// ConnectionConfigBuilder
// =============================================================================

/// Builder for [`ConnectionConfig`].
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    connection_string: String,
    request_timeout: Duration,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    jitter: f64,
}

impl ConnectionConfigBuilder {
    /// Sets the per-request timeout (default 5 s).
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Sets the retry count after the first attempt (default 3).
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the initial backoff delay (default 250 ms).
    pub fn initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    /// Sets the backoff ceiling (default 10 s).
    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Sets the backoff jitter factor (default 0.2, must be in `[0, 1]`).
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when the connection string is
    /// blank, a duration is zero where it must not be, or the jitter is
    /// outside `[0, 1]`.
    pub fn build(self) -> Result<ConnectionConfig, ConfigError> {
        if self.connection_string.trim().is_empty() {
            return Err(ConfigError::validation(
                "connection_string",
                "must not be blank",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::validation("request_timeout", "must be > 0"));
        }
        if self.initial_backoff.is_zero() {
            return Err(ConfigError::validation("initial_backoff", "must be > 0"));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(ConfigError::validation(
                "max_backoff",
                "must be >= initial_backoff",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::validation("jitter", "must be between 0 and 1"));
        }

        Ok(ConnectionConfig {
            connection_string: self.connection_string,
            request_timeout: self.request_timeout,
            max_retries: self.max_retries,
            initial_backoff: self.initial_backoff,
            max_backoff: self.max_backoff,
            jitter: self.jitter,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
