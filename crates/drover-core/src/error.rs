// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Unified error hierarchy for drover.
//!
//! This module defines the error types shared across the workspace:
//!
//! - [`ConfigError`] — invalid builder inputs, never retried
//! - [`ClientError`] — transport/protocol failures on the wire path, with
//!   retryability classification
//! - [`SampleTypeError`] — a typed sample accessor asked for the wrong variant
//!
//! # Error Hierarchy
//!
//! ```text
//! DroverError (root)
//! ├── ConfigError  - Builder and configuration validation
//! └── ClientError  - Connection, request, and protocol failures
//! ```
//!
//! # Examples
//!
//! ```
//! use drover_core::error::ClientError;
//! use std::time::Duration;
//!
//! let error = ClientError::timeout(Duration::from_secs(5));
//! assert!(error.is_retryable());
//! assert!(!ClientError::Closed.is_retryable());
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

// =============================================================================
// DroverError - Root Error Type
// =============================================================================

/// The root error type for drover.
#[derive(Debug, Error)]
pub enum DroverError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connection / request error.
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
}

impl DroverError {
    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            DroverError::Config(_) => false,
            DroverError::Client(e) => e.is_retryable(),
        }
    }

    /// Returns the error category as a string for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            DroverError::Config(_) => "config",
            DroverError::Client(e) => e.error_type(),
        }
    }
}

// =============================================================================
// ConfigError
// =============================================================================

/// Configuration and builder validation errors.
///
/// These are surfaced to the caller before any object is constructed and are
/// never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field failed validation.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// A measurement ID appears more than once within a device.
    #[error("Duplicate measurement id: {id}")]
    DuplicateMeasurement {
        /// The duplicated measurement ID.
        id: String,
    },

    /// Two measurements of the same category cover overlapping addresses.
    #[error("Measurements '{first}' and '{second}' overlap within one category")]
    OverlappingMeasurements {
        /// The earlier measurement ID.
        first: String,
        /// The overlapping measurement ID.
        second: String,
    },

    /// A device ID is already registered with the scheduler.
    #[error("Device already registered: {device_id}")]
    DuplicateDevice {
        /// The duplicated device ID.
        device_id: String,
    },

    /// A polling configuration has no measurements.
    #[error("No measurements configured for device {device_id}")]
    NoMeasurements {
        /// The device ID.
        device_id: String,
    },

    /// An address or tag string could not be parsed.
    #[error("Invalid address '{address}': {message}")]
    InvalidAddress {
        /// The invalid address string.
        address: String,
        /// Error message.
        message: String,
    },

    /// A connection string could not be parsed.
    #[error("Invalid connection string '{value}': {message}")]
    InvalidConnectionString {
        /// The offending connection string.
        value: String,
        /// Error message.
        message: String,
    },
}

impl ConfigError {
    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a duplicate measurement error.
    pub fn duplicate_measurement(id: impl Into<String>) -> Self {
        Self::DuplicateMeasurement { id: id.into() }
    }

    /// Creates an overlapping measurements error.
    pub fn overlapping_measurements(
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        Self::OverlappingMeasurements {
            first: first.into(),
            second: second.into(),
        }
    }

    /// Creates a duplicate device error.
    pub fn duplicate_device(device_id: impl Into<String>) -> Self {
        Self::DuplicateDevice {
            device_id: device_id.into(),
        }
    }

    /// Creates a no-measurements error.
    pub fn no_measurements(device_id: impl Into<String>) -> Self {
        Self::NoMeasurements {
            device_id: device_id.into(),
        }
    }

    /// Creates an invalid address error.
    pub fn invalid_address(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid connection string error.
    pub fn invalid_connection_string(
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidConnectionString {
            value: value.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// ClientError
// =============================================================================

/// Errors raised on the connection and request path.
///
/// The retry layer inside the connection manager classifies these:
/// [`Timeout`](ClientError::Timeout), [`Protocol`](ClientError::Protocol),
/// and [`Transport`](ClientError::Transport) are retried with backoff and an
/// interleaved reconnect; [`Unavailable`](ClientError::Unavailable) and
/// [`Closed`](ClientError::Closed) are terminal.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A request exceeded the configured request timeout.
    #[error("Request timed out after {duration:?}")]
    Timeout {
        /// The timeout that elapsed.
        duration: Duration,
    },

    /// The device answered, but not with an OK response.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error message.
        message: String,
    },

    /// The connection could not be opened or maintained.
    #[error("Transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Retries were exhausted without obtaining a usable connection.
    #[error("Connection unavailable after {attempts} attempts")]
    Unavailable {
        /// Number of attempts made.
        attempts: u32,
    },

    /// The operation was attempted on a closed connection manager.
    #[error("Connection manager is closed")]
    Closed,
}

impl ClientError {
    /// Creates a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transport error with an underlying source.
    pub fn transport_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(attempts: u32) -> Self {
        Self::Unavailable { attempts }
    }

    /// Returns `true` if this error is retryable.
    ///
    /// Retryable errors are transient wire conditions that may succeed on a
    /// later attempt against a fresh connection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout { .. }
                | ClientError::Protocol { .. }
                | ClientError::Transport { .. }
        )
    }

    /// Returns the error category for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            ClientError::Timeout { .. } => "timeout",
            ClientError::Protocol { .. } => "protocol",
            ClientError::Transport { .. } => "transport",
            ClientError::Unavailable { .. } => "unavailable",
            ClientError::Closed => "closed",
        }
    }

    /// Returns the error kind name as shown in health snapshots.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Timeout { .. } => "Timeout",
            ClientError::Protocol { .. } => "ProtocolError",
            ClientError::Transport { .. } => "TransportError",
            ClientError::Unavailable { .. } => "Unavailable",
            ClientError::Closed => "Closed",
        }
    }

    /// Formats the error as it appears in health snapshots: kind name plus
    /// message.
    pub fn detail(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

impl Clone for ClientError {
    fn clone(&self) -> Self {
        match self {
            ClientError::Timeout { duration } => ClientError::Timeout {
                duration: *duration,
            },
            ClientError::Protocol { message } => ClientError::Protocol {
                message: message.clone(),
            },
            ClientError::Transport { message, .. } => ClientError::Transport {
                message: message.clone(),
                source: None,
            },
            ClientError::Unavailable { attempts } => ClientError::Unavailable {
                attempts: *attempts,
            },
            ClientError::Closed => ClientError::Closed,
        }
    }
}

// =============================================================================
// SampleTypeError
// =============================================================================

/// A typed sample accessor was asked for the wrong variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct SampleTypeError {
    expected: &'static str,
    actual: &'static str,
}

impl SampleTypeError {
    /// Creates a new sample type error.
    pub fn new(expected: &'static str, actual: &'static str) -> Self {
        Self { expected, actual }
    }

    /// Returns the variant the caller asked for.
    pub fn expected(&self) -> &'static str {
        self.expected
    }

    /// Returns the variant the sample actually holds.
    pub fn actual(&self) -> &'static str {
        self.actual
    }
}

impl fmt::Display for SampleTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Measurement is not a {} (found {})",
            self.expected, self.actual
        )
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// A Result type with [`DroverError`].
pub type DroverResult<T> = Result<T, DroverError>;

/// A Result type with [`ConfigError`].
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A Result type with [`ClientError`].
pub type ClientResult<T> = Result<T, ClientError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_retryable() {
        assert!(ClientError::timeout(Duration::from_secs(5)).is_retryable());
        assert!(ClientError::protocol("non-OK response").is_retryable());
        assert!(ClientError::transport("connection refused").is_retryable());
        assert!(!ClientError::unavailable(4).is_retryable());
        assert!(!ClientError::Closed.is_retryable());
    }

    #[test]
    fn test_client_error_detail() {
        let error = ClientError::protocol("Read failed: INVALID_ADDRESS");
        assert_eq!(
            error.detail(),
            "ProtocolError: Protocol error: Read failed: INVALID_ADDRESS"
        );
    }

    #[test]
    fn test_client_error_clone_drops_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = ClientError::transport_with("connect failed", io);
        let cloned = error.clone();
        match cloned {
            ClientError::Transport { message, source } => {
                assert_eq!(message, "connect failed");
                assert!(source.is_none());
            }
            _ => panic!("Expected Transport"),
        }
    }

    #[test]
    fn test_config_error_constructors() {
        let error = ConfigError::validation("poll_interval", "must be > 0");
        assert!(matches!(error, ConfigError::Validation { .. }));

        let error = ConfigError::duplicate_measurement("hr100");
        assert!(error.to_string().contains("hr100"));

        let error = ConfigError::overlapping_measurements("a", "b");
        assert!(error.to_string().contains('a'));
        assert!(error.to_string().contains('b'));
    }

    #[test]
    fn test_root_error_conversion() {
        let error: DroverError = ClientError::timeout(Duration::from_millis(100)).into();
        assert!(error.is_retryable());
        assert_eq!(error.error_type(), "timeout");

        let error: DroverError = ConfigError::no_measurements("plc-001").into();
        assert!(!error.is_retryable());
        assert_eq!(error.error_type(), "config");
    }

    #[test]
    fn test_sample_type_error_display() {
        let error = SampleTypeError::new("bool", "word");
        assert_eq!(error.to_string(), "Measurement is not a bool (found word)");
    }
}
