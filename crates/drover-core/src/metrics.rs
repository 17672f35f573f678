// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Prometheus meter catalog.
//!
//! All meters the workspace publishes are registered here, against a single
//! [`MetricsHub`]. Components take an `Option<Arc<MetricsHub>>`; when no hub
//! is configured, nothing is recorded and the hot path stays meter-free.
//!
//! # Metrics Overview
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `modbus_connection_reconnects_total` | Counter | `connection` | Successful (re)connects |
//! | `modbus_poll_duration_seconds` | Histogram | `device` | Poll cycle duration |
//! | `modbus_poll_errors_total` | Counter | `device` | Failed poll cycles |
//! | `modbus_poll_backpressure_total` | Counter | `device` | Ticks dropped while a poll was in flight |

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

// =============================================================================
// MetricsHub
// =============================================================================

/// Owns a Prometheus registry with every drover meter pre-registered.
///
/// Handles returned by the accessor methods are cheap label-bound children
/// and can be cached by callers for the hot path.
#[derive(Debug)]
pub struct MetricsHub {
    registry: Registry,
    reconnects: IntCounterVec,
    poll_duration: HistogramVec,
    poll_errors: IntCounterVec,
    poll_backpressure: IntCounterVec,
}

impl MetricsHub {
    /// Creates a hub backed by a fresh registry.
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
            .expect("Failed to register drover metrics on a fresh registry")
    }

    /// Creates a hub backed by an existing registry.
    ///
    /// # Errors
    ///
    /// Returns [`prometheus::Error`] when a metric with a colliding name is
    /// already registered.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let reconnects = IntCounterVec::new(
            Opts::new(
                "modbus_connection_reconnects_total",
                "Number of times a Modbus connection has been (re)established",
            ),
            &["connection"],
        )?;
        registry.register(Box::new(reconnects.clone()))?;

        let poll_duration = HistogramVec::new(
            HistogramOpts::new(
                "modbus_poll_duration_seconds",
                "Duration of Modbus polling cycles",
            ),
            &["device"],
        )?;
        registry.register(Box::new(poll_duration.clone()))?;

        let poll_errors = IntCounterVec::new(
            Opts::new("modbus_poll_errors_total", "Number of Modbus polling errors"),
            &["device"],
        )?;
        registry.register(Box::new(poll_errors.clone()))?;

        let poll_backpressure = IntCounterVec::new(
            Opts::new(
                "modbus_poll_backpressure_total",
                "Number of Modbus polls skipped due to in-flight work",
            ),
            &["device"],
        )?;
        registry.register(Box::new(poll_backpressure.clone()))?;

        Ok(Self {
            registry,
            reconnects,
            poll_duration,
            poll_errors,
            poll_backpressure,
        })
    }

    /// Returns the underlying registry, e.g. for an embedder's scrape
    /// endpoint.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Counter of successful transport opens for one connection string.
    pub fn reconnects(&self, connection: &str) -> IntCounter {
        self.reconnects.with_label_values(&[connection])
    }

    /// Poll cycle duration histogram for one device.
    pub fn poll_duration(&self, device: &str) -> Histogram {
        self.poll_duration.with_label_values(&[device])
    }

    /// Failed poll cycle counter for one device.
    pub fn poll_errors(&self, device: &str) -> IntCounter {
        self.poll_errors.with_label_values(&[device])
    }

    /// Dropped-tick counter for one device.
    pub fn poll_backpressure(&self, device: &str) -> IntCounter {
        self.poll_backpressure.with_label_values(&[device])
    }

    /// Renders every registered meter in the Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for MetricsHub {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let hub = MetricsHub::new();
        assert_eq!(hub.reconnects("modbus:tcp://127.0.0.1:502").get(), 0);
        assert_eq!(hub.poll_errors("plc-001").get(), 0);
        assert_eq!(hub.poll_backpressure("plc-001").get(), 0);
    }

    #[test]
    fn test_labelled_children_share_state() {
        let hub = MetricsHub::new();
        hub.poll_errors("plc-001").inc();
        hub.poll_errors("plc-001").inc();
        hub.poll_errors("plc-002").inc();

        assert_eq!(hub.poll_errors("plc-001").get(), 2);
        assert_eq!(hub.poll_errors("plc-002").get(), 1);
    }

    #[test]
    fn test_render_contains_metric_names() {
        let hub = MetricsHub::new();
        hub.reconnects("modbus:tcp://10.0.0.5:502").inc();
        hub.poll_duration("plc-001").observe(0.005);

        let rendered = hub.render();
        assert!(rendered.contains("modbus_connection_reconnects_total"));
        assert!(rendered.contains("modbus_poll_duration_seconds"));
    }

    #[test]
    fn test_with_registry_rejects_double_registration() {
        let registry = Registry::new();
        let _hub = MetricsHub::with_registry(registry.clone()).unwrap();
        assert!(MetricsHub::with_registry(registry).is_err());
    }
}
