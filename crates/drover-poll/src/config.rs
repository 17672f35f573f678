// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-device polling configuration.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use drover_core::error::ConfigError;
use drover_core::types::{DeviceId, MeasurementCategory, MeasurementDefinition};
use drover_modbus::manager::ConnectionManager;

// =============================================================================
// DevicePollingConfig
// =============================================================================

/// Immutable description of what to poll on one device and how often.
///
/// Built via [`DevicePollingConfig::builder`]. The measurement list keeps its
/// declared order; published events carry samples in this order regardless of
/// how the reads were batched.
#[derive(Clone)]
pub struct DevicePollingConfig {
    device_id: DeviceId,
    poll_interval: Duration,
    initial_delay: Duration,
    connection_manager: Arc<ConnectionManager>,
    measurements: Vec<MeasurementDefinition>,
}

impl DevicePollingConfig {
    /// Starts building a configuration for `device_id` polled through
    /// `connection_manager`.
    pub fn builder(
        device_id: impl Into<DeviceId>,
        connection_manager: Arc<ConnectionManager>,
    ) -> DevicePollingConfigBuilder {
        DevicePollingConfigBuilder {
            device_id: device_id.into(),
            connection_manager,
            poll_interval: Duration::from_secs(5),
            initial_delay: Duration::ZERO,
            measurements: Vec::new(),
        }
    }

    /// Returns the device ID.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Returns the fixed poll rate.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns the delay before the first poll.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Returns the connection manager used for every read.
    pub fn connection_manager(&self) -> &Arc<ConnectionManager> {
        &self.connection_manager
    }

    /// Returns the measurements in declared order.
    pub fn measurements(&self) -> &[MeasurementDefinition] {
        &self.measurements
    }
}

impl std::fmt::Debug for DevicePollingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePollingConfig")
            .field("device_id", &self.device_id)
            .field("poll_interval", &self.poll_interval)
            .field("initial_delay", &self.initial_delay)
            .field("measurements", &self.measurements.len())
            .finish()
    }
}

// =============================================================================
// DevicePollingConfigBuilder
// =============================================================================

/// Builder for [`DevicePollingConfig`].
pub struct DevicePollingConfigBuilder {
    device_id: DeviceId,
    connection_manager: Arc<ConnectionManager>,
    poll_interval: Duration,
    initial_delay: Duration,
    measurements: Vec<MeasurementDefinition>,
}

impl DevicePollingConfigBuilder {
    /// Sets the poll rate (default 5 s, must be > 0).
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sets the delay before the first poll (default zero).
    pub fn initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Appends a measurement.
    pub fn measurement(mut self, measurement: MeasurementDefinition) -> Self {
        self.measurements.push(measurement);
        self
    }

    /// Appends several measurements.
    pub fn measurements(
        mut self,
        measurements: impl IntoIterator<Item = MeasurementDefinition>,
    ) -> Self {
        self.measurements.extend(measurements);
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Validation`] — blank device ID or zero poll interval
    /// - [`ConfigError::NoMeasurements`] — empty measurement list
    /// - [`ConfigError::DuplicateMeasurement`] — repeated measurement ID
    /// - [`ConfigError::OverlappingMeasurements`] — two measurements of one
    ///   category covering a common address
    pub fn build(self) -> Result<DevicePollingConfig, ConfigError> {
        if self.device_id.as_str().trim().is_empty() {
            return Err(ConfigError::validation("device_id", "must not be blank"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::validation("poll_interval", "must be > 0"));
        }
        if self.measurements.is_empty() {
            return Err(ConfigError::no_measurements(self.device_id.as_str()));
        }

        let mut ids = HashSet::new();
        for measurement in &self.measurements {
            if !ids.insert(measurement.id()) {
                return Err(ConfigError::duplicate_measurement(measurement.id()));
            }
        }

        Self::reject_overlaps(&self.measurements)?;

        Ok(DevicePollingConfig {
            device_id: self.device_id,
            poll_interval: self.poll_interval,
            initial_delay: self.initial_delay,
            connection_manager: self.connection_manager,
            measurements: self.measurements,
        })
    }

    /// Within each category, any two ranges sharing an address are a
    /// configuration mistake: the planner assumes disjoint ranges.
    fn reject_overlaps(measurements: &[MeasurementDefinition]) -> Result<(), ConfigError> {
        let categories = [
            MeasurementCategory::Coil,
            MeasurementCategory::DiscreteInput,
            MeasurementCategory::HoldingRegister,
            MeasurementCategory::InputRegister,
        ];

        for category in categories {
            let mut sorted: Vec<&MeasurementDefinition> = measurements
                .iter()
                .filter(|m| m.category() == category)
                .collect();
            sorted.sort_by_key(|m| m.address());

            for pair in sorted.windows(2) {
                if u32::from(pair[1].address()) < pair[0].end_exclusive() {
                    return Err(ConfigError::overlapping_measurements(
                        pair[0].id(),
                        pair[1].id(),
                    ));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use drover_modbus::config::ConnectionConfig;
    use drover_modbus::tcp::ModbusTransportFactory;

    fn manager() -> Arc<ConnectionManager> {
        let config = ConnectionConfig::builder("modbus:tcp://127.0.0.1:502")
            .build()
            .unwrap();
        Arc::new(ConnectionManager::new(
            config,
            Arc::new(ModbusTransportFactory::new()),
        ))
    }

    fn holding(id: &str, address: u16, count: u16) -> MeasurementDefinition {
        MeasurementDefinition::holding_register_range(id, address, count).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = DevicePollingConfig::builder("plc-001", manager())
            .measurement(holding("hr", 0, 1))
            .build()
            .unwrap();

        assert_eq!(config.device_id().as_str(), "plc-001");
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.initial_delay(), Duration::ZERO);
        assert_eq!(config.measurements().len(), 1);
    }

    #[test]
    fn test_rejects_blank_device_id() {
        let result = DevicePollingConfig::builder("  ", manager())
            .measurement(holding("hr", 0, 1))
            .build();
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let result = DevicePollingConfig::builder("plc-001", manager())
            .poll_interval(Duration::ZERO)
            .measurement(holding("hr", 0, 1))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_empty_measurements() {
        let result = DevicePollingConfig::builder("plc-001", manager()).build();
        assert!(matches!(result, Err(ConfigError::NoMeasurements { .. })));
    }

    #[test]
    fn test_rejects_duplicate_measurement_ids() {
        let result = DevicePollingConfig::builder("plc-001", manager())
            .measurement(holding("hr", 0, 1))
            .measurement(holding("hr", 10, 1))
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::DuplicateMeasurement { .. })
        ));
    }

    #[test]
    fn test_rejects_overlapping_ranges() {
        let result = DevicePollingConfig::builder("plc-001", manager())
            .measurement(holding("a", 100, 4))
            .measurement(holding("b", 102, 1))
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::OverlappingMeasurements { .. })
        ));
    }

    #[test]
    fn test_same_addresses_in_different_categories_do_not_overlap() {
        let result = DevicePollingConfig::builder("plc-001", manager())
            .measurement(holding("hr5", 5, 2))
            .measurement(MeasurementDefinition::input_register_range("ir5", 5, 2).unwrap())
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_declared_order_preserved() {
        let config = DevicePollingConfig::builder("plc-001", manager())
            .measurement(holding("second", 200, 1))
            .measurement(holding("first", 100, 1))
            .build()
            .unwrap();

        let ids: Vec<_> = config.measurements().iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec!["second", "first"]);
    }
}
