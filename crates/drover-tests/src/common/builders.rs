// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Builders
//!
//! Short-hands for wiring managers, schedulers, and measurement definitions
//! in integration tests. Timings are compressed so retry and backoff paths
//! run in milliseconds.

use std::sync::Arc;
use std::time::Duration;

use drover_core::metrics::MetricsHub;
use drover_core::types::MeasurementDefinition;
use drover_modbus::config::ConnectionConfig;
use drover_modbus::manager::ConnectionManager;

use super::mocks::{MockFactory, MockState};

/// Connection string used by every mock-backed manager.
pub const MOCK_CONNECTION: &str = "modbus:tcp://mock:502?unit-identifier=1";

/// A connection config with millisecond-scale timeouts and no jitter.
pub fn fast_connection_config() -> ConnectionConfig {
    ConnectionConfig::builder(MOCK_CONNECTION)
        .request_timeout(Duration::from_millis(250))
        .initial_backoff(Duration::from_millis(2))
        .max_backoff(Duration::from_millis(10))
        .jitter(0.0)
        .build()
        .expect("fast connection config")
}

/// A manager over a fresh mock device.
pub fn mock_manager() -> (Arc<ConnectionManager>, Arc<MockState>) {
    mock_manager_with(fast_connection_config(), None)
}

/// A manager over a fresh mock device, publishing into `metrics`.
pub fn metered_mock_manager(metrics: &MetricsHub) -> (Arc<ConnectionManager>, Arc<MockState>) {
    mock_manager_with(fast_connection_config(), Some(metrics))
}

/// A manager over a fresh mock device with a custom configuration.
pub fn mock_manager_with(
    config: ConnectionConfig,
    metrics: Option<&MetricsHub>,
) -> (Arc<ConnectionManager>, Arc<MockState>) {
    let state = MockState::new();
    let factory = Arc::new(MockFactory::new(state.clone()));
    let manager = match metrics {
        Some(metrics) => ConnectionManager::with_metrics(config, factory, metrics),
        None => ConnectionManager::new(config, factory),
    };
    (Arc::new(manager), state)
}

/// Holding-register measurement with `count == 1`.
pub fn holding(id: &str, address: u16) -> MeasurementDefinition {
    MeasurementDefinition::holding_register(id, address).expect("definition")
}

/// Holding-register range measurement.
pub fn holding_range(id: &str, address: u16, count: u16) -> MeasurementDefinition {
    MeasurementDefinition::holding_register_range(id, address, count).expect("definition")
}

/// Coil measurement with `count == 1`.
pub fn coil(id: &str, address: u16) -> MeasurementDefinition {
    MeasurementDefinition::coil(id, address).expect("definition")
}

/// Discrete-input measurement with `count == 1`.
pub fn discrete_input(id: &str, address: u16) -> MeasurementDefinition {
    MeasurementDefinition::discrete_input(id, address).expect("definition")
}

/// Input-register measurement with `count == 1`.
pub fn input_register(id: &str, address: u16) -> MeasurementDefinition {
    MeasurementDefinition::input_register(id, address).expect("definition")
}

/// Polls `condition` every few milliseconds until it holds or `limit`
/// elapses. Returns whether the condition was met.
pub async fn wait_for(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Installs a test tracing subscriber once per process.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}
