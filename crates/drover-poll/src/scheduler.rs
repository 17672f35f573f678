// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Fixed-rate device polling.
//!
//! The [`PollingScheduler`] owns one context per registered device. Each
//! context runs a ticker task at the configured rate; every tick tries to
//! launch a poll cycle. Cycles are serialized per device by an in-flight
//! flag: a tick that lands while the previous cycle is still running is
//! dropped and counted as backpressure. Devices poll independently of each
//! other on the shared runtime.
//!
//! A poll cycle executes the device's batch plan sequentially on its
//! connection manager, slices the results back into per-measurement samples,
//! and publishes one [`MeasurementEvent`] carrying the samples in declared
//! order. A failed cycle publishes nothing; it records the error and waits
//! for the next tick. The scheduler never retries — retry policy lives in
//! the connection manager.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use prometheus::{Histogram, IntCounter};
use tokio::task::JoinHandle;

use drover_core::bus::MeasurementEventBus;
use drover_core::error::{ClientError, ClientResult, ConfigError, DroverError, DroverResult};
use drover_core::metrics::MetricsHub;
use drover_core::types::{
    DeviceId, MeasurementCategory, MeasurementEvent, MeasurementSample, SampleValue,
};

use crate::batch::{plan_batches, Batch};
use crate::config::DevicePollingConfig;

// =============================================================================
// Device Meters
// =============================================================================

struct DeviceMeters {
    duration: Histogram,
    errors: IntCounter,
    backpressure: IntCounter,
}

impl DeviceMeters {
    fn new(metrics: &MetricsHub, device_id: &DeviceId) -> Self {
        Self {
            duration: metrics.poll_duration(device_id.as_str()),
            errors: metrics.poll_errors(device_id.as_str()),
            backpressure: metrics.poll_backpressure(device_id.as_str()),
        }
    }
}

// =============================================================================
// Device Context
// =============================================================================

struct DeviceContext {
    config: DevicePollingConfig,
    batches: Vec<Batch>,
    in_flight: AtomicBool,
    last_error: RwLock<Option<String>>,
    meters: Option<DeviceMeters>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    cycle: Mutex<Option<JoinHandle<()>>>,
}

// =============================================================================
// PollingScheduler
// =============================================================================

/// Polls registered devices on fixed schedules, batching adjacent addresses,
/// publishing events, and recording metrics.
///
/// # Lifecycle
///
/// Registering a device starts its connection manager and its periodic task;
/// unregistering cancels the task (letting an in-flight cycle finish) and
/// stops the manager. [`close()`](Self::close) tears everything down,
/// interrupting in-flight cycles.
pub struct PollingScheduler {
    bus: Arc<dyn MeasurementEventBus>,
    metrics: Option<Arc<MetricsHub>>,
    contexts: DashMap<DeviceId, Arc<DeviceContext>>,
}

impl PollingScheduler {
    /// Creates a scheduler publishing on `bus`, without metrics.
    pub fn new(bus: Arc<dyn MeasurementEventBus>) -> Self {
        Self {
            bus,
            metrics: None,
            contexts: DashMap::new(),
        }
    }

    /// Creates a scheduler publishing on `bus` and metering into `metrics`.
    pub fn with_metrics(bus: Arc<dyn MeasurementEventBus>, metrics: Arc<MetricsHub>) -> Self {
        Self {
            bus,
            metrics: Some(metrics),
            contexts: DashMap::new(),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a device and schedules its polling task.
    ///
    /// Starts the device's connection manager, plans the batches once, and
    /// begins polling after `initial_delay`, then every `poll_interval`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::DuplicateDevice`] — the device ID is already
    ///   registered
    /// - [`ClientError::Closed`] — the connection manager was already stopped
    ///   (the registration is rolled back)
    pub async fn register_device(&self, config: DevicePollingConfig) -> DroverResult<()> {
        let device_id = config.device_id().clone();

        let batches = plan_batches(config.measurements());
        if batches.is_empty() {
            return Err(ConfigError::no_measurements(device_id.as_str()).into());
        }

        let meters = self
            .metrics
            .as_deref()
            .map(|metrics| DeviceMeters::new(metrics, &device_id));

        let context = Arc::new(DeviceContext {
            config,
            batches,
            in_flight: AtomicBool::new(false),
            last_error: RwLock::new(None),
            meters,
            ticker: Mutex::new(None),
            cycle: Mutex::new(None),
        });

        match self.contexts.entry(device_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(ConfigError::duplicate_device(device_id.as_str()).into());
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(context.clone());
            }
        }

        if let Err(error) = context.config.connection_manager().start() {
            self.contexts.remove(&device_id);
            context.config.connection_manager().stop().await;
            return Err(DroverError::Client(error));
        }

        let ticker = tokio::spawn(Self::run_ticker(context.clone(), self.bus.clone()));
        *context.ticker.lock() = Some(ticker);

        tracing::info!(device_id = %device_id, batches = context.batches.len(), "Registered device for polling");

        Ok(())
    }

    /// Unregisters a device: cancels its ticker without interrupting an
    /// in-flight cycle, and stops its connection manager. Idempotent on
    /// unknown IDs.
    pub async fn unregister_device(&self, device_id: &DeviceId) {
        if let Some((_, context)) = self.contexts.remove(device_id) {
            if let Some(ticker) = context.ticker.lock().take() {
                ticker.abort();
            }
            context.config.connection_manager().stop().await;
            tracing::info!(device_id = %device_id, "Unregistered device");
        }
    }

    /// Returns `true` while the device is registered.
    pub fn is_registered(&self, device_id: &DeviceId) -> bool {
        self.contexts.contains_key(device_id)
    }

    /// Returns the registered device IDs.
    pub fn registered_devices(&self) -> Vec<DeviceId> {
        self.contexts.iter().map(|e| e.key().clone()).collect()
    }

    /// Returns the last poll-cycle error for a device, if any. Cleared by the
    /// next successful cycle.
    pub fn last_error(&self, device_id: &DeviceId) -> Option<String> {
        self.contexts
            .get(device_id)
            .and_then(|context| context.last_error.read().clone())
    }

    /// Cancels all polling tasks, interrupting in-flight cycles, stops every
    /// connection manager, and clears the registrations.
    pub async fn close(&self) {
        let contexts: Vec<Arc<DeviceContext>> =
            self.contexts.iter().map(|e| e.value().clone()).collect();
        self.contexts.clear();

        for context in contexts {
            if let Some(ticker) = context.ticker.lock().take() {
                ticker.abort();
            }
            if let Some(cycle) = context.cycle.lock().take() {
                cycle.abort();
            }
            context.config.connection_manager().stop().await;
        }

        tracing::debug!("Polling scheduler closed");
    }

    // =========================================================================
    // Poll Execution
    // =========================================================================

    async fn run_ticker(context: Arc<DeviceContext>, bus: Arc<dyn MeasurementEventBus>) {
        let first = tokio::time::Instant::now() + context.config.initial_delay();
        let mut interval = tokio::time::interval_at(first, context.config.poll_interval());

        loop {
            interval.tick().await;
            Self::launch_cycle(&context, &bus);
        }
    }

    /// Launches one poll cycle unless the previous one is still in flight,
    /// in which case the tick is dropped and counted.
    fn launch_cycle(context: &Arc<DeviceContext>, bus: &Arc<dyn MeasurementEventBus>) {
        if context
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            if let Some(meters) = &context.meters {
                meters.backpressure.inc();
            }
            tracing::trace!(
                device_id = %context.config.device_id(),
                "Poll tick dropped; previous cycle still in flight"
            );
            return;
        }

        let context_task = context.clone();
        let bus_task = bus.clone();
        let cycle = tokio::spawn(async move {
            Self::run_cycle(&context_task, &bus_task).await;
        });
        *context.cycle.lock() = Some(cycle);
    }

    async fn run_cycle(context: &DeviceContext, bus: &Arc<dyn MeasurementEventBus>) {
        let timer = context
            .meters
            .as_ref()
            .map(|meters| meters.duration.start_timer());

        match Self::perform_poll(context).await {
            Ok(samples) => {
                if !samples.is_empty() {
                    let event = MeasurementEvent::new(
                        context.config.device_id().clone(),
                        Utc::now(),
                        samples,
                    );
                    bus.publish(&event);
                }
                if let Some(timer) = timer {
                    timer.stop_and_record();
                }
                *context.last_error.write() = None;
            }
            Err(error) => {
                tracing::warn!(
                    device_id = %context.config.device_id(),
                    error = %error,
                    "Poll cycle failed"
                );
                *context.last_error.write() = Some(error.detail());
                if let Some(meters) = &context.meters {
                    meters.errors.inc();
                }
                if let Some(timer) = timer {
                    timer.stop_and_discard();
                }
            }
        }

        context.in_flight.store(false, Ordering::SeqCst);
    }

    /// Executes every batch sequentially and reassembles the samples in
    /// declared order.
    async fn perform_poll(context: &DeviceContext) -> ClientResult<Vec<MeasurementSample>> {
        let manager = context.config.connection_manager();
        let mut by_id: HashMap<String, MeasurementSample> = HashMap::new();

        for batch in &context.batches {
            match batch.category() {
                MeasurementCategory::Coil => {
                    let values = manager.read_coils(batch.start_address(), batch.count()).await?;
                    Self::apply_boolean_batch(batch, &values, &mut by_id)?;
                }
                MeasurementCategory::DiscreteInput => {
                    let values = manager
                        .read_discrete_inputs(batch.start_address(), batch.count())
                        .await?;
                    Self::apply_boolean_batch(batch, &values, &mut by_id)?;
                }
                MeasurementCategory::HoldingRegister => {
                    let values = manager
                        .read_holding_registers(batch.start_address(), batch.count())
                        .await?;
                    Self::apply_register_batch(batch, &values, &mut by_id)?;
                }
                MeasurementCategory::InputRegister => {
                    let values = manager
                        .read_input_registers(batch.start_address(), batch.count())
                        .await?;
                    Self::apply_register_batch(batch, &values, &mut by_id)?;
                }
            }
        }

        let mut ordered = Vec::with_capacity(context.config.measurements().len());
        for definition in context.config.measurements() {
            if let Some(sample) = by_id.remove(definition.id()) {
                ordered.push(sample);
            }
        }
        Ok(ordered)
    }

    fn apply_boolean_batch(
        batch: &Batch,
        values: &[bool],
        out: &mut HashMap<String, MeasurementSample>,
    ) -> ClientResult<()> {
        if values.len() < batch.count() as usize {
            return Err(ClientError::protocol(
                "Received fewer boolean values than expected",
            ));
        }
        for slice in batch.slices() {
            let definition = slice.definition();
            let offset = slice.offset() as usize;
            let len = definition.count() as usize;
            let value = if len == 1 {
                SampleValue::Bool(values[offset])
            } else {
                SampleValue::Bools(values[offset..offset + len].to_vec())
            };
            out.insert(
                definition.id().to_string(),
                MeasurementSample::new(definition.clone(), value),
            );
        }
        Ok(())
    }

    fn apply_register_batch(
        batch: &Batch,
        values: &[u16],
        out: &mut HashMap<String, MeasurementSample>,
    ) -> ClientResult<()> {
        if values.len() < batch.count() as usize {
            return Err(ClientError::protocol(
                "Received fewer register values than expected",
            ));
        }
        for slice in batch.slices() {
            let definition = slice.definition();
            let offset = slice.offset() as usize;
            let len = definition.count() as usize;
            let value = if len == 1 {
                SampleValue::Word(values[offset])
            } else {
                SampleValue::Words(values[offset..offset + len].to_vec())
            };
            out.insert(
                definition.id().to_string(),
                MeasurementSample::new(definition.clone(), value),
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for PollingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingScheduler")
            .field("devices", &self.contexts.len())
            .field("metered", &self.metrics.is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::bus::InMemoryMeasurementEventBus;
    use drover_core::types::MeasurementDefinition;
    use drover_modbus::config::ConnectionConfig;
    use drover_modbus::manager::ConnectionManager;
    use drover_modbus::tcp::ModbusTransportFactory;
    use std::time::Duration;

    fn polling_config(device: &str) -> DevicePollingConfig {
        let connection = ConnectionConfig::builder("modbus:tcp://127.0.0.1:1")
            .initial_backoff(Duration::from_millis(5))
            .max_backoff(Duration::from_millis(10))
            .build()
            .unwrap();
        let manager = Arc::new(ConnectionManager::new(
            connection,
            Arc::new(ModbusTransportFactory::new()),
        ));
        DevicePollingConfig::builder(device, manager)
            .poll_interval(Duration::from_secs(60))
            .measurement(MeasurementDefinition::holding_register("hr", 0).unwrap())
            .build()
            .unwrap()
    }

    fn scheduler() -> PollingScheduler {
        PollingScheduler::new(Arc::new(InMemoryMeasurementEventBus::new()))
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let scheduler = scheduler();
        let device = DeviceId::new("plc-001");

        scheduler.register_device(polling_config("plc-001")).await.unwrap();
        assert!(scheduler.is_registered(&device));
        assert_eq!(scheduler.registered_devices(), vec![device.clone()]);

        scheduler.unregister_device(&device).await;
        assert!(!scheduler.is_registered(&device));

        // Idempotent on unknown IDs.
        scheduler.unregister_device(&device).await;
    }

    #[tokio::test]
    async fn test_duplicate_registration_fails() {
        let scheduler = scheduler();
        scheduler.register_device(polling_config("plc-001")).await.unwrap();

        let error = scheduler
            .register_device(polling_config("plc-001"))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            DroverError::Config(ConfigError::DuplicateDevice { .. })
        ));

        scheduler.close().await;
    }

    #[tokio::test]
    async fn test_registration_rolls_back_when_manager_closed() {
        let scheduler = scheduler();
        let config = polling_config("plc-001");
        config.connection_manager().stop().await;

        let error = scheduler.register_device(config).await.unwrap_err();
        assert!(matches!(error, DroverError::Client(ClientError::Closed)));
        assert!(!scheduler.is_registered(&DeviceId::new("plc-001")));
    }

    #[tokio::test]
    async fn test_close_clears_registrations() {
        let scheduler = scheduler();
        scheduler.register_device(polling_config("a")).await.unwrap();
        scheduler.register_device(polling_config("b")).await.unwrap();

        scheduler.close().await;
        assert!(scheduler.registered_devices().is_empty());
    }

    #[tokio::test]
    async fn test_last_error_unknown_device() {
        let scheduler = scheduler();
        assert_eq!(scheduler.last_error(&DeviceId::new("nope")), None);
    }
}
