// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Durable Modbus session management.
//!
//! The [`ConnectionManager`] owns one [`TagTransport`] per endpoint and keeps
//! it alive across failures:
//!
//! - a background reconnect loop with exponential backoff and jitter,
//!   started by [`start()`](ConnectionManager::start)
//! - per-operation retry that drops the broken transport, sleeps a backoff,
//!   and reconnects before the next attempt
//! - a per-request timeout bounding every wire exchange
//! - typed read/write operations for all four Modbus object categories,
//!   with registers exposed as unsigned 16-bit integers
//!
//! The live transport sits in an atomic cell: readers observe either a
//! connected transport or absence, and any failure eagerly swaps the cell to
//! absence so concurrent callers converge on the reconnect path.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use prometheus::IntCounter;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use drover_core::address::TagAddress;
use drover_core::error::{ClientError, ClientResult};
use drover_core::metrics::MetricsHub;
use drover_core::types::MeasurementCategory;

use crate::backoff::BackoffPolicy;
use crate::config::ConnectionConfig;
use crate::transport::{
    ReadRequest, ReadResponse, TagTransport, TagValues, TransportFactory, WriteRequest,
};

const READ_TAG: &str = "r";
const WRITE_TAG: &str = "w";

// =============================================================================
// Health Snapshot
// =============================================================================

/// Connection status as reported by [`ConnectionManager::health`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// An open transport exists and reports itself connected.
    Healthy,
    /// The connection is down and not being re-established.
    Unhealthy,
    /// No usable transport; the reconnect loop is (or will be) working on it.
    Connecting,
    /// The manager was stopped. Terminal.
    Closed,
}

/// Point-in-time view of a connection manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Current status.
    pub status: HealthState,
    /// When the transport last connected successfully.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// When a connect was last attempted.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// The last connect error, as error kind plus message. Cleared on the
    /// next successful connect.
    pub last_error: Option<String>,
}

// =============================================================================
// ConnectionManager
// =============================================================================

/// Maintains one durable Modbus session and exposes typed operations on it.
///
/// # Lifecycle
///
/// Create, [`start()`](Self::start), use, then [`stop()`](Self::stop). Stop
/// is terminal: a stopped manager rejects `start()` and every operation with
/// [`ClientError::Closed`].
///
/// # Example
///
/// ```rust,ignore
/// use drover_modbus::config::ConnectionConfig;
/// use drover_modbus::manager::ConnectionManager;
/// use drover_modbus::tcp::ModbusTransportFactory;
///
/// let config = ConnectionConfig::builder("modbus:tcp://10.0.0.5:502?unit-identifier=1")
///     .build()?;
/// let manager = ConnectionManager::new(config, Arc::new(ModbusTransportFactory));
/// manager.start()?;
///
/// let value = manager.read_holding_register(100).await?;
/// manager.stop().await;
/// ```
pub struct ConnectionManager {
    shared: Arc<Shared>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    config: ConnectionConfig,
    factory: Arc<dyn TransportFactory>,
    backoff: BackoffPolicy,
    connection: RwLock<Option<Arc<dyn TagTransport>>>,
    // Serializes connect attempts so a losing racer never leaks a transport.
    connect_gate: tokio::sync::Mutex<()>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_attempt_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    reconnect_attempts: AtomicU32,
    closed: AtomicBool,
    reconnects: Option<IntCounter>,
}

impl ConnectionManager {
    /// Creates a manager without metrics.
    pub fn new(config: ConnectionConfig, factory: Arc<dyn TransportFactory>) -> Self {
        Self::build(config, factory, None)
    }

    /// Creates a manager publishing its reconnect counter into `metrics`.
    pub fn with_metrics(
        config: ConnectionConfig,
        factory: Arc<dyn TransportFactory>,
        metrics: &MetricsHub,
    ) -> Self {
        let reconnects = Some(metrics.reconnects(config.connection_string()));
        Self::build(config, factory, reconnects)
    }

    fn build(
        config: ConnectionConfig,
        factory: Arc<dyn TransportFactory>,
        reconnects: Option<IntCounter>,
    ) -> Self {
        let backoff = config.backoff_policy();
        Self {
            shared: Arc::new(Shared {
                config,
                factory,
                backoff,
                connection: RwLock::new(None),
                connect_gate: tokio::sync::Mutex::new(()),
                last_connected_at: RwLock::new(None),
                last_attempt_at: RwLock::new(None),
                last_error: RwLock::new(None),
                reconnect_attempts: AtomicU32::new(0),
                closed: AtomicBool::new(false),
                reconnects,
            }),
            reconnect_task: Mutex::new(None),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Launches the background reconnect loop. Idempotent.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] when the manager was already stopped.
    pub fn start(&self) -> ClientResult<()> {
        if self.shared.is_closed() {
            return Err(ClientError::Closed);
        }
        self.shared.reconnect_attempts.store(0, Ordering::Relaxed);

        let shared = self.shared.clone();
        let mut guard = self.reconnect_task.lock();
        if let Some(previous) = guard.take() {
            previous.abort();
        }
        *guard = Some(tokio::spawn(async move {
            shared.connect_with_backoff().await;
        }));

        Ok(())
    }

    /// Stops the manager: cancels the reconnect loop and closes any open
    /// transport. Terminal and idempotent.
    pub async fn stop(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);

        let handle = self.reconnect_task.lock().take();
        if let Some(handle) = handle {
            handle.abort();
        }

        self.shared.drop_connection().await;

        tracing::debug!(
            connection = %self.shared.config.connection_string(),
            "Connection manager stopped"
        );
    }

    /// Alias for [`stop()`](Self::stop).
    pub async fn close(&self) {
        self.stop().await;
    }

    /// Returns `true` iff an open transport exists and reports itself
    /// connected.
    pub fn is_connected(&self) -> bool {
        self.shared
            .current_connection()
            .map(|c| c.is_connected())
            .unwrap_or(false)
    }

    /// Returns a snapshot of the connection health.
    pub fn health(&self) -> HealthSnapshot {
        let status = if self.shared.is_closed() {
            HealthState::Closed
        } else if self.is_connected() {
            HealthState::Healthy
        } else {
            HealthState::Connecting
        };

        HealthSnapshot {
            status,
            last_connected_at: *self.shared.last_connected_at.read(),
            last_attempt_at: *self.shared.last_attempt_at.read(),
            last_error: self.shared.last_error.read().clone(),
        }
    }

    // =========================================================================
    // Typed Operations: Read Single
    // =========================================================================

    /// Reads a single coil. An empty response yields `false`.
    pub async fn read_coil(&self, address: u16) -> ClientResult<bool> {
        let values = self.read_coils(address, 1).await?;
        Ok(values.first().copied().unwrap_or(false))
    }

    /// Reads a single discrete input. An empty response yields `false`.
    pub async fn read_discrete_input(&self, address: u16) -> ClientResult<bool> {
        let values = self.read_discrete_inputs(address, 1).await?;
        Ok(values.first().copied().unwrap_or(false))
    }

    /// Reads a single holding register as an unsigned 16-bit value.
    pub async fn read_holding_register(&self, address: u16) -> ClientResult<u16> {
        let values = self.read_holding_registers(address, 1).await?;
        Ok(values.first().copied().unwrap_or(0))
    }

    /// Reads a single input register as an unsigned 16-bit value.
    pub async fn read_input_register(&self, address: u16) -> ClientResult<u16> {
        let values = self.read_input_registers(address, 1).await?;
        Ok(values.first().copied().unwrap_or(0))
    }

    // =========================================================================
    // Typed Operations: Read Ranged
    // =========================================================================

    /// Reads `count` coils starting at `address`.
    pub async fn read_coils(&self, address: u16, count: u16) -> ClientResult<Vec<bool>> {
        let tag = TagAddress::new(MeasurementCategory::Coil, address, count);
        self.execute_with_retry(|| self.do_read_bits(tag)).await
    }

    /// Reads `count` discrete inputs starting at `address`.
    pub async fn read_discrete_inputs(&self, address: u16, count: u16) -> ClientResult<Vec<bool>> {
        let tag = TagAddress::new(MeasurementCategory::DiscreteInput, address, count);
        self.execute_with_retry(|| self.do_read_bits(tag)).await
    }

    /// Reads `count` holding registers starting at `address` as unsigned
    /// 16-bit values.
    pub async fn read_holding_registers(
        &self,
        address: u16,
        count: u16,
    ) -> ClientResult<Vec<u16>> {
        let tag = TagAddress::new(MeasurementCategory::HoldingRegister, address, count);
        self.execute_with_retry(|| self.do_read_words(tag)).await
    }

    /// Reads `count` input registers starting at `address` as unsigned
    /// 16-bit values.
    pub async fn read_input_registers(&self, address: u16, count: u16) -> ClientResult<Vec<u16>> {
        let tag = TagAddress::new(MeasurementCategory::InputRegister, address, count);
        self.execute_with_retry(|| self.do_read_words(tag)).await
    }

    // =========================================================================
    // Typed Operations: Write
    // =========================================================================

    /// Writes a single coil.
    pub async fn write_coil(&self, address: u16, value: bool) -> ClientResult<()> {
        let tag = TagAddress::single(MeasurementCategory::Coil, address);
        let values = TagValues::Bits(vec![value]);
        self.execute_with_retry(|| self.do_write(tag, values.clone()))
            .await
    }

    /// Writes a run of coils starting at `address`.
    pub async fn write_coils(&self, address: u16, values: &[bool]) -> ClientResult<()> {
        if values.is_empty() {
            return Err(ClientError::protocol("Write requires at least one value"));
        }
        let tag = TagAddress::new(MeasurementCategory::Coil, address, values.len() as u16);
        let values = TagValues::Bits(values.to_vec());
        self.execute_with_retry(|| self.do_write(tag, values.clone()))
            .await
    }

    /// Writes a single holding register. The value's low 16 bits go on the
    /// wire.
    pub async fn write_holding_register(&self, address: u16, value: u16) -> ClientResult<()> {
        let tag = TagAddress::single(MeasurementCategory::HoldingRegister, address);
        let values = TagValues::Words(vec![value as i16]);
        self.execute_with_retry(|| self.do_write(tag, values.clone()))
            .await
    }

    /// Writes a run of holding registers starting at `address`.
    pub async fn write_holding_registers(&self, address: u16, values: &[u16]) -> ClientResult<()> {
        if values.is_empty() {
            return Err(ClientError::protocol("Write requires at least one value"));
        }
        let tag = TagAddress::new(
            MeasurementCategory::HoldingRegister,
            address,
            values.len() as u16,
        );
        let values = TagValues::Words(values.iter().map(|v| *v as i16).collect());
        self.execute_with_retry(|| self.do_write(tag, values.clone()))
            .await
    }

    // =========================================================================
    // Low-level Operations
    // =========================================================================

    async fn do_read_bits(&self, tag: TagAddress) -> ClientResult<Vec<bool>> {
        let response = self.do_read(tag).await?;
        response
            .all_bits(READ_TAG)
            .map(|bits| bits.to_vec())
            .ok_or_else(|| ClientError::protocol("Response carries no boolean values"))
    }

    async fn do_read_words(&self, tag: TagAddress) -> ClientResult<Vec<u16>> {
        let response = self.do_read(tag).await?;
        response
            .all_words(READ_TAG)
            .map(|words| words.iter().map(|w| unsigned16(*w)).collect())
            .ok_or_else(|| ClientError::protocol("Response carries no register values"))
    }

    async fn do_read(&self, tag: TagAddress) -> ClientResult<ReadResponse> {
        let connection = self.shared.require_connection().await?;
        let request = ReadRequest::builder().tag(READ_TAG, tag).build();
        let response = self.with_timeout(connection.read(&request)).await?;

        match response.response_code(READ_TAG) {
            Some(code) if code.is_ok() => Ok(response),
            Some(code) => Err(ClientError::protocol(format!("Read failed: {}", code))),
            None => Err(ClientError::protocol("Read response missing tag")),
        }
    }

    async fn do_write(&self, tag: TagAddress, values: TagValues) -> ClientResult<()> {
        let connection = self.shared.require_connection().await?;
        let request = WriteRequest::builder().tag(WRITE_TAG, tag, values).build();
        let response = self.with_timeout(connection.write(&request)).await?;

        match response.response_code(WRITE_TAG) {
            Some(code) if code.is_ok() => Ok(()),
            Some(code) => Err(ClientError::protocol(format!("Write failed: {}", code))),
            None => Err(ClientError::protocol("Write response missing tag")),
        }
    }

    async fn with_timeout<T>(
        &self,
        request: impl std::future::Future<Output = ClientResult<T>>,
    ) -> ClientResult<T> {
        let timeout = self.shared.config.request_timeout();
        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::timeout(timeout)),
        }
    }

    // =========================================================================
    // Retry
    // =========================================================================

    /// Runs `operation` up to `max_retries + 1` times.
    ///
    /// After a failure the current transport is dropped, a backoff keyed by
    /// the retry count is slept, and the next attempt reconnects before
    /// touching the wire. The first attempt is never preceded by a sleep.
    async fn execute_with_retry<T, F, Fut>(&self, operation: F) -> ClientResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ClientResult<T>>,
    {
        let shared = &self.shared;
        let mut last_error: Option<ClientError> = None;
        let mut attempt: u32 = 0;

        while attempt <= shared.config.max_retries() {
            if shared.is_closed() {
                return Err(ClientError::Closed);
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(ClientError::Closed) => return Err(ClientError::Closed),
                Err(error) => {
                    tracing::debug!(
                        connection = %shared.config.connection_string(),
                        attempt,
                        max_retries = shared.config.max_retries(),
                        error = %error,
                        "Modbus operation failed; dropping transport before retry"
                    );
                    shared.drop_connection().await;
                    let delay = shared.backoff.delay(attempt);
                    last_error = Some(error);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ClientError::unavailable(attempt)))
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connection", &self.shared.config.connection_string())
            .field("connected", &self.is_connected())
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}

// =============================================================================
// Shared Connection State
// =============================================================================

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn current_connection(&self) -> Option<Arc<dyn TagTransport>> {
        self.connection.read().clone()
    }

    /// Takes the current transport out of the cell and closes it.
    async fn drop_connection(&self) {
        let connection = self.connection.write().take();
        if let Some(connection) = connection {
            if let Err(error) = connection.close().await {
                tracing::debug!(error = %error, "Error closing Modbus transport");
            }
        }
    }

    /// Returns a connected transport, making one bounded connect attempt if
    /// the cell is empty or broken.
    async fn require_connection(&self) -> ClientResult<Arc<dyn TagTransport>> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        if let Some(connection) = self.current_connection() {
            if connection.is_connected() {
                return Ok(connection);
            }
        }

        self.connect_once().await?;

        self.current_connection()
            .filter(|c| c.is_connected())
            .ok_or_else(|| {
                ClientError::transport("Unable to obtain a connected Modbus connection")
            })
    }

    /// One connect attempt: opens a transport for the configured connection
    /// string and installs it on success.
    async fn connect_once(&self) -> ClientResult<()> {
        let _gate = self.connect_gate.lock().await;

        if self.is_closed() {
            return Err(ClientError::Closed);
        }

        *self.last_attempt_at.write() = Some(Utc::now());

        if let Some(existing) = self.current_connection() {
            if existing.is_connected() {
                return Ok(());
            }
        }

        match self.open_transport().await {
            Ok(transport) => {
                tracing::info!(
                    connection = %self.config.connection_string(),
                    transport = %transport.display_name(),
                    "Modbus connection established"
                );
                *self.connection.write() = Some(transport);
                *self.last_connected_at.write() = Some(Utc::now());
                *self.last_error.write() = None;
                self.reconnect_attempts.store(0, Ordering::Relaxed);
                if let Some(counter) = &self.reconnects {
                    counter.inc();
                }
                Ok(())
            }
            Err(error) => {
                *self.last_error.write() = Some(error.detail());
                self.drop_connection().await;
                Err(error)
            }
        }
    }

    async fn open_transport(&self) -> ClientResult<Arc<dyn TagTransport>> {
        let transport: Arc<dyn TagTransport> =
            Arc::from(self.factory.open(self.config.connection_string())?);

        match transport.connect().await {
            Ok(()) if transport.is_connected() => Ok(transport),
            Ok(()) => {
                let _ = transport.close().await;
                Err(ClientError::transport("Connection not established"))
            }
            Err(error) => {
                let _ = transport.close().await;
                Err(error)
            }
        }
    }

    /// Reconnect loop: attempts until connected or closed, sleeping a backoff
    /// keyed by the unbroken-failure attempt counter between tries.
    async fn connect_with_backoff(&self) {
        while !self.is_closed() {
            match self.connect_once().await {
                Ok(()) | Err(ClientError::Closed) => return,
                Err(error) => {
                    let attempt = self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
                    let delay = self.backoff.delay(attempt);
                    tracing::debug!(
                        connection = %self.config.connection_string(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Modbus connect failed; backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Reinterprets a signed wire word as its unsigned 16-bit value.
#[inline]
const fn unsigned16(word: i16) -> u16 {
    word as u16
}

// =============================================================================
// Tests
// =============================================================================
