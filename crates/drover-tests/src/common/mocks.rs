// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! A scriptable tagged transport for testing the connection manager and the
//! polling scheduler in isolation.
//!
//! ## Design Principles
//!
//! - Configurable failure injection per connect and per read
//! - Shared register/coil memory acting as an ideal device
//! - Interaction counters for verification
//! - Thread-safe; every transport opened by the factory shares one state

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use drover_core::error::{ClientError, ClientResult};
use drover_core::types::MeasurementCategory;
use drover_modbus::transport::{
    ReadRequest, ReadResponse, ResponseCode, TagReadResult, TagTransport, TagValues,
    TransportFactory, WriteRequest, WriteResponse,
};

// =============================================================================
// Mock Device State
// =============================================================================

/// Shared state behind every transport a [`MockFactory`] opens.
///
/// Acts as an ideal Modbus device: reads return whatever was last written or
/// seeded, unknown addresses read as zero/false.
pub struct MockState {
    connected: AtomicBool,

    /// Coil / discrete-input memory, keyed by category + address.
    bits: Mutex<HashMap<(MeasurementCategory, u16), bool>>,

    /// Register memory (wire words), keyed by category + address.
    words: Mutex<HashMap<(MeasurementCategory, u16), i16>>,

    /// Number of upcoming connects that fail.
    fail_connects: AtomicU32,

    /// Number of upcoming reads that fail with a transport error.
    fail_reads: AtomicU32,

    /// Number of upcoming reads delayed by `read_delay`.
    delayed_reads: AtomicU32,

    /// Delay applied to every read (on top of `delayed_reads`).
    constant_read_delay: Mutex<Duration>,

    /// Delay applied while `delayed_reads` is positive.
    read_delay: Mutex<Duration>,

    connect_count: AtomicU64,
    read_count: AtomicU64,
    write_count: AtomicU64,
}

impl MockState {
    /// Creates a fresh mock device.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(false),
            bits: Mutex::new(HashMap::new()),
            words: Mutex::new(HashMap::new()),
            fail_connects: AtomicU32::new(0),
            fail_reads: AtomicU32::new(0),
            delayed_reads: AtomicU32::new(0),
            constant_read_delay: Mutex::new(Duration::ZERO),
            read_delay: Mutex::new(Duration::ZERO),
            connect_count: AtomicU64::new(0),
            read_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
        })
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Seeds a coil value.
    pub fn set_coil(&self, address: u16, value: bool) {
        self.bits
            .lock()
            .insert((MeasurementCategory::Coil, address), value);
    }

    /// Seeds a discrete input value.
    pub fn set_discrete_input(&self, address: u16, value: bool) {
        self.bits
            .lock()
            .insert((MeasurementCategory::DiscreteInput, address), value);
    }

    /// Seeds a holding register from a wire word.
    pub fn set_holding_register_word(&self, address: u16, word: i16) {
        self.words
            .lock()
            .insert((MeasurementCategory::HoldingRegister, address), word);
    }

    /// Seeds a holding register from an unsigned value.
    pub fn set_holding_register(&self, address: u16, value: u16) {
        self.set_holding_register_word(address, value as i16);
    }

    /// Seeds an input register from a wire word.
    pub fn set_input_register_word(&self, address: u16, word: i16) {
        self.words
            .lock()
            .insert((MeasurementCategory::InputRegister, address), word);
    }

    /// Seeds an input register from an unsigned value.
    pub fn set_input_register(&self, address: u16, value: u16) {
        self.set_input_register_word(address, value as i16);
    }

    // =========================================================================
    // Failure Injection
    // =========================================================================

    /// Makes the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.fail_connects.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` reads fail with a transport error.
    pub fn fail_next_reads(&self, count: u32) {
        self.fail_reads.store(count, Ordering::SeqCst);
    }

    /// Delays the next `count` reads by `delay`.
    pub fn delay_next_reads(&self, count: u32, delay: Duration) {
        *self.read_delay.lock() = delay;
        self.delayed_reads.store(count, Ordering::SeqCst);
    }

    /// Delays every read by `delay`.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.constant_read_delay.lock() = delay;
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Number of connect attempts observed.
    pub fn connect_count(&self) -> u64 {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Number of read requests observed.
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::SeqCst)
    }

    /// Number of write requests observed.
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::SeqCst)
    }
}

// =============================================================================
// MockTransport
// =============================================================================

/// A [`TagTransport`] view onto a [`MockState`].
pub struct MockTransport {
    state: Arc<MockState>,
}

#[async_trait]
impl TagTransport for MockTransport {
    async fn connect(&self) -> ClientResult<()> {
        self.state.connect_count.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_connects.load(Ordering::SeqCst) > 0 {
            self.state.fail_connects.fetch_sub(1, Ordering::SeqCst);
            return Err(ClientError::transport("mock: connection refused"));
        }
        self.state.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> ClientResult<()> {
        self.state.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self, request: &ReadRequest) -> ClientResult<ReadResponse> {
        self.state.read_count.fetch_add(1, Ordering::SeqCst);

        let constant = *self.state.constant_read_delay.lock();
        if !constant.is_zero() {
            tokio::time::sleep(constant).await;
        }
        if self.state.delayed_reads.load(Ordering::SeqCst) > 0 {
            self.state.delayed_reads.fetch_sub(1, Ordering::SeqCst);
            let delay = *self.state.read_delay.lock();
            tokio::time::sleep(delay).await;
        }

        if self.state.fail_reads.load(Ordering::SeqCst) > 0 {
            self.state.fail_reads.fetch_sub(1, Ordering::SeqCst);
            return Err(ClientError::transport("mock: connection reset"));
        }

        let mut response = ReadResponse::new();
        for (name, tag) in request.items() {
            let values = if tag.category().is_boolean() {
                let bits = self.state.bits.lock();
                TagValues::Bits(
                    (0..tag.count())
                        .map(|i| {
                            bits.get(&(tag.category(), tag.address() + i))
                                .copied()
                                .unwrap_or(false)
                        })
                        .collect(),
                )
            } else {
                let words = self.state.words.lock();
                TagValues::Words(
                    (0..tag.count())
                        .map(|i| {
                            words
                                .get(&(tag.category(), tag.address() + i))
                                .copied()
                                .unwrap_or(0)
                        })
                        .collect(),
                )
            };
            response.insert(name.clone(), TagReadResult::ok(values));
        }
        Ok(response)
    }

    async fn write(&self, request: &WriteRequest) -> ClientResult<WriteResponse> {
        self.state.write_count.fetch_add(1, Ordering::SeqCst);

        let mut response = WriteResponse::new();
        for (name, tag, values) in request.items() {
            match values {
                TagValues::Bits(values) => {
                    let mut bits = self.state.bits.lock();
                    for (i, value) in values.iter().enumerate() {
                        bits.insert((tag.category(), tag.address() + i as u16), *value);
                    }
                }
                TagValues::Words(values) => {
                    let mut words = self.state.words.lock();
                    for (i, value) in values.iter().enumerate() {
                        words.insert((tag.category(), tag.address() + i as u16), *value);
                    }
                }
            }
            response.insert(name.clone(), ResponseCode::Ok);
        }
        Ok(response)
    }

    fn display_name(&self) -> String {
        "mock device".to_string()
    }
}

// =============================================================================
// MockFactory
// =============================================================================

/// A [`TransportFactory`] whose transports all share one [`MockState`].
pub struct MockFactory {
    state: Arc<MockState>,
}

impl MockFactory {
    /// Creates a factory over the given device state.
    pub fn new(state: Arc<MockState>) -> Self {
        Self { state }
    }
}

impl TransportFactory for MockFactory {
    fn open(&self, _connection_string: &str) -> ClientResult<Box<dyn TagTransport>> {
        Ok(Box::new(MockTransport {
            state: self.state.clone(),
        }))
    }
}
