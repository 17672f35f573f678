// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # drover-modbus
//!
//! Modbus connection management for drover.
//!
//! This crate keeps one durable session per endpoint and exposes typed
//! operations on it:
//!
//! - **Transport**: the tagged-transport abstraction (`TagTransport`,
//!   `TransportFactory`) with per-tag response codes
//! - **Tcp**: a tokio-modbus backed transport for `modbus:tcp://` and
//!   `modbus:rtu-tcp://` connection strings
//! - **Backoff**: exponential, clamped, jittered delays
//! - **Config**: per-connection timeouts and retry policy
//! - **Manager**: the connection manager — reconnect loop, per-operation
//!   retry, typed reads/writes, health snapshots
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              ConnectionManager              │
//! │   (reconnect loop, retry, typed ops)        │
//! └─────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────┐
//! │                TagTransport                 │
//! │     (tagged reads/writes, response codes)   │
//! └─────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────┐
//! │            ModbusTcpTransport               │
//! │              (tokio-modbus)                 │
//! └─────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod backoff;
pub mod config;
pub mod manager;
pub mod tcp;
pub mod transport;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use backoff::BackoffPolicy;
pub use config::{ConnectionConfig, ConnectionConfigBuilder};
pub use manager::{ConnectionManager, HealthSnapshot, HealthState};
pub use tcp::{ModbusTcpTransport, ModbusTransportFactory};
pub use transport::{
    ReadRequest, ReadRequestBuilder, ReadResponse, ResponseCode, TagReadResult, TagTransport,
    TagValues, TransportFactory, WriteRequest, WriteRequestBuilder, WriteResponse,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
