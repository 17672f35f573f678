// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # drover-core
//!
//! Core abstractions and shared types for the drover Modbus polling engine.
//!
//! This crate provides the foundation used by the connection layer and the
//! polling scheduler:
//!
//! - **Types**: `DeviceId`, `MeasurementCategory`, `MeasurementDefinition`,
//!   `SampleValue`, `MeasurementSample`, `MeasurementEvent`
//! - **Address**: the `category:address[count]` tag grammar
//! - **Error**: unified error hierarchy with retryability classification
//! - **Bus**: synchronous in-process fan-out of measurement events
//! - **Metrics**: Prometheus meter catalog
//!
//! ## Example
//!
//! ```
//! use drover_core::types::{MeasurementCategory, MeasurementDefinition};
//! use drover_core::address::TagAddress;
//!
//! let def = MeasurementDefinition::holding_register_range("hr100", 100, 2).unwrap();
//! let tag = TagAddress::new(def.category(), def.address(), def.count());
//! assert_eq!(tag.to_string(), "holding-register:100[2]");
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod address;
pub mod bus;
pub mod error;
pub mod metrics;
pub mod types;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use address::TagAddress;
pub use bus::{EventConsumer, InMemoryMeasurementEventBus, MeasurementEventBus, Subscription};
pub use error::{
    ClientError, ClientResult, ConfigError, ConfigResult, DroverError, DroverResult,
    SampleTypeError,
};
pub use metrics::MetricsHub;
pub use types::{
    DeviceId, MeasurementCategory, MeasurementDefinition, MeasurementEvent, MeasurementSample,
    SampleValue,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
