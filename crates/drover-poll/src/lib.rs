// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # drover-poll
//!
//! Fixed-rate measurement collection for drover.
//!
//! - **Config**: `DevicePollingConfig` — what to poll on a device and how
//!   often
//! - **Batch**: the pure planner grouping contiguous same-category addresses
//!   into single wire transactions
//! - **Scheduler**: `PollingScheduler` — per-device tickers, single
//!   in-flight cycle per device, event publication, metrics
//!
//! Data flow:
//!
//! ```text
//! DevicePollingConfig → plan_batches → PollingScheduler ─(tick)→ ConnectionManager
//!                                            │
//!                                            └─→ MeasurementEvent → EventBus
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod batch;
pub mod config;
pub mod scheduler;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use batch::{plan_batches, Batch, Slice};
pub use config::{DevicePollingConfig, DevicePollingConfigBuilder};
pub use scheduler::PollingScheduler;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
