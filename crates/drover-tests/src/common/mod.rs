// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Shared fixtures for the integration test suite.

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::{MockFactory, MockState, MockTransport};
