// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # drover-tests
//!
//! Integration test suite for the drover workspace, plus the shared mock
//! transport and builder helpers under [`common`].
//!
//! The tests in `tests/` exercise the full stack: connection manager against
//! a scriptable transport, the batch planner through real poll cycles, and
//! the event bus as the scheduler drives it.

pub mod common;
