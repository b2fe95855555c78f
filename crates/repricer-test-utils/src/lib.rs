// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for repricer integration tests.
//!
//! Provides mock collaborators and test harness infrastructure for fast,
//! deterministic tests without a live shop.
//!
//! # Components
//!
//! - [`MockPriceExecutor`] - Price executor that captures requests
//! - [`FlakyExecutionStore`] - Execution state store with injectable failures
//! - [`TestHarness`] - Temp SQLite, engine, and pipeline wired together
//! - [`fixtures`] - Campaign, rule, and webhook builders

pub mod fixtures;
pub mod flaky_store;
pub mod harness;
pub mod mock_executor;

pub use flaky_store::FlakyExecutionStore;
pub use harness::TestHarness;
pub use mock_executor::{AppliedChange, MockPriceExecutor};
