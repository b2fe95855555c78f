// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rule evaluation for the repricer service.
//!
//! - [`evaluator`] classifies inventory against a rule's threshold and detects crossings
//! - [`state_machine`] decides the next execution state with hysteresis and cooldown
//! - [`engine`] serializes evaluations per (rule, variant) and persists transitions
//! - [`pricing`] computes the price change a fired rule makes

pub mod engine;
pub mod evaluator;
pub mod executor;
pub mod locks;
pub mod pricing;
pub mod state_machine;

pub use engine::{EngineSettings, EvaluationOutcome, RuleExecutionEngine};
pub use evaluator::{CrossingResult, Operator, RuleCondition, Threshold};
pub use executor::DryRunPriceExecutor;
pub use locks::{KeyGuard, KeyedLocks};
pub use pricing::compute_price_change;
pub use state_machine::{Reason, Transition};
