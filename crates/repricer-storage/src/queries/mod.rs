// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Every function takes a [`crate::Database`] and runs
//! on the single writer thread.

pub mod audit;
pub mod campaigns;
pub mod execution_states;
pub mod queue;
pub mod shop_signals;
pub mod variant_states;
pub mod webhook_messages;
