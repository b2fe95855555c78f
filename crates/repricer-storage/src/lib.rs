// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the repricer service.
//!
//! WAL-mode SQLite with embedded migrations and a single-writer connection
//! via `tokio-rusqlite`. Holds variant snapshots, execution states, the
//! webhook dedup ledger, the durable inbox queue, the campaign read model,
//! the audit log, and shop signals.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
pub use models::{QueueEntry, ShopSignalRow};
