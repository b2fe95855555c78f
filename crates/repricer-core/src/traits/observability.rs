// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sinks for executed rules and shop signals.
//!
//! The audit log is read back in one place only: a redelivered message
//! checks it to avoid applying the same price change twice.

use async_trait::async_trait;

use crate::error::RepricerError;
use crate::types::{AuditRecord, ShopSignal};

/// Receives one record per executed rule.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_execution(&self, record: &AuditRecord) -> Result<(), RepricerError>;

    /// Whether `message_id` already executed `rule_id` on `variant_id`.
    async fn execution_recorded(
        &self,
        rule_id: &str,
        variant_id: &str,
        message_id: &str,
    ) -> Result<bool, RepricerError>;
}

/// Receives shop lifecycle signals raised by app webhooks.
#[async_trait]
pub trait ShopSignalSink: Send + Sync {
    async fn signal(
        &self,
        shop_domain: &str,
        signal: ShopSignal,
        message_id: &str,
    ) -> Result<(), RepricerError>;
}
