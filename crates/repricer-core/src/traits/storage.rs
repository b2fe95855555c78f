// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence contracts used by the engine and the ingestion pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RepricerError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ExecutionKey, ExecutionState, ExecutionStatePatch, ProcessingResult, SnapshotRecord,
    VariantObservation, VariantStateSnapshot, WebhookMessage,
};

/// Lifecycle of a storage backend.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, pragmas, etc.).
    async fn initialize(&self) -> Result<(), RepricerError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), RepricerError>;
}

/// Append-only history of variant inventory and price.
#[async_trait]
pub trait VariantStateStore: Send + Sync {
    /// Record an observation, appending a snapshot only when it is a material
    /// change from the newest stored one.
    ///
    /// Returns the snapshot pair to evaluate. A redelivered message (same
    /// `source_message_id` as the newest snapshot) appends nothing and yields
    /// the same pair as the first delivery.
    async fn record(&self, observation: VariantObservation)
    -> Result<SnapshotRecord, RepricerError>;

    /// Up to `limit` snapshots for a variant, newest first.
    async fn latest(
        &self,
        shop_domain: &str,
        variant_id: &str,
        limit: usize,
    ) -> Result<Vec<VariantStateSnapshot>, RepricerError>;
}

/// Per-(rule, variant) automaton state.
#[async_trait]
pub trait ExecutionStateStore: Send + Sync {
    /// Fetch the state row for `key`, creating it as `INACTIVE` if absent.
    /// Concurrent calls for one key never create two rows.
    async fn get_or_create(&self, key: &ExecutionKey) -> Result<ExecutionState, RepricerError>;

    /// Apply `patch` if the row is still at `expected_version`.
    ///
    /// Stamps `updated_at` and bumps `version`. A version mismatch returns
    /// [`RepricerError::Conflict`].
    async fn update(
        &self,
        id: i64,
        expected_version: i64,
        patch: &ExecutionStatePatch,
    ) -> Result<ExecutionState, RepricerError>;
}

/// Idempotency ledger keyed by webhook message id.
#[async_trait]
pub trait ProcessedMessageStore: Send + Sync {
    async fn is_processed(&self, message_id: &str) -> Result<bool, RepricerError>;

    /// Log that a message was received. Repeated receipts are ignored.
    async fn record_receipt(&self, message: &WebhookMessage) -> Result<(), RepricerError>;

    /// Mark a message processed; later deliveries short-circuit.
    async fn mark_processed(
        &self,
        message_id: &str,
        result: &ProcessingResult,
    ) -> Result<(), RepricerError>;

    /// Record a failed attempt without marking the message processed.
    async fn record_failure(
        &self,
        message_id: &str,
        result: &ProcessingResult,
    ) -> Result<(), RepricerError>;

    /// Drop ledger rows received before `cutoff`. Returns the number removed.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepricerError>;
}
