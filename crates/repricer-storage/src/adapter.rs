// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the storage, read-model, and sink traits.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use repricer_config::model::StorageConfig;
use repricer_core::types::{
    AuditRecord, Campaign, CampaignMatch, CampaignStatus, ExecutionKey, ExecutionState,
    ExecutionStatePatch, ProcessingResult, ShopSignal, SnapshotRecord, VariantObservation,
    VariantRef, VariantStateSnapshot, WebhookMessage,
};
use repricer_core::{
    AdapterType, AuditSink, CampaignReadModel, ExecutionStateStore, HealthStatus, PluginAdapter,
    ProcessedMessageStore, RepricerError, ShopSignalSink, StorageAdapter, VariantCatalog,
    VariantStateStore,
};

use crate::database::Database;
use crate::models::{QueueEntry, ShopSignalRow};
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Every call is bounded by `storage.operation_timeout_ms`; exceeding it
/// returns [`RepricerError::Timeout`]. The database is opened on
/// [`StorageAdapter::initialize`] unless one was supplied up front.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
    timeout: Duration,
}

impl SqliteStorage {
    /// Create a new SqliteStorage. The database is not opened until
    /// [`StorageAdapter::initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        let timeout = Duration::from_millis(config.operation_timeout_ms);
        Self {
            config,
            db: OnceCell::new(),
            timeout,
        }
    }

    /// Wrap an already opened database.
    pub fn with_database(config: StorageConfig, db: Database) -> Self {
        let timeout = Duration::from_millis(config.operation_timeout_ms);
        Self {
            config,
            db: OnceCell::new_with(Some(db)),
            timeout,
        }
    }

    /// Returns the underlying Database, or an error if not initialized.
    pub fn database(&self) -> Result<&Database, RepricerError> {
        self.db.get().ok_or_else(|| {
            RepricerError::storage("storage not initialized -- call initialize() first")
        })
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, RepricerError>>,
    ) -> Result<T, RepricerError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_ms = self.timeout.as_millis() as u64, "storage call timed out");
                Err(RepricerError::Timeout {
                    duration: self.timeout,
                })
            }
        }
    }

    // --- Queue operations ---

    pub async fn enqueue(
        &self,
        queue_name: &str,
        payload: &str,
        max_attempts: u32,
    ) -> Result<i64, RepricerError> {
        let db = self.database()?;
        self.bounded("enqueue", queries::queue::enqueue(db, queue_name, payload, max_attempts))
            .await
    }

    pub async fn dequeue(
        &self,
        queue_name: &str,
        lock_timeout: Duration,
    ) -> Result<Option<QueueEntry>, RepricerError> {
        let db = self.database()?;
        self.bounded("dequeue", queries::queue::dequeue(db, queue_name, lock_timeout))
            .await
    }

    pub async fn ack(&self, id: i64) -> Result<(), RepricerError> {
        let db = self.database()?;
        self.bounded("ack", queries::queue::ack(db, id)).await
    }

    /// Return a claimed entry to the queue, claimable again after `retry_after`.
    pub async fn fail(
        &self,
        id: i64,
        error: &str,
        retry_after: std::time::Duration,
    ) -> Result<(), RepricerError> {
        let db = self.database()?;
        self.bounded("fail", queries::queue::fail(db, id, error, retry_after))
            .await
    }

    pub async fn purge_completed(&self, cutoff: DateTime<Utc>) -> Result<u64, RepricerError> {
        let db = self.database()?;
        self.bounded("purge_completed", queries::queue::purge_completed(db, cutoff))
            .await
    }

    pub async fn queue_depth(&self, queue_name: &str) -> Result<Vec<(String, i64)>, RepricerError> {
        let db = self.database()?;
        self.bounded("queue_depth", queries::queue::depth(db, queue_name))
            .await
    }

    // --- Campaign authoring and inspection ---

    pub async fn upsert_campaign(&self, campaign: &Campaign) -> Result<(), RepricerError> {
        let db = self.database()?;
        self.bounded("upsert_campaign", queries::campaigns::upsert_campaign(db, campaign))
            .await
    }

    pub async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, RepricerError> {
        let db = self.database()?;
        self.bounded("get_campaign", queries::campaigns::get_campaign(db, id))
            .await
    }

    pub async fn execution_states_for_variant(
        &self,
        shop_domain: &str,
        variant_id: &str,
    ) -> Result<Vec<ExecutionState>, RepricerError> {
        let db = self.database()?;
        self.bounded(
            "execution_states_for_variant",
            queries::execution_states::for_variant(db, shop_domain, variant_id),
        )
        .await
    }

    pub async fn audit_for_variant(
        &self,
        shop_domain: &str,
        variant_id: &str,
    ) -> Result<Vec<AuditRecord>, RepricerError> {
        let db = self.database()?;
        self.bounded(
            "audit_for_variant",
            queries::audit::records_for_variant(db, shop_domain, variant_id),
        )
        .await
    }

    /// Newest snapshot of a variant, if one was ever recorded.
    pub async fn newest_snapshot(
        &self,
        shop_domain: &str,
        variant_id: &str,
    ) -> Result<Option<VariantStateSnapshot>, RepricerError> {
        let db = self.database()?;
        self.bounded(
            "newest_snapshot",
            queries::variant_states::newest_snapshot(db, shop_domain, variant_id),
        )
        .await
    }

    /// Shop lifecycle signals not yet handled.
    pub async fn pending_signals(&self) -> Result<Vec<ShopSignalRow>, RepricerError> {
        let db = self.database()?;
        self.bounded("pending_signals", queries::shop_signals::pending(db))
            .await
    }

    /// Ledger status, attempt count, and last result of a webhook message.
    pub async fn message_outcome(
        &self,
        message_id: &str,
    ) -> Result<Option<(String, i64, Option<ProcessingResult>)>, RepricerError> {
        let db = self.database()?;
        self.bounded(
            "message_outcome",
            queries::webhook_messages::outcome(db, message_id),
        )
        .await
    }

    async fn checkpoint(&self, db: &Database) -> Result<(), RepricerError> {
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, RepricerError> {
        let db = self.database()?;
        let ping = async {
            db.connection()
                .call(|conn| -> Result<(), rusqlite::Error> {
                    conn.execute_batch("SELECT 1;")?;
                    Ok(())
                })
                .await
                .map_err(crate::database::map_tr_err)
        };
        match self.bounded("health_check", ping).await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(RepricerError::Timeout { duration }) => Ok(HealthStatus::Degraded(format!(
                "health query exceeded {}ms",
                duration.as_millis()
            ))),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), RepricerError> {
        if let Some(db) = self.db.get() {
            self.checkpoint(db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), RepricerError> {
        if self.db.initialized() {
            return Err(RepricerError::storage("storage already initialized"));
        }
        let db = Database::open_with(&self.config).await?;
        self.db
            .set(db)
            .map_err(|_| RepricerError::storage("storage already initialized"))?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), RepricerError> {
        let db = self.database()?;
        self.checkpoint(db).await
    }
}

#[async_trait]
impl VariantStateStore for SqliteStorage {
    async fn record(
        &self,
        observation: VariantObservation,
    ) -> Result<SnapshotRecord, RepricerError> {
        let db = self.database()?;
        self.bounded("record_snapshot", queries::variant_states::record(db, observation))
            .await
    }

    async fn latest(
        &self,
        shop_domain: &str,
        variant_id: &str,
        limit: usize,
    ) -> Result<Vec<VariantStateSnapshot>, RepricerError> {
        let db = self.database()?;
        self.bounded(
            "latest_snapshots",
            queries::variant_states::latest(db, shop_domain, variant_id, limit),
        )
        .await
    }
}

#[async_trait]
impl ExecutionStateStore for SqliteStorage {
    async fn get_or_create(&self, key: &ExecutionKey) -> Result<ExecutionState, RepricerError> {
        let db = self.database()?;
        self.bounded(
            "get_or_create_execution_state",
            queries::execution_states::get_or_create(db, key),
        )
        .await
    }

    async fn update(
        &self,
        id: i64,
        expected_version: i64,
        patch: &ExecutionStatePatch,
    ) -> Result<ExecutionState, RepricerError> {
        let db = self.database()?;
        self.bounded(
            "update_execution_state",
            queries::execution_states::update(db, id, expected_version, patch),
        )
        .await
    }
}

#[async_trait]
impl ProcessedMessageStore for SqliteStorage {
    async fn is_processed(&self, message_id: &str) -> Result<bool, RepricerError> {
        let db = self.database()?;
        self.bounded(
            "is_processed",
            queries::webhook_messages::is_processed(db, message_id),
        )
        .await
    }

    async fn record_receipt(&self, message: &WebhookMessage) -> Result<(), RepricerError> {
        let db = self.database()?;
        self.bounded(
            "record_receipt",
            queries::webhook_messages::record_receipt(db, message),
        )
        .await
    }

    async fn mark_processed(
        &self,
        message_id: &str,
        result: &ProcessingResult,
    ) -> Result<(), RepricerError> {
        let db = self.database()?;
        self.bounded(
            "mark_processed",
            queries::webhook_messages::mark_processed(db, message_id, result),
        )
        .await
    }

    async fn record_failure(
        &self,
        message_id: &str,
        result: &ProcessingResult,
    ) -> Result<(), RepricerError> {
        let db = self.database()?;
        self.bounded(
            "record_failure",
            queries::webhook_messages::record_failure(db, message_id, result),
        )
        .await
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepricerError> {
        let db = self.database()?;
        self.bounded(
            "purge_messages",
            queries::webhook_messages::purge_older_than(db, cutoff),
        )
        .await
    }
}

#[async_trait]
impl CampaignReadModel for SqliteStorage {
    async fn active_campaigns_targeting(
        &self,
        shop_domain: &str,
        product_id: &str,
        variant_id: &str,
    ) -> Result<Vec<CampaignMatch>, RepricerError> {
        let db = self.database()?;
        self.bounded(
            "active_campaigns_targeting",
            queries::campaigns::active_campaigns_targeting(db, shop_domain, product_id, variant_id),
        )
        .await
    }

    async fn record_trigger(
        &self,
        campaign_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepricerError> {
        let db = self.database()?;
        self.bounded(
            "record_campaign_trigger",
            queries::campaigns::record_trigger(db, campaign_id, at),
        )
        .await
    }

    async fn transition_status(
        &self,
        campaign_id: &str,
        to: CampaignStatus,
    ) -> Result<Campaign, RepricerError> {
        let db = self.database()?;
        self.bounded(
            "transition_campaign_status",
            queries::campaigns::transition_status(db, campaign_id, to),
        )
        .await
    }
}

#[async_trait]
impl VariantCatalog for SqliteStorage {
    async fn variant_for_inventory_item(
        &self,
        shop_domain: &str,
        inventory_item_id: &str,
    ) -> Result<Option<VariantRef>, RepricerError> {
        let db = self.database()?;
        self.bounded(
            "variant_for_inventory_item",
            queries::campaigns::variant_for_inventory_item(db, shop_domain, inventory_item_id),
        )
        .await
    }

    async fn remember_inventory_item(
        &self,
        shop_domain: &str,
        inventory_item_id: &str,
        variant: &VariantRef,
    ) -> Result<(), RepricerError> {
        let db = self.database()?;
        self.bounded(
            "remember_inventory_item",
            queries::campaigns::remember_inventory_item(db, shop_domain, inventory_item_id, variant),
        )
        .await
    }
}

#[async_trait]
impl AuditSink for SqliteStorage {
    async fn record_execution(&self, record: &AuditRecord) -> Result<(), RepricerError> {
        let db = self.database()?;
        self.bounded("record_audit", queries::audit::insert_record(db, record))
            .await
            .map(|_| ())
    }

    async fn execution_recorded(
        &self,
        rule_id: &str,
        variant_id: &str,
        message_id: &str,
    ) -> Result<bool, RepricerError> {
        let db = self.database()?;
        self.bounded(
            "execution_recorded",
            queries::audit::execution_recorded(db, rule_id, variant_id, message_id),
        )
        .await
    }
}

#[async_trait]
impl ShopSignalSink for SqliteStorage {
    async fn signal(
        &self,
        shop_domain: &str,
        signal: ShopSignal,
        message_id: &str,
    ) -> Result<(), RepricerError> {
        let db = self.database()?;
        self.bounded(
            "raise_shop_signal",
            queries::shop_signals::raise(db, shop_domain, signal, message_id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            ..StorageConfig::default()
        }
    }

    #[tokio::test]
    async fn identifies_as_storage_adapter() {
        let storage = SqliteStorage::new(make_config("unused.db"));
        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_opens_database_at_configured_path() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("init_test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
        assert!(storage.initialize().await.is_err(), "second initialize should fail");
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn calls_before_initialize_fail() {
        let storage = SqliteStorage::new(make_config("never.db"));
        assert!(storage.health_check().await.is_err());
        assert!(storage.is_processed("m1").await.is_err());
    }

    #[tokio::test]
    async fn trait_calls_reach_the_database() {
        let db = Database::open_in_memory().await.unwrap();
        let storage = SqliteStorage::with_database(StorageConfig::default(), db);

        let key = ExecutionKey {
            rule_id: "r1".into(),
            variant_id: "v1".into(),
            campaign_id: "c1".into(),
            shop_domain: "shop.example".into(),
        };
        let state = ExecutionStateStore::get_or_create(&storage, &key).await.unwrap();
        assert_eq!(state.version, 0);

        storage
            .signal("shop.example", ShopSignal::ScopesRevalidation, "m9")
            .await
            .unwrap();
        let pending = queries::shop_signals::pending(storage.database().unwrap())
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn zero_timeout_surfaces_as_retryable() {
        let db = Database::open_in_memory().await.unwrap();
        let config = StorageConfig {
            operation_timeout_ms: 0,
            ..StorageConfig::default()
        };
        let storage = SqliteStorage::with_database(config, db);
        let result = storage
            .bounded("sleep", async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<(), RepricerError>(())
            })
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, RepricerError::Timeout { .. }));
        assert!(err.is_retryable());
    }
}
