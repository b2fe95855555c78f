// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the storage, engine, and ingestion pipeline over a
//! temp SQLite database with a mock price executor. `deliver()` drives one
//! webhook message through the full pipeline.

use std::sync::Arc;

use repricer_config::model::{EngineConfig, RepricerConfig, StorageConfig};
use repricer_core::traits::{StorageAdapter, WebhookHandler};
use repricer_core::types::{Campaign, ExecutionState, ProcessingResult, WebhookMessage};
use repricer_core::RepricerError;
use repricer_engine::{EngineSettings, RuleExecutionEngine};
use repricer_storage::SqliteStorage;
use repricer_webhook::{PipelineDeps, WebhookPipeline};
use tokio_util::sync::CancellationToken;

use crate::flaky_store::FlakyExecutionStore;
use crate::mock_executor::MockPriceExecutor;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    cooldown_secs: Option<u64>,
    max_concurrent_evaluations: usize,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            cooldown_secs: None,
            max_concurrent_evaluations: EngineConfig::default().max_concurrent_evaluations,
        }
    }

    /// Enable the per-(rule, variant) cooldown gate.
    pub fn with_cooldown_secs(mut self, secs: u64) -> Self {
        self.cooldown_secs = Some(secs);
        self
    }

    pub fn with_max_concurrent_evaluations(mut self, n: usize) -> Self {
        self.max_concurrent_evaluations = n;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, RepricerError> {
        let temp_dir = tempfile::TempDir::new().map_err(RepricerError::storage)?;
        let db_path = temp_dir.path().join("test.db");

        let config = RepricerConfig {
            storage: StorageConfig {
                database_path: db_path.to_string_lossy().into_owned(),
                ..StorageConfig::default()
            },
            engine: EngineConfig {
                cooldown_secs: self.cooldown_secs,
                max_concurrent_evaluations: self.max_concurrent_evaluations,
                ..EngineConfig::default()
            },
            ..RepricerConfig::default()
        };

        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await?;

        let state_store = Arc::new(FlakyExecutionStore::new(storage.clone()));
        let engine = Arc::new(RuleExecutionEngine::new(
            state_store.clone(),
            EngineSettings::from(&config.engine),
        ));
        let executor = Arc::new(MockPriceExecutor::new());

        let deps = PipelineDeps {
            messages: storage.clone(),
            variants: storage.clone(),
            campaigns: storage.clone(),
            catalog: storage.clone(),
            executor: executor.clone(),
            audit: storage.clone(),
            signals: storage.clone(),
        };
        let pipeline = Arc::new(WebhookPipeline::new(
            deps.clone(),
            engine.clone(),
            config.engine.max_concurrent_evaluations,
        ));

        Ok(TestHarness {
            storage,
            state_store,
            executor,
            pipeline,
            config,
            deps,
            engine,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with a mock executor and temp storage.
pub struct TestHarness {
    /// SQLite storage (temp DB, cleaned up on drop).
    pub storage: Arc<SqliteStorage>,
    /// Execution state store seen by the engine; can inject failures.
    pub state_store: Arc<FlakyExecutionStore>,
    pub executor: Arc<MockPriceExecutor>,
    pub pipeline: Arc<WebhookPipeline>,
    pub config: RepricerConfig,
    deps: PipelineDeps,
    engine: Arc<RuleExecutionEngine>,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub async fn add_campaign(&self, campaign: &Campaign) -> Result<(), RepricerError> {
        self.storage.upsert_campaign(campaign).await
    }

    /// Run one message through the pipeline.
    pub async fn deliver(&self, message: &WebhookMessage) -> Result<ProcessingResult, RepricerError> {
        self.pipeline.process_webhook_message(message.clone()).await
    }

    /// A second pipeline over the same storage, engine and executor that
    /// stops evaluating once `cancel` fires.
    pub fn pipeline_with_cancellation(&self, cancel: CancellationToken) -> Arc<WebhookPipeline> {
        Arc::new(
            WebhookPipeline::new(
                self.deps.clone(),
                self.engine.clone(),
                self.config.engine.max_concurrent_evaluations,
            )
            .with_cancellation(cancel),
        )
    }

    /// Execution state of `rule_id` on `variant_id`, if the pair was ever evaluated.
    pub async fn execution_state(
        &self,
        shop_domain: &str,
        variant_id: &str,
        rule_id: &str,
    ) -> Result<Option<ExecutionState>, RepricerError> {
        Ok(self
            .storage
            .execution_states_for_variant(shop_domain, variant_id)
            .await?
            .into_iter()
            .find(|s| s.rule_id == rule_id))
    }
}
