// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock price executor for deterministic testing.
//!
//! `MockPriceExecutor` computes changes with the real pricing math, captures
//! every request for assertions, and can be told to reject or stall calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use repricer_core::RepricerError;
use repricer_core::traits::{PluginAdapter, PriceExecutor};
use repricer_core::types::{AdapterType, HealthStatus, PriceChange, PriceChangeRequest};
use repricer_engine::compute_price_change;

/// A captured executor call.
#[derive(Debug, Clone)]
pub struct AppliedChange {
    pub request: PriceChangeRequest,
    pub change: PriceChange,
}

/// A price executor that records instead of calling a shop.
#[derive(Default)]
pub struct MockPriceExecutor {
    applied: Arc<Mutex<Vec<AppliedChange>>>,
    reject: AtomicBool,
    delay_ms: AtomicU64,
    started: AtomicUsize,
}

impl MockPriceExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail with [`RepricerError::PriceExecution`].
    pub fn reject_changes(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Hold every subsequent call for `delay` before applying it.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), Ordering::SeqCst);
    }

    /// Calls that have entered the executor, finished or not.
    pub fn calls_started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// All successfully applied changes, in call order.
    pub async fn applied(&self) -> Vec<AppliedChange> {
        self.applied.lock().await.clone()
    }

    pub async fn applied_count(&self) -> usize {
        self.applied.lock().await.len()
    }
}

#[async_trait]
impl PluginAdapter for MockPriceExecutor {
    fn name(&self) -> &str {
        "mock-executor"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Executor
    }

    async fn health_check(&self) -> Result<HealthStatus, RepricerError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RepricerError> {
        Ok(())
    }
}

#[async_trait]
impl PriceExecutor for MockPriceExecutor {
    async fn apply_price_change(
        &self,
        request: &PriceChangeRequest,
    ) -> Result<PriceChange, RepricerError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(RepricerError::PriceExecution {
                variant_id: request.variant_id.clone(),
                message: "rejected by mock".to_string(),
            });
        }
        let change = compute_price_change(request);
        self.applied.lock().await.push(AppliedChange {
            request: request.clone(),
            change: change.clone(),
        });
        Ok(change)
    }
}
