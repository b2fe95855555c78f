// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution state store wrapper that fails on demand.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use repricer_core::RepricerError;
use repricer_core::traits::ExecutionStateStore;
use repricer_core::types::{ExecutionKey, ExecutionState, ExecutionStatePatch};

/// Delegates to an inner store, except that the next `n` calls fail with a
/// retryable storage error.
///
/// It can also lose the acknowledgement of an update: the write commits but
/// the caller sees a timeout, as when a bounded storage call expires while
/// its statement is still running.
pub struct FlakyExecutionStore {
    inner: Arc<dyn ExecutionStateStore>,
    failures_left: AtomicUsize,
    lost_acks_left: AtomicUsize,
}

impl FlakyExecutionStore {
    pub fn new(inner: Arc<dyn ExecutionStateStore>) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(0),
            lost_acks_left: AtomicUsize::new(0),
        }
    }

    pub fn fail_next(&self, calls: usize) {
        self.failures_left.store(calls, Ordering::SeqCst);
    }

    /// Commit the next `updates` updates but report them as timed out.
    pub fn time_out_after_commit(&self, updates: usize) {
        self.lost_acks_left.store(updates, Ordering::SeqCst);
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn take_failure(&self) -> Result<(), RepricerError> {
        if Self::take(&self.failures_left) {
            Err(RepricerError::storage("injected: database is locked"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ExecutionStateStore for FlakyExecutionStore {
    async fn get_or_create(&self, key: &ExecutionKey) -> Result<ExecutionState, RepricerError> {
        self.take_failure()?;
        self.inner.get_or_create(key).await
    }

    async fn update(
        &self,
        id: i64,
        expected_version: i64,
        patch: &ExecutionStatePatch,
    ) -> Result<ExecutionState, RepricerError> {
        self.take_failure()?;
        let updated = self.inner.update(id, expected_version, patch).await?;
        if Self::take(&self.lost_acks_left) {
            return Err(RepricerError::Timeout {
                duration: Duration::from_millis(5_000),
            });
        }
        Ok(updated)
    }
}
