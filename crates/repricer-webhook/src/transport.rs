// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable queue transport.
//!
//! The HTTP receiver persists each delivery to the SQLite queue before
//! answering. Workers claim rows, hand them to the [`WebhookHandler`], and
//! ack once the message is recorded as processed. A claim that is never
//! acked (crash, timeout) becomes reclaimable when its lock expires, which
//! is the redelivery path; the pipeline's dedup makes it safe.
//!
//! A delivery that fails is held back for an exponential delay before it
//! can be claimed again, so a transient outage does not use up its
//! attempts in one burst.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use repricer_config::model::WebhookConfig;
use repricer_core::error::RepricerError;
use repricer_core::traits::{ProcessedMessageStore, WebhookHandler};
use repricer_core::types::WebhookMessage;
use repricer_storage::{QueueEntry, SqliteStorage};

/// Queue name used for inbound webhooks.
pub const WEBHOOK_QUEUE: &str = "webhooks";

/// Worker and purge settings derived from `[webhook]`.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub workers: usize,
    pub poll_interval: Duration,
    pub lock_timeout: Duration,
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further attempt.
    pub retry_backoff: Duration,
    pub max_retry_backoff: Duration,
    pub dedup_horizon: chrono::Duration,
    pub purge_interval: Duration,
}

impl TransportSettings {
    /// Delay after the `attempts`-th claim failed.
    pub fn retry_delay(&self, attempts: i32) -> Duration {
        let exponent = u32::try_from(attempts.saturating_sub(1)).unwrap_or(0).min(16);
        self.retry_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_retry_backoff)
    }
}

impl From<&WebhookConfig> for TransportSettings {
    fn from(config: &WebhookConfig) -> Self {
        let horizon_hours = i64::try_from(config.dedup_horizon_hours).unwrap_or(i64::MAX / 3600);
        Self {
            workers: config.workers.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            lock_timeout: Duration::from_secs(config.lock_timeout_secs),
            max_attempts: config.max_attempts,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            max_retry_backoff: Duration::from_millis(config.max_retry_backoff_ms),
            dedup_horizon: chrono::Duration::hours(horizon_hours),
            purge_interval: Duration::from_secs(3600),
        }
    }
}

/// Queue-backed transport feeding a [`WebhookHandler`].
pub struct QueueTransport {
    storage: Arc<SqliteStorage>,
    handler: Arc<dyn WebhookHandler>,
    settings: TransportSettings,
    cancel: CancellationToken,
    tracker: TaskTracker,
    started: Mutex<bool>,
}

impl QueueTransport {
    pub fn new(
        storage: Arc<SqliteStorage>,
        handler: Arc<dyn WebhookHandler>,
        settings: TransportSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            storage,
            handler,
            settings,
            cancel,
            tracker: TaskTracker::new(),
            started: Mutex::new(false),
        }
    }

    /// Persist a delivery. Returns the queue row id.
    pub async fn enqueue(&self, message: &WebhookMessage) -> Result<i64, RepricerError> {
        let payload = serde_json::to_string(message).map_err(|e| RepricerError::Transport {
            message: format!("cannot serialize webhook {}: {e}", message.message_id),
            source: Some(Box::new(e)),
        })?;
        let id = self
            .storage
            .enqueue(WEBHOOK_QUEUE, &payload, self.settings.max_attempts)
            .await?;
        metrics::counter!("repricer_webhooks_enqueued_total").increment(1);
        debug!(message_id = message.message_id.as_str(), queue_id = id, "webhook enqueued");
        Ok(id)
    }

    /// Spawn workers and the purge task. Calling it again is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut started = self.started.lock().await;
        if *started {
            debug!("queue transport already started");
            return;
        }
        *started = true;

        for worker in 0..self.settings.workers {
            let this = Arc::clone(self);
            self.tracker.spawn(async move { this.worker_loop(worker).await });
        }
        let this = Arc::clone(self);
        self.tracker.spawn(async move { this.purge_loop().await });

        info!(workers = self.settings.workers, "queue transport started");
    }

    /// Cancel workers and wait for in-flight messages to finish.
    pub async fn shutdown(&self, timeout: Duration) {
        self.cancel.cancel();
        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(timeout_secs = timeout.as_secs(), "queue workers did not stop in time");
        } else {
            info!("queue transport stopped");
        }
    }

    async fn worker_loop(&self, worker: usize) {
        debug!(worker, "queue worker running");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => error!(worker, error = %e, "queue poll failed"),
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
        debug!(worker, "queue worker stopped");
    }

    /// Claim and handle at most one queued delivery. Returns whether one was found.
    pub async fn run_once(&self) -> Result<bool, RepricerError> {
        let Some(entry) = self
            .storage
            .dequeue(WEBHOOK_QUEUE, self.settings.lock_timeout)
            .await?
        else {
            return Ok(false);
        };
        self.handle_entry(entry).await?;
        Ok(true)
    }

    async fn handle_entry(&self, entry: QueueEntry) -> Result<(), RepricerError> {
        let retry_after = self.settings.retry_delay(entry.attempts);
        let message: WebhookMessage = match serde_json::from_str(&entry.payload) {
            Ok(message) => message,
            Err(e) => {
                error!(queue_id = entry.id, error = %e, "unreadable queue payload");
                return self
                    .storage
                    .fail(entry.id, &format!("unreadable payload: {e}"), retry_after)
                    .await;
            }
        };

        match self.handler.process_webhook_message(message).await {
            Ok(result) if result.marked_processed => self.storage.ack(entry.id).await,
            Ok(result) => {
                let reason = result.error.unwrap_or_else(|| "not marked processed".to_string());
                debug!(
                    queue_id = entry.id,
                    attempts = entry.attempts,
                    retry_after_ms = retry_after.as_millis() as u64,
                    reason = reason.as_str(),
                    "delivery will be retried"
                );
                self.storage.fail(entry.id, &reason, retry_after).await
            }
            Err(e) => {
                warn!(queue_id = entry.id, attempts = entry.attempts, error = %e, "webhook handler failed");
                self.storage.fail(entry.id, &e.to_string(), retry_after).await
            }
        }
    }

    async fn purge_loop(&self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.purge_interval) => {}
            }
            if let Err(e) = self.purge().await {
                warn!(error = %e, "dedup purge failed");
            }
        }
    }

    /// Forget processed messages and finished queue rows older than the dedup horizon.
    pub async fn purge(&self) -> Result<(u64, u64), RepricerError> {
        let cutoff = Utc::now() - self.settings.dedup_horizon;
        let messages = self.storage.purge_older_than(cutoff).await?;
        let rows = self.storage.purge_completed(cutoff).await?;
        for (status, count) in self.storage.queue_depth(WEBHOOK_QUEUE).await? {
            metrics::gauge!("repricer_queue_depth", "status" => status).set(count as f64);
        }
        if messages + rows > 0 {
            info!(messages, queue_rows = rows, "purged entries past the dedup horizon");
        }
        Ok((messages, rows))
    }
}
