// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook ingestion pipeline.
//!
//! One call to [`WebhookPipeline::process_webhook_message`] handles one
//! delivery: dedup check, receipt, topic dispatch, per-tuple rule
//! evaluation, and the processed/failed bookkeeping.
//!
//! A message is marked processed unless some failure could succeed on
//! replay (a retryable tuple error, a retryable dispatch error, or
//! cancellation). Permanent failures are marked processed with
//! `success = false` so redelivery does not repeat them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use repricer_core::error::RepricerError;
use repricer_core::traits::{
    AuditSink, CampaignReadModel, PriceExecutor, ProcessedMessageStore, ShopSignalSink,
    VariantCatalog, VariantStateStore, WebhookHandler,
};
use repricer_core::types::{
    AuditRecord, Campaign, PriceChangeRequest, ProcessingResult, Rule, ShopSignal,
    SnapshotRecord, TupleError, VariantObservation, VariantRef, VariantStateSnapshot,
    WebhookMessage, WebhookTopic,
};
use repricer_engine::{KeyedLocks, Reason, RuleExecutionEngine};

use crate::payload::{InventoryLevelPayload, ProductPayload, WebhookPayload};

/// Collaborators the pipeline reads from and writes to.
#[derive(Clone)]
pub struct PipelineDeps {
    pub messages: Arc<dyn ProcessedMessageStore>,
    pub variants: Arc<dyn VariantStateStore>,
    pub campaigns: Arc<dyn CampaignReadModel>,
    pub catalog: Arc<dyn VariantCatalog>,
    pub executor: Arc<dyn PriceExecutor>,
    pub audit: Arc<dyn AuditSink>,
    pub signals: Arc<dyn ShopSignalSink>,
}

/// Counts accumulated while dispatching one message.
#[derive(Debug, Default)]
struct Tally {
    campaigns_triggered: HashSet<String>,
    variants_updated: usize,
    rules_executed: usize,
    tuple_errors: Vec<TupleError>,
    cancelled: bool,
}

struct TupleOutcome {
    campaign_id: String,
    executed: bool,
    error: Option<TupleError>,
}

/// Deduplicating dispatcher from webhook messages to the rule engine.
pub struct WebhookPipeline {
    deps: PipelineDeps,
    engine: Arc<RuleExecutionEngine>,
    in_flight: KeyedLocks<String>,
    max_concurrent: usize,
    cancel: CancellationToken,
}

impl WebhookPipeline {
    pub fn new(deps: PipelineDeps, engine: Arc<RuleExecutionEngine>, max_concurrent: usize) -> Self {
        Self {
            deps,
            engine,
            in_flight: KeyedLocks::new(),
            max_concurrent: max_concurrent.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop scheduling tuple evaluations when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn process(&self, message: WebhookMessage) -> Result<ProcessingResult, RepricerError> {
        let started = Instant::now();
        let message_id = message.message_id.clone();

        // Duplicates wait here for the first delivery to finish.
        let _in_flight = self.in_flight.lock(message_id.clone()).await;

        if self.deps.messages.is_processed(&message_id).await? {
            debug!(message_id = message_id.as_str(), "duplicate delivery, skipping");
            metrics::counter!("repricer_webhooks_total", "topic" => message.topic.clone(), "outcome" => "duplicate")
                .increment(1);
            return Ok(ProcessingResult {
                success: true,
                message_id,
                processing_time_ms: elapsed_ms(started),
                duplicate: true,
                marked_processed: true,
                ..Default::default()
            });
        }

        self.deps.messages.record_receipt(&message).await?;

        let topic = WebhookTopic::parse(&message.topic);
        let dispatched = self.dispatch(&topic, &message).await;

        let mut result = ProcessingResult {
            message_id: message_id.clone(),
            ..Default::default()
        };
        let retry = match dispatched {
            Ok(tally) => {
                let retry =
                    tally.cancelled || tally.tuple_errors.iter().any(|e| e.retryable);
                result.success = tally.tuple_errors.is_empty() && !tally.cancelled;
                result.campaigns_triggered = tally.campaigns_triggered.len();
                result.variants_updated = tally.variants_updated;
                result.rules_executed = tally.rules_executed;
                if tally.cancelled {
                    result.error = Some(RepricerError::Cancelled.to_string());
                } else if let Some(first) = tally.tuple_errors.first() {
                    result.error = Some(format!(
                        "{} tuple(s) failed, first: {}",
                        tally.tuple_errors.len(),
                        first.error
                    ));
                }
                result.tuple_errors = tally.tuple_errors;
                retry
            }
            Err(e) => {
                warn!(
                    message_id = message_id.as_str(),
                    topic = message.topic.as_str(),
                    error = %e,
                    retryable = e.is_retryable(),
                    "webhook dispatch failed"
                );
                result.success = false;
                result.error = Some(e.to_string());
                e.is_retryable()
            }
        };
        result.processing_time_ms = elapsed_ms(started);

        if retry {
            self.deps.messages.record_failure(&message_id, &result).await?;
        } else {
            result.marked_processed = true;
            self.deps.messages.mark_processed(&message_id, &result).await?;
        }

        let outcome = match (result.success, result.marked_processed) {
            (true, _) => "success",
            (false, true) => "failed_permanent",
            (false, false) => "failed_retryable",
        };
        metrics::counter!("repricer_webhooks_total", "topic" => topic.to_string(), "outcome" => outcome)
            .increment(1);
        metrics::histogram!("repricer_webhook_processing_seconds")
            .record(started.elapsed().as_secs_f64());

        info!(
            message_id = message_id.as_str(),
            topic = message.topic.as_str(),
            shop = message.shop_domain.as_str(),
            success = result.success,
            marked_processed = result.marked_processed,
            campaigns_triggered = result.campaigns_triggered,
            variants_updated = result.variants_updated,
            processing_time_ms = result.processing_time_ms,
            "webhook processed"
        );
        Ok(result)
    }

    async fn dispatch(
        &self,
        topic: &WebhookTopic,
        message: &WebhookMessage,
    ) -> Result<Tally, RepricerError> {
        let mut tally = Tally::default();
        match WebhookPayload::parse(topic, &message.payload)? {
            WebhookPayload::InventoryLevel(level) => {
                if let Some(observation) = self.inventory_level_observation(message, &level).await? {
                    self.observe(message, observation, &mut tally).await?;
                }
            }
            WebhookPayload::InventoryItem(item) => {
                if let Some(observation) = self.refresh_observation(message, &item.id).await? {
                    self.observe(message, observation, &mut tally).await?;
                }
            }
            WebhookPayload::Product(product) => {
                for observation in self.product_observations(message, &product).await? {
                    if tally.cancelled {
                        break;
                    }
                    self.observe(message, observation, &mut tally).await?;
                }
            }
            WebhookPayload::AppUninstalled => {
                self.deps
                    .signals
                    .signal(&message.shop_domain, ShopSignal::CleanupRequested, &message.message_id)
                    .await?;
            }
            WebhookPayload::ScopesUpdate => {
                self.deps
                    .signals
                    .signal(&message.shop_domain, ShopSignal::ScopesRevalidation, &message.message_id)
                    .await?;
            }
            WebhookPayload::Ignored => {
                debug!(topic = message.topic.as_str(), "no handler for topic");
            }
        }
        Ok(tally)
    }

    async fn newest(
        &self,
        shop_domain: &str,
        variant_id: &str,
    ) -> Result<Option<VariantStateSnapshot>, RepricerError> {
        Ok(self
            .deps
            .variants
            .latest(shop_domain, variant_id, 1)
            .await?
            .into_iter()
            .next())
    }

    /// Observation for an inventory level change. Price comes from the
    /// newest snapshot; unknown items and variants never seen are skipped.
    async fn inventory_level_observation(
        &self,
        message: &WebhookMessage,
        level: &InventoryLevelPayload,
    ) -> Result<Option<VariantObservation>, RepricerError> {
        let Some(available) = level.available else {
            debug!(inventory_item_id = level.inventory_item_id.as_str(), "level update without quantity");
            return Ok(None);
        };
        let Some(variant) = self
            .deps
            .catalog
            .variant_for_inventory_item(&message.shop_domain, &level.inventory_item_id)
            .await?
        else {
            debug!(inventory_item_id = level.inventory_item_id.as_str(), "inventory item not mapped to a variant");
            return Ok(None);
        };
        let Some(newest) = self.newest(&message.shop_domain, &variant.variant_id).await? else {
            debug!(variant_id = variant.variant_id.as_str(), "no snapshot to take price from");
            return Ok(None);
        };
        Ok(Some(VariantObservation {
            shop_domain: message.shop_domain.clone(),
            variant_id: variant.variant_id,
            product_id: variant.product_id,
            inventory_quantity: available,
            price_amount: newest.price_amount,
            compare_at_price: newest.compare_at_price,
            reason: message.topic.clone(),
            source_message_id: Some(message.message_id.clone()),
        }))
    }

    /// Re-observe the newest snapshot of the variant behind an inventory item.
    async fn refresh_observation(
        &self,
        message: &WebhookMessage,
        inventory_item_id: &str,
    ) -> Result<Option<VariantObservation>, RepricerError> {
        let Some(variant) = self
            .deps
            .catalog
            .variant_for_inventory_item(&message.shop_domain, inventory_item_id)
            .await?
        else {
            return Ok(None);
        };
        let newest = self.newest(&message.shop_domain, &variant.variant_id).await?;
        Ok(newest.map(|snapshot| VariantObservation {
            shop_domain: snapshot.shop_domain,
            variant_id: snapshot.variant_id,
            product_id: snapshot.product_id,
            inventory_quantity: snapshot.inventory_quantity,
            price_amount: snapshot.price_amount,
            compare_at_price: snapshot.compare_at_price,
            reason: message.topic.clone(),
            source_message_id: Some(message.message_id.clone()),
        }))
    }

    /// One observation per product variant. Inventory item mappings are
    /// remembered on the way; missing quantities fall back to the newest snapshot.
    async fn product_observations(
        &self,
        message: &WebhookMessage,
        product: &ProductPayload,
    ) -> Result<Vec<VariantObservation>, RepricerError> {
        let mut observations = Vec::with_capacity(product.variants.len());
        for variant in &product.variants {
            let variant_ref = VariantRef {
                variant_id: variant.id.clone(),
                product_id: product.id.clone(),
            };
            if let Some(item) = &variant.inventory_item_id {
                self.deps
                    .catalog
                    .remember_inventory_item(&message.shop_domain, item, &variant_ref)
                    .await?;
            }
            let inventory = match variant.inventory_quantity {
                Some(quantity) => quantity,
                None => self
                    .newest(&message.shop_domain, &variant.id)
                    .await?
                    .map_or(0, |s| s.inventory_quantity),
            };
            observations.push(VariantObservation {
                shop_domain: message.shop_domain.clone(),
                variant_id: variant_ref.variant_id,
                product_id: variant_ref.product_id,
                inventory_quantity: inventory,
                price_amount: variant.price,
                compare_at_price: variant.compare_at_price,
                reason: message.topic.clone(),
                source_message_id: Some(message.message_id.clone()),
            });
        }
        Ok(observations)
    }

    /// Record one observation and evaluate every (campaign, rule) that targets it.
    async fn observe(
        &self,
        message: &WebhookMessage,
        observation: VariantObservation,
        tally: &mut Tally,
    ) -> Result<(), RepricerError> {
        let record = self.deps.variants.record(observation).await?;
        if record.appended {
            tally.variants_updated += 1;
        }

        let current = &record.current;
        let matches = self
            .deps
            .campaigns
            .active_campaigns_targeting(&current.shop_domain, &current.product_id, &current.variant_id)
            .await?;
        let tuples: Vec<(Campaign, Rule)> = matches
            .into_iter()
            .flat_map(|m| {
                let campaign = m.campaign;
                m.matching_rules
                    .into_iter()
                    .map(move |rule| (campaign.clone(), rule))
            })
            .collect();
        let total = tuples.len();

        // Cancellation stops new tuples from starting; a started tuple runs
        // to completion so its state write and price change stay paired.
        let record = &record;
        let outcomes: Vec<Option<TupleOutcome>> = futures::stream::iter(tuples)
            .map(|(campaign, rule)| async move {
                if self.cancel.is_cancelled() {
                    return None;
                }
                Some(self.run_tuple(message, &campaign, &rule, record).await)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;
        let outcomes: Vec<TupleOutcome> = outcomes.into_iter().flatten().collect();

        if outcomes.len() < total {
            warn!(
                message_id = message.message_id.as_str(),
                completed = outcomes.len(),
                total,
                "evaluation cancelled"
            );
            tally.cancelled = true;
        }
        for outcome in outcomes {
            if outcome.executed {
                tally.rules_executed += 1;
                tally.campaigns_triggered.insert(outcome.campaign_id);
            }
            if let Some(error) = outcome.error {
                tally.tuple_errors.push(error);
            }
        }
        Ok(())
    }

    async fn run_tuple(
        &self,
        message: &WebhookMessage,
        campaign: &Campaign,
        rule: &Rule,
        record: &SnapshotRecord,
    ) -> TupleOutcome {
        let current = &record.current;
        let tuple_error = |e: &RepricerError, retryable: bool| TupleError {
            campaign_id: campaign.id.clone(),
            rule_id: rule.id.clone(),
            variant_id: current.variant_id.clone(),
            error: e.to_string(),
            retryable,
        };
        let failed = |error: TupleError| TupleOutcome {
            campaign_id: campaign.id.clone(),
            executed: false,
            error: Some(error),
        };

        let outcome = match self
            .engine
            .evaluate_for_message(
                rule,
                campaign,
                current,
                record.previous.as_ref(),
                &message.message_id,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(campaign_id = campaign.id.as_str(), rule_id = rule.id.as_str(), error = %e, "rule evaluation failed");
                return failed(tuple_error(&e, e.is_retryable()));
            }
        };
        let skipped = || TupleOutcome {
            campaign_id: campaign.id.clone(),
            executed: false,
            error: None,
        };
        if !outcome.should_execute {
            return skipped();
        }
        if outcome.reason == Reason::Redelivered {
            match self
                .deps
                .audit
                .execution_recorded(&rule.id, &current.variant_id, &message.message_id)
                .await
            {
                Ok(true) => {
                    debug!(
                        rule_id = rule.id.as_str(),
                        variant_id = current.variant_id.as_str(),
                        "price change already applied for this delivery"
                    );
                    return skipped();
                }
                Ok(false) => {
                    info!(
                        rule_id = rule.id.as_str(),
                        variant_id = current.variant_id.as_str(),
                        "re-driving interrupted price change"
                    );
                }
                Err(e) => return failed(tuple_error(&e, e.is_retryable())),
            }
        }

        let request = PriceChangeRequest {
            shop_domain: current.shop_domain.clone(),
            variant_id: current.variant_id.clone(),
            product_id: current.product_id.clone(),
            rule: rule.clone(),
            current_price: current.price_amount,
            current_compare_at: current.compare_at_price,
        };
        // Permanent: the message is marked processed and the trigger stays consumed.
        let change = match self.deps.executor.apply_price_change(&request).await {
            Ok(change) => change,
            Err(e) => {
                warn!(rule_id = rule.id.as_str(), variant_id = current.variant_id.as_str(), error = %e, "price change failed");
                return failed(tuple_error(&e, false));
            }
        };

        let now = Utc::now();
        let audit = AuditRecord {
            rule_id: rule.id.clone(),
            campaign_id: campaign.id.clone(),
            shop_domain: current.shop_domain.clone(),
            variant_id: current.variant_id.clone(),
            old_price: change.old_price,
            new_price: change.new_price,
            old_compare_at: change.old_compare_at,
            new_compare_at: change.new_compare_at,
            trigger_reason: format!(
                "{} {} {}: inventory {}",
                rule.when_condition, rule.when_value, outcome.reason, current.inventory_quantity
            ),
            message_id: Some(message.message_id.clone()),
            created_at: now,
        };
        if let Err(e) = self.deps.audit.record_execution(&audit).await {
            warn!(rule_id = rule.id.as_str(), error = %e, "audit write failed");
        }
        if let Err(e) = self.deps.campaigns.record_trigger(&campaign.id, now).await {
            warn!(campaign_id = campaign.id.as_str(), error = %e, "campaign trigger counter not updated");
        }
        metrics::counter!("repricer_price_changes_total").increment(1);

        TupleOutcome {
            campaign_id: campaign.id.clone(),
            executed: true,
            error: None,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl WebhookHandler for WebhookPipeline {
    async fn process_webhook_message(
        &self,
        message: WebhookMessage,
    ) -> Result<ProcessingResult, RepricerError> {
        self.process(message).await
    }
}
