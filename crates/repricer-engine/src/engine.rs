// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rule execution engine.
//!
//! Decides, for one (rule, variant) pair and one observation pair, whether
//! the rule fires. Evaluations of the same pair are serialized in-process
//! with a keyed lock, and across processes by the store's version check.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use repricer_config::model::EngineConfig;
use repricer_core::error::RepricerError;
use repricer_core::status::CampaignStatusGuard;
use repricer_core::traits::ExecutionStateStore;
use repricer_core::types::{Campaign, ExecutionKey, ExecutionState, Rule, VariantStateSnapshot};

use crate::evaluator::{CrossingResult, RuleCondition};
use crate::locks::KeyedLocks;
use crate::state_machine::{self, Reason, Step, Transition};

/// Engine tuning derived from `[engine]`.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub default_reset_margin: Decimal,
    pub cooldown: Option<Duration>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            default_reset_margin: config.default_reset_margin,
            cooldown: config
                .cooldown_secs
                .and_then(|secs| i64::try_from(secs).ok())
                .map(Duration::seconds),
        }
    }
}

/// Verdict of one evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub should_execute: bool,
    pub reason: Reason,
    /// `None` when the campaign gate refused before evaluating.
    pub crossing: Option<CrossingResult>,
    pub transition: Option<Transition>,
    /// Execution state after the transition was persisted.
    pub state: Option<ExecutionState>,
}

impl EvaluationOutcome {
    fn refused(reason: Reason) -> Self {
        Self {
            should_execute: false,
            reason,
            crossing: None,
            transition: None,
            state: None,
        }
    }
}

/// Orchestrates the evaluator, the automaton and the execution state store.
pub struct RuleExecutionEngine {
    store: Arc<dyn ExecutionStateStore>,
    locks: KeyedLocks<(String, String)>,
    settings: EngineSettings,
}

impl RuleExecutionEngine {
    pub fn new(store: Arc<dyn ExecutionStateStore>, settings: EngineSettings) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Evaluate `rule` for the variant in `current` at the current time.
    pub async fn evaluate(
        &self,
        rule: &Rule,
        campaign: &Campaign,
        current: &VariantStateSnapshot,
        previous: Option<&VariantStateSnapshot>,
    ) -> Result<EvaluationOutcome, RepricerError> {
        self.evaluate_at(rule, campaign, current, previous, Utc::now())
            .await
    }

    /// Evaluate on behalf of a webhook message.
    ///
    /// The message id is stored with a trigger; evaluating the same message
    /// again while the state is still TRIGGERED answers `Redelivered` with
    /// `should_execute` set, so an interrupted delivery can finish its price
    /// change on replay.
    pub async fn evaluate_for_message(
        &self,
        rule: &Rule,
        campaign: &Campaign,
        current: &VariantStateSnapshot,
        previous: Option<&VariantStateSnapshot>,
        message_id: &str,
    ) -> Result<EvaluationOutcome, RepricerError> {
        self.decide(rule, campaign, current, previous, Some(message_id), Utc::now())
            .await
    }

    /// Evaluate with an explicit clock.
    ///
    /// A campaign that is not ACTIVE is refused without touching the store.
    /// A malformed rule fails with `InvalidRule` or `UnknownOperator` before
    /// any state is read. Store failures propagate unchanged and leave the
    /// persisted state as it was.
    pub async fn evaluate_at(
        &self,
        rule: &Rule,
        campaign: &Campaign,
        current: &VariantStateSnapshot,
        previous: Option<&VariantStateSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<EvaluationOutcome, RepricerError> {
        self.decide(rule, campaign, current, previous, None, now).await
    }

    async fn decide(
        &self,
        rule: &Rule,
        campaign: &Campaign,
        current: &VariantStateSnapshot,
        previous: Option<&VariantStateSnapshot>,
        message_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<EvaluationOutcome, RepricerError> {
        if !CampaignStatusGuard::may_evaluate(campaign) {
            debug!(
                campaign_id = campaign.id.as_str(),
                status = %campaign.status,
                "campaign not active, skipping rule"
            );
            metrics::counter!("repricer_rule_evaluations_total", "outcome" => Reason::CampaignNotActive.as_str())
                .increment(1);
            return Ok(EvaluationOutcome::refused(Reason::CampaignNotActive));
        }

        let condition = RuleCondition::from_rule(rule, self.settings.default_reset_margin)?;
        let crossing = condition.crossing(current, previous);
        let reset_met = condition.reset_condition_met(current, previous);

        let key = ExecutionKey {
            rule_id: rule.id.clone(),
            variant_id: current.variant_id.clone(),
            campaign_id: campaign.id.clone(),
            shop_domain: current.shop_domain.clone(),
        };
        let _guard = self.locks.lock(key.lock_key()).await;

        let state = self.store.get_or_create(&key).await?;
        let transition = state_machine::transition(
            &state,
            Step {
                crossing: &crossing,
                reset_met,
                inventory: current.inventory_quantity,
                now,
                cooldown: self.settings.cooldown,
                message_id,
            },
        );

        let state = if transition.is_noop() {
            state
        } else {
            self.store
                .update(state.id, state.version, &transition.patch)
                .await?
        };

        metrics::counter!("repricer_rule_evaluations_total", "outcome" => transition.reason.as_str())
            .increment(1);
        if transition.execute {
            if !transition.is_noop() {
                metrics::counter!("repricer_rule_triggers_total").increment(1);
            }
            info!(
                campaign_id = campaign.id.as_str(),
                rule_id = rule.id.as_str(),
                variant_id = current.variant_id.as_str(),
                inventory = current.inventory_quantity,
                trigger_count = state.trigger_count,
                reason = %transition.reason,
                "rule triggered"
            );
        } else {
            debug!(
                rule_id = rule.id.as_str(),
                variant_id = current.variant_id.as_str(),
                from = %transition.from,
                to = %transition.to,
                reason = %transition.reason,
                "rule evaluated"
            );
        }

        Ok(EvaluationOutcome {
            should_execute: transition.execute,
            reason: transition.reason,
            crossing: Some(crossing),
            transition: Some(transition),
            state: Some(state),
        })
    }
}
