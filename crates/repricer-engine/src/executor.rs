// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Price executor that computes changes without calling a shop API.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

use repricer_core::error::RepricerError;
use repricer_core::traits::{PluginAdapter, PriceExecutor};
use repricer_core::types::{AdapterType, HealthStatus, PriceChange, PriceChangeRequest};

use crate::pricing::compute_price_change;

/// Logs each computed change and remembers the latest one per variant.
#[derive(Default)]
pub struct DryRunPriceExecutor {
    applied: DashMap<(String, String), PriceChange>,
}

impl DryRunPriceExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent change computed for a variant.
    pub fn last_change(&self, shop_domain: &str, variant_id: &str) -> Option<PriceChange> {
        self.applied
            .get(&(shop_domain.to_string(), variant_id.to_string()))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl PluginAdapter for DryRunPriceExecutor {
    fn name(&self) -> &str {
        "dry-run"
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
impl PriceExecutor for DryRunPriceExecutor {
    async fn apply_price_change(
        &self,
        request: &PriceChangeRequest,
    ) -> Result<PriceChange, RepricerError> {
        let change = compute_price_change(request);
        info!(
            shop = request.shop_domain.as_str(),
            variant_id = request.variant_id.as_str(),
            rule_id = request.rule.id.as_str(),
            old_price = %change.old_price,
            new_price = %change.new_price,
            "dry-run price change"
        );
        self.applied.insert(
            (request.shop_domain.clone(), request.variant_id.clone()),
            change.clone(),
        );
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repricer_core::types::{Rule, ThenAction, ThenMode, WhenCondition};
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn remembers_last_change() {
        let executor = DryRunPriceExecutor::new();
        let request = PriceChangeRequest {
            shop_domain: "shop.example".into(),
            variant_id: "v1".into(),
            product_id: "p1".into(),
            rule: Rule {
                id: "r1".into(),
                description: String::new(),
                when_condition: WhenCondition::LessThanAbs,
                when_operator: None,
                when_value: "20".into(),
                then_action: ThenAction::ReducePrice,
                then_mode: ThenMode::Absolute,
                then_value: Decimal::from(5),
                change_compare_at: false,
                reset_margin: None,
            },
            current_price: Decimal::from(30),
            current_compare_at: None,
        };
        let change = executor.apply_price_change(&request).await.unwrap();
        assert_eq!(change.new_price, Decimal::from(25));
        assert_eq!(executor.last_change("shop.example", "v1"), Some(change));
        assert!(executor.last_change("shop.example", "v2").is_none());
    }
}
