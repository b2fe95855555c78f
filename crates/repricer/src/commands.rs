// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator commands: campaign management and variant inspection.
//!
//! Each command opens the configured database directly; they are safe to run
//! next to a live `serve` process because SQLite serializes writers.

use std::path::Path;

use rust_decimal::Decimal;
use tracing::info;

use repricer_core::RepricerError;
use repricer_core::traits::{CampaignReadModel, VariantStateStore};
use repricer_core::types::{Campaign, CampaignStatus};
use repricer_engine::RuleCondition;
use repricer_storage::SqliteStorage;

/// Parse campaigns from a JSON file holding one campaign or an array of them.
pub fn read_campaigns(path: &Path) -> Result<Vec<Campaign>, RepricerError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| RepricerError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse_campaigns(&content)
        .map_err(|e| RepricerError::Config(format!("invalid campaign file {}: {e}", path.display())))
}

fn parse_campaigns(content: &str) -> Result<Vec<Campaign>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    if value.is_array() {
        serde_json::from_value(value)
    } else {
        serde_json::from_value(value).map(|c| vec![c])
    }
}

/// Store campaigns after checking that every rule parses.
pub async fn import_campaigns(
    storage: &SqliteStorage,
    campaigns: &[Campaign],
    default_margin: Decimal,
) -> Result<usize, RepricerError> {
    for campaign in campaigns {
        for rule in &campaign.rules {
            RuleCondition::from_rule(rule, default_margin)?;
        }
    }
    for campaign in campaigns {
        storage.upsert_campaign(campaign).await?;
        info!(
            campaign_id = campaign.id.as_str(),
            status = %campaign.status,
            rules = campaign.rules.len(),
            "campaign imported"
        );
    }
    Ok(campaigns.len())
}

/// Move a campaign to `to`, enforcing the lifecycle graph.
pub async fn transition_campaign(
    storage: &SqliteStorage,
    campaign_id: &str,
    to: &str,
) -> Result<Campaign, RepricerError> {
    let to: CampaignStatus = to.parse().map_err(|_| {
        RepricerError::Config(format!(
            "unknown campaign status '{to}' (expected DRAFT, ACTIVE, PAUSED, COMPLETED, or ARCHIVED)"
        ))
    })?;
    let campaign = storage.transition_status(campaign_id, to).await?;
    info!(campaign_id, status = %campaign.status, "campaign status changed");
    Ok(campaign)
}

pub async fn show_campaign(storage: &SqliteStorage, campaign_id: &str) -> Result<String, RepricerError> {
    let campaign = storage
        .get_campaign(campaign_id)
        .await?
        .ok_or_else(|| RepricerError::NotFound {
            entity: "campaign".into(),
            id: campaign_id.into(),
        })?;
    serde_json::to_string_pretty(&campaign).map_err(|e| RepricerError::Internal(e.to_string()))
}

/// Snapshot history, newest first, one line per snapshot.
pub async fn variant_history(
    storage: &SqliteStorage,
    shop_domain: &str,
    variant_id: &str,
    limit: usize,
) -> Result<Vec<String>, RepricerError> {
    let snapshots = storage.latest(shop_domain, variant_id, limit).await?;
    Ok(snapshots
        .iter()
        .map(|s| {
            let compare_at = s
                .compare_at_price
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".into());
            format!(
                "{}  inventory={:<6} price={:<10} compare_at={:<10} {}",
                s.captured_at.to_rfc3339(),
                s.inventory_quantity,
                s.price_amount,
                compare_at,
                s.reason
            )
        })
        .collect())
}

/// Execution state of every rule tracked for a variant.
pub async fn variant_states(
    storage: &SqliteStorage,
    shop_domain: &str,
    variant_id: &str,
) -> Result<Vec<String>, RepricerError> {
    let states = storage.execution_states_for_variant(shop_domain, variant_id).await?;
    Ok(states
        .iter()
        .map(|s| {
            format!(
                "campaign={} rule={} state={} triggers={} last_inventory={}",
                s.campaign_id,
                s.rule_id,
                s.state,
                s.trigger_count,
                s.last_inventory_value
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "-".into())
            )
        })
        .collect())
}
