// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign read model and inventory-item catalog.

use chrono::{DateTime, Utc};
use repricer_core::types::{Campaign, CampaignMatch, CampaignStatus, VariantRef};
use repricer_core::{CampaignStatusGuard, RepricerError};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{enum_column, format_ts, json_column, now_ts, to_json, ts_column};

const CAMPAIGN_COLUMNS: &str =
    "id, shop_domain, name, status, priority, rules, targeting, trigger_count, last_triggered";

fn campaign_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Campaign> {
    let trigger_count: i64 = row.get(7)?;
    Ok(Campaign {
        id: row.get(0)?,
        shop_domain: row.get(1)?,
        name: row.get(2)?,
        status: enum_column(row, 3)?,
        priority: row.get(4)?,
        rules: json_column(row, 5)?,
        targeting: json_column(row, 6)?,
        trigger_count: trigger_count.max(0) as u64,
        last_triggered: ts_column(row, 8)?,
    })
}

/// Insert or replace a campaign definition.
///
/// Counters already accumulated on an existing row are preserved.
pub async fn upsert_campaign(db: &Database, campaign: &Campaign) -> Result<(), RepricerError> {
    let campaign = campaign.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO campaigns (id, shop_domain, name, status, priority, rules, targeting,
                     trigger_count, last_triggered, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT (id) DO UPDATE SET
                     shop_domain = excluded.shop_domain,
                     name = excluded.name,
                     status = excluded.status,
                     priority = excluded.priority,
                     rules = excluded.rules,
                     targeting = excluded.targeting,
                     trigger_count = MAX(trigger_count, excluded.trigger_count),
                     last_triggered = COALESCE(excluded.last_triggered, last_triggered),
                     updated_at = excluded.updated_at",
                params![
                    campaign.id,
                    campaign.shop_domain,
                    campaign.name,
                    campaign.status.to_string(),
                    campaign.priority,
                    to_json(&campaign.rules)?,
                    to_json(&campaign.targeting)?,
                    campaign.trigger_count as i64,
                    campaign.last_triggered.map(format_ts),
                    now_ts(),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_campaign(db: &Database, id: &str) -> Result<Option<Campaign>, RepricerError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
                params![id],
                campaign_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// ACTIVE campaigns of a shop whose targeting covers the variant, highest
/// priority first.
pub async fn active_campaigns_targeting(
    db: &Database,
    shop_domain: &str,
    product_id: &str,
    variant_id: &str,
) -> Result<Vec<CampaignMatch>, RepricerError> {
    let shop_domain = shop_domain.to_string();
    let campaigns = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns
                 WHERE shop_domain = ?1 AND status = ?2
                 ORDER BY priority DESC, id ASC"
            ))?;
            let rows = stmt.query_map(
                params![shop_domain, CampaignStatus::Active.to_string()],
                campaign_from_row,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    Ok(campaigns
        .into_iter()
        .filter(|c| c.targeting.matches(product_id, variant_id) && !c.rules.is_empty())
        .map(|campaign| CampaignMatch {
            matching_rules: campaign.rules.clone(),
            campaign,
        })
        .collect())
}

/// Bump a campaign's trigger counter.
pub async fn record_trigger(
    db: &Database,
    campaign_id: &str,
    at: DateTime<Utc>,
) -> Result<(), RepricerError> {
    let campaign_id = campaign_id.to_string();
    let at = format_ts(at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE campaigns SET trigger_count = trigger_count + 1,
                     last_triggered = ?2, updated_at = ?2
                 WHERE id = ?1",
                params![campaign_id, at],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Move a campaign to `to` if the lifecycle allows it.
///
/// The write is conditional on the status that was validated, so a
/// concurrent transition surfaces as a conflict instead of being overwritten.
pub async fn transition_status(
    db: &Database,
    campaign_id: &str,
    to: CampaignStatus,
) -> Result<Campaign, RepricerError> {
    let mut campaign =
        get_campaign(db, campaign_id)
            .await?
            .ok_or_else(|| RepricerError::NotFound {
                entity: "campaign".to_string(),
                id: campaign_id.to_string(),
            })?;
    let from = campaign.status;
    CampaignStatusGuard::transition(from, to)?;

    let id = campaign.id.clone();
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE campaigns SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
                params![id, from.to_string(), to.to_string(), now_ts()],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    if changed == 0 {
        return Err(RepricerError::Conflict {
            entity: "campaign".to_string(),
            id: campaign_id.to_string(),
        });
    }
    campaign.status = to;
    Ok(campaign)
}

pub async fn variant_for_inventory_item(
    db: &Database,
    shop_domain: &str,
    inventory_item_id: &str,
) -> Result<Option<VariantRef>, RepricerError> {
    let shop_domain = shop_domain.to_string();
    let inventory_item_id = inventory_item_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT variant_id, product_id FROM inventory_items
                 WHERE shop_domain = ?1 AND inventory_item_id = ?2",
                params![shop_domain, inventory_item_id],
                |row| {
                    Ok(VariantRef {
                        variant_id: row.get(0)?,
                        product_id: row.get(1)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn remember_inventory_item(
    db: &Database,
    shop_domain: &str,
    inventory_item_id: &str,
    variant: &VariantRef,
) -> Result<(), RepricerError> {
    let shop_domain = shop_domain.to_string();
    let inventory_item_id = inventory_item_id.to_string();
    let variant = variant.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO inventory_items (shop_domain, inventory_item_id, variant_id,
                     product_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (shop_domain, inventory_item_id) DO UPDATE SET
                     variant_id = excluded.variant_id,
                     product_id = excluded.product_id,
                     updated_at = excluded.updated_at",
                params![
                    shop_domain,
                    inventory_item_id,
                    variant.variant_id,
                    variant.product_id,
                    now_ts()
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use repricer_core::types::{Rule, Targeting, ThenAction, ThenMode, WhenCondition};
    use rust_decimal::Decimal;

    fn rule(id: &str) -> Rule {
        Rule {
            id: id.into(),
            description: String::new(),
            when_condition: WhenCondition::LessThanAbs,
            when_operator: None,
            when_value: "20".into(),
            then_action: ThenAction::ReducePrice,
            then_mode: ThenMode::Percentage,
            then_value: Decimal::from(10),
            change_compare_at: false,
            reset_margin: None,
        }
    }

    fn campaign(id: &str, status: CampaignStatus, priority: i32, targeting: Targeting) -> Campaign {
        Campaign {
            id: id.into(),
            shop_domain: "shop.example".into(),
            name: format!("campaign {id}"),
            status,
            priority,
            rules: vec![rule(&format!("{id}-r1"))],
            targeting,
            trigger_count: 0,
            last_triggered: None,
        }
    }

    fn products(ids: &[&str]) -> Targeting {
        Targeting {
            product_ids: ids.iter().map(|s| s.to_string()).collect(),
            ..Targeting::default()
        }
    }

    #[tokio::test]
    async fn only_active_targeting_campaigns_are_returned() {
        let db = Database::open_in_memory().await.unwrap();
        for c in [
            campaign("low", CampaignStatus::Active, 1, products(&["p1"])),
            campaign("high", CampaignStatus::Active, 9, products(&["p1"])),
            campaign("paused", CampaignStatus::Paused, 5, products(&["p1"])),
            campaign("draft", CampaignStatus::Draft, 5, products(&["p1"])),
            campaign("elsewhere", CampaignStatus::Active, 5, products(&["p2"])),
        ] {
            upsert_campaign(&db, &c).await.unwrap();
        }

        let matches = active_campaigns_targeting(&db, "shop.example", "p1", "v1")
            .await
            .unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.campaign.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low"]);
        assert_eq!(matches[0].matching_rules[0].id, "high-r1");
    }

    #[tokio::test]
    async fn other_shops_are_invisible() {
        let db = Database::open_in_memory().await.unwrap();
        let mut c = campaign("c1", CampaignStatus::Active, 1, Targeting {
            all_products: true,
            ..Targeting::default()
        });
        c.shop_domain = "other.example".into();
        upsert_campaign(&db, &c).await.unwrap();
        assert!(
            active_campaigns_targeting(&db, "shop.example", "p1", "v1")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn transitions_follow_the_lifecycle() {
        let db = Database::open_in_memory().await.unwrap();
        upsert_campaign(&db, &campaign("c1", CampaignStatus::Draft, 1, products(&["p1"])))
            .await
            .unwrap();

        let err = transition_status(&db, "c1", CampaignStatus::Paused)
            .await
            .unwrap_err();
        assert!(matches!(err, RepricerError::InvalidTransition { .. }));

        let active = transition_status(&db, "c1", CampaignStatus::Active).await.unwrap();
        assert_eq!(active.status, CampaignStatus::Active);
        let stored = get_campaign(&db, "c1").await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Active);

        let missing = transition_status(&db, "nope", CampaignStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(missing, RepricerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn record_trigger_counts_up_and_survives_upsert() {
        let db = Database::open_in_memory().await.unwrap();
        let c = campaign("c1", CampaignStatus::Active, 1, products(&["p1"]));
        upsert_campaign(&db, &c).await.unwrap();
        record_trigger(&db, "c1", Utc::now()).await.unwrap();
        record_trigger(&db, "c1", Utc::now()).await.unwrap();
        upsert_campaign(&db, &c).await.unwrap();

        let stored = get_campaign(&db, "c1").await.unwrap().unwrap();
        assert_eq!(stored.trigger_count, 2);
        assert!(stored.last_triggered.is_some());
    }

    #[tokio::test]
    async fn inventory_items_map_to_variants() {
        let db = Database::open_in_memory().await.unwrap();
        let variant = VariantRef {
            variant_id: "v1".into(),
            product_id: "p1".into(),
        };
        remember_inventory_item(&db, "shop.example", "inv-1", &variant)
            .await
            .unwrap();
        assert_eq!(
            variant_for_inventory_item(&db, "shop.example", "inv-1")
                .await
                .unwrap(),
            Some(variant)
        );
        assert!(
            variant_for_inventory_item(&db, "shop.example", "inv-2")
                .await
                .unwrap()
                .is_none()
        );
    }
}
