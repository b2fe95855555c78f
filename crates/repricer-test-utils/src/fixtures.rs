// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builders for campaigns, rules, and webhook messages used across tests.

use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;

use repricer_core::types::{
    Campaign, CampaignStatus, Rule, Targeting, ThenAction, ThenMode, WebhookMessage,
    WhenCondition,
};

pub const SHOP: &str = "test-shop.myshopify.com";

/// Parse a decimal literal. Panics on malformed input.
pub fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap_or_else(|e| panic!("bad decimal literal {value}: {e}"))
}

/// "When inventory < `threshold`, reduce price by 10%", compare-at included.
pub fn low_stock_rule(id: &str, threshold: i64) -> Rule {
    Rule {
        id: id.to_string(),
        description: format!("reduce 10% below {threshold}"),
        when_condition: WhenCondition::LessThanAbs,
        when_operator: Some("<".to_string()),
        when_value: threshold.to_string(),
        then_action: ThenAction::ReducePrice,
        then_mode: ThenMode::Percentage,
        then_value: Decimal::from(10),
        change_compare_at: true,
        reset_margin: None,
    }
}

/// A campaign of [`SHOP`] targeting every product.
pub fn campaign(id: &str, status: CampaignStatus, rules: Vec<Rule>) -> Campaign {
    Campaign {
        id: id.to_string(),
        shop_domain: SHOP.to_string(),
        name: format!("campaign {id}"),
        status,
        priority: 0,
        rules,
        targeting: Targeting {
            all_products: true,
            ..Targeting::default()
        },
        trigger_count: 0,
        last_triggered: None,
    }
}

fn message(message_id: &str, topic: &str, payload: serde_json::Value) -> WebhookMessage {
    WebhookMessage {
        message_id: message_id.to_string(),
        topic: topic.to_string(),
        shop_domain: SHOP.to_string(),
        payload,
        received_at: Utc::now(),
    }
}

/// `products/update` with a single variant.
pub fn product_update(
    message_id: &str,
    product_id: &str,
    variant_id: &str,
    inventory: i64,
    price: &str,
    compare_at: Option<&str>,
) -> WebhookMessage {
    message(
        message_id,
        "products/update",
        json!({
            "id": product_id,
            "title": "Test product",
            "variants": [{
                "id": variant_id,
                "price": price,
                "compare_at_price": compare_at,
                "inventory_quantity": inventory,
                "inventory_item_id": format!("item-{variant_id}"),
            }]
        }),
    )
}

/// `inventory_levels/update` for the item [`product_update`] maps to `variant_id`.
pub fn inventory_level_update(message_id: &str, variant_id: &str, available: i64) -> WebhookMessage {
    message(
        message_id,
        "inventory_levels/update",
        json!({
            "inventory_item_id": format!("item-{variant_id}"),
            "location_id": 1,
            "available": available,
        }),
    )
}

/// An app lifecycle topic with an empty body.
pub fn app_event(message_id: &str, topic: &str) -> WebhookMessage {
    message(message_id, topic, json!({}))
}
