// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed webhook payloads.
//!
//! Raw JSON is parsed once, at the pipeline boundary, into one variant per
//! topic. Shop identifiers arrive as JSON numbers or strings and are kept as
//! strings; prices arrive as decimal strings. Negative inventory quantities
//! are clamped to zero here.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use repricer_core::error::RepricerError;
use repricer_core::types::WebhookTopic;

/// `inventory_levels/update`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InventoryLevelPayload {
    #[serde(deserialize_with = "id_string")]
    pub inventory_item_id: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub location_id: Option<String>,
    #[serde(default, deserialize_with = "opt_quantity")]
    pub available: Option<i64>,
}

/// `inventory_items/update`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InventoryItemPayload {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub sku: Option<String>,
}

/// One variant inside a product payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProductVariantPayload {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(deserialize_with = "decimal")]
    pub price: Decimal,
    #[serde(default, deserialize_with = "opt_decimal")]
    pub compare_at_price: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_quantity")]
    pub inventory_quantity: Option<i64>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub inventory_item_id: Option<String>,
}

/// `products/update` and `products/create`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProductPayload {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub variants: Vec<ProductVariantPayload>,
}

/// A webhook body, parsed according to its topic.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookPayload {
    InventoryLevel(InventoryLevelPayload),
    InventoryItem(InventoryItemPayload),
    Product(ProductPayload),
    AppUninstalled,
    ScopesUpdate,
    /// A topic the pipeline does not act on.
    Ignored,
}

impl WebhookPayload {
    /// Parse `payload` for `topic`. A body that does not fit the topic's
    /// shape is a permanent [`RepricerError::Payload`] error.
    pub fn parse(topic: &WebhookTopic, payload: &serde_json::Value) -> Result<Self, RepricerError> {
        let malformed = |e: serde_json::Error| RepricerError::Payload {
            topic: topic.to_string(),
            reason: e.to_string(),
        };
        let parsed = match topic {
            WebhookTopic::InventoryLevelsUpdate => WebhookPayload::InventoryLevel(
                InventoryLevelPayload::deserialize(payload).map_err(malformed)?,
            ),
            WebhookTopic::InventoryItemsUpdate => WebhookPayload::InventoryItem(
                InventoryItemPayload::deserialize(payload).map_err(malformed)?,
            ),
            WebhookTopic::ProductsUpdate | WebhookTopic::ProductsCreate => {
                WebhookPayload::Product(ProductPayload::deserialize(payload).map_err(malformed)?)
            }
            WebhookTopic::AppUninstalled => WebhookPayload::AppUninstalled,
            WebhookTopic::AppScopesUpdate => WebhookPayload::ScopesUpdate,
            WebhookTopic::Other(_) => WebhookPayload::Ignored,
        };
        Ok(parsed)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Num(serde_json::Number),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Str(s) => s,
            Scalar::Num(n) => n.to_string(),
        }
    }
}

fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let id = Scalar::deserialize(d)?.into_string();
    if id.trim().is_empty() {
        return Err(serde::de::Error::custom("empty id"));
    }
    Ok(id)
}

fn opt_id_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(d)?.map(Scalar::into_string))
}

fn parse_decimal<E: serde::de::Error>(raw: String) -> Result<Decimal, E> {
    let value = Decimal::from_str(raw.trim())
        .map_err(|e| E::custom(format!("invalid amount `{raw}`: {e}")))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(E::custom(format!("negative amount `{raw}`")));
    }
    Ok(value)
}

fn decimal<'de, D: Deserializer<'de>>(d: D) -> Result<Decimal, D::Error> {
    parse_decimal(Scalar::deserialize(d)?.into_string())
}

fn opt_decimal<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Decimal>, D::Error> {
    match Option::<Scalar>::deserialize(d)? {
        Some(raw) => {
            let raw = raw.into_string();
            if raw.trim().is_empty() {
                Ok(None)
            } else {
                parse_decimal(raw).map(Some)
            }
        }
        None => Ok(None),
    }
}

fn opt_quantity<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(Option::<i64>::deserialize(d)?.map(|q| q.max(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inventory_level_accepts_numeric_ids_and_clamps() {
        let payload = json!({
            "inventory_item_id": 271878346596884015u64,
            "location_id": 24826418,
            "available": -3,
            "updated_at": "2026-01-01T00:00:00-05:00"
        });
        let parsed = WebhookPayload::parse(&WebhookTopic::InventoryLevelsUpdate, &payload).unwrap();
        let WebhookPayload::InventoryLevel(level) = parsed else {
            panic!("expected inventory level payload");
        };
        assert_eq!(level.inventory_item_id, "271878346596884015");
        assert_eq!(level.location_id.as_deref(), Some("24826418"));
        assert_eq!(level.available, Some(0));
    }

    #[test]
    fn product_variants_parse_string_prices() {
        let payload = json!({
            "id": 788032119674292922u64,
            "title": "Example T-Shirt",
            "variants": [
                {
                    "id": 642667041472713922u64,
                    "price": "19.99",
                    "compare_at_price": "24.99",
                    "inventory_quantity": 75,
                    "inventory_item_id": 1
                },
                {
                    "id": "757650484644203962",
                    "price": 20,
                    "compare_at_price": null
                }
            ]
        });
        let WebhookPayload::Product(product) =
            WebhookPayload::parse(&WebhookTopic::ProductsUpdate, &payload).unwrap()
        else {
            panic!("expected product payload");
        };
        assert_eq!(product.variants.len(), 2);
        assert_eq!(product.variants[0].price, Decimal::new(1999, 2));
        assert_eq!(product.variants[0].compare_at_price, Some(Decimal::new(2499, 2)));
        assert_eq!(product.variants[0].inventory_item_id.as_deref(), Some("1"));
        assert_eq!(product.variants[1].id, "757650484644203962");
        assert_eq!(product.variants[1].inventory_quantity, None);
        assert_eq!(product.variants[1].compare_at_price, None);
    }

    #[test]
    fn wrong_shape_is_a_payload_error() {
        let err = WebhookPayload::parse(&WebhookTopic::ProductsCreate, &json!({"title": "no id"}))
            .unwrap_err();
        assert!(matches!(err, RepricerError::Payload { ref topic, .. } if topic == "products/create"));
        assert!(!err.is_retryable());

        let err = WebhookPayload::parse(
            &WebhookTopic::ProductsUpdate,
            &json!({"id": 1, "variants": [{"id": 2, "price": "-4.00"}]}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("negative amount"));
    }

    #[test]
    fn app_and_unknown_topics_ignore_body() {
        assert_eq!(
            WebhookPayload::parse(&WebhookTopic::AppUninstalled, &json!(null)).unwrap(),
            WebhookPayload::AppUninstalled
        );
        assert_eq!(
            WebhookPayload::parse(&WebhookTopic::parse("orders/create"), &json!({})).unwrap(),
            WebhookPayload::Ignored
        );
    }
}
