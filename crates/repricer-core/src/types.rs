// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the repricer crates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Price changes at or below this magnitude are not material.
pub const PRICE_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Catalog,
    Executor,
    Observability,
    Transport,
}

// --- Campaigns and rules ---

/// Campaign lifecycle status. Only `Active` campaigns are evaluated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Archived,
}

/// The inventory condition a rule watches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WhenCondition {
    /// Inventory dropped by at least `when_value` percent since the previous snapshot.
    DecreasesByPercent,
    /// Inventory dropped by at least `when_value` units since the previous snapshot.
    DecreasesByAbs,
    LessThanAbs,
    MoreThanAbs,
    GreaterThanAbs,
    Equals,
    /// `when_value` holds an inclusive `"low,high"` range.
    Between,
}

/// Direction of the price change a rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ThenAction {
    ReducePrice,
    IncreasePrice,
}

/// How `then_value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ThenMode {
    /// Multiply by `1 ± then_value / 100`.
    Percentage,
    /// Add or subtract a flat amount.
    Absolute,
    /// Assign `then_value` directly; `then_action` is ignored.
    Set,
}

/// A pricing rule: "when inventory matches X, then change price by Y".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub when_condition: WhenCondition,
    /// Display operator from the authoring UI (`<`, `less_than`, ...). Must agree
    /// with `when_condition` when present.
    #[serde(default)]
    pub when_operator: Option<String>,
    /// Threshold, percentage, or `"low,high"` range depending on `when_condition`.
    pub when_value: String,
    pub then_action: ThenAction,
    pub then_mode: ThenMode,
    #[serde(with = "rust_decimal::serde::str")]
    pub then_value: Decimal,
    #[serde(default)]
    pub change_compare_at: bool,
    /// Hysteresis margin override for re-arming the rule.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub reset_margin: Option<Decimal>,
}

/// Which products and variants a campaign applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Targeting {
    #[serde(default)]
    pub all_products: bool,
    #[serde(default)]
    pub product_ids: Vec<String>,
    #[serde(default)]
    pub variant_ids: Vec<String>,
}

impl Targeting {
    /// Whether a product/variant pair falls inside this targeting block.
    pub fn matches(&self, product_id: &str, variant_id: &str) -> bool {
        self.all_products
            || self.product_ids.iter().any(|p| p == product_id)
            || self.variant_ids.iter().any(|v| v == variant_id)
    }
}

/// A merchant campaign: an ordered rule list applied to targeted products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub shop_domain: String,
    pub name: String,
    pub status: CampaignStatus,
    #[serde(default)]
    pub priority: i32,
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub targeting: Targeting,
    #[serde(default)]
    pub trigger_count: u64,
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
}

/// Identifies a product variant in the shop's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantRef {
    pub variant_id: String,
    pub product_id: String,
}

/// A campaign together with the rules that apply to one variant.
#[derive(Debug, Clone)]
pub struct CampaignMatch {
    pub campaign: Campaign,
    pub matching_rules: Vec<Rule>,
}

// --- Variant snapshots ---

/// Immutable point-in-time inventory/price observation of one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantStateSnapshot {
    pub id: i64,
    pub shop_domain: String,
    pub variant_id: String,
    pub product_id: String,
    /// Never negative; negative upstream quantities are clamped at ingestion.
    pub inventory_quantity: i64,
    pub price_amount: Decimal,
    pub compare_at_price: Option<Decimal>,
    /// Topic or command that produced the snapshot.
    pub reason: String,
    pub source_message_id: Option<String>,
    pub captured_at: DateTime<Utc>,
}

/// Values observed for a variant in one inbound event, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantObservation {
    pub shop_domain: String,
    pub variant_id: String,
    pub product_id: String,
    pub inventory_quantity: i64,
    pub price_amount: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub reason: String,
    pub source_message_id: Option<String>,
}

impl VariantObservation {
    /// Whether this observation differs materially from a stored snapshot.
    ///
    /// Material means any inventory delta, or a price delta above one cent.
    pub fn is_material_change_from(&self, snapshot: &VariantStateSnapshot) -> bool {
        self.inventory_quantity != snapshot.inventory_quantity
            || (self.price_amount - snapshot.price_amount).abs() > PRICE_EPSILON
    }
}

/// Result of recording an observation: the snapshot pair the engine compares.
#[derive(Debug, Clone)]
pub struct SnapshotRecord {
    /// Most recent snapshot from before this event, if any.
    pub previous: Option<VariantStateSnapshot>,
    /// Snapshot describing the variant after this event.
    pub current: VariantStateSnapshot,
    /// Whether a new row was appended.
    pub appended: bool,
}

// --- Execution state ---

/// Persisted automaton state of one (rule, variant) pair.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Inactive,
    Triggered,
    ResetPending,
}

/// Which side of a threshold a value sits on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThresholdDirection {
    Above,
    Below,
}

/// Identity of an execution state row. Uniqueness is on `(rule_id, variant_id)`;
/// campaign and shop scope the row for isolation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionKey {
    pub rule_id: String,
    pub variant_id: String,
    pub campaign_id: String,
    pub shop_domain: String,
}

impl ExecutionKey {
    /// The pair evaluations must be serialized on.
    pub fn lock_key(&self) -> (String, String) {
        (self.rule_id.clone(), self.variant_id.clone())
    }
}

/// Durable memory that prevents a rule from firing twice for one crossing.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionState {
    pub id: i64,
    pub rule_id: String,
    pub variant_id: String,
    pub campaign_id: String,
    pub shop_domain: String,
    pub state: ExecutionStatus,
    pub last_trigger_value: Option<Decimal>,
    pub last_inventory_value: Option<i64>,
    pub threshold_direction: Option<ThresholdDirection>,
    pub trigger_count: u64,
    pub reset_condition_met: bool,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub triggered_at: Option<DateTime<Utc>>,
    /// Webhook message that caused the latest trigger. A redelivery of that
    /// message may re-drive the price change.
    pub trigger_message_id: Option<String>,
    /// Incremented on every write; updates are compare-and-swap on this value.
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionState {
    /// Whether a cooldown window is still open at `now`.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    /// Apply a partial update in memory. `trigger_count` never moves backwards.
    pub fn apply(&mut self, patch: &ExecutionStatePatch) {
        if let Some(state) = patch.state {
            self.state = state;
        }
        if let Some(value) = patch.last_trigger_value {
            self.last_trigger_value = Some(value);
        }
        if let Some(value) = patch.last_inventory_value {
            self.last_inventory_value = Some(value);
        }
        if let Some(direction) = patch.threshold_direction {
            self.threshold_direction = Some(direction);
        }
        if let Some(count) = patch.trigger_count {
            self.trigger_count = self.trigger_count.max(count);
        }
        if let Some(met) = patch.reset_condition_met {
            self.reset_condition_met = met;
        }
        if let Some(until) = patch.cooldown_until {
            self.cooldown_until = until;
        }
        if let Some(at) = patch.triggered_at {
            self.triggered_at = Some(at);
        }
        if let Some(message_id) = &patch.trigger_message_id {
            self.trigger_message_id = message_id.clone();
        }
    }

    /// Whether this state was triggered by `message_id` and still holds it.
    pub fn triggered_by(&self, message_id: &str) -> bool {
        self.state == ExecutionStatus::Triggered
            && self.trigger_message_id.as_deref() == Some(message_id)
    }
}

/// Partial update of an [`ExecutionState`]. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionStatePatch {
    pub state: Option<ExecutionStatus>,
    pub last_trigger_value: Option<Decimal>,
    pub last_inventory_value: Option<i64>,
    pub threshold_direction: Option<ThresholdDirection>,
    pub trigger_count: Option<u64>,
    pub reset_condition_met: Option<bool>,
    /// `Some(None)` clears the cooldown.
    pub cooldown_until: Option<Option<DateTime<Utc>>>,
    pub triggered_at: Option<DateTime<Utc>>,
    /// `Some(None)` clears the marker.
    pub trigger_message_id: Option<Option<String>>,
}

impl ExecutionStatePatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// --- Webhooks ---

/// Webhook topics the pipeline routes on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString)]
pub enum WebhookTopic {
    #[strum(serialize = "inventory_levels/update")]
    InventoryLevelsUpdate,
    #[strum(serialize = "inventory_items/update")]
    InventoryItemsUpdate,
    #[strum(serialize = "products/update")]
    ProductsUpdate,
    #[strum(serialize = "products/create")]
    ProductsCreate,
    #[strum(serialize = "app/uninstalled")]
    AppUninstalled,
    #[strum(serialize = "app/scopes_update")]
    AppScopesUpdate,
    #[strum(default)]
    Other(String),
}

impl WebhookTopic {
    /// Parse a topic header value. Never fails; unknown topics map to `Other`.
    pub fn parse(topic: &str) -> Self {
        topic
            .parse()
            .unwrap_or_else(|_| WebhookTopic::Other(topic.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            WebhookTopic::InventoryLevelsUpdate => "inventory_levels/update",
            WebhookTopic::InventoryItemsUpdate => "inventory_items/update",
            WebhookTopic::ProductsUpdate => "products/update",
            WebhookTopic::ProductsCreate => "products/create",
            WebhookTopic::AppUninstalled => "app/uninstalled",
            WebhookTopic::AppScopesUpdate => "app/scopes_update",
            WebhookTopic::Other(topic) => topic,
        }
    }
}

impl std::fmt::Display for WebhookTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A delivered webhook. `message_id` is the idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookMessage {
    pub message_id: String,
    pub topic: String,
    pub shop_domain: String,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

/// A failure isolated to one (campaign, rule, variant) evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleError {
    pub campaign_id: String,
    pub rule_id: String,
    pub variant_id: String,
    pub error: String,
    pub retryable: bool,
}

/// Outcome of processing one webhook message, as reported to the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub message_id: String,
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The message had already been processed; nothing was done.
    #[serde(default)]
    pub duplicate: bool,
    /// Whether the message was recorded as processed (dedup-visible).
    #[serde(default)]
    pub marked_processed: bool,
    pub campaigns_triggered: usize,
    pub variants_updated: usize,
    pub rules_executed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tuple_errors: Vec<TupleError>,
}

// --- Price execution and audit ---

/// Everything the price-mutation collaborator needs to apply one rule.
#[derive(Debug, Clone)]
pub struct PriceChangeRequest {
    pub shop_domain: String,
    pub variant_id: String,
    pub product_id: String,
    pub rule: Rule,
    pub current_price: Decimal,
    pub current_compare_at: Option<Decimal>,
}

/// Prices before and after a rule was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceChange {
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub old_compare_at: Option<Decimal>,
    pub new_compare_at: Option<Decimal>,
}

/// One executed rule, written to the audit sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub rule_id: String,
    pub campaign_id: String,
    pub shop_domain: String,
    pub variant_id: String,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub old_compare_at: Option<Decimal>,
    pub new_compare_at: Option<Decimal>,
    pub trigger_reason: String,
    pub message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Shop-level lifecycle signals raised by app webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ShopSignal {
    /// The app was uninstalled; shop data should be cleaned up.
    CleanupRequested,
    /// Granted scopes changed; required permissions must be re-validated.
    ScopesRevalidation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn snapshot(inventory: i64, price: &str) -> VariantStateSnapshot {
        VariantStateSnapshot {
            id: 1,
            shop_domain: "shop.example".into(),
            variant_id: "v1".into(),
            product_id: "p1".into(),
            inventory_quantity: inventory,
            price_amount: Decimal::from_str(price).unwrap(),
            compare_at_price: None,
            reason: "products/update".into(),
            source_message_id: None,
            captured_at: Utc::now(),
        }
    }

    fn observation(inventory: i64, price: &str) -> VariantObservation {
        VariantObservation {
            shop_domain: "shop.example".into(),
            variant_id: "v1".into(),
            product_id: "p1".into(),
            inventory_quantity: inventory,
            price_amount: Decimal::from_str(price).unwrap(),
            compare_at_price: None,
            reason: "products/update".into(),
            source_message_id: None,
        }
    }

    #[test]
    fn material_change_thresholds() {
        let snap = snapshot(10, "19.99");
        assert!(!observation(10, "19.99").is_material_change_from(&snap));
        assert!(!observation(10, "20.00").is_material_change_from(&snap));
        assert!(observation(10, "20.01").is_material_change_from(&snap));
        assert!(observation(9, "19.99").is_material_change_from(&snap));
    }

    #[test]
    fn campaign_status_parses_case_insensitively() {
        assert_eq!(
            CampaignStatus::from_str("paused").unwrap(),
            CampaignStatus::Paused
        );
        assert_eq!(CampaignStatus::Archived.to_string(), "ARCHIVED");
    }

    #[test]
    fn webhook_topic_round_trip_and_fallback() {
        assert_eq!(
            WebhookTopic::parse("inventory_levels/update"),
            WebhookTopic::InventoryLevelsUpdate
        );
        assert_eq!(WebhookTopic::ProductsCreate.to_string(), "products/create");
        assert_eq!(
            WebhookTopic::parse("orders/create"),
            WebhookTopic::Other("orders/create".into())
        );
    }

    #[test]
    fn targeting_matches_products_or_variants() {
        let targeting = Targeting {
            all_products: false,
            product_ids: vec!["p1".into()],
            variant_ids: vec!["v9".into()],
        };
        assert!(targeting.matches("p1", "v1"));
        assert!(targeting.matches("p2", "v9"));
        assert!(!targeting.matches("p2", "v2"));
        assert!(Targeting {
            all_products: true,
            ..Targeting::default()
        }
        .matches("p3", "v3"));
    }

    #[test]
    fn rule_deserializes_from_authoring_json() {
        let json = r#"{
            "id": "r1",
            "when_condition": "less_than_abs",
            "when_value": "20",
            "then_action": "reduce_price",
            "then_mode": "percentage",
            "then_value": "10",
            "change_compare_at": true
        }"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.when_condition, WhenCondition::LessThanAbs);
        assert_eq!(rule.then_value, Decimal::from(10));
        assert!(rule.reset_margin.is_none());
        assert!(rule.when_operator.is_none());
    }

    #[test]
    fn patch_never_lowers_trigger_count() {
        let mut state = ExecutionState {
            id: 1,
            rule_id: "r1".into(),
            variant_id: "v1".into(),
            campaign_id: "c1".into(),
            shop_domain: "shop.example".into(),
            state: ExecutionStatus::Triggered,
            last_trigger_value: None,
            last_inventory_value: None,
            threshold_direction: None,
            trigger_count: 3,
            reset_condition_met: false,
            cooldown_until: None,
            triggered_at: None,
            trigger_message_id: None,
            version: 4,
            updated_at: Utc::now(),
        };
        state.apply(&ExecutionStatePatch {
            trigger_count: Some(1),
            ..Default::default()
        });
        assert_eq!(state.trigger_count, 3);
        assert!(ExecutionStatePatch::default().is_empty());
    }

    #[test]
    fn trigger_marker_identifies_the_firing_message() {
        let mut state = ExecutionState {
            id: 1,
            rule_id: "r1".into(),
            variant_id: "v1".into(),
            campaign_id: "c1".into(),
            shop_domain: "shop.example".into(),
            state: ExecutionStatus::Inactive,
            last_trigger_value: None,
            last_inventory_value: None,
            threshold_direction: None,
            trigger_count: 0,
            reset_condition_met: false,
            cooldown_until: None,
            triggered_at: None,
            trigger_message_id: None,
            version: 0,
            updated_at: Utc::now(),
        };
        state.apply(&ExecutionStatePatch {
            state: Some(ExecutionStatus::Triggered),
            trigger_message_id: Some(Some("m2".into())),
            ..Default::default()
        });
        assert!(state.triggered_by("m2"));
        assert!(!state.triggered_by("m3"));

        state.apply(&ExecutionStatePatch {
            state: Some(ExecutionStatus::ResetPending),
            ..Default::default()
        });
        assert!(!state.triggered_by("m2"));
    }

    proptest::proptest! {
        #[test]
        fn any_inventory_delta_is_material(
            base in 0i64..10_000,
            delta in 1i64..500,
            cents in 0i64..100_000,
        ) {
            let price = Decimal::new(cents, 2).to_string();
            let snap = snapshot(base, &price);
            proptest::prop_assert!(observation(base + delta, &price).is_material_change_from(&snap));
        }

        #[test]
        fn sub_cent_price_drift_is_not_material(
            inventory in 0i64..10_000,
            cents in 100i64..100_000,
            drift in -10i64..=10,
        ) {
            let snap = snapshot(inventory, &Decimal::new(cents * 10, 3).to_string());
            let drifted = Decimal::new(cents * 10 + drift, 3).to_string();
            proptest::prop_assert!(!observation(inventory, &drifted).is_material_change_from(&snap));
        }
    }
}
