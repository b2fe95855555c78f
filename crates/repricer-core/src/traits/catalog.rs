// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read model over merchant campaigns and the variant catalog.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RepricerError;
use crate::types::{Campaign, CampaignMatch, CampaignStatus, VariantRef};

#[async_trait]
pub trait CampaignReadModel: Send + Sync {
    /// ACTIVE campaigns of `shop_domain` whose targeting covers the variant,
    /// ordered by descending priority. Never returns other statuses.
    async fn active_campaigns_targeting(
        &self,
        shop_domain: &str,
        product_id: &str,
        variant_id: &str,
    ) -> Result<Vec<CampaignMatch>, RepricerError>;

    /// Bump a campaign's trigger counter after one of its rules executed.
    async fn record_trigger(&self, campaign_id: &str, at: DateTime<Utc>)
    -> Result<(), RepricerError>;

    /// Move a campaign to `to`, rejecting transitions the lifecycle forbids.
    async fn transition_status(
        &self,
        campaign_id: &str,
        to: CampaignStatus,
    ) -> Result<Campaign, RepricerError>;
}

/// Maps inventory items to the variants that stock them.
#[async_trait]
pub trait VariantCatalog: Send + Sync {
    async fn variant_for_inventory_item(
        &self,
        shop_domain: &str,
        inventory_item_id: &str,
    ) -> Result<Option<VariantRef>, RepricerError>;

    async fn remember_inventory_item(
        &self,
        shop_domain: &str,
        inventory_item_id: &str,
        variant: &VariantRef,
    ) -> Result<(), RepricerError>;
}
