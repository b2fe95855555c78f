// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Price-mutation collaborator.

use async_trait::async_trait;

use crate::error::RepricerError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{PriceChange, PriceChangeRequest};

/// Applies a rule's price action to a variant in the shop.
///
/// Only invoked after the engine decided the rule executes for this crossing.
#[async_trait]
pub trait PriceExecutor: PluginAdapter {
    async fn apply_price_change(
        &self,
        request: &PriceChangeRequest,
    ) -> Result<PriceChange, RepricerError>;
}
