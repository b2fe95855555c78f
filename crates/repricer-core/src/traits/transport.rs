// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Boundary between message delivery and message processing.

use async_trait::async_trait;

use crate::error::RepricerError;
use crate::types::{ProcessingResult, WebhookMessage};

/// Called by a transport for every delivery, at least once per message and
/// possibly out of order across message ids.
///
/// Business rejections come back as a failed [`ProcessingResult`]; `Err` is
/// reserved for faults that leave the message's processed status unknown.
#[async_trait]
pub trait WebhookHandler: Send + Sync + 'static {
    async fn process_webhook_message(
        &self,
        message: WebhookMessage,
    ) -> Result<ProcessingResult, RepricerError>;
}
