// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook ingestion for the repricer service.
//!
//! Deliveries enter through the axum receiver ([`server`]), are verified
//! ([`auth`]) and persisted to the durable queue ([`transport`]). Queue
//! workers hand each message to the [`pipeline`], which deduplicates,
//! parses the typed [`payload`], and drives the rule engine.

pub mod auth;
pub mod handlers;
pub mod payload;
pub mod pipeline;
pub mod server;
pub mod transport;

pub use auth::AuthConfig;
pub use payload::WebhookPayload;
pub use pipeline::{PipelineDeps, WebhookPipeline};
pub use server::{HealthState, ServerConfig, WebhookState, start_server};
pub use transport::{QueueTransport, TransportSettings, WEBHOOK_QUEUE};
