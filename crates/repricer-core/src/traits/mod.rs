// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits.
//!
//! Backends are injected as trait objects and use `#[async_trait]` for
//! dynamic dispatch compatibility.

pub mod adapter;
pub mod catalog;
pub mod executor;
pub mod observability;
pub mod storage;
pub mod transport;

pub use adapter::PluginAdapter;
pub use catalog::{CampaignReadModel, VariantCatalog};
pub use executor::PriceExecutor;
pub use observability::{AuditSink, ShopSignalSink};
pub use storage::{ExecutionStateStore, ProcessedMessageStore, StorageAdapter, VariantStateStore};
pub use transport::WebhookHandler;
