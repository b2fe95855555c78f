// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the repricer service.
//!
//! Provides the domain types, the error type, the campaign lifecycle guard,
//! and the collaborator traits that storage, pricing, and transport
//! implementations plug into.

pub mod error;
pub mod status;
pub mod traits;
pub mod types;

pub use error::RepricerError;
pub use status::CampaignStatusGuard;
pub use types::{
    AdapterType, AuditRecord, Campaign, CampaignMatch, CampaignStatus, ExecutionKey,
    ExecutionState, ExecutionStatePatch, ExecutionStatus, HealthStatus, PriceChange,
    PriceChangeRequest, ProcessingResult, Rule, ShopSignal, SnapshotRecord, Targeting,
    ThenAction, ThenMode, ThresholdDirection, TupleError, VariantObservation, VariantRef,
    VariantStateSnapshot, WebhookMessage, WebhookTopic, WhenCondition,
};

pub use traits::{
    AuditSink, CampaignReadModel, ExecutionStateStore, PluginAdapter, PriceExecutor,
    ProcessedMessageStore, ShopSignalSink, StorageAdapter, VariantCatalog, VariantStateStore,
    WebhookHandler,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_display_round_trip() {
        use std::str::FromStr;

        for variant in [
            AdapterType::Storage,
            AdapterType::Catalog,
            AdapterType::Executor,
            AdapterType::Observability,
            AdapterType::Transport,
        ] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn execution_status_serializes_screaming() {
        let json = serde_json::to_string(&ExecutionStatus::ResetPending).unwrap();
        assert_eq!(json, "\"RESET_PENDING\"");
        assert_eq!(ExecutionStatus::ResetPending.to_string(), "RESET_PENDING");
    }

    #[test]
    fn all_traits_are_object_safe() {
        fn _storage(_: &dyn StorageAdapter) {}
        fn _variants(_: &dyn VariantStateStore) {}
        fn _executions(_: &dyn ExecutionStateStore) {}
        fn _messages(_: &dyn ProcessedMessageStore) {}
        fn _campaigns(_: &dyn CampaignReadModel) {}
        fn _catalog(_: &dyn VariantCatalog) {}
        fn _executor(_: &dyn PriceExecutor) {}
        fn _audit(_: &dyn AuditSink) {}
        fn _signals(_: &dyn ShopSignalSink) {}
        fn _handler(_: &dyn WebhookHandler) {}
    }
}
