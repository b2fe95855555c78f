// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion pipeline behavior against real SQLite storage.

use std::sync::Arc;
use std::time::Duration;

use repricer_core::traits::{ProcessedMessageStore, WebhookHandler};
use repricer_core::types::CampaignStatus;
use repricer_test_utils::TestHarness;
use repricer_test_utils::fixtures::{
    SHOP, app_event, campaign, dec, inventory_level_update, low_stock_rule, product_update,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

async fn harness_with_active_campaign() -> TestHarness {
    let h = TestHarness::builder().build().await.unwrap();
    h.add_campaign(&campaign("c1", CampaignStatus::Active, vec![low_stock_rule("r1", 20)]))
        .await
        .unwrap();
    h
}

#[tokio::test]
async fn inventory_sequence_fires_on_each_crossing() {
    let h = harness_with_active_campaign().await;

    let first = h
        .deliver(&product_update("m1", "p1", "v1", 25, "50.00", None))
        .await
        .unwrap();
    assert!(first.success);
    assert_eq!(first.variants_updated, 1);
    assert_eq!(first.campaigns_triggered, 0);

    let mut triggered = Vec::new();
    for (i, level) in [15, 15, 26, 14].into_iter().enumerate() {
        let result = h
            .deliver(&inventory_level_update(&format!("m{}", i + 2), "v1", level))
            .await
            .unwrap();
        assert!(result.success, "{result:?}");
        assert!(result.marked_processed);
        triggered.push(result.campaigns_triggered);
    }
    assert_eq!(triggered, vec![1, 0, 0, 1]);
    assert_eq!(h.executor.applied_count().await, 2);

    let state = h.execution_state(SHOP, "v1", "r1").await.unwrap().unwrap();
    assert_eq!(state.trigger_count, 2);

    let campaign = h.storage.get_campaign("c1").await.unwrap().unwrap();
    assert_eq!(campaign.trigger_count, 2);
    assert!(campaign.last_triggered.is_some());

    assert_eq!(h.storage.audit_for_variant(SHOP, "v1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn duplicate_delivery_is_a_noop() {
    let h = harness_with_active_campaign().await;
    h.deliver(&product_update("m1", "p1", "v1", 25, "50.00", None))
        .await
        .unwrap();

    let message = inventory_level_update("m2", "v1", 15);
    let first = h.deliver(&message).await.unwrap();
    let second = h.deliver(&message).await.unwrap();

    assert!(!first.duplicate);
    assert_eq!(first.campaigns_triggered, 1);
    assert!(second.duplicate);
    assert!(second.success);
    assert_eq!(second.campaigns_triggered, 0);
    assert_eq!(h.executor.applied_count().await, 1);
    assert!(h.storage.is_processed("m2").await.unwrap());
}

#[tokio::test]
async fn concurrent_duplicates_fire_once() {
    let h = harness_with_active_campaign().await;
    h.deliver(&product_update("m1", "p1", "v1", 25, "50.00", None))
        .await
        .unwrap();

    let message = inventory_level_update("m2", "v1", 15);
    let mut handles = Vec::new();
    for _ in 0..4 {
        let pipeline = Arc::clone(&h.pipeline);
        let message = message.clone();
        handles.push(tokio::spawn(async move {
            pipeline.process_webhook_message(message).await.unwrap()
        }));
    }
    let mut fresh = 0;
    for handle in handles {
        if !handle.await.unwrap().duplicate {
            fresh += 1;
        }
    }
    assert_eq!(fresh, 1);
    assert_eq!(h.executor.applied_count().await, 1);
}

#[tokio::test]
async fn paused_campaign_never_fires() {
    let h = TestHarness::builder().build().await.unwrap();
    h.add_campaign(&campaign("c1", CampaignStatus::Paused, vec![low_stock_rule("r1", 20)]))
        .await
        .unwrap();

    h.deliver(&product_update("m1", "p1", "v1", 25, "50.00", None))
        .await
        .unwrap();
    let result = h.deliver(&inventory_level_update("m2", "v1", 15)).await.unwrap();

    assert!(result.success);
    assert_eq!(result.campaigns_triggered, 0);
    assert_eq!(h.executor.applied_count().await, 0);
    assert!(h.execution_state(SHOP, "v1", "r1").await.unwrap().is_none());
}

#[tokio::test]
async fn price_change_applies_to_compare_at() {
    let h = harness_with_active_campaign().await;
    h.deliver(&product_update("m1", "p1", "v1", 25, "50.00", Some("60.00")))
        .await
        .unwrap();
    h.deliver(&inventory_level_update("m2", "v1", 15)).await.unwrap();

    let applied = h.executor.applied().await;
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].change.new_price, dec("45.00"));
    assert_eq!(applied[0].change.new_compare_at, Some(dec("54.00")));

    let audit = h.storage.audit_for_variant(SHOP, "v1").await.unwrap();
    assert_eq!(audit[0].old_price, dec("50.00"));
    assert_eq!(audit[0].new_price, dec("45.00"));
    assert_eq!(audit[0].message_id.as_deref(), Some("m2"));
}

#[tokio::test]
async fn retryable_failure_is_not_marked_and_replay_fires_once() {
    let h = harness_with_active_campaign().await;
    h.deliver(&product_update("m1", "p1", "v1", 25, "50.00", None))
        .await
        .unwrap();

    let message = inventory_level_update("m2", "v1", 15);
    h.state_store.fail_next(1);
    let failed = h.deliver(&message).await.unwrap();
    assert!(!failed.success);
    assert!(!failed.marked_processed);
    assert_eq!(failed.tuple_errors.len(), 1);
    assert!(failed.tuple_errors[0].retryable);
    assert!(failed.error.is_some());
    assert!(!h.storage.is_processed("m2").await.unwrap());

    let replay = h.deliver(&message).await.unwrap();
    assert!(replay.success);
    assert!(replay.marked_processed);
    assert_eq!(replay.campaigns_triggered, 1);
    assert_eq!(h.executor.applied_count().await, 1);

    let (status, attempts, _) = h.storage.message_outcome("m2").await.unwrap().unwrap();
    assert_eq!(status, "processed");
    assert_eq!(attempts, 2);
}

#[tokio::test]
async fn lost_state_write_ack_is_redriven_on_replay() {
    let h = harness_with_active_campaign().await;
    h.deliver(&product_update("m1", "p1", "v1", 25, "50.00", None))
        .await
        .unwrap();

    // The TRIGGERED write commits, but the caller only sees a timeout.
    let message = inventory_level_update("m2", "v1", 15);
    h.state_store.time_out_after_commit(1);
    let failed = h.deliver(&message).await.unwrap();
    assert!(!failed.marked_processed);
    assert!(failed.tuple_errors[0].retryable);
    assert_eq!(h.executor.applied_count().await, 0);
    let state = h.execution_state(SHOP, "v1", "r1").await.unwrap().unwrap();
    assert!(state.triggered_by("m2"));

    let replay = h.deliver(&message).await.unwrap();
    assert!(replay.success, "{replay:?}");
    assert!(replay.marked_processed);
    assert_eq!(replay.rules_executed, 1);
    assert_eq!(h.executor.applied_count().await, 1);
    let state = h.execution_state(SHOP, "v1", "r1").await.unwrap().unwrap();
    assert_eq!(state.trigger_count, 1);

    // A later message does not re-drive the same trigger.
    let later = h.deliver(&inventory_level_update("m3", "v1", 14)).await.unwrap();
    assert_eq!(later.rules_executed, 0);
    assert_eq!(h.executor.applied_count().await, 1);
}

#[tokio::test]
async fn cancellation_lets_a_started_evaluation_finish() {
    let h = harness_with_active_campaign().await;
    h.deliver(&product_update("m1", "p1", "v1", 25, "50.00", None))
        .await
        .unwrap();

    h.executor.set_delay(Duration::from_millis(300));
    let cancel = CancellationToken::new();
    let pipeline = h.pipeline_with_cancellation(cancel.clone());
    let delivery = tokio::spawn({
        let pipeline = pipeline.clone();
        async move {
            pipeline
                .process_webhook_message(inventory_level_update("m2", "v1", 15))
                .await
        }
    });
    while h.executor.calls_started() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cancel.cancel();

    let result = delivery.await.unwrap().unwrap();
    assert!(result.success, "{result:?}");
    assert!(result.marked_processed);
    assert_eq!(h.executor.applied_count().await, 1);
    let state = h.execution_state(SHOP, "v1", "r1").await.unwrap().unwrap();
    assert_eq!(state.trigger_count, 1);
}

#[tokio::test]
async fn cancellation_mid_batch_keeps_finished_tuples_and_replays_the_rest() {
    let h = TestHarness::builder()
        .with_max_concurrent_evaluations(1)
        .build()
        .await
        .unwrap();
    for (campaign_id, rule_id) in [("c1", "r1"), ("c2", "r2")] {
        h.add_campaign(&campaign(
            campaign_id,
            CampaignStatus::Active,
            vec![low_stock_rule(rule_id, 20)],
        ))
        .await
        .unwrap();
    }
    h.deliver(&product_update("m1", "p1", "v1", 25, "50.00", None))
        .await
        .unwrap();

    h.executor.set_delay(Duration::from_millis(200));
    let cancel = CancellationToken::new();
    let pipeline = h.pipeline_with_cancellation(cancel.clone());
    let message = inventory_level_update("m2", "v1", 15);
    let delivery = tokio::spawn({
        let pipeline = pipeline.clone();
        let message = message.clone();
        async move { pipeline.process_webhook_message(message).await }
    });
    while h.executor.calls_started() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cancel.cancel();

    let interrupted = delivery.await.unwrap().unwrap();
    assert!(!interrupted.success);
    assert!(!interrupted.marked_processed);
    assert_eq!(interrupted.rules_executed, 1);
    assert!(!h.storage.is_processed("m2").await.unwrap());

    let applied = h.executor.applied().await;
    assert_eq!(applied.len(), 1);
    let finished_rule = applied[0].request.rule.id.clone();
    let other_rule = if finished_rule == "r1" { "r2" } else { "r1" };
    let finished = h.execution_state(SHOP, "v1", &finished_rule).await.unwrap().unwrap();
    assert_eq!(finished.trigger_count, 1);
    assert!(h.execution_state(SHOP, "v1", other_rule).await.unwrap().is_none());

    h.executor.set_delay(Duration::ZERO);
    let replay = h.deliver(&message).await.unwrap();
    assert!(replay.success, "{replay:?}");
    assert!(replay.marked_processed);
    assert_eq!(replay.rules_executed, 1);

    let applied = h.executor.applied().await;
    assert_eq!(applied.len(), 2);
    assert_eq!(applied[1].request.rule.id, other_rule);
    for rule_id in ["r1", "r2"] {
        let state = h.execution_state(SHOP, "v1", rule_id).await.unwrap().unwrap();
        assert_eq!(state.trigger_count, 1, "{rule_id}");
    }
    assert_eq!(h.storage.audit_for_variant(SHOP, "v1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn executor_rejection_is_permanent() {
    let h = harness_with_active_campaign().await;
    h.deliver(&product_update("m1", "p1", "v1", 25, "50.00", None))
        .await
        .unwrap();

    h.executor.reject_changes(true);
    let result = h.deliver(&inventory_level_update("m2", "v1", 15)).await.unwrap();
    assert!(!result.success);
    assert!(result.marked_processed);
    assert!(!result.tuple_errors[0].retryable);

    // The crossing was consumed; the replay is a duplicate.
    h.executor.reject_changes(false);
    let replay = h.deliver(&inventory_level_update("m2", "v1", 15)).await.unwrap();
    assert!(replay.duplicate);
    assert_eq!(h.executor.applied_count().await, 0);
}

#[tokio::test]
async fn malformed_payload_is_marked_failed() {
    let h = harness_with_active_campaign().await;
    let mut message = product_update("m1", "p1", "v1", 25, "50.00", None);
    message.payload = json!({"variants": "nope"});

    let result = h.deliver(&message).await.unwrap();
    assert!(!result.success);
    assert!(result.marked_processed);
    assert!(result.error.unwrap().contains("malformed products/update payload"));
}

#[tokio::test]
async fn app_topics_raise_shop_signals() {
    let h = TestHarness::builder().build().await.unwrap();
    let uninstalled = h.deliver(&app_event("m1", "app/uninstalled")).await.unwrap();
    let scopes = h.deliver(&app_event("m2", "app/scopes_update")).await.unwrap();
    assert!(uninstalled.success && scopes.success);

    let signals = h.storage.pending_signals().await.unwrap();
    let names: Vec<&str> = signals.iter().map(|s| s.signal.as_str()).collect();
    assert_eq!(names, vec!["cleanup_requested", "scopes_revalidation"]);
}

#[tokio::test]
async fn unknown_topic_succeeds_without_work() {
    let h = harness_with_active_campaign().await;
    let result = h.deliver(&app_event("m1", "orders/create")).await.unwrap();
    assert!(result.success);
    assert!(result.marked_processed);
    assert_eq!(result.variants_updated, 0);
}

#[tokio::test]
async fn unmapped_inventory_item_is_skipped() {
    let h = harness_with_active_campaign().await;
    let result = h.deliver(&inventory_level_update("m1", "ghost", 3)).await.unwrap();
    assert!(result.success);
    assert_eq!(result.variants_updated, 0);
}
