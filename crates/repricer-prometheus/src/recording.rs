// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric descriptions.
//!
//! The engine, pipeline, and queue emit through the metrics-rs facade; this
//! module only attaches help text and units once a recorder is installed.

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};

/// Register every repricer metric description.
pub fn register_metrics() {
    describe_counter!(
        "repricer_rule_evaluations_total",
        "Rule evaluations by outcome reason"
    );
    describe_counter!(
        "repricer_rule_triggers_total",
        "Rule evaluations that transitioned to triggered"
    );
    describe_counter!(
        "repricer_webhooks_total",
        "Webhook deliveries processed, by topic and outcome"
    );
    describe_counter!(
        "repricer_webhooks_enqueued_total",
        "Webhook deliveries persisted to the queue"
    );
    describe_counter!(
        "repricer_webhooks_rejected_total",
        "Webhook deliveries rejected at the receiver, by reason"
    );
    describe_counter!(
        "repricer_price_changes_total",
        "Price changes handed to the executor"
    );
    describe_histogram!(
        "repricer_webhook_processing_seconds",
        Unit::Seconds,
        "Time spent processing one webhook delivery"
    );
    describe_gauge!(
        "repricer_queue_depth",
        "Queued webhook rows by status"
    );
    describe_gauge!("repricer_build_info", "Build information");
}

/// Publish the running version as a constant gauge.
pub fn record_build_info(version: &str) {
    metrics::gauge!("repricer_build_info", "version" => version.to_string()).set(1.0);
}
