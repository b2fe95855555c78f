// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus recorder for the repricer.
//!
//! Installs the metrics-rs Prometheus exporter as the global recorder.
//! Rendering is exposed through the receiver's /metrics endpoint.

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use repricer_core::RepricerError;
use repricer_core::traits::PluginAdapter;
use repricer_core::types::{AdapterType, HealthStatus};

pub use recording::{record_build_info, register_metrics};

/// Prometheus metrics adapter.
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Install the recorder globally. Only one recorder can be installed per
    /// process; a second call returns an error.
    pub fn new() -> Result<Self, RepricerError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            RepricerError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        register_metrics();
        record_build_info(env!("CARGO_PKG_VERSION"));
        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, RepricerError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RepricerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The global recorder can only be installed once per process, so these
    // tests use a local recorder.
    #[test]
    fn descriptions_appear_in_render() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            register_metrics();
            metrics::counter!("repricer_rule_triggers_total").increment(2);
            record_build_info("9.9.9");
        });

        let text = handle.render();
        assert!(text.contains("# HELP repricer_rule_triggers_total"));
        assert!(text.contains("repricer_rule_triggers_total 2"));
        assert!(text.contains("repricer_build_info{version=\"9.9.9\"} 1"));
    }

    #[test]
    fn labelled_counters_render_per_label() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("repricer_webhooks_total", "topic" => "products/update", "outcome" => "success")
                .increment(1);
            metrics::counter!("repricer_webhooks_total", "topic" => "products/update", "outcome" => "duplicate")
                .increment(3);
        });

        let text = handle.render();
        assert!(text.contains("outcome=\"duplicate\""));
        assert!(text.contains("outcome=\"success\""));
    }
}
