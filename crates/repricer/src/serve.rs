// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `repricer serve` command implementation.
//!
//! Opens storage, builds the rule engine and ingestion pipeline, starts the
//! queue workers and the HTTP receiver, and runs until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use repricer_config::RepricerConfig;
use repricer_core::RepricerError;
use repricer_core::traits::{StorageAdapter, WebhookHandler};
use repricer_engine::{DryRunPriceExecutor, EngineSettings, RuleExecutionEngine};
use repricer_storage::SqliteStorage;
use repricer_webhook::{
    AuthConfig, HealthState, PipelineDeps, QueueTransport, ServerConfig, TransportSettings,
    WebhookPipeline, WebhookState, start_server,
};

use crate::shutdown;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything `serve` runs, assembled but not started.
pub struct Service {
    pub storage: Arc<SqliteStorage>,
    pub transport: Arc<QueueTransport>,
    pub state: WebhookState,
    pub server: ServerConfig,
}

/// Build the service graph on top of initialized storage.
pub fn assemble(
    config: &RepricerConfig,
    storage: Arc<SqliteStorage>,
    prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
    cancel: CancellationToken,
) -> Service {
    let engine = Arc::new(RuleExecutionEngine::new(
        storage.clone(),
        EngineSettings::from(&config.engine),
    ));
    // Price writes are simulated until a platform executor is configured.
    let executor = Arc::new(DryRunPriceExecutor::new());

    let deps = PipelineDeps {
        messages: storage.clone(),
        variants: storage.clone(),
        campaigns: storage.clone(),
        catalog: storage.clone(),
        executor,
        audit: storage.clone(),
        signals: storage.clone(),
    };
    let pipeline: Arc<dyn WebhookHandler> = Arc::new(
        WebhookPipeline::new(deps, engine, config.engine.max_concurrent_evaluations)
            .with_cancellation(cancel.clone()),
    );

    let transport = Arc::new(QueueTransport::new(
        storage.clone(),
        pipeline,
        TransportSettings::from(&config.webhook),
        cancel,
    ));

    let state = WebhookState {
        transport: transport.clone(),
        auth: AuthConfig {
            shared_secret: config.webhook.shared_secret.clone(),
            require_signature: config.webhook.require_signature,
        },
        health: HealthState {
            start_time: Instant::now(),
            storage: storage.clone(),
            prometheus_render,
        },
    };

    Service {
        storage,
        transport,
        state,
        server: ServerConfig {
            host: config.webhook.host.clone(),
            port: config.webhook.port,
        },
    }
}

/// Runs the `repricer serve` command.
pub async fn run_serve(config: RepricerConfig) -> Result<(), RepricerError> {
    info!(name = config.service.name.as_str(), "starting repricer serve");

    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;

    let prometheus = if config.prometheus.enabled {
        match repricer_prometheus::PrometheusAdapter::new() {
            Ok(adapter) => {
                info!("prometheus metrics enabled");
                Some(adapter)
            }
            Err(e) => {
                warn!(error = %e, "prometheus initialization failed, continuing without metrics");
                None
            }
        }
    } else {
        debug!("prometheus metrics disabled by configuration");
        None
    };
    let prometheus_render = prometheus.as_ref().map(|adapter| {
        let handle = adapter.handle().clone();
        Arc::new(move || handle.render()) as Arc<dyn Fn() -> String + Send + Sync>
    });

    if config.webhook.shared_secret.is_none() && config.webhook.require_signature {
        warn!("no webhook shared secret configured; every delivery will be rejected");
    }

    let cancel = shutdown::install_signal_handler();
    let service = assemble(&config, storage, prometheus_render, cancel.clone());

    service.transport.start().await;
    // Report queue depth at startup; the purge task refreshes it afterwards.
    if let Err(e) = service.transport.purge().await {
        warn!(error = %e, "initial dedup purge failed");
    }

    let served = start_server(&service.server, service.state, cancel.clone()).await;
    if let Err(e) = &served {
        error!(error = %e, "webhook receiver stopped with an error");
        cancel.cancel();
    }

    service.transport.shutdown(DRAIN_TIMEOUT).await;
    if let Err(e) = service.storage.close().await {
        warn!(error = %e, "storage did not close cleanly");
    }

    info!("repricer serve shutdown complete");
    served
}
