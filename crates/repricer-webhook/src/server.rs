// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the receiver.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use repricer_core::error::RepricerError;
use repricer_core::traits::PluginAdapter;

use crate::auth::AuthConfig;
use crate::handlers;
use crate::transport::QueueTransport;

/// State for the unauthenticated health and metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    pub storage: Arc<dyn PluginAdapter>,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct WebhookState {
    pub transport: Arc<QueueTransport>,
    pub auth: AuthConfig,
    pub health: HealthState,
}

/// Bind address of the receiver.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Routes:
/// - POST /webhooks (signature checked in the handler against the raw body)
/// - GET /health
/// - GET /metrics
pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhooks", post(handlers::post_webhook))
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: WebhookState,
    cancel: CancellationToken,
) -> Result<(), RepricerError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RepricerError::Transport {
            message: format!("failed to bind webhook receiver to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!(addr = addr.as_str(), "webhook receiver listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| RepricerError::Transport {
            message: format!("webhook receiver error: {e}"),
            source: Some(Box::new(e)),
        })?;

    Ok(())
}
