// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the webhook receiver.
//!
//! Handles POST /webhooks, GET /health, GET /metrics.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use repricer_core::types::{HealthStatus, WebhookMessage};

use crate::auth::verify_request;
use crate::server::WebhookState;

pub const TOPIC_HEADER: &str = "x-shopify-topic";
pub const SHOP_HEADER: &str = "x-shopify-shop-domain";
pub const WEBHOOK_ID_HEADER: &str = "x-shopify-webhook-id";
pub const EVENT_ID_HEADER: &str = "x-shopify-event-id";

/// Response body for POST /webhooks.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub message_id: String,
    pub queued: bool,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub storage: String,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// POST /webhooks
///
/// Verifies the signature, persists the delivery to the queue, and answers
/// 200 once it is durable. Processing happens on the queue workers.
pub async fn post_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(status) = verify_request(&state.auth, &headers, &body) {
        metrics::counter!("repricer_webhooks_rejected_total", "reason" => "signature").increment(1);
        return error(status, "invalid webhook signature");
    }

    let (Some(topic), Some(shop), Some(message_id)) = (
        header(&headers, TOPIC_HEADER),
        header(&headers, SHOP_HEADER),
        header(&headers, WEBHOOK_ID_HEADER).or_else(|| header(&headers, EVENT_ID_HEADER)),
    ) else {
        metrics::counter!("repricer_webhooks_rejected_total", "reason" => "headers").increment(1);
        return error(
            StatusCode::BAD_REQUEST,
            "missing topic, shop domain, or webhook id header",
        );
    };

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            metrics::counter!("repricer_webhooks_rejected_total", "reason" => "body").increment(1);
            return error(StatusCode::BAD_REQUEST, format!("body is not JSON: {e}"));
        }
    };

    let message = WebhookMessage {
        message_id: message_id.to_string(),
        topic: topic.to_string(),
        shop_domain: shop.to_string(),
        payload,
        received_at: chrono::Utc::now(),
    };

    match state.transport.enqueue(&message).await {
        Ok(_) => (
            StatusCode::OK,
            Json(AcceptedResponse {
                message_id: message.message_id,
                queued: true,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(message_id = message.message_id.as_str(), error = %e, "failed to enqueue webhook");
            // Non-2xx makes the sender redeliver.
            error(StatusCode::SERVICE_UNAVAILABLE, "webhook could not be persisted")
        }
    }
}

/// GET /health
pub async fn get_health(State(state): State<WebhookState>) -> Response {
    let storage = match state.health.storage.health_check().await {
        Ok(status) => status,
        Err(e) => HealthStatus::Unhealthy(e.to_string()),
    };
    let (code, status, detail) = match &storage {
        HealthStatus::Healthy => (StatusCode::OK, "ok", "healthy".to_string()),
        HealthStatus::Degraded(reason) => (StatusCode::OK, "degraded", reason.clone()),
        HealthStatus::Unhealthy(reason) => {
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", reason.clone())
        }
    };
    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: state.health.start_time.elapsed().as_secs(),
            storage: detail,
        }),
    )
        .into_response()
}

/// GET /metrics
pub async fn get_metrics(State(state): State<WebhookState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => error(StatusCode::NOT_FOUND, "metrics disabled"),
    }
}
