// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level repricer configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RepricerConfig {
    /// `[service]`: instance name and log level.
    #[serde(default)]
    pub service: ServiceConfig,

    /// `[storage]`: the SQLite database holding snapshots, execution
    /// states, the webhook ledger and the queue.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Rule engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Webhook receiver and queue workers.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// `[prometheus]`: the `/metrics` exporter.
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// Process-level settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Instance name used in logs and health output.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "repricer".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// How long SQLite waits on a locked database before failing a statement.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Upper bound on any single store call. Exceeding it is a retryable failure.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("repricer").join("repricer.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("repricer.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_operation_timeout_ms() -> u64 {
    10_000
}

/// Rule engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Hysteresis margin used when a rule does not set its own `reset_margin`.
    #[serde(default = "default_reset_margin")]
    pub default_reset_margin: Decimal,

    /// Minimum seconds between two executions of the same rule on the same
    /// variant. Unset disables the cooldown gate.
    #[serde(default)]
    pub cooldown_secs: Option<u64>,

    /// Maximum (campaign, rule, variant) evaluations run in parallel per message.
    #[serde(default = "default_max_concurrent_evaluations")]
    pub max_concurrent_evaluations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_reset_margin: default_reset_margin(),
            cooldown_secs: None,
            max_concurrent_evaluations: default_max_concurrent_evaluations(),
        }
    }
}

fn default_reset_margin() -> Decimal {
    Decimal::from(5)
}

fn default_max_concurrent_evaluations() -> usize {
    8
}

/// Webhook receiver and queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Address the receiver binds to.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// App secret used to verify `X-Shopify-Hmac-Sha256`.
    #[serde(default)]
    pub shared_secret: Option<String>,

    /// Reject unsigned or badly signed deliveries.
    #[serde(default = "default_require_signature")]
    pub require_signature: bool,

    /// Number of queue workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How long processed message ids are remembered for deduplication.
    #[serde(default = "default_dedup_horizon_hours")]
    pub dedup_horizon_hours: u64,

    /// Idle poll interval of queue workers.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// A claimed queue row becomes reclaimable after this long.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// Attempts before a queue row is parked as failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry of a failed delivery; doubles per attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound on the retry delay.
    #[serde(default = "default_max_retry_backoff_ms")]
    pub max_retry_backoff_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shared_secret: None,
            require_signature: default_require_signature(),
            workers: default_workers(),
            dedup_horizon_hours: default_dedup_horizon_hours(),
            poll_interval_ms: default_poll_interval_ms(),
            lock_timeout_secs: default_lock_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_retry_backoff_ms: default_max_retry_backoff_ms(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_require_signature() -> bool {
    true
}

fn default_workers() -> usize {
    4
}

fn default_dedup_horizon_hours() -> u64 {
    72
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_lock_timeout_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    2_000
}

fn default_max_retry_backoff_ms() -> u64 {
    300_000
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Install the recorder and serve `/metrics` on the webhook listener.
    #[serde(default = "default_prometheus_enabled")]
    pub enabled: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: default_prometheus_enabled(),
        }
    }
}

fn default_prometheus_enabled() -> bool {
    true
}
