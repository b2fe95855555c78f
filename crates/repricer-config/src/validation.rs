// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Collects every problem instead of failing on the first.

use rust_decimal::Decimal;

use crate::diagnostic::ConfigError;
use crate::model::RepricerConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &RepricerConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        invalid(format!(
            "service.log_level `{}` must be one of {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        invalid("storage.database_path must not be empty".to_string());
    }
    if config.storage.operation_timeout_ms == 0 {
        invalid("storage.operation_timeout_ms must be greater than 0".to_string());
    }

    if config.engine.default_reset_margin < Decimal::ZERO {
        invalid(format!(
            "engine.default_reset_margin must be non-negative, got {}",
            config.engine.default_reset_margin
        ));
    }
    if config.engine.cooldown_secs == Some(0) {
        invalid("engine.cooldown_secs must be greater than 0 when set; omit it to disable".to_string());
    }
    if config.engine.max_concurrent_evaluations == 0 {
        invalid("engine.max_concurrent_evaluations must be at least 1".to_string());
    }

    let host = config.webhook.host.trim();
    if host.is_empty() {
        invalid("webhook.host must not be empty".to_string());
    } else if host.parse::<std::net::IpAddr>().is_err()
        && !host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        invalid(format!(
            "webhook.host `{host}` is not a valid IP address or hostname"
        ));
    }
    if config.webhook.workers == 0 {
        invalid("webhook.workers must be at least 1".to_string());
    }
    if config.webhook.dedup_horizon_hours == 0 {
        invalid("webhook.dedup_horizon_hours must be at least 1".to_string());
    }
    if config.webhook.max_attempts == 0 {
        invalid("webhook.max_attempts must be at least 1".to_string());
    }
    if config.webhook.retry_backoff_ms > config.webhook.max_retry_backoff_ms {
        invalid(format!(
            "webhook.retry_backoff_ms ({}) must not exceed webhook.max_retry_backoff_ms ({})",
            config.webhook.retry_backoff_ms, config.webhook.max_retry_backoff_ms
        ));
    }
    if config.webhook.require_signature
        && config
            .webhook
            .shared_secret
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
    {
        invalid("webhook.shared_secret must not be blank".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &RepricerConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&RepricerConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = RepricerConfig::default();
        config.storage.database_path = " ".to_string();
        config.webhook.workers = 0;
        config.engine.default_reset_margin = Decimal::from(-1);
        let messages = messages(&config);
        assert_eq!(messages.len(), 3, "{messages:?}");
        assert!(messages.iter().any(|m| m.contains("database_path")));
        assert!(messages.iter().any(|m| m.contains("webhook.workers")));
        assert!(messages.iter().any(|m| m.contains("default_reset_margin")));
    }

    #[test]
    fn zero_cooldown_is_rejected() {
        let mut config = RepricerConfig::default();
        config.engine.cooldown_secs = Some(0);
        assert!(messages(&config)[0].contains("cooldown_secs"));
    }

    #[test]
    fn bad_log_level_is_rejected() {
        let mut config = RepricerConfig::default();
        config.service.log_level = "verbose".to_string();
        assert!(messages(&config)[0].contains("service.log_level"));
    }

    #[test]
    fn retry_backoff_above_its_cap_is_rejected() {
        let mut config = RepricerConfig::default();
        config.webhook.retry_backoff_ms = 10_000;
        config.webhook.max_retry_backoff_ms = 1_000;
        assert!(messages(&config)[0].contains("webhook.retry_backoff_ms"));

        config.webhook.retry_backoff_ms = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn hostname_and_ipv6_hosts_pass() {
        let mut config = RepricerConfig::default();
        config.webhook.host = "repricer.internal".to_string();
        assert!(validate_config(&config).is_ok());
        config.webhook.host = "::1".to_string();
        assert!(validate_config(&config).is_ok());
        config.webhook.host = "bad host!".to_string();
        assert!(validate_config(&config).is_err());
    }
}
