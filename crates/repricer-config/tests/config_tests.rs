// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the repricer configuration system.

use repricer_config::diagnostic::ConfigError;
use repricer_config::{load_and_validate_str, load_config_from_str};
use rust_decimal::Decimal;

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[service]
name = "repricer-eu"
log_level = "debug"

[storage]
database_path = "/tmp/repricer-test.db"
wal_mode = false
operation_timeout_ms = 2500

[engine]
default_reset_margin = "7.5"
cooldown_secs = 3600
max_concurrent_evaluations = 2

[webhook]
host = "0.0.0.0"
port = 8443
shared_secret = "hush"
workers = 3
dedup_horizon_hours = 24

[prometheus]
enabled = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.service.name, "repricer-eu");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.storage.operation_timeout_ms, 2500);
    assert_eq!(config.engine.default_reset_margin, Decimal::new(75, 1));
    assert_eq!(config.engine.cooldown_secs, Some(3600));
    assert_eq!(config.webhook.port, 8443);
    assert_eq!(config.webhook.shared_secret.as_deref(), Some("hush"));
    assert_eq!(config.webhook.dedup_horizon_hours, 24);
    assert!(!config.prometheus.enabled);
}

#[test]
fn unknown_key_gets_suggestion() {
    let toml = r#"
[webhook]
wokers = 2
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    let unknown = errors
        .iter()
        .find_map(|e| match e {
            ConfigError::UnknownKey {
                key, suggestion, ..
            } => Some((key.clone(), suggestion.clone())),
            _ => None,
        })
        .expect("an UnknownKey diagnostic");
    assert_eq!(unknown.0, "wokers");
    assert_eq!(unknown.1.as_deref(), Some("workers"));
}

#[test]
fn key_under_the_wrong_section_names_its_home() {
    let errors = load_and_validate_str("[webhook]\ncooldown_secs = 60\n").unwrap_err();
    let (section, hint) = errors
        .iter()
        .find_map(|e| match e {
            ConfigError::UnknownKey { section, hint, .. } => Some((section.clone(), hint.clone())),
            _ => None,
        })
        .expect("an UnknownKey diagnostic");
    assert_eq!(section.as_deref(), Some("webhook"));
    assert_eq!(hint, "`cooldown_secs` belongs in [engine]");
}

#[test]
fn retry_backoff_is_configurable() {
    let config = load_and_validate_str("[webhook]\nretry_backoff_ms = 500\nmax_retry_backoff_ms = 4000\n")
        .unwrap();
    assert_eq!(config.webhook.retry_backoff_ms, 500);
    assert_eq!(config.webhook.max_retry_backoff_ms, 4000);
}

#[test]
fn unknown_section_is_rejected() {
    let errors = load_and_validate_str("[telegram]\nbot_token = \"x\"\n").unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::UnknownKey { key, .. } if key == "telegram"))
    );
}

#[test]
fn wrong_type_is_reported() {
    let errors = load_and_validate_str("[webhook]\nport = \"eighty\"\n").unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. }))
    );
}

#[test]
fn validation_runs_after_parse() {
    let errors = load_and_validate_str("[engine]\nmax_concurrent_evaluations = 0\n").unwrap_err();
    assert!(errors.iter().any(
        |e| matches!(e, ConfigError::Validation { message } if message.contains("max_concurrent_evaluations"))
    ));
}

#[test]
fn empty_input_yields_defaults() {
    let config = load_and_validate_str("").expect("defaults validate");
    assert_eq!(config.service.name, "repricer");
    assert_eq!(config.webhook.max_attempts, 5);
}
