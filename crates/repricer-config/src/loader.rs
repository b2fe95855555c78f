// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Lookup order: `./repricer.toml` > `~/.config/repricer/repricer.toml` >
//! `/etc/repricer/repricer.toml`, with `REPRICER_` environment overrides.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::RepricerConfig;

pub(crate) const SYSTEM_CONFIG_PATH: &str = "/etc/repricer/repricer.toml";
pub(crate) const LOCAL_CONFIG_FILE: &str = "repricer.toml";

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/repricer/repricer.toml`
/// 3. `~/.config/repricer/repricer.toml`
/// 4. `./repricer.toml`
/// 5. `REPRICER_*` environment variables
pub fn load_config() -> Result<RepricerConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<RepricerConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RepricerConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RepricerConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RepricerConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full layered Figment, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(RepricerConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

pub(crate) fn user_config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|d| d.join("repricer").join(LOCAL_CONFIG_FILE))
}

/// Environment provider mapping `REPRICER_<SECTION>_<KEY>` to `section.key`.
///
/// Uses `Env::map()` rather than `Env::split("_")` because keys themselves
/// contain underscores: `REPRICER_ENGINE_DEFAULT_RESET_MARGIN` must become
/// `engine.default_reset_margin`.
fn env_provider() -> Env {
    Env::prefixed("REPRICER_").map(|key| {
        let key_str = key.as_str().to_ascii_lowercase();
        let mapped = ["service_", "storage_", "engine_", "webhook_", "prometheus_"]
            .iter()
            .find(|section| key_str.starts_with(*section))
            .map(|section| key_str.replacen(section, &section.replace('_', "."), 1))
            .unwrap_or(key_str);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
[webhook]
port = 8080
workers = 2
"#,
            )?;
            jail.set_env("REPRICER_WEBHOOK_WORKERS", "6");
            jail.set_env("REPRICER_ENGINE_COOLDOWN_SECS", "90");

            let config = load_config_from_path(Path::new("custom.toml"))?;
            assert_eq!(config.webhook.port, 8080);
            assert_eq!(config.webhook.workers, 6);
            assert_eq!(config.engine.cooldown_secs, Some(90));
            Ok(())
        });
    }

    #[test]
    fn env_keys_with_underscores_map_to_one_field() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("empty.toml", "")?;
            jail.set_env("REPRICER_WEBHOOK_SHARED_SECRET", "s3cret");
            jail.set_env("REPRICER_STORAGE_OPERATION_TIMEOUT_MS", "1500");

            let config = load_config_from_path(Path::new("empty.toml"))?;
            assert_eq!(config.webhook.shared_secret.as_deref(), Some("s3cret"));
            assert_eq!(config.storage.operation_timeout_ms, 1500);
            Ok(())
        });
    }
}
