// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the repricer service.
//!
//! TOML files merged over compiled defaults, strict key checking
//! (`deny_unknown_fields`), `REPRICER_*` environment overrides, and miette
//! diagnostics with typo suggestions.
//!
//! ```no_run
//! use repricer_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("listening on {}:{}", config.webhook.host, config.webhook.port);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::RepricerConfig;

/// Load from the standard hierarchy and validate.
pub fn load_and_validate() -> Result<RepricerConfig, Vec<ConfigError>> {
    finish(loader::load_config(), collect_toml_sources)
}

/// Load from an explicit file (plus env overrides) and validate.
pub fn load_and_validate_path(path: &Path) -> Result<RepricerConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        read_source(path).into_iter().collect()
    })
}

/// Load from a TOML string and validate. Used by tests and `check-config`.
pub fn load_and_validate_str(toml_content: &str) -> Result<RepricerConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

fn finish(
    loaded: Result<RepricerConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<RepricerConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::from_figment(err, &sources())),
    }
}

fn read_source(path: &Path) -> Option<(String, String)> {
    let content = std::fs::read_to_string(path).ok()?;
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    Some((absolute.display().to_string(), content))
}

/// TOML contents of every config file in the hierarchy, for error spans.
fn collect_toml_sources() -> Vec<(String, String)> {
    let mut candidates = vec![Path::new(loader::LOCAL_CONFIG_FILE).to_path_buf()];
    candidates.extend(loader::user_config_path());
    candidates.push(Path::new(loader::SYSTEM_CONFIG_PATH).to_path_buf());
    candidates.iter().filter_map(|p| read_source(p)).collect()
}
