// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics.
//!
//! Figment reports what went wrong while extracting a [`RepricerConfig`];
//! [`from_figment`] maps each report onto a [`ConfigError`] that miette can
//! render, pointing at the offending line of `repricer.toml` when the file
//! is known. A key written under the wrong section is named as such rather
//! than reported as a typo.
//!
//! [`RepricerConfig`]: crate::model::RepricerConfig

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Keys accepted by each section of `repricer.toml`.
pub const SECTIONS: &[(&str, &[&str])] = &[
    ("service", &["name", "log_level"]),
    (
        "storage",
        &["database_path", "wal_mode", "busy_timeout_ms", "operation_timeout_ms"],
    ),
    (
        "engine",
        &["default_reset_margin", "cooldown_secs", "max_concurrent_evaluations"],
    ),
    (
        "webhook",
        &[
            "host",
            "port",
            "shared_secret",
            "require_signature",
            "workers",
            "dedup_horizon_hours",
            "poll_interval_ms",
            "lock_timeout_secs",
            "max_attempts",
            "retry_backoff_ms",
            "max_retry_backoff_ms",
        ],
    ),
    ("prometheus", &["enabled"]),
];

/// Jaro-Winkler score a candidate must exceed to be offered as a correction.
const MIN_SIMILARITY: f64 = 0.8;

/// One problem found while loading or validating the configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A key (or section header) the configuration does not accept.
    #[error("unknown key `{key}` in {}", section_label(section.as_deref()))]
    #[diagnostic(code(repricer::config::unknown_key), help("{hint}"))]
    UnknownKey {
        /// The key as written.
        key: String,
        /// Section the key appeared in; `None` for the top level.
        section: Option<String>,
        /// Closest key accepted by that section, if any is close enough.
        suggestion: Option<String>,
        /// Correction shown under the report.
        hint: String,
        #[label("not accepted here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value of the wrong TOML type, such as a quoted port number.
    #[error("`{key}` has the wrong type: found {found}")]
    #[diagnostic(code(repricer::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        /// Dotted path of the value, e.g. `webhook.port`.
        key: String,
        found: String,
        expected: String,
        #[label("expected {expected}")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A key without a default was left out.
    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(repricer::config::missing_key),
        help("add `{key} = <value>` to repricer.toml")
    )]
    MissingKey { key: String },

    /// A value that parsed but cannot run the service (zero workers, a
    /// blank database path, a retry delay above its cap).
    #[error("validation error: {message}")]
    #[diagnostic(code(repricer::config::validation))]
    Validation { message: String },

    /// Anything figment reports that has no dedicated variant.
    #[error("configuration error: {0}")]
    #[diagnostic(code(repricer::config::other))]
    Other(String),
}

fn section_label(section: Option<&str>) -> String {
    match section {
        Some(name) => format!("[{name}]"),
        None => "the top level".to_string(),
    }
}

/// The section that accepts `key`, other than `except`.
fn home_section(key: &str, except: Option<&str>) -> Option<&'static str> {
    SECTIONS
        .iter()
        .find(|(name, keys)| Some(*name) != except && keys.contains(&key))
        .map(|(name, _)| *name)
}

fn unknown_key_hint(
    key: &str,
    section: Option<&str>,
    suggestion: Option<&str>,
    accepted: &[&str],
) -> String {
    if section.is_some()
        && let Some(home) = home_section(key, section)
    {
        return format!("`{key}` belongs in [{home}]");
    }
    match suggestion {
        Some(close) => format!("did you mean `{close}`?"),
        None if section.is_none() => format!("sections are: {}", accepted.join(", ")),
        None => format!("{} accepts: {}", section_label(section), accepted.join(", ")),
    }
}

/// Convert every error carried by a `figment::Error` into a [`ConfigError`].
///
/// `sources` holds `(path, content)` pairs of the TOML files that were
/// merged; they are only used to attach spans.
pub fn from_figment(err: figment::Error, sources: &[(String, String)]) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| match &error.kind {
            Kind::UnknownField(key, accepted) => {
                let section = error.path.first().cloned();
                let suggestion = suggest_key(key, accepted);
                let hint = unknown_key_hint(key, section.as_deref(), suggestion.as_deref(), accepted);
                let (span, src) = locate(&error, sources, section.as_deref(), key);
                ConfigError::UnknownKey {
                    key: key.clone(),
                    section,
                    suggestion,
                    hint,
                    span,
                    src,
                }
            }
            Kind::InvalidType(found, expected) => {
                let (section, key) = match error.path.as_slice() {
                    [section, key, ..] => (Some(section.as_str()), key.as_str()),
                    [key] => (None, key.as_str()),
                    [] => (None, ""),
                };
                let (span, src) = locate(&error, sources, section, key);
                ConfigError::InvalidType {
                    key: error.path.join("."),
                    found: found.to_string(),
                    expected: expected.to_string(),
                    span,
                    src,
                }
            }
            Kind::MissingField(key) => ConfigError::MissingKey {
                key: key.to_string(),
            },
            _ => ConfigError::Other(error.to_string()),
        })
        .collect()
}

/// Span of `key` in the file the error came from, with that file's source.
fn locate(
    error: &figment::error::Error,
    sources: &[(String, String)],
    section: Option<&str>,
    key: &str,
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let origin = match error.metadata.as_ref().and_then(|m| m.source.as_ref()) {
        Some(figment::Source::File(path)) => path.display().to_string(),
        // Inline TOML from `load_and_validate_str` carries no file path.
        Some(figment::Source::Code(_)) if sources.len() == 1 => sources[0].0.clone(),
        _ => return (None, None),
    };
    sources
        .iter()
        .find(|(name, _)| *name == origin)
        .and_then(|(name, content)| {
            let span = key_span(content, section, key)?;
            Some((Some(span), Some(NamedSource::new(name, content.clone()))))
        })
        .unwrap_or((None, None))
}

/// Where `key` is written inside `[section]`, or where the `[key]` header
/// sits when `section` is `None`.
pub fn key_span(content: &str, section: Option<&str>, key: &str) -> Option<SourceSpan> {
    let mut current: Option<&str> = None;
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let text = line.trim();
        if let Some(header) = text.strip_prefix('[').and_then(|h| h.split(']').next()) {
            let header = header.trim();
            if section.is_none() && header == key {
                let at = line.find(key).unwrap_or(indent);
                return Some(SourceSpan::new((offset + at).into(), key.len()));
            }
            current = Some(header);
        } else if current == section
            && let Some((name, _)) = text.split_once('=')
            && name.trim() == key
        {
            return Some(SourceSpan::new((offset + indent).into(), key.len()));
        }
        offset += line.len();
    }
    None
}

/// Best match for `unknown` among `accepted`, if any is similar enough.
pub fn suggest_key(unknown: &str, accepted: &[&str]) -> Option<String> {
    accepted
        .iter()
        .map(|candidate| (strsim::jaro_winkler(unknown, candidate), *candidate))
        .filter(|(score, _)| *score > MIN_SIMILARITY)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate.to_string())
}

/// Render every error as a miette report, in order.
pub fn report(errors: &[ConfigError]) -> String {
    let handler = miette::GraphicalReportHandler::new_themed(miette::GraphicalTheme::unicode_nocolor());
    let mut out = String::new();
    for error in errors {
        if handler.render_report(&mut out, error as &dyn Diagnostic).is_err() {
            out.push_str(&format!("Error: {error}\n"));
        }
    }
    out
}

/// Print [`report`] to stderr.
pub fn render_errors(errors: &[ConfigError]) {
    eprint!("{}", report(errors));
}
