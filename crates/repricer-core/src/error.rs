// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the repricer service.
//!
//! Every variant is classified as either transient (safe to retry on
//! redelivery) or permanent (retrying cannot change the outcome). The
//! webhook pipeline uses [`RepricerError::is_retryable`] to decide whether a
//! message may be marked processed.

use thiserror::Error;

use crate::types::CampaignStatus;

/// The primary error type used across all repricer crates.
#[derive(Debug, Error)]
pub enum RepricerError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// A compare-and-swap update lost a race against a concurrent writer.
    #[error("concurrent update conflict on {entity} {id}")]
    Conflict { entity: String, id: String },

    /// Message transport errors (queue unavailable, listener failure).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A campaign status change that the lifecycle does not allow.
    #[error("invalid campaign status transition from {from} to {to}")]
    InvalidTransition {
        from: CampaignStatus,
        to: CampaignStatus,
    },

    /// A rule condition or operator name that is not recognised.
    #[error("unknown rule operator `{0}`")]
    UnknownOperator(String),

    /// A rule whose threshold or action values cannot be evaluated.
    #[error("invalid rule {rule_id}: {reason}")]
    InvalidRule { rule_id: String, reason: String },

    /// A webhook payload that does not match the shape expected for its topic.
    #[error("malformed {topic} payload: {reason}")]
    Payload { topic: String, reason: String },

    /// The price-mutation collaborator rejected or failed a price change.
    #[error("price change failed for variant {variant_id}: {message}")]
    PriceExecution { variant_id: String, message: String },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Processing was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RepricerError {
    /// Whether the failure is transient and the same work may succeed on retry.
    ///
    /// Store unavailability, timeouts, CAS conflicts, transport failures and
    /// cancellation are retryable. Logic errors (bad transitions, bad rules,
    /// malformed payloads) and price-executor rejections are not: the execution
    /// state has already recorded the crossing, so a replay would not re-fire.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RepricerError::Storage { .. }
                | RepricerError::Timeout { .. }
                | RepricerError::Conflict { .. }
                | RepricerError::Transport { .. }
                | RepricerError::Cancelled
        )
    }

    /// Convenience constructor for storage errors from any error source.
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        RepricerError::Storage {
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(RepricerError::storage("db locked").is_retryable());
        assert!(
            RepricerError::Timeout {
                duration: std::time::Duration::from_millis(250)
            }
            .is_retryable()
        );
        assert!(
            RepricerError::Conflict {
                entity: "execution_state".into(),
                id: "7".into()
            }
            .is_retryable()
        );
        assert!(RepricerError::Cancelled.is_retryable());
    }

    #[test]
    fn logic_errors_are_permanent() {
        assert!(!RepricerError::UnknownOperator("roughly".into()).is_retryable());
        assert!(
            !RepricerError::InvalidTransition {
                from: CampaignStatus::Completed,
                to: CampaignStatus::Active,
            }
            .is_retryable()
        );
        assert!(
            !RepricerError::Payload {
                topic: "products/update".into(),
                reason: "missing id".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn invalid_transition_names_both_statuses() {
        let err = RepricerError::InvalidTransition {
            from: CampaignStatus::Draft,
            to: CampaignStatus::Paused,
        };
        assert_eq!(
            err.to_string(),
            "invalid campaign status transition from DRAFT to PAUSED"
        );
    }
}
