// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Processed-message ledger backing webhook deduplication.

use chrono::{DateTime, Utc};
use repricer_core::RepricerError;
use repricer_core::types::{ProcessingResult, WebhookMessage};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{format_ts, now_ts, to_json};

/// Whether `message_id` has been marked processed.
pub async fn is_processed(db: &Database, message_id: &str) -> Result<bool, RepricerError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            let status: Option<String> = conn
                .query_row(
                    "SELECT status FROM webhook_messages WHERE message_id = ?1",
                    params![message_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(status.as_deref() == Some("processed"))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Log receipt of a message. A second receipt for the same id is a no-op.
pub async fn record_receipt(db: &Database, message: &WebhookMessage) -> Result<(), RepricerError> {
    let message_id = message.message_id.clone();
    let topic = message.topic.clone();
    let shop_domain = message.shop_domain.clone();
    let received_at = format_ts(message.received_at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO webhook_messages (message_id, topic, shop_domain, received_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (message_id) DO NOTHING",
                params![message_id, topic, shop_domain, received_at],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark a message processed and store its outcome.
pub async fn mark_processed(
    db: &Database,
    message_id: &str,
    result: &ProcessingResult,
) -> Result<(), RepricerError> {
    write_outcome(db, message_id, result, "processed").await
}

/// Store a failed attempt. Never downgrades a processed message.
pub async fn record_failure(
    db: &Database,
    message_id: &str,
    result: &ProcessingResult,
) -> Result<(), RepricerError> {
    write_outcome(db, message_id, result, "failed").await
}

async fn write_outcome(
    db: &Database,
    message_id: &str,
    result: &ProcessingResult,
    status: &'static str,
) -> Result<(), RepricerError> {
    let message_id = message_id.to_string();
    let result = result.clone();
    db.connection()
        .call(move |conn| {
            let now = now_ts();
            let processed_at = (status == "processed").then(|| now.clone());
            conn.execute(
                "INSERT INTO webhook_messages (message_id, topic, shop_domain, status, attempts,
                     result, error, received_at, processed_at, updated_at)
                 VALUES (?1, '', '', ?2, 1, ?3, ?4, ?5, ?6, ?5)
                 ON CONFLICT (message_id) DO UPDATE SET
                     status = CASE WHEN status = 'processed' THEN status ELSE excluded.status END,
                     attempts = attempts + 1,
                     result = excluded.result,
                     error = excluded.error,
                     processed_at = COALESCE(processed_at, excluded.processed_at),
                     updated_at = excluded.updated_at",
                params![
                    message_id,
                    status,
                    to_json(&result)?,
                    result.error,
                    now,
                    processed_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete ledger rows received before `cutoff`. Rows still in `received`
/// state are kept so an in-flight delivery keeps its dedup entry.
pub async fn purge_older_than(db: &Database, cutoff: DateTime<Utc>) -> Result<u64, RepricerError> {
    let cutoff = format_ts(cutoff);
    db.connection()
        .call(move |conn| {
            let removed = conn.execute(
                "DELETE FROM webhook_messages
                 WHERE received_at < ?1 AND status IN ('processed', 'failed')",
                params![cutoff],
            )?;
            Ok(removed as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Stored outcome of a message, if any. Used by tests and the CLI.
pub async fn outcome(
    db: &Database,
    message_id: &str,
) -> Result<Option<(String, i64, Option<ProcessingResult>)>, RepricerError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT status, attempts, result FROM webhook_messages WHERE message_id = ?1",
                params![message_id],
                |row| {
                    let result: Option<String> = row.get(2)?;
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        result.and_then(|raw| serde_json::from_str(&raw).ok()),
                    ))
                },
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
