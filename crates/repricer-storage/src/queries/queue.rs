// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable inbox queue.
//!
//! A claimed row is locked until `locked_until`; if the worker dies before
//! acking, the row becomes claimable again once the lock expires. `attempts`
//! counts claims, so a message that keeps crashing its worker is eventually
//! parked as `failed`.
//!
//! On a `pending` row `locked_until` is the retry deadline: a failed attempt
//! is not claimable again before it.

use std::time::Duration;

use chrono::Utc;
use repricer_core::RepricerError;
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{QueueEntry, format_ts, now_ts};

const ENTRY_COLUMNS: &str = "id, queue_name, payload, status, attempts, max_attempts, \
     created_at, updated_at, locked_until";

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueEntry> {
    Ok(QueueEntry {
        id: row.get(0)?,
        queue_name: row.get(1)?,
        payload: row.get(2)?,
        status: row.get(3)?,
        attempts: row.get(4)?,
        max_attempts: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        locked_until: row.get(8)?,
    })
}

/// Enqueue a new item. Returns the queue entry id.
pub async fn enqueue(
    db: &Database,
    queue_name: &str,
    payload: &str,
    max_attempts: u32,
) -> Result<i64, RepricerError> {
    let queue_name = queue_name.to_string();
    let payload = payload.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queue (queue_name, payload, max_attempts) VALUES (?1, ?2, ?3)",
                params![queue_name, payload, max_attempts],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Claim the oldest pending (or lock-expired) entry of `queue_name`.
///
/// Expired claims that already used up their attempts are parked as
/// `failed` first. Returns `None` when nothing is claimable.
pub async fn dequeue(
    db: &Database,
    queue_name: &str,
    lock_timeout: Duration,
) -> Result<Option<QueueEntry>, RepricerError> {
    let queue_name = queue_name.to_string();
    let lock_timeout = chrono::Duration::from_std(lock_timeout)
        .map_err(|e| RepricerError::Internal(format!("invalid lock timeout: {e}")))?;
    db.connection()
        .call(move |conn| {
            let now = Utc::now();
            let now_str = format_ts(now);
            let locked_until = format_ts(now + lock_timeout);
            let tx = conn.transaction()?;

            tx.execute(
                "UPDATE queue SET status = 'failed', locked_until = NULL,
                     last_error = COALESCE(last_error, 'lock expired after final attempt'),
                     updated_at = ?2
                 WHERE queue_name = ?1 AND status = 'processing'
                   AND locked_until < ?2 AND attempts >= max_attempts",
                params![queue_name, now_str],
            )?;

            let claimed = tx
                .query_row(
                    &format!(
                        "SELECT {ENTRY_COLUMNS} FROM queue
                         WHERE queue_name = ?1
                           AND ((status = 'pending'
                                 AND (locked_until IS NULL OR locked_until <= ?2))
                                OR (status = 'processing' AND locked_until < ?2))
                         ORDER BY id ASC
                         LIMIT 1"
                    ),
                    params![queue_name, now_str],
                    entry_from_row,
                )
                .optional()?;

            let Some(entry) = claimed else {
                tx.commit()?;
                return Ok(None);
            };

            tx.execute(
                "UPDATE queue SET status = 'processing', attempts = attempts + 1,
                     locked_until = ?1, updated_at = ?2
                 WHERE id = ?3",
                params![locked_until, now_str, entry.id],
            )?;
            tx.commit()?;

            Ok(Some(QueueEntry {
                status: "processing".to_string(),
                attempts: entry.attempts + 1,
                locked_until: Some(locked_until),
                updated_at: now_str,
                ..entry
            }))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Acknowledge successful processing of a queue entry.
pub async fn ack(db: &Database, id: i64) -> Result<(), RepricerError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET status = 'completed', locked_until = NULL, updated_at = ?2
                 WHERE id = ?1",
                params![id, now_ts()],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Release a claimed entry after a failed attempt.
///
/// Goes back to `pending`, claimable again after `retry_after`, or to
/// `failed` once `max_attempts` claims have been used.
pub async fn fail(
    db: &Database,
    id: i64,
    error: &str,
    retry_after: Duration,
) -> Result<(), RepricerError> {
    let error = error.to_string();
    let retry_after = chrono::Duration::from_std(retry_after)
        .map_err(|e| RepricerError::Internal(format!("invalid retry delay: {e}")))?;
    db.connection()
        .call(move |conn| {
            let now = Utc::now();
            conn.execute(
                "UPDATE queue SET
                     status = CASE WHEN attempts >= max_attempts THEN 'failed' ELSE 'pending' END,
                     locked_until = CASE WHEN attempts >= max_attempts THEN NULL ELSE ?3 END,
                     last_error = ?2, updated_at = ?4
                 WHERE id = ?1",
                params![id, error, format_ts(now + retry_after), format_ts(now)],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete completed entries last touched before `cutoff`.
pub async fn purge_completed(
    db: &Database,
    cutoff: chrono::DateTime<Utc>,
) -> Result<u64, RepricerError> {
    let cutoff = format_ts(cutoff);
    db.connection()
        .call(move |conn| {
            let removed = conn.execute(
                "DELETE FROM queue WHERE status = 'completed' AND updated_at < ?1",
                params![cutoff],
            )?;
            Ok(removed as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Count entries per status for `queue_name`, for health output.
pub async fn depth(db: &Database, queue_name: &str) -> Result<Vec<(String, i64)>, RepricerError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM queue WHERE queue_name = ?1
                 GROUP BY status ORDER BY status",
            )?;
            let rows = stmt.query_map(params![queue_name], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
