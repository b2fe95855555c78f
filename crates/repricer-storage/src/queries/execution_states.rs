// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-(rule, variant) execution state rows.
//!
//! Creation is an atomic upsert on `(variant_id, rule_id)`; updates are
//! compare-and-swap on `version`.

use repricer_core::RepricerError;
use repricer_core::types::{ExecutionKey, ExecutionState, ExecutionStatePatch};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{enum_column, format_ts, now_ts, opt_decimal_column, opt_enum_column, parse_ts, ts_column};

const STATE_COLUMNS: &str = "id, rule_id, variant_id, campaign_id, shop_domain, state, \
     last_trigger_value, last_inventory_value, threshold_direction, trigger_count, \
     reset_condition_met, cooldown_until, triggered_at, version, updated_at, trigger_message_id";

fn state_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionState> {
    let trigger_count: i64 = row.get(9)?;
    let updated_at: String = row.get(14)?;
    Ok(ExecutionState {
        id: row.get(0)?,
        rule_id: row.get(1)?,
        variant_id: row.get(2)?,
        campaign_id: row.get(3)?,
        shop_domain: row.get(4)?,
        state: enum_column(row, 5)?,
        last_trigger_value: opt_decimal_column(row, 6)?,
        last_inventory_value: row.get(7)?,
        threshold_direction: opt_enum_column(row, 8)?,
        trigger_count: trigger_count.max(0) as u64,
        reset_condition_met: row.get(10)?,
        cooldown_until: ts_column(row, 11)?,
        triggered_at: ts_column(row, 12)?,
        trigger_message_id: row.get(15)?,
        version: row.get(13)?,
        updated_at: parse_ts(14, &updated_at)?,
    })
}

fn select_by_id(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<ExecutionState>> {
    conn.query_row(
        &format!("SELECT {STATE_COLUMNS} FROM execution_states WHERE id = ?1"),
        params![id],
        state_from_row,
    )
    .optional()
}

/// Fetch the row for `key`, inserting an `INACTIVE` row first if none exists.
pub async fn get_or_create(
    db: &Database,
    key: &ExecutionKey,
) -> Result<ExecutionState, RepricerError> {
    let key = key.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO execution_states (rule_id, variant_id, campaign_id, shop_domain,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT (variant_id, rule_id) DO NOTHING",
                params![
                    key.rule_id,
                    key.variant_id,
                    key.campaign_id,
                    key.shop_domain,
                    now_ts()
                ],
            )?;
            let state = tx.query_row(
                &format!(
                    "SELECT {STATE_COLUMNS} FROM execution_states
                     WHERE variant_id = ?1 AND rule_id = ?2"
                ),
                params![key.variant_id, key.rule_id],
                state_from_row,
            )?;
            tx.commit()?;
            Ok(state)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

enum CasOutcome {
    Updated(ExecutionState),
    Stale,
    Missing,
}

/// Apply `patch` to row `id` if it is still at `expected_version`.
///
/// Stamps `updated_at` and increments `version`. A stale version yields
/// [`RepricerError::Conflict`], a missing row [`RepricerError::NotFound`].
pub async fn update(
    db: &Database,
    id: i64,
    expected_version: i64,
    patch: &ExecutionStatePatch,
) -> Result<ExecutionState, RepricerError> {
    let patch = patch.clone();
    let outcome = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(mut state) = select_by_id(&tx, id)? else {
                return Ok(CasOutcome::Missing);
            };
            if state.version != expected_version {
                return Ok(CasOutcome::Stale);
            }
            state.apply(&patch);

            let changed = tx.execute(
                "UPDATE execution_states SET
                     state = ?1, last_trigger_value = ?2, last_inventory_value = ?3,
                     threshold_direction = ?4, trigger_count = ?5, reset_condition_met = ?6,
                     cooldown_until = ?7, triggered_at = ?8, trigger_message_id = ?9,
                     version = version + 1, updated_at = ?10
                 WHERE id = ?11 AND version = ?12",
                params![
                    state.state.to_string(),
                    state.last_trigger_value.map(|v| v.to_string()),
                    state.last_inventory_value,
                    state.threshold_direction.map(|d| d.to_string()),
                    state.trigger_count as i64,
                    state.reset_condition_met,
                    state.cooldown_until.map(format_ts),
                    state.triggered_at.map(format_ts),
                    state.trigger_message_id,
                    now_ts(),
                    id,
                    expected_version,
                ],
            )?;
            if changed == 0 {
                return Ok(CasOutcome::Stale);
            }
            let updated = select_by_id(&tx, id)?;
            tx.commit()?;
            Ok(updated.map_or(CasOutcome::Missing, CasOutcome::Updated))
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    match outcome {
        CasOutcome::Updated(state) => Ok(state),
        CasOutcome::Stale => Err(RepricerError::Conflict {
            entity: "execution_state".to_string(),
            id: id.to_string(),
        }),
        CasOutcome::Missing => Err(RepricerError::NotFound {
            entity: "execution_state".to_string(),
            id: id.to_string(),
        }),
    }
}

/// Read-only lookup by key. Used by the CLI.
pub async fn find(
    db: &Database,
    rule_id: &str,
    variant_id: &str,
) -> Result<Option<ExecutionState>, RepricerError> {
    let rule_id = rule_id.to_string();
    let variant_id = variant_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {STATE_COLUMNS} FROM execution_states
                     WHERE variant_id = ?1 AND rule_id = ?2"
                ),
                params![variant_id, rule_id],
                state_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Every execution state recorded for a variant.
pub async fn for_variant(
    db: &Database,
    shop_domain: &str,
    variant_id: &str,
) -> Result<Vec<ExecutionState>, RepricerError> {
    let shop_domain = shop_domain.to_string();
    let variant_id = variant_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {STATE_COLUMNS} FROM execution_states
                 WHERE shop_domain = ?1 AND variant_id = ?2 ORDER BY rule_id"
            ))?;
            let rows = stmt.query_map(params![shop_domain, variant_id], state_from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
