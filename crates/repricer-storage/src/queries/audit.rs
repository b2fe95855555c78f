// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audit log of executed rules.

use repricer_core::RepricerError;
use repricer_core::types::AuditRecord;
use rusqlite::params;

use crate::database::Database;
use crate::models::{decimal_column, format_ts, opt_decimal_column, parse_ts};

pub async fn insert_record(db: &Database, record: &AuditRecord) -> Result<i64, RepricerError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO audit_log (rule_id, campaign_id, shop_domain, variant_id,
                     old_price, new_price, old_compare_at, new_compare_at, trigger_reason,
                     message_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.rule_id,
                    record.campaign_id,
                    record.shop_domain,
                    record.variant_id,
                    record.old_price.to_string(),
                    record.new_price.to_string(),
                    record.old_compare_at.map(|p| p.to_string()),
                    record.new_compare_at.map(|p| p.to_string()),
                    record.trigger_reason,
                    record.message_id,
                    format_ts(record.created_at),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Whether an execution of `rule_id` on `variant_id` was logged for `message_id`.
pub async fn execution_recorded(
    db: &Database,
    rule_id: &str,
    variant_id: &str,
    message_id: &str,
) -> Result<bool, RepricerError> {
    let rule_id = rule_id.to_string();
    let variant_id = variant_id.to_string();
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM audit_log
                     WHERE message_id = ?1 AND rule_id = ?2 AND variant_id = ?3)",
                params![message_id, rule_id, variant_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Audit records of a variant in insertion order.
pub async fn records_for_variant(
    db: &Database,
    shop_domain: &str,
    variant_id: &str,
) -> Result<Vec<AuditRecord>, RepricerError> {
    let shop_domain = shop_domain.to_string();
    let variant_id = variant_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT rule_id, campaign_id, shop_domain, variant_id, old_price, new_price,
                        old_compare_at, new_compare_at, trigger_reason, message_id, created_at
                 FROM audit_log WHERE shop_domain = ?1 AND variant_id = ?2 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![shop_domain, variant_id], |row| {
                let created_at: String = row.get(10)?;
                Ok(AuditRecord {
                    rule_id: row.get(0)?,
                    campaign_id: row.get(1)?,
                    shop_domain: row.get(2)?,
                    variant_id: row.get(3)?,
                    old_price: decimal_column(row, 4)?,
                    new_price: decimal_column(row, 5)?,
                    old_compare_at: opt_decimal_column(row, 6)?,
                    new_compare_at: opt_decimal_column(row, 7)?,
                    trigger_reason: row.get(8)?,
                    message_id: row.get(9)?,
                    created_at: parse_ts(10, &created_at)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
