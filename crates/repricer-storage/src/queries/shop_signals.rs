// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shop lifecycle signals raised by app webhooks.

use repricer_core::RepricerError;
use repricer_core::types::ShopSignal;
use rusqlite::params;

use crate::database::Database;
use crate::models::ShopSignalRow;

/// Record a signal. The same (message, signal) pair is stored once.
pub async fn raise(
    db: &Database,
    shop_domain: &str,
    signal: ShopSignal,
    message_id: &str,
) -> Result<(), RepricerError> {
    let shop_domain = shop_domain.to_string();
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO shop_signals (shop_domain, signal, message_id)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (message_id, signal) DO NOTHING",
                params![shop_domain, signal.to_string(), message_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Signals not yet handled, oldest first.
pub async fn pending(db: &Database) -> Result<Vec<ShopSignalRow>, RepricerError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, shop_domain, signal, message_id, status, created_at
                 FROM shop_signals WHERE status = 'pending' ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(ShopSignalRow {
                    id: row.get(0)?,
                    shop_domain: row.get(1)?,
                    signal: row.get(2)?,
                    message_id: row.get(3)?,
                    status: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn mark_done(db: &Database, id: i64) -> Result<(), RepricerError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE shop_signals SET status = 'done' WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_signals_collapse() {
        let db = Database::open_in_memory().await.unwrap();
        raise(&db, "shop.example", ShopSignal::CleanupRequested, "m1")
            .await
            .unwrap();
        raise(&db, "shop.example", ShopSignal::CleanupRequested, "m1")
            .await
            .unwrap();
        raise(&db, "shop.example", ShopSignal::ScopesRevalidation, "m2")
            .await
            .unwrap();

        let pending_signals = pending(&db).await.unwrap();
        assert_eq!(pending_signals.len(), 2);
        assert_eq!(pending_signals[0].signal, "cleanup_requested");

        mark_done(&db, pending_signals[0].id).await.unwrap();
        assert_eq!(pending(&db).await.unwrap().len(), 1);
    }
}
