// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Variant snapshot history.

use repricer_core::RepricerError;
use repricer_core::types::{SnapshotRecord, VariantObservation, VariantStateSnapshot};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{decimal_column, now_ts, opt_decimal_column, parse_ts};

const SNAPSHOT_COLUMNS: &str = "id, shop_domain, variant_id, product_id, inventory_quantity, \
     price_amount, compare_at_price, reason, source_message_id, captured_at";

fn snapshot_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VariantStateSnapshot> {
    let captured_at: String = row.get(9)?;
    Ok(VariantStateSnapshot {
        id: row.get(0)?,
        shop_domain: row.get(1)?,
        variant_id: row.get(2)?,
        product_id: row.get(3)?,
        inventory_quantity: row.get(4)?,
        price_amount: decimal_column(row, 5)?,
        compare_at_price: opt_decimal_column(row, 6)?,
        reason: row.get(7)?,
        source_message_id: row.get(8)?,
        captured_at: parse_ts(9, &captured_at)?,
    })
}

fn newest(
    conn: &rusqlite::Connection,
    shop_domain: &str,
    variant_id: &str,
    limit: usize,
) -> rusqlite::Result<Vec<VariantStateSnapshot>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM variant_snapshots
         WHERE shop_domain = ?1 AND variant_id = ?2
         ORDER BY id DESC LIMIT ?3"
    ))?;
    let rows = stmt.query_map(
        params![shop_domain, variant_id, limit as i64],
        snapshot_from_row,
    )?;
    rows.collect()
}

/// Row appended by `message_id` for this variant, with the row before it.
fn produced_by(
    conn: &rusqlite::Connection,
    shop_domain: &str,
    variant_id: &str,
    message_id: &str,
) -> rusqlite::Result<Option<(VariantStateSnapshot, Option<VariantStateSnapshot>)>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM variant_snapshots
         WHERE shop_domain = ?1 AND variant_id = ?2 AND source_message_id = ?3
         ORDER BY id DESC LIMIT 1"
    ))?;
    let Some(current) = stmt
        .query_row(params![shop_domain, variant_id, message_id], snapshot_from_row)
        .optional()?
    else {
        return Ok(None);
    };
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM variant_snapshots
         WHERE shop_domain = ?1 AND variant_id = ?2 AND id < ?3
         ORDER BY id DESC LIMIT 1"
    ))?;
    let previous = stmt
        .query_row(params![shop_domain, variant_id, current.id], snapshot_from_row)
        .optional()?;
    Ok(Some((current, previous)))
}

/// Record an observation and return the snapshot pair to evaluate.
///
/// Runs in one transaction:
/// - a row already produced by this same message, newest or not: nothing
///   appended, the pair from the first delivery is returned, so a late
///   replay never lands on top of newer history;
/// - no history or a material change: a row is appended;
/// - otherwise nothing is appended and `previous == current`.
pub async fn record(
    db: &Database,
    observation: VariantObservation,
) -> Result<SnapshotRecord, RepricerError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            if let Some(message_id) = observation.source_message_id.as_deref()
                && let Some((current, previous)) = produced_by(
                    &tx,
                    &observation.shop_domain,
                    &observation.variant_id,
                    message_id,
                )?
            {
                tx.commit()?;
                return Ok(SnapshotRecord {
                    previous,
                    current,
                    appended: false,
                });
            }

            let previous = newest(&tx, &observation.shop_domain, &observation.variant_id, 1)?
                .into_iter()
                .next();
            if let Some(latest) = &previous
                && !observation.is_material_change_from(latest)
            {
                tx.commit()?;
                return Ok(SnapshotRecord {
                    previous: previous.clone(),
                    current: latest.clone(),
                    appended: false,
                });
            }

            tx.execute(
                "INSERT INTO variant_snapshots (shop_domain, variant_id, product_id,
                     inventory_quantity, price_amount, compare_at_price, reason,
                     source_message_id, captured_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    observation.shop_domain,
                    observation.variant_id,
                    observation.product_id,
                    observation.inventory_quantity.max(0),
                    observation.price_amount.to_string(),
                    observation.compare_at_price.map(|p| p.to_string()),
                    observation.reason,
                    observation.source_message_id,
                    now_ts(),
                ],
            )?;
            let id = tx.last_insert_rowid();
            let current = tx.query_row(
                &format!("SELECT {SNAPSHOT_COLUMNS} FROM variant_snapshots WHERE id = ?1"),
                params![id],
                snapshot_from_row,
            )?;
            tx.commit()?;
            Ok(SnapshotRecord {
                previous,
                current,
                appended: true,
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Up to `limit` snapshots for a variant, newest first.
pub async fn latest(
    db: &Database,
    shop_domain: &str,
    variant_id: &str,
    limit: usize,
) -> Result<Vec<VariantStateSnapshot>, RepricerError> {
    let shop_domain = shop_domain.to_string();
    let variant_id = variant_id.to_string();
    db.connection()
        .call(move |conn| newest(conn, &shop_domain, &variant_id, limit))
        .await
        .map_err(crate::database::map_tr_err)
}

/// Newest snapshot of a variant, if any.
pub async fn newest_snapshot(
    db: &Database,
    shop_domain: &str,
    variant_id: &str,
) -> Result<Option<VariantStateSnapshot>, RepricerError> {
    let shop_domain = shop_domain.to_string();
    let variant_id = variant_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM variant_snapshots
                     WHERE shop_domain = ?1 AND variant_id = ?2
                     ORDER BY id DESC LIMIT 1"
                ),
                params![shop_domain, variant_id],
                snapshot_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn observation(inventory: i64, price: i64, message: &str) -> VariantObservation {
        VariantObservation {
            shop_domain: "shop.example".into(),
            variant_id: "v1".into(),
            product_id: "p1".into(),
            inventory_quantity: inventory,
            price_amount: Decimal::from(price),
            compare_at_price: None,
            reason: "inventory_levels/update".into(),
            source_message_id: Some(message.into()),
        }
    }

    #[tokio::test]
    async fn first_observation_appends_without_previous() {
        let db = Database::open_in_memory().await.unwrap();
        let record = record(&db, observation(25, 50, "m1")).await.unwrap();
        assert!(record.appended);
        assert!(record.previous.is_none());
        assert_eq!(record.current.inventory_quantity, 25);
        assert_eq!(record.current.price_amount, Decimal::from(50));
    }

    #[tokio::test]
    async fn unchanged_observation_does_not_grow_history() {
        let db = Database::open_in_memory().await.unwrap();
        record(&db, observation(15, 50, "m1")).await.unwrap();
        let again = record(&db, observation(15, 50, "m2")).await.unwrap();
        assert!(!again.appended);
        assert_eq!(again.previous.as_ref().unwrap().id, again.current.id);

        let history = latest(&db, "shop.example", "v1", 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn material_change_links_previous() {
        let db = Database::open_in_memory().await.unwrap();
        record(&db, observation(25, 50, "m1")).await.unwrap();
        let second = record(&db, observation(15, 50, "m2")).await.unwrap();
        assert!(second.appended);
        assert_eq!(second.previous.unwrap().inventory_quantity, 25);
        assert_eq!(second.current.inventory_quantity, 15);

        let history = latest(&db, "shop.example", "v1", 10).await.unwrap();
        let quantities: Vec<i64> = history.iter().map(|s| s.inventory_quantity).collect();
        assert_eq!(quantities, vec![15, 25]);
    }

    #[tokio::test]
    async fn redelivery_replays_the_same_pair() {
        let db = Database::open_in_memory().await.unwrap();
        record(&db, observation(25, 50, "m1")).await.unwrap();
        let first = record(&db, observation(15, 50, "m2")).await.unwrap();
        let replay = record(&db, observation(15, 50, "m2")).await.unwrap();

        assert!(!replay.appended);
        assert_eq!(replay.current.id, first.current.id);
        assert_eq!(
            replay.previous.map(|s| s.id),
            first.previous.map(|s| s.id)
        );
    }

    #[tokio::test]
    async fn late_replay_does_not_append_over_newer_history() {
        let db = Database::open_in_memory().await.unwrap();
        record(&db, observation(25, 50, "m1")).await.unwrap();
        let first = record(&db, observation(15, 50, "m2")).await.unwrap();
        record(&db, observation(26, 50, "m3")).await.unwrap();

        let replay = record(&db, observation(15, 50, "m2")).await.unwrap();
        assert!(!replay.appended);
        assert_eq!(replay.current.id, first.current.id);
        assert_eq!(replay.previous.map(|s| s.inventory_quantity), Some(25));

        let history = latest(&db, "shop.example", "v1", 10).await.unwrap();
        let quantities: Vec<i64> = history.iter().map(|s| s.inventory_quantity).collect();
        assert_eq!(quantities, vec![26, 15, 25]);
    }

    #[tokio::test]
    async fn sub_cent_price_noise_is_ignored() {
        let db = Database::open_in_memory().await.unwrap();
        record(&db, observation(5, 50, "m1")).await.unwrap();
        let mut noisy = observation(5, 50, "m2");
        noisy.price_amount = Decimal::new(5001, 2);
        assert!(!record(&db, noisy).await.unwrap().appended);
    }

    #[tokio::test]
    async fn history_is_scoped_by_shop() {
        let db = Database::open_in_memory().await.unwrap();
        record(&db, observation(5, 50, "m1")).await.unwrap();
        let mut other = observation(9, 50, "m2");
        other.shop_domain = "other.example".into();
        let other = record(&db, other).await.unwrap();
        assert!(other.previous.is_none());
        assert!(
            newest_snapshot(&db, "nobody.example", "v1")
                .await
                .unwrap()
                .is_none()
        );
    }
}
