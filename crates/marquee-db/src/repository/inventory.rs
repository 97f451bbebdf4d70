//! # Inventory Repository
//!
//! On-hand stock per (tenant, sku) and its append-only adjustment ledger.
//!
//! ## The Only Mutation Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  adjust(delta)                                                          │
//! │                                                                         │
//! │  UPDATE inventory_items                                                │
//! │     SET on_hand = on_hand + delta                                      │
//! │   WHERE tenant_id = ? AND sku = ?                                      │
//! │     AND on_hand + delta >= 0         ← check and write are one step    │
//! │  RETURNING on_hand                                                     │
//! │       │                                                                 │
//! │       ├── row returned → INSERT adjustment (same transaction)          │
//! │       └── no row       → NotFound or NegativeStock                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no way to set `on_hand` directly; restocks and corrections are
//! adjustments too.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use marquee_core::{AdjustmentReason, CoreError, InventoryAdjustment, InventoryItem};

/// One stock movement request.
#[derive(Debug, Clone)]
pub struct StockMovement<'a> {
    pub tenant_id: &'a str,
    pub sku: &'a str,
    pub delta: i64,
    pub reason: AdjustmentReason,
    pub actor: &'a str,
    pub sale_id: Option<&'a str>,
}

/// Repository for inventory operations.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    pub async fn get(&self, tenant_id: &str, sku: &str) -> DbResult<Option<InventoryItem>> {
        let mut conn = self.pool.acquire().await?;
        get_in(&mut conn, tenant_id, sku).await
    }

    /// Applies one movement in its own transaction. Returns the new on-hand.
    pub async fn adjust(&self, movement: &StockMovement<'_>, now: DateTime<Utc>) -> DbResult<i64> {
        let mut tx = self.pool.begin().await?;
        let on_hand = adjust_in(&mut tx, movement, now).await?;
        tx.commit().await?;

        info!(
            tenant = %movement.tenant_id,
            sku = %movement.sku,
            delta = movement.delta,
            reason = %movement.reason,
            on_hand,
            "Inventory adjusted"
        );
        Ok(on_hand)
    }

    /// Newest first.
    pub async fn history(&self, tenant_id: &str, sku: &str, limit: i64) -> DbResult<Vec<InventoryAdjustment>> {
        let rows = sqlx::query_as::<_, InventoryAdjustment>(
            r#"
            SELECT id, tenant_id, sku, delta, reason, actor, sale_id, resulting_qty, created_at
            FROM inventory_adjustments
            WHERE tenant_id = ?1 AND sku = ?2
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?3
            "#,
        )
        .bind(tenant_id)
        .bind(sku)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Items at or below their reorder level.
    pub async fn low_stock(&self, tenant_id: &str) -> DbResult<Vec<InventoryItem>> {
        let rows = sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT tenant_id, sku, name, on_hand, reorder_level, updated_at
            FROM inventory_items
            WHERE tenant_id = ?1 AND on_hand <= reorder_level
            ORDER BY sku
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Registers a SKU with zero stock. Opening stock goes through
    /// `adjust` with `Restock` so it appears in the ledger.
    pub async fn create_item(
        &self,
        tenant_id: &str,
        sku: &str,
        name: &str,
        reorder_level: i64,
        now: DateTime<Utc>,
    ) -> DbResult<InventoryItem> {
        debug!(tenant = %tenant_id, sku = %sku, "Creating inventory item");

        let result = sqlx::query(
            r#"
            INSERT INTO inventory_items (tenant_id, sku, name, on_hand, reorder_level, updated_at)
            VALUES (?1, ?2, ?3, 0, ?4, ?5)
            "#,
        )
        .bind(tenant_id)
        .bind(sku)
        .bind(name)
        .bind(reorder_level)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(err) => {
                let err = DbError::from(err);
                return Err(if err.is_unique_violation() {
                    DbError::duplicate("sku", sku)
                } else {
                    err
                });
            }
        }

        Ok(InventoryItem {
            tenant_id: tenant_id.to_string(),
            sku: sku.to_string(),
            name: name.to_string(),
            on_hand: 0,
            reorder_level,
            updated_at: now,
        })
    }
}

// =============================================================================
// Connection helpers
// =============================================================================

pub(crate) async fn get_in(conn: &mut SqliteConnection, tenant_id: &str, sku: &str) -> DbResult<Option<InventoryItem>> {
    let item = sqlx::query_as::<_, InventoryItem>(
        r#"
        SELECT tenant_id, sku, name, on_hand, reorder_level, updated_at
        FROM inventory_items
        WHERE tenant_id = ?1 AND sku = ?2
        "#,
    )
    .bind(tenant_id)
    .bind(sku)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(item)
}

/// Conditional update plus ledger append, on the caller's connection.
///
/// ## Errors
/// - `NotFound` unknown SKU
/// - `NegativeStock` the delta would take on-hand below zero
pub(crate) async fn adjust_in(
    conn: &mut SqliteConnection,
    movement: &StockMovement<'_>,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    debug!(
        tenant = %movement.tenant_id,
        sku = %movement.sku,
        delta = movement.delta,
        reason = %movement.reason,
        "Adjusting stock"
    );

    let on_hand: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE inventory_items
        SET on_hand = on_hand + ?1, updated_at = ?2
        WHERE tenant_id = ?3 AND sku = ?4 AND on_hand + ?1 >= 0
        RETURNING on_hand
        "#,
    )
    .bind(movement.delta)
    .bind(now)
    .bind(movement.tenant_id)
    .bind(movement.sku)
    .fetch_optional(&mut *conn)
    .await?;

    let on_hand = match on_hand {
        Some(on_hand) => on_hand,
        None => {
            let current = get_in(conn, movement.tenant_id, movement.sku)
                .await?
                .ok_or_else(|| CoreError::not_found("InventoryItem", movement.sku))?;
            return Err(CoreError::NegativeStock {
                sku: movement.sku.to_string(),
                on_hand: current.on_hand,
                delta: movement.delta,
            }
            .into());
        }
    };

    sqlx::query(
        r#"
        INSERT INTO inventory_adjustments (id, tenant_id, sku, delta, reason, actor, sale_id, resulting_qty, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(movement.tenant_id)
    .bind(movement.sku)
    .bind(movement.delta)
    .bind(movement.reason)
    .bind(movement.actor)
    .bind(movement.sale_id)
    .bind(on_hand)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(on_hand)
}

// =============================================================================
// Unit Tests
// =============================================================================
