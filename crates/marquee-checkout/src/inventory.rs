//! # Inventory Ledger
//!
//! Concession stock. Every change is an adjustment with a reason; the only
//! check that matters is the one inside the conditional update.

use std::sync::Arc;

use tracing::debug;

use marquee_core::validation::{validate_adjustment_delta, validate_quantity, validate_sku};
use marquee_core::{AdjustmentReason, Clock, CoreError, InventoryAdjustment, InventoryItem, ValidationError};
use marquee_db::{Database, StockMovement};

use crate::error::CheckoutResult;

/// Default page size for [`InventoryLedger::history`].
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

#[derive(Clone)]
pub struct InventoryLedger {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl InventoryLedger {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        InventoryLedger { db, clock }
    }

    /// Advisory: whether `quantity` could be sold right now. Finalize may
    /// still reject.
    pub async fn check_available(&self, tenant_id: &str, sku: &str, quantity: i64) -> CheckoutResult<bool> {
        validate_sku(sku)?;
        validate_quantity(quantity)?;

        let item = self
            .db
            .inventory()
            .get(tenant_id, sku)
            .await?
            .ok_or_else(|| CoreError::not_found("InventoryItem", sku))?;
        Ok(item.can_supply(quantity))
    }

    /// Applies a signed delta and returns the new on-hand.
    ///
    /// ## Errors
    /// - `NegativeStock` when on-hand would drop below zero
    /// - `NotFound` for an unknown SKU
    /// - `Validation` for `Sale` or `Refund`, which only settlement records
    pub async fn adjust(
        &self,
        tenant_id: &str,
        sku: &str,
        delta: i64,
        reason: AdjustmentReason,
        actor: &str,
    ) -> CheckoutResult<i64> {
        validate_sku(sku)?;
        validate_adjustment_delta(delta)?;
        if actor.trim().is_empty() {
            return Err(ValidationError::Required { field: "actor".to_string() }.into());
        }
        if !reason.is_manual() {
            return Err(ValidationError::InvalidFormat {
                field: "reason".to_string(),
                reason: format!("'{reason}' adjustments are recorded by settlement only"),
            }
            .into());
        }

        debug!(tenant = %tenant_id, sku = %sku, delta, reason = %reason, "adjust");

        let movement = StockMovement {
            tenant_id,
            sku,
            delta,
            reason,
            actor,
            sale_id: None,
        };
        Ok(self.db.inventory().adjust(&movement, self.clock.now()).await?)
    }

    /// Receives `quantity` units.
    pub async fn restock(&self, tenant_id: &str, sku: &str, quantity: i64, actor: &str) -> CheckoutResult<i64> {
        validate_quantity(quantity)?;
        self.adjust(tenant_id, sku, quantity, AdjustmentReason::Restock, actor).await
    }

    /// Stock-count correction in either direction.
    pub async fn correct(&self, tenant_id: &str, sku: &str, delta: i64, actor: &str) -> CheckoutResult<i64> {
        self.adjust(tenant_id, sku, delta, AdjustmentReason::Correction, actor).await
    }

    /// Registers a SKU with zero stock.
    pub async fn register_item(
        &self,
        tenant_id: &str,
        sku: &str,
        name: &str,
        reorder_level: i64,
    ) -> CheckoutResult<InventoryItem> {
        validate_sku(sku)?;
        if reorder_level < 0 {
            return Err(ValidationError::MustBePositive {
                field: "reorder_level".to_string(),
            }
            .into());
        }
        Ok(self
            .db
            .inventory()
            .create_item(tenant_id, sku, name, reorder_level, self.clock.now())
            .await?)
    }

    pub async fn item(&self, tenant_id: &str, sku: &str) -> CheckoutResult<InventoryItem> {
        Ok(self
            .db
            .inventory()
            .get(tenant_id, sku)
            .await?
            .ok_or_else(|| CoreError::not_found("InventoryItem", sku))?)
    }

    /// Adjustments for a SKU, newest first.
    pub async fn history(&self, tenant_id: &str, sku: &str, limit: Option<i64>) -> CheckoutResult<Vec<InventoryAdjustment>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 500);
        Ok(self.db.inventory().history(tenant_id, sku, limit).await?)
    }

    /// Items at or below their reorder level.
    pub async fn low_stock(&self, tenant_id: &str) -> CheckoutResult<Vec<InventoryItem>> {
        Ok(self.db.inventory().low_stock(tenant_id).await?)
    }
}
