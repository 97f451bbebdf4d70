//! # Checkout Facade
//!
//! One entry point per operation, each returning an [`OpResult`] envelope
//! scoped to the tenant in a [`RequestContext`].
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  caller ── RequestContext { tenant_id, actor } ──► Checkout::op(...)   │
//! │                                                        │                │
//! │              ┌─────────────────┬───────────────────────┼─────────┐      │
//! │              ▼                 ▼                       ▼         ▼      │
//! │      SeatLeaseManager    SaleService           SaleFinalizer  Inventory │
//! │              │                 │                       │       Ledger   │
//! │              └─────────────────┴───────────┬───────────┴─────────┘      │
//! │                                            ▼                            │
//! │                      CheckoutResult<T> ──► OpResult<T>                 │
//! │                      (rejections logged at warn)                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ts_rs::TS;

use marquee_core::{
    AdjustmentReason, Clock, FinalizeReceipt, InventoryAdjustment, InventoryItem, LeaseGrant, Money, NewSaleItem,
    PaymentMethod, Sale, SaleDetails, SeatAvailability, SeatLease, Ticket,
};
use marquee_db::{CancelOutcome, Database, RefundOutcome};

use crate::audit::AuditSink;
use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, CheckoutResult, OpResult};
use crate::finalizer::SaleFinalizer;
use crate::inventory::InventoryLedger;
use crate::leases::SeatLeaseManager;
use crate::retry::RetryPolicy;
use crate::sales::{DiscountApplied, LineAdded, PaymentAdded, SaleService};

/// Who is calling, and for which tenant. Every read and write is scoped to
/// `tenant_id`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RequestContext {
    pub tenant_id: String,
    /// Cashier or manager id, recorded on sales, adjustments and audit events.
    pub actor: String,
}

impl RequestContext {
    pub fn new(tenant_id: impl Into<String>, actor: impl Into<String>) -> Self {
        RequestContext {
            tenant_id: tenant_id.into(),
            actor: actor.into(),
        }
    }
}

/// Whether a quantity of a SKU can be sold right now.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Availability {
    pub sku: String,
    pub quantity: i64,
    pub available: bool,
}

#[derive(Clone)]
pub struct Checkout {
    leases: SeatLeaseManager,
    sales: SaleService,
    finalizer: SaleFinalizer,
    inventory: InventoryLedger,
}

impl Checkout {
    pub fn new(db: Database, config: &CheckoutConfig, clock: Arc<dyn Clock>, audit: Arc<dyn AuditSink>) -> Self {
        let retry = RetryPolicy::new(&config.retry);
        Checkout {
            leases: SeatLeaseManager::new(db.clone(), clock.clone(), retry.clone(), config.leases.clone()),
            sales: SaleService::new(db.clone(), clock.clone()),
            finalizer: SaleFinalizer::new(db.clone(), clock.clone(), retry, audit),
            inventory: InventoryLedger::new(db, clock),
        }
    }

    pub fn leases(&self) -> &SeatLeaseManager {
        &self.leases
    }

    pub fn sales(&self) -> &SaleService {
        &self.sales
    }

    pub fn finalizer(&self) -> &SaleFinalizer {
        &self.finalizer
    }

    pub fn inventory(&self) -> &InventoryLedger {
        &self.inventory
    }

    // -------------------------------------------------------------------------
    // Seat leases
    // -------------------------------------------------------------------------

    pub async fn reserve(
        &self,
        ctx: &RequestContext,
        session_id: &str,
        seat_ids: &[String],
        holder_token: &str,
        ttl_secs: Option<i64>,
    ) -> OpResult<LeaseGrant> {
        debug!(tenant = %ctx.tenant_id, session_id = %session_id, "reserve command");
        respond(
            "reserve",
            ctx,
            self.leases
                .reserve(&ctx.tenant_id, session_id, seat_ids, holder_token, ttl_secs)
                .await,
        )
    }

    pub async fn release(&self, ctx: &RequestContext, holder_token: &str) -> OpResult<u64> {
        respond("release", ctx, self.leases.release(&ctx.tenant_id, holder_token).await)
    }

    pub async fn reap(&self, ctx: &RequestContext) -> OpResult<u64> {
        respond("reap", ctx, self.leases.reap(&ctx.tenant_id).await)
    }

    pub async fn leases_for(&self, ctx: &RequestContext, holder_token: &str) -> OpResult<Vec<SeatLease>> {
        respond("leases_for", ctx, self.leases.leases_for(&ctx.tenant_id, holder_token).await)
    }

    pub async fn seat_map(&self, ctx: &RequestContext, session_id: &str) -> OpResult<Vec<SeatAvailability>> {
        respond("seat_map", ctx, self.leases.seat_map(&ctx.tenant_id, session_id).await)
    }

    // -------------------------------------------------------------------------
    // Sales
    // -------------------------------------------------------------------------

    /// Opens a sale for `ctx.actor`. Pass `holder_token` to continue a
    /// reservation made before the sale existed.
    pub async fn open_sale(
        &self,
        ctx: &RequestContext,
        buyer_id: Option<&str>,
        holder_token: Option<&str>,
    ) -> OpResult<Sale> {
        debug!(tenant = %ctx.tenant_id, actor = %ctx.actor, "open_sale command");
        let result = match holder_token {
            Some(token) => {
                self.sales
                    .open_with_token(&ctx.tenant_id, &ctx.actor, buyer_id, token)
                    .await
            }
            None => self.sales.open(&ctx.tenant_id, &ctx.actor, buyer_id).await,
        };
        respond("open_sale", ctx, result)
    }

    pub async fn add_item(&self, ctx: &RequestContext, sale_id: &str, item: &NewSaleItem) -> OpResult<LineAdded> {
        respond("add_item", ctx, self.sales.add_item(&ctx.tenant_id, sale_id, item).await)
    }

    pub async fn remove_item(&self, ctx: &RequestContext, sale_id: &str, item_id: &str) -> OpResult<Sale> {
        respond("remove_item", ctx, self.sales.remove_item(&ctx.tenant_id, sale_id, item_id).await)
    }

    pub async fn apply_discount(&self, ctx: &RequestContext, sale_id: &str, code: &str) -> OpResult<DiscountApplied> {
        respond("apply_discount", ctx, self.sales.apply_discount(&ctx.tenant_id, sale_id, code).await)
    }

    pub async fn add_payment(
        &self,
        ctx: &RequestContext,
        sale_id: &str,
        method: PaymentMethod,
        amount: Money,
        reference: Option<&str>,
    ) -> OpResult<PaymentAdded> {
        respond(
            "add_payment",
            ctx,
            self.sales
                .add_payment(&ctx.tenant_id, sale_id, method, amount, reference)
                .await,
        )
    }

    pub async fn get_sale(&self, ctx: &RequestContext, sale_id: &str) -> OpResult<SaleDetails> {
        respond("get_sale", ctx, self.sales.get(&ctx.tenant_id, sale_id).await)
    }

    pub async fn tickets_for_sale(&self, ctx: &RequestContext, sale_id: &str) -> OpResult<Vec<Ticket>> {
        respond("tickets_for_sale", ctx, self.sales.tickets_for_sale(&ctx.tenant_id, sale_id).await)
    }

    // -------------------------------------------------------------------------
    // Settlement
    // -------------------------------------------------------------------------

    pub async fn finalize(&self, ctx: &RequestContext, sale_id: &str) -> OpResult<FinalizeReceipt> {
        debug!(tenant = %ctx.tenant_id, sale_id = %sale_id, "finalize command");
        respond("finalize", ctx, self.finalizer.finalize(&ctx.tenant_id, sale_id, &ctx.actor).await)
    }

    pub async fn cancel(&self, ctx: &RequestContext, sale_id: &str, reason: &str) -> OpResult<CancelOutcome> {
        respond(
            "cancel",
            ctx,
            self.finalizer.cancel(&ctx.tenant_id, sale_id, reason, &ctx.actor).await,
        )
    }

    pub async fn refund(&self, ctx: &RequestContext, sale_id: &str, reason: &str) -> OpResult<RefundOutcome> {
        respond(
            "refund",
            ctx,
            self.finalizer.refund(&ctx.tenant_id, sale_id, reason, &ctx.actor).await,
        )
    }

    // -------------------------------------------------------------------------
    // Inventory
    // -------------------------------------------------------------------------

    pub async fn check_available(&self, ctx: &RequestContext, sku: &str, quantity: i64) -> OpResult<Availability> {
        let result = self
            .inventory
            .check_available(&ctx.tenant_id, sku, quantity)
            .await
            .map(|available| Availability {
                sku: sku.to_string(),
                quantity,
                available,
            });
        respond("check_available", ctx, result)
    }

    pub async fn adjust(&self, ctx: &RequestContext, sku: &str, delta: i64, reason: AdjustmentReason) -> OpResult<i64> {
        respond(
            "adjust",
            ctx,
            self.inventory.adjust(&ctx.tenant_id, sku, delta, reason, &ctx.actor).await,
        )
    }

    pub async fn restock(&self, ctx: &RequestContext, sku: &str, quantity: i64) -> OpResult<i64> {
        respond(
            "restock",
            ctx,
            self.inventory.restock(&ctx.tenant_id, sku, quantity, &ctx.actor).await,
        )
    }

    pub async fn correct(&self, ctx: &RequestContext, sku: &str, delta: i64) -> OpResult<i64> {
        respond(
            "correct",
            ctx,
            self.inventory.correct(&ctx.tenant_id, sku, delta, &ctx.actor).await,
        )
    }

    pub async fn register_item(
        &self,
        ctx: &RequestContext,
        sku: &str,
        name: &str,
        reorder_level: i64,
    ) -> OpResult<InventoryItem> {
        respond(
            "register_item",
            ctx,
            self.inventory.register_item(&ctx.tenant_id, sku, name, reorder_level).await,
        )
    }

    pub async fn history(&self, ctx: &RequestContext, sku: &str, limit: Option<i64>) -> OpResult<Vec<InventoryAdjustment>> {
        respond("history", ctx, self.inventory.history(&ctx.tenant_id, sku, limit).await)
    }

    pub async fn low_stock(&self, ctx: &RequestContext) -> OpResult<Vec<InventoryItem>> {
        respond("low_stock", ctx, self.inventory.low_stock(&ctx.tenant_id).await)
    }
}

/// Logs a business rejection and wraps the result. Store failures are
/// logged when converted into an [`crate::error::ApiError`].
fn respond<T>(operation: &str, ctx: &RequestContext, result: CheckoutResult<T>) -> OpResult<T> {
    if let Err(CheckoutError::Rejected(rejection)) = &result {
        warn!(operation, tenant = %ctx.tenant_id, actor = %ctx.actor, error = %rejection, "Operation rejected");
    }
    result.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_core::SystemClock;
    use marquee_db::DbConfig;

    use crate::audit::MemoryAuditSink;
    use crate::error::ErrorKind;

    async fn checkout() -> Checkout {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        Checkout::new(
            db,
            &CheckoutConfig::default(),
            Arc::new(SystemClock),
            Arc::new(MemoryAuditSink::new()),
        )
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let checkout = checkout().await;
        let a = RequestContext::new("tenant-a", "cashier");
        let b = RequestContext::new("tenant-b", "cashier");

        let sale = checkout.open_sale(&a, None, None).await.into_result().unwrap();
        let result = checkout.get_sale(&b, &sale.id).await;
        assert!(!result.success);
        assert_eq!(result.kind(), Some(ErrorKind::NotFound));

        checkout.register_item(&a, "SODA", "Soda", 0).await.into_result().unwrap();
        assert_eq!(checkout.check_available(&b, "SODA", 1).await.kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_inventory_envelope() {
        let checkout = checkout().await;
        let ctx = RequestContext::new("t1", "manager");
        checkout.register_item(&ctx, "CANDY", "Candy", 2).await.into_result().unwrap();

        assert_eq!(checkout.restock(&ctx, "CANDY", 3).await.into_result().unwrap(), 3);
        let negative = checkout.correct(&ctx, "CANDY", -4).await;
        assert_eq!(negative.kind(), Some(ErrorKind::NegativeStock));

        let forged = checkout.adjust(&ctx, "CANDY", -1, AdjustmentReason::Sale).await;
        assert_eq!(forged.kind(), Some(ErrorKind::ValidationError));

        let low = checkout.low_stock(&ctx).await.into_result().unwrap();
        assert!(low.is_empty());

        let availability = checkout.check_available(&ctx, "CANDY", 3).await.into_result().unwrap();
        assert!(availability.available);
    }
}
