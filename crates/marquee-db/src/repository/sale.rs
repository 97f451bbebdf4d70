//! # Sale Repository
//!
//! The sale aggregate and the three units of work that settle it.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. OPEN                                                               │
//! │     └── open() → Sale { status: Open, totals: 0 }                      │
//! │                                                                         │
//! │  2. BUILD (each its own transaction, each re-checks OPEN first)        │
//! │     ├── add_item() / remove_item() / apply_discount()                  │
//! │     │     └── totals recomputed from items + discounts, persisted      │
//! │     └── add_payment()                                                  │
//! │                                                                         │
//! │  3. SETTLE (one transaction each)                                      │
//! │     ├── finalize() → stock −qty, tickets issued, leases released       │
//! │     ├── cancel()   → leases of the holder token released               │
//! │     └── refund()   → stock +qty, tickets refunded (from FINALIZED)     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Write First
//! Every unit of work opens with a conditional UPDATE on the sale row
//! (`... WHERE status = 'open'`). That single statement both takes the
//! SQLite write lock and is the freshest possible status check; when it
//! matches no row the transaction is rolled back and the caller gets
//! `NotFound`, `SaleNotOpen` or `SaleNotFinalized`.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::inventory::{self, StockMovement};
use crate::repository::{catalog, lease, ticket};
use marquee_core::totals::Recomputed;
use marquee_core::validation::checked_paid_total;
use marquee_core::{
    AdjustmentReason, CoreError, FinalizeReceipt, LineTarget, Money, NewSaleItem, Payment,
    PaymentMethod, Sale, SaleDetails, SaleDiscount, SaleItem, SaleStatus, SaleTotals, Tender,
    Ticket, TicketStatus, MAX_SALE_ITEMS,
};

const SALE_COLUMNS: &str = "id, tenant_id, cashier_id, buyer_id, holder_token, status, \
    subtotal_cents, discount_cents, tax_cents, total_cents, cancel_reason, refund_reason, \
    created_at, updated_at, finalized_at, version";

const ITEM_COLUMNS: &str = "id, sale_id, tenant_id, kind, description, sku, session_id, seat_id, \
    quantity, unit_price_cents, tax_rate_bps, line_total_cents, created_at";

/// Lifetime of the lease finalize takes on a seat before ticketing it.
/// The lease is deleted again before commit.
const IMPLICIT_LEASE_SECS: i64 = 60;

/// Result of a cancel.
#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub sale: Sale,
    pub leases_released: u64,
}

/// Result of a refund.
#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub sale: Sale,
    pub tickets_refunded: u64,
    /// `(sku, quantity)` returned to stock.
    pub restocked: Vec<(String, i64)>,
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn get(&self, tenant_id: &str, sale_id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        find_in(&mut conn, tenant_id, sale_id).await
    }

    /// The sale with its lines and the live payment balance.
    pub async fn details(&self, tenant_id: &str, sale_id: &str) -> DbResult<SaleDetails> {
        let mut conn = self.pool.acquire().await?;

        let sale = fetch_in(&mut conn, tenant_id, sale_id).await?;
        let items = items_in(&mut conn, tenant_id, sale_id).await?;
        let discounts = discounts_in(&mut conn, tenant_id, sale_id).await?;
        let payments = payments_in(&mut conn, tenant_id, sale_id).await?;

        let paid: Money = payments.iter().map(Payment::amount).sum();
        let tender = Tender::new(paid, sale.total());

        Ok(SaleDetails {
            remaining: tender.remaining(),
            change: tender.change(),
            paid,
            sale,
            items,
            discounts,
            payments,
        })
    }

    // -------------------------------------------------------------------------
    // Aggregate mutations
    // -------------------------------------------------------------------------

    /// Creates an OPEN sale with zero totals.
    pub async fn open(
        &self,
        tenant_id: &str,
        cashier_id: &str,
        buyer_id: Option<&str>,
        holder_token: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Sale> {
        let mut tx = self.pool.begin().await?;

        if let Some(buyer_id) = buyer_id {
            if catalog::customer_in(&mut tx, tenant_id, buyer_id).await?.is_none() {
                return Err(CoreError::not_found("Customer", buyer_id).into());
            }
        }

        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            cashier_id: cashier_id.to_string(),
            buyer_id: buyer_id.map(str::to_string),
            holder_token: holder_token.to_string(),
            status: SaleStatus::Open,
            subtotal_cents: 0,
            discount_cents: 0,
            tax_cents: 0,
            total_cents: 0,
            cancel_reason: None,
            refund_reason: None,
            created_at: now,
            updated_at: now,
            finalized_at: None,
            version: 1,
        };

        debug!(tenant = %tenant_id, sale_id = %sale.id, "Opening sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, tenant_id, cashier_id, buyer_id, holder_token, status,
                subtotal_cents, discount_cents, tax_cents, total_cents,
                created_at, updated_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, 0, 0, ?7, ?7, 1)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.tenant_id)
        .bind(&sale.cashier_id)
        .bind(&sale.buyer_id)
        .bind(&sale.holder_token)
        .bind(sale.status)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(sale)
    }

    /// Appends a line and recomputes totals.
    ///
    /// Stock and seat checks here are advisory; finalize re-checks both
    /// authoritatively.
    ///
    /// ## Errors
    /// - `SaleNotOpen`, `SaleTooLarge`
    /// - inventory lines: `NotFound` (SKU), `InsufficientStock`
    /// - ticket lines: `NotFound` (session/seat), `SessionNotBookable`,
    ///   `SeatUnavailable` (sold, held by another token, or already on
    ///   this sale)
    pub async fn add_item(
        &self,
        tenant_id: &str,
        sale_id: &str,
        new_item: &NewSaleItem,
        now: DateTime<Utc>,
    ) -> DbResult<(Sale, SaleItem)> {
        debug!(tenant = %tenant_id, sale_id = %sale_id, kind = ?new_item.kind(), "Adding sale item");

        let mut tx = self.pool.begin().await?;
        touch_open_in(&mut tx, tenant_id, sale_id, now).await?;
        let sale = fetch_in(&mut tx, tenant_id, sale_id).await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sale_items WHERE sale_id = ?1")
            .bind(sale_id)
            .fetch_one(&mut *tx)
            .await?;
        if count as usize >= MAX_SALE_ITEMS {
            return Err(CoreError::SaleTooLarge { max: MAX_SALE_ITEMS }.into());
        }

        let (sku, session_id, seat_id) = match &new_item.target {
            LineTarget::Inventory { sku } => {
                let stock = inventory::get_in(&mut tx, tenant_id, sku)
                    .await?
                    .ok_or_else(|| CoreError::not_found("InventoryItem", sku.as_str()))?;

                let already: i64 = sqlx::query_scalar(
                    "SELECT COALESCE(SUM(quantity), 0) FROM sale_items WHERE sale_id = ?1 AND sku = ?2",
                )
                .bind(sale_id)
                .bind(sku)
                .fetch_one(&mut *tx)
                .await?;

                let requested = already + new_item.quantity;
                if !stock.can_supply(requested) {
                    return Err(CoreError::InsufficientStock {
                        sku: sku.clone(),
                        available: stock.on_hand,
                        requested,
                    }
                    .into());
                }
                (Some(sku.clone()), None, None)
            }
            LineTarget::Ticket { session_id, seat_id } => {
                let session = catalog::session_in(&mut tx, tenant_id, session_id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("Session", session_id.as_str()))?;
                session.ensure_bookable()?;

                if !catalog::seat_exists_in(&mut tx, tenant_id, &session.room_id, seat_id).await? {
                    return Err(CoreError::not_found("Seat", seat_id.as_str()).into());
                }

                let on_this_sale: Option<i64> = sqlx::query_scalar(
                    "SELECT 1 FROM sale_items WHERE sale_id = ?1 AND session_id = ?2 AND seat_id = ?3",
                )
                .bind(sale_id)
                .bind(session_id)
                .bind(seat_id)
                .fetch_optional(&mut *tx)
                .await?;

                if on_this_sale.is_some()
                    || lease::seat_conflicts_in(&mut tx, tenant_id, session_id, seat_id, &sale.holder_token, now).await?
                {
                    return Err(CoreError::seats_unavailable([seat_id.as_str()]).into());
                }
                (None, Some(session_id.clone()), Some(seat_id.clone()))
            }
            LineTarget::Service => (None, None, None),
        };

        let item = SaleItem {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.to_string(),
            tenant_id: tenant_id.to_string(),
            kind: new_item.kind(),
            description: new_item.description.clone(),
            sku,
            session_id,
            seat_id,
            quantity: new_item.quantity,
            unit_price_cents: new_item.unit_price_cents,
            tax_rate_bps: new_item.tax_rate_bps,
            line_total_cents: new_item.line_total().cents(),
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, tenant_id, kind, description, sku, session_id, seat_id,
                quantity, unit_price_cents, tax_rate_bps, line_total_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.tenant_id)
        .bind(item.kind)
        .bind(&item.description)
        .bind(&item.sku)
        .bind(&item.session_id)
        .bind(&item.seat_id)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.tax_rate_bps)
        .bind(item.line_total_cents)
        .bind(item.created_at)
        .execute(&mut *tx)
        .await?;

        recompute_in(&mut tx, tenant_id, sale_id).await?;
        let sale = fetch_in(&mut tx, tenant_id, sale_id).await?;
        tx.commit().await?;

        Ok((sale, item))
    }

    /// Removes a line and recomputes totals.
    pub async fn remove_item(&self, tenant_id: &str, sale_id: &str, item_id: &str, now: DateTime<Utc>) -> DbResult<Sale> {
        debug!(tenant = %tenant_id, sale_id = %sale_id, item_id = %item_id, "Removing sale item");

        let mut tx = self.pool.begin().await?;
        touch_open_in(&mut tx, tenant_id, sale_id, now).await?;

        let result = sqlx::query("DELETE FROM sale_items WHERE id = ?1 AND sale_id = ?2 AND tenant_id = ?3")
            .bind(item_id)
            .bind(sale_id)
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("SaleItem", item_id).into());
        }

        recompute_in(&mut tx, tenant_id, sale_id).await?;
        let sale = fetch_in(&mut tx, tenant_id, sale_id).await?;
        tx.commit().await?;

        Ok(sale)
    }

    /// Applies a discount code and consumes one of its uses.
    ///
    /// ## Errors
    /// `SaleNotOpen`, `DiscountNotFound`, `DiscountExpired`,
    /// `DiscountExhausted`, `DiscountNotEligible`, `DiscountAlreadyApplied`
    pub async fn apply_discount(
        &self,
        tenant_id: &str,
        sale_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> DbResult<(Sale, SaleDiscount)> {
        debug!(tenant = %tenant_id, sale_id = %sale_id, code = %code, "Applying discount");

        let mut tx = self.pool.begin().await?;
        touch_open_in(&mut tx, tenant_id, sale_id, now).await?;
        let sale = fetch_in(&mut tx, tenant_id, sale_id).await?;

        let definition = catalog::discount_code_in(&mut tx, tenant_id, code)
            .await?
            .ok_or_else(|| CoreError::DiscountNotFound(code.to_string()))?;

        let buyer = match sale.buyer_id.as_deref() {
            Some(buyer_id) => catalog::customer_in(&mut tx, tenant_id, buyer_id).await?,
            None => None,
        };

        let already: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM sale_discounts WHERE sale_id = ?1 AND code = ?2")
                .bind(sale_id)
                .bind(code)
                .fetch_optional(&mut *tx)
                .await?;

        definition.evaluate(buyer.as_ref(), already.is_some(), now)?;

        if !catalog::consume_discount_use_in(&mut tx, tenant_id, code).await? {
            return Err(CoreError::DiscountExhausted(code.to_string()).into());
        }

        let mut discount = SaleDiscount {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.to_string(),
            tenant_id: tenant_id.to_string(),
            code: definition.code.clone(),
            kind: definition.kind,
            value: definition.value,
            amount_cents: definition.amount_for(sale.totals().subtotal).cents(),
            created_at: now,
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO sale_discounts (id, sale_id, tenant_id, code, kind, value, amount_cents, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&discount.id)
        .bind(&discount.sale_id)
        .bind(&discount.tenant_id)
        .bind(&discount.code)
        .bind(discount.kind)
        .bind(discount.value)
        .bind(discount.amount_cents)
        .bind(discount.created_at)
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            let err = DbError::from(err);
            return Err(if err.is_unique_violation() {
                CoreError::DiscountAlreadyApplied(code.to_string()).into()
            } else {
                err
            });
        }

        let recomputed = recompute_in(&mut tx, tenant_id, sale_id).await?;
        if let Some((_, amount)) = recomputed.discount_amounts.iter().find(|(id, _)| *id == discount.id) {
            discount.amount_cents = amount.cents();
        }

        let sale = fetch_in(&mut tx, tenant_id, sale_id).await?;
        tx.commit().await?;

        Ok((sale, discount))
    }

    /// Records a payment. Never retried by callers: it is not idempotent.
    pub async fn add_payment(
        &self,
        tenant_id: &str,
        sale_id: &str,
        method: PaymentMethod,
        amount: Money,
        reference: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<(Sale, Payment)> {
        debug!(tenant = %tenant_id, sale_id = %sale_id, amount = amount.cents(), "Adding payment");

        let mut tx = self.pool.begin().await?;
        touch_open_in(&mut tx, tenant_id, sale_id, now).await?;

        let paid = payments_in(&mut tx, tenant_id, sale_id)
            .await?
            .iter()
            .try_fold(Money::zero(), |paid, p| checked_paid_total(paid, p.amount()))
            .and_then(|paid| checked_paid_total(paid, amount))
            .map_err(CoreError::from)?;
        debug!(sale_id = %sale_id, paid = paid.cents(), "Running paid after payment");

        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.to_string(),
            tenant_id: tenant_id.to_string(),
            method,
            amount_cents: amount.cents(),
            reference: reference.map(str::to_string),
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO payments (id, sale_id, tenant_id, method, amount_cents, reference, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.sale_id)
        .bind(&payment.tenant_id)
        .bind(payment.method)
        .bind(payment.amount_cents)
        .bind(&payment.reference)
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await?;

        let sale = fetch_in(&mut tx, tenant_id, sale_id).await?;
        tx.commit().await?;

        Ok((sale, payment))
    }

    // -------------------------------------------------------------------------
    // Settlement
    // -------------------------------------------------------------------------

    /// Finalizes an OPEN sale in one transaction.
    ///
    /// ```text
    /// touch (OPEN?) → items? → totals → paid ≥ total?
    ///   → stock −qty per SKU   (NegativeStock ⇒ InsufficientStock)
    ///   → per seat: lease under holder token → ticket → release lease
    ///   → FINALIZED
    /// ```
    /// Any error rolls back every decrement and ticket.
    pub async fn finalize(&self, tenant_id: &str, sale_id: &str, actor: &str, now: DateTime<Utc>) -> DbResult<FinalizeReceipt> {
        debug!(tenant = %tenant_id, sale_id = %sale_id, "Finalizing sale");

        let mut tx = self.pool.begin().await?;
        touch_open_in(&mut tx, tenant_id, sale_id, now).await?;
        let sale = fetch_in(&mut tx, tenant_id, sale_id).await?;

        let items = items_in(&mut tx, tenant_id, sale_id).await?;
        if items.is_empty() {
            return Err(CoreError::EmptySale {
                sale_id: sale_id.to_string(),
            }
            .into());
        }

        let totals = recompute_in(&mut tx, tenant_id, sale_id).await?.totals;
        let paid: Money = payments_in(&mut tx, tenant_id, sale_id)
            .await?
            .iter()
            .map(Payment::amount)
            .sum();
        let change = Tender::new(paid, totals.total).settle()?;

        let mut per_sku: BTreeMap<&str, i64> = BTreeMap::new();
        for item in &items {
            if let Some(sku) = item.inventory_sku() {
                *per_sku.entry(sku).or_default() += item.quantity;
            }
        }
        for (sku, quantity) in &per_sku {
            let movement = StockMovement {
                tenant_id,
                sku,
                delta: -quantity,
                reason: AdjustmentReason::Sale,
                actor,
                sale_id: Some(sale_id),
            };
            inventory::adjust_in(&mut tx, &movement, now)
                .await
                .map_err(|err| match err {
                    DbError::Core(core) => DbError::Core(core.into_insufficient_stock(*quantity)),
                    other => other,
                })?;
        }

        let seat_items: Vec<&SaleItem> = items.iter().filter(|item| item.seat().is_some()).collect();
        let lease_expiry = now + Duration::seconds(IMPLICIT_LEASE_SECS);

        let mut conflicts = Vec::new();
        for item in &seat_items {
            let Some((session_id, seat_id)) = item.seat() else { continue };

            let session = catalog::session_in(&mut tx, tenant_id, session_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Session", session_id))?;
            session.ensure_bookable()?;

            let free = !lease::seat_conflicts_in(&mut tx, tenant_id, session_id, seat_id, &sale.holder_token, now).await?
                && lease::acquire_in(&mut tx, tenant_id, session_id, seat_id, &sale.holder_token, now, lease_expiry).await?;
            if !free {
                conflicts.push(seat_id.to_string());
            }
        }
        if !conflicts.is_empty() {
            return Err(CoreError::seats_unavailable(conflicts).into());
        }

        let mut tickets = Vec::with_capacity(seat_items.len());
        for item in &seat_items {
            let Some((session_id, seat_id)) = item.seat() else { continue };

            let ticket = Ticket {
                id: Uuid::new_v4().to_string(),
                tenant_id: tenant_id.to_string(),
                session_id: session_id.to_string(),
                seat_id: seat_id.to_string(),
                sale_id: sale_id.to_string(),
                price_cents: item.unit_price_cents,
                status: TicketStatus::Issued,
                issued_at: now,
                refunded_at: None,
            };
            ticket::issue_in(&mut tx, &ticket).await.map_err(|err| {
                if err.is_unique_violation() {
                    CoreError::seats_unavailable([seat_id]).into()
                } else {
                    err
                }
            })?;
            lease::release_seat_in(&mut tx, tenant_id, session_id, seat_id, &sale.holder_token).await?;
            tickets.push(ticket);
        }

        sqlx::query(
            r#"
            UPDATE sales
            SET status = 'finalized', finalized_at = ?3, updated_at = ?3
            WHERE tenant_id = ?1 AND id = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(sale_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let sale = fetch_in(&mut tx, tenant_id, sale_id).await?;
        tx.commit().await?;

        info!(
            tenant = %tenant_id,
            sale_id = %sale_id,
            total = %totals.total,
            paid = %paid,
            tickets = tickets.len(),
            "Sale finalized"
        );

        Ok(FinalizeReceipt { sale, tickets, change })
    }

    /// Cancels an OPEN sale and releases every lease of its holder token.
    pub async fn cancel(&self, tenant_id: &str, sale_id: &str, reason: &str, now: DateTime<Utc>) -> DbResult<CancelOutcome> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE sales
            SET status = 'canceled', cancel_reason = ?3, updated_at = ?4, version = version + 1
            WHERE tenant_id = ?1 AND id = ?2 AND status = 'open'
            "#,
        )
        .bind(tenant_id)
        .bind(sale_id)
        .bind(reason)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(status_rejection_in(&mut tx, tenant_id, sale_id, SaleStatus::Open).await);
        }

        let sale = fetch_in(&mut tx, tenant_id, sale_id).await?;
        let leases_released = lease::release_token_in(&mut tx, tenant_id, &sale.holder_token).await?;
        tx.commit().await?;

        info!(tenant = %tenant_id, sale_id = %sale_id, leases_released, "Sale canceled");
        Ok(CancelOutcome { sale, leases_released })
    }

    /// Refunds a FINALIZED sale: stock returned, tickets refunded.
    pub async fn refund(
        &self,
        tenant_id: &str,
        sale_id: &str,
        reason: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> DbResult<RefundOutcome> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE sales
            SET status = 'refunded', refund_reason = ?3, updated_at = ?4, version = version + 1
            WHERE tenant_id = ?1 AND id = ?2 AND status = 'finalized'
            "#,
        )
        .bind(tenant_id)
        .bind(sale_id)
        .bind(reason)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(status_rejection_in(&mut tx, tenant_id, sale_id, SaleStatus::Finalized).await);
        }

        let items = items_in(&mut tx, tenant_id, sale_id).await?;
        let mut per_sku: BTreeMap<String, i64> = BTreeMap::new();
        for item in &items {
            if let Some(sku) = item.inventory_sku() {
                *per_sku.entry(sku.to_string()).or_default() += item.quantity;
            }
        }
        for (sku, quantity) in &per_sku {
            let movement = StockMovement {
                tenant_id,
                sku,
                delta: *quantity,
                reason: AdjustmentReason::Refund,
                actor,
                sale_id: Some(sale_id),
            };
            inventory::adjust_in(&mut tx, &movement, now).await?;
        }

        let tickets_refunded = ticket::refund_for_sale_in(&mut tx, tenant_id, sale_id, now).await?;
        let sale = fetch_in(&mut tx, tenant_id, sale_id).await?;
        tx.commit().await?;

        info!(tenant = %tenant_id, sale_id = %sale_id, tickets_refunded, "Sale refunded");
        Ok(RefundOutcome {
            sale,
            tickets_refunded,
            restocked: per_sku.into_iter().collect(),
        })
    }
}

// =============================================================================
// Connection helpers
// =============================================================================

/// Write-first OPEN check: bumps `version` on an OPEN sale, or explains why
/// it could not.
async fn touch_open_in(conn: &mut SqliteConnection, tenant_id: &str, sale_id: &str, now: DateTime<Utc>) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE sales
        SET updated_at = ?3, version = version + 1
        WHERE tenant_id = ?1 AND id = ?2 AND status = 'open'
        "#,
    )
    .bind(tenant_id)
    .bind(sale_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(status_rejection_in(conn, tenant_id, sale_id, SaleStatus::Open).await);
    }
    Ok(())
}

/// Builds the error for a sale that is missing or not in `expected`.
async fn status_rejection_in(conn: &mut SqliteConnection, tenant_id: &str, sale_id: &str, expected: SaleStatus) -> DbError {
    let status: Result<Option<SaleStatus>, sqlx::Error> =
        sqlx::query_scalar("SELECT status FROM sales WHERE tenant_id = ?1 AND id = ?2")
            .bind(tenant_id)
            .bind(sale_id)
            .fetch_optional(&mut *conn)
            .await;

    match status {
        Err(err) => err.into(),
        Ok(None) => CoreError::not_found("Sale", sale_id).into(),
        Ok(Some(status)) if expected == SaleStatus::Finalized => CoreError::SaleNotFinalized {
            sale_id: sale_id.to_string(),
            status: status.to_string(),
        }
        .into(),
        Ok(Some(status)) => CoreError::SaleNotOpen {
            sale_id: sale_id.to_string(),
            status: status.to_string(),
        }
        .into(),
    }
}

async fn find_in(conn: &mut SqliteConnection, tenant_id: &str, sale_id: &str) -> DbResult<Option<Sale>> {
    let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE tenant_id = ?1 AND id = ?2");
    let sale = sqlx::query_as::<_, Sale>(&sql)
        .bind(tenant_id)
        .bind(sale_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(sale)
}

async fn fetch_in(conn: &mut SqliteConnection, tenant_id: &str, sale_id: &str) -> DbResult<Sale> {
    find_in(conn, tenant_id, sale_id)
        .await?
        .ok_or_else(|| CoreError::not_found("Sale", sale_id).into())
}

async fn items_in(conn: &mut SqliteConnection, tenant_id: &str, sale_id: &str) -> DbResult<Vec<SaleItem>> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM sale_items WHERE tenant_id = ?1 AND sale_id = ?2 ORDER BY created_at, rowid"
    );
    let items = sqlx::query_as::<_, SaleItem>(&sql)
        .bind(tenant_id)
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(items)
}

async fn discounts_in(conn: &mut SqliteConnection, tenant_id: &str, sale_id: &str) -> DbResult<Vec<SaleDiscount>> {
    let discounts = sqlx::query_as::<_, SaleDiscount>(
        r#"
        SELECT id, sale_id, tenant_id, code, kind, value, amount_cents, created_at
        FROM sale_discounts
        WHERE tenant_id = ?1 AND sale_id = ?2
        ORDER BY created_at, rowid
        "#,
    )
    .bind(tenant_id)
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(discounts)
}

async fn payments_in(conn: &mut SqliteConnection, tenant_id: &str, sale_id: &str) -> DbResult<Vec<Payment>> {
    let payments = sqlx::query_as::<_, Payment>(
        r#"
        SELECT id, sale_id, tenant_id, method, amount_cents, reference, created_at
        FROM payments
        WHERE tenant_id = ?1 AND sale_id = ?2
        ORDER BY created_at, rowid
        "#,
    )
    .bind(tenant_id)
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(payments)
}

/// Recomputes totals from the current rows and writes them back, along
/// with each discount's amount against the new subtotal.
async fn recompute_in(conn: &mut SqliteConnection, tenant_id: &str, sale_id: &str) -> DbResult<Recomputed> {
    let items = items_in(conn, tenant_id, sale_id).await?;
    let discounts = discounts_in(conn, tenant_id, sale_id).await?;
    let recomputed = SaleTotals::compute(&items, &discounts);

    for (discount_id, amount) in &recomputed.discount_amounts {
        sqlx::query("UPDATE sale_discounts SET amount_cents = ?1 WHERE id = ?2")
            .bind(amount.cents())
            .bind(discount_id)
            .execute(&mut *conn)
            .await?;
    }

    let totals = recomputed.totals;
    sqlx::query(
        r#"
        UPDATE sales
        SET subtotal_cents = ?3, discount_cents = ?4, tax_cents = ?5, total_cents = ?6
        WHERE tenant_id = ?1 AND id = ?2
        "#,
    )
    .bind(tenant_id)
    .bind(sale_id)
    .bind(totals.subtotal.cents())
    .bind(totals.discount.cents())
    .bind(totals.tax.cents())
    .bind(totals.total.cents())
    .execute(&mut *conn)
    .await?;

    Ok(recomputed)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::test_support::{seed_session, seed_stock, TENANT};

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_session(&db, TENANT, "S1", &["A1", "A2"]).await;
        seed_stock(&db, TENANT, "POPCORN-L", 3, 1).await;
        db
    }

    async fn open(db: &Database) -> Sale {
        db.sales().open(TENANT, "cashier-1", None, "tok-1", Utc::now()).await.unwrap()
    }

    #[tokio::test]
    async fn test_totals_follow_items() {
        let db = setup().await;
        let sales = db.sales();
        let sale = open(&db).await;
        let now = Utc::now();

        let (after_add, popcorn) = sales
            .add_item(TENANT, &sale.id, &NewSaleItem::inventory("POPCORN-L", "Popcorn", 2, Money::from_cents(650)), now)
            .await
            .unwrap();
        assert_eq!(after_add.subtotal_cents, 1300);
        assert_eq!(after_add.total_cents, 1300);

        let after_remove = sales.remove_item(TENANT, &sale.id, &popcorn.id, now).await.unwrap();
        assert_eq!(after_remove.subtotal_cents, 0);
        assert_eq!(after_remove.total_cents, 0);
        assert!(after_remove.version > after_add.version);
    }

    #[tokio::test]
    async fn test_add_item_checks_stock_across_lines() {
        let db = setup().await;
        let sales = db.sales();
        let sale = open(&db).await;
        let now = Utc::now();
        let popcorn = NewSaleItem::inventory("POPCORN-L", "Popcorn", 2, Money::from_cents(650));

        sales.add_item(TENANT, &sale.id, &popcorn, now).await.unwrap();
        let err = sales.add_item(TENANT, &sale.id, &popcorn, now).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InsufficientStock { available: 3, requested: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_same_seat_twice_on_one_sale() {
        let db = setup().await;
        let sales = db.sales();
        let sale = open(&db).await;
        let now = Utc::now();
        let ticket = NewSaleItem::ticket("S1", "A1", "Adult", Money::from_cents(1200));

        sales.add_item(TENANT, &sale.id, &ticket, now).await.unwrap();
        let err = sales.add_item(TENANT, &sale.id, &ticket, now).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::SeatUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_finalize_issues_tickets_and_decrements() {
        let db = setup().await;
        let sales = db.sales();
        let sale = open(&db).await;
        let now = Utc::now();

        sales
            .add_item(TENANT, &sale.id, &NewSaleItem::ticket("S1", "A1", "Adult", Money::from_cents(1200)), now)
            .await
            .unwrap();
        sales
            .add_item(TENANT, &sale.id, &NewSaleItem::inventory("POPCORN-L", "Popcorn", 1, Money::from_cents(650)), now)
            .await
            .unwrap();
        sales
            .add_payment(TENANT, &sale.id, PaymentMethod::Cash, Money::from_cents(2000), None, now)
            .await
            .unwrap();

        let receipt = sales.finalize(TENANT, &sale.id, "cashier-1", now).await.unwrap();
        assert_eq!(receipt.sale.status, SaleStatus::Finalized);
        assert_eq!(receipt.change.cents(), 150);
        assert_eq!(receipt.tickets.len(), 1);
        assert_eq!(db.inventory().get(TENANT, "POPCORN-L").await.unwrap().unwrap().on_hand, 2);
        assert!(db.leases().leases_for(TENANT, "tok-1", now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_finalize_leaves_no_trace() {
        let db = setup().await;
        let sales = db.sales();
        let now = Utc::now();

        // Another sale holds A2 by ticket
        let other = open(&db).await;
        sales
            .add_item(TENANT, &other.id, &NewSaleItem::ticket("S1", "A2", "Adult", Money::zero()), now)
            .await
            .unwrap();

        let sale = db.sales().open(TENANT, "cashier-2", None, "tok-2", now).await.unwrap();
        sales
            .add_item(TENANT, &sale.id, &NewSaleItem::inventory("POPCORN-L", "Popcorn", 1, Money::zero()), now)
            .await
            .unwrap();
        sales
            .add_item(TENANT, &sale.id, &NewSaleItem::ticket("S1", "A2", "Adult", Money::zero()), now)
            .await
            .unwrap();

        sales.finalize(TENANT, &other.id, "cashier-1", now).await.unwrap();

        let err = sales.finalize(TENANT, &sale.id, "cashier-2", now).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::SeatUnavailable { .. })));

        // Popcorn decrement rolled back, sale still open
        assert_eq!(db.inventory().get(TENANT, "POPCORN-L").await.unwrap().unwrap().on_hand, 3);
        assert_eq!(sales.get(TENANT, &sale.id).await.unwrap().unwrap().status, SaleStatus::Open);
    }

    #[tokio::test]
    async fn test_cancel_then_refund_rejected() {
        let db = setup().await;
        let sales = db.sales();
        let sale = open(&db).await;
        let now = Utc::now();

        let outcome = sales.cancel(TENANT, &sale.id, "customer left", now).await.unwrap();
        assert_eq!(outcome.sale.status, SaleStatus::Canceled);
        assert_eq!(outcome.sale.cancel_reason.as_deref(), Some("customer left"));

        let err = sales.refund(TENANT, &sale.id, "oops", "manager", now).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::SaleNotFinalized { .. })));

        let err = sales.cancel(TENANT, &sale.id, "again", now).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::SaleNotOpen { .. })));
    }

    #[tokio::test]
    async fn test_unknown_sale_is_not_found() {
        let db = setup().await;
        let err = db
            .sales()
            .add_payment(TENANT, "missing", PaymentMethod::Card, Money::from_cents(100), None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::NotFound { .. })));
    }
}
