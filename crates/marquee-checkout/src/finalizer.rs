//! # Sale Finalizer
//!
//! Settles sales: finalize, cancel and refund. Each is one store
//! transaction guarded by a status check, so each may be retried on a
//! transient error without double-applying.
//!
//! ```text
//!            finalize               refund
//!   OPEN ─────────────► FINALIZED ─────────► REFUNDED
//!     │
//!     └── cancel ─────► CANCELED
//! ```
//!
//! Cancel and refund emit an [`AuditEvent`] once committed.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use marquee_core::validation::validate_reason;
use marquee_core::{Clock, FinalizeReceipt, ValidationError};
use marquee_db::{CancelOutcome, Database, RefundOutcome};

use crate::audit::{AuditAction, AuditEvent, AuditSink};
use crate::error::CheckoutResult;
use crate::retry::RetryPolicy;

#[derive(Clone)]
pub struct SaleFinalizer {
    db: Database,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    audit: Arc<dyn AuditSink>,
}

impl SaleFinalizer {
    pub fn new(db: Database, clock: Arc<dyn Clock>, retry: RetryPolicy, audit: Arc<dyn AuditSink>) -> Self {
        SaleFinalizer {
            db,
            clock,
            retry,
            audit,
        }
    }

    /// Finalizes an OPEN sale: stock decremented, tickets issued, seat leases
    /// of the sale released. All or nothing.
    ///
    /// ## Errors
    /// - `EmptySale`, `InsufficientPayment` (with shortfall)
    /// - `InsufficientStock` when a decrement would go negative
    /// - `SeatUnavailable` when another token holds or bought a seat
    /// - `SaleNotOpen`, `NotFound`
    pub async fn finalize(&self, tenant_id: &str, sale_id: &str, actor: &str) -> CheckoutResult<FinalizeReceipt> {
        require_actor(actor)?;

        self.retry
            .run("finalize", || async move {
                Ok(self.db.sales().finalize(tenant_id, sale_id, actor, self.clock.now()).await?)
            })
            .await
    }

    /// Cancels an OPEN sale and releases its seat leases.
    pub async fn cancel(&self, tenant_id: &str, sale_id: &str, reason: &str, actor: &str) -> CheckoutResult<CancelOutcome> {
        validate_reason(reason)?;
        require_actor(actor)?;

        let outcome = self
            .retry
            .run("cancel", || async move {
                Ok(self.db.sales().cancel(tenant_id, sale_id, reason, self.clock.now()).await?)
            })
            .await?;

        self.audit.record(&AuditEvent {
            action: AuditAction::CancelSale,
            tenant_id: tenant_id.to_string(),
            actor: actor.to_string(),
            sale_id: sale_id.to_string(),
            reason: reason.to_string(),
            at: outcome.sale.updated_at,
            details: json!({ "leases_released": outcome.leases_released }),
        });

        Ok(outcome)
    }

    /// Refunds a FINALIZED sale. Stock comes back, tickets are voided and
    /// their seats become sellable again.
    pub async fn refund(&self, tenant_id: &str, sale_id: &str, reason: &str, actor: &str) -> CheckoutResult<RefundOutcome> {
        validate_reason(reason)?;
        require_actor(actor)?;

        let outcome = self
            .retry
            .run("refund", || async move {
                Ok(self
                    .db
                    .sales()
                    .refund(tenant_id, sale_id, reason, actor, self.clock.now())
                    .await?)
            })
            .await?;

        info!(
            tenant = %tenant_id,
            sale_id = %sale_id,
            total = %outcome.sale.total(),
            "Refund recorded"
        );

        let restocked: serde_json::Map<String, serde_json::Value> = outcome
            .restocked
            .iter()
            .map(|(sku, quantity)| (sku.clone(), json!(quantity)))
            .collect();

        self.audit.record(&AuditEvent {
            action: AuditAction::RefundSale,
            tenant_id: tenant_id.to_string(),
            actor: actor.to_string(),
            sale_id: sale_id.to_string(),
            reason: reason.to_string(),
            at: outcome.sale.updated_at,
            details: json!({
                "tickets_refunded": outcome.tickets_refunded,
                "restocked": restocked,
            }),
        });

        Ok(outcome)
    }
}

fn require_actor(actor: &str) -> Result<(), ValidationError> {
    if actor.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "actor".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use marquee_core::{CoreError, ManualClock, Money, NewSaleItem, PaymentMethod, SaleStatus, Session, SessionStatus};
    use marquee_db::{DbConfig, StockMovement};

    use crate::audit::MemoryAuditSink;
    use crate::error::CheckoutError;
    use crate::sales::SaleService;

    struct Fixture {
        sales: SaleService,
        finalizer: SaleFinalizer,
        audit: Arc<MemoryAuditSink>,
        db: Database,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc.with_ymd_and_hms(2030, 5, 10, 17, 0, 0).unwrap();

        db.catalog()
            .insert_session(&Session {
                id: "S1".into(),
                tenant_id: "t1".into(),
                room_id: "R1".into(),
                title: "Matinee".into(),
                starts_at: now + Duration::hours(1),
                ends_at: now + Duration::hours(3),
                status: SessionStatus::Scheduled,
            })
            .await
            .unwrap();
        db.catalog().insert_seats("t1", "R1", &["A1", "A2"]).await.unwrap();
        db.inventory().create_item("t1", "NACHOS", "Nachos", 1, now).await.unwrap();
        db.inventory()
            .adjust(
                &StockMovement {
                    tenant_id: "t1",
                    sku: "NACHOS",
                    delta: 4,
                    reason: marquee_core::AdjustmentReason::Restock,
                    actor: "seed",
                    sale_id: None,
                },
                now,
            )
            .await
            .unwrap();

        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(now));
        let audit = Arc::new(MemoryAuditSink::new());
        Fixture {
            sales: SaleService::new(db.clone(), clock.clone()),
            finalizer: SaleFinalizer::new(db.clone(), clock, RetryPolicy::default(), audit.clone()),
            audit,
            db,
        }
    }

    #[tokio::test]
    async fn test_refund_records_audit_event() {
        let f = fixture().await;
        let sale = f.sales.open("t1", "cashier", None).await.unwrap();
        f.sales
            .add_item("t1", &sale.id, &NewSaleItem::ticket("S1", "A1", "Adult", Money::from_cents(1200)))
            .await
            .unwrap();
        f.sales
            .add_item("t1", &sale.id, &NewSaleItem::inventory("NACHOS", "Nachos", 2, Money::from_cents(600)))
            .await
            .unwrap();
        f.sales
            .add_payment("t1", &sale.id, PaymentMethod::Card, Money::from_cents(2400), Some("AUTH-1"))
            .await
            .unwrap();

        let receipt = f.finalizer.finalize("t1", &sale.id, "cashier").await.unwrap();
        assert_eq!(receipt.tickets.len(), 1);
        assert_eq!(f.db.inventory().get("t1", "NACHOS").await.unwrap().unwrap().on_hand, 2);

        let outcome = f.finalizer.refund("t1", &sale.id, "projector failure", "manager").await.unwrap();
        assert_eq!(outcome.sale.status, SaleStatus::Refunded);
        assert_eq!(outcome.tickets_refunded, 1);
        assert_eq!(f.db.inventory().get("t1", "NACHOS").await.unwrap().unwrap().on_hand, 4);

        let events = f.audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::RefundSale);
        assert_eq!(events[0].details["tickets_refunded"], 1);
        assert_eq!(events[0].details["restocked"]["NACHOS"], 2);
    }

    #[tokio::test]
    async fn test_cancel_releases_leases_and_audits() {
        let f = fixture().await;
        let sale = f.sales.open("t1", "cashier", None).await.unwrap();
        f.db.leases()
            .reserve(
                "t1",
                "S1",
                &["A1".to_string(), "A2".to_string()],
                &sale.holder_token,
                sale.created_at,
                sale.created_at + Duration::minutes(10),
            )
            .await
            .unwrap();

        let outcome = f.finalizer.cancel("t1", &sale.id, "customer left", "cashier").await.unwrap();
        assert_eq!(outcome.leases_released, 2);
        assert_eq!(outcome.sale.cancel_reason.as_deref(), Some("customer left"));

        let events = f.audit.events();
        assert_eq!(events[0].action, AuditAction::CancelSale);
        assert_eq!(events[0].details["leases_released"], 2);
    }

    #[tokio::test]
    async fn test_failed_operations_are_not_audited() {
        let f = fixture().await;
        let sale = f.sales.open("t1", "cashier", None).await.unwrap();

        let err = f.finalizer.refund("t1", &sale.id, "oops", "manager").await.unwrap_err();
        assert!(matches!(err, CheckoutError::Rejected(CoreError::SaleNotFinalized { .. })));

        let err = f.finalizer.cancel("t1", &sale.id, "  ", "manager").await.unwrap_err();
        assert!(matches!(err, CheckoutError::Rejected(CoreError::Validation(_))));

        assert!(f.audit.events().is_empty());
    }

    #[tokio::test]
    async fn test_empty_sale_cannot_finalize() {
        let f = fixture().await;
        let sale = f.sales.open("t1", "cashier", None).await.unwrap();
        let err = f.finalizer.finalize("t1", &sale.id, "cashier").await.unwrap_err();
        assert!(matches!(err, CheckoutError::Rejected(CoreError::EmptySale { .. })));
    }
}
