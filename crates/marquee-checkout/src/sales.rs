//! # Sale Service
//!
//! Building an OPEN sale: lines, discounts, payments. Settlement lives in
//! [`crate::finalizer`].
//!
//! None of these operations are retried. A retried AddItem or AddPayment
//! after an ambiguous failure could record the line or the money twice.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use marquee_core::validation::{validate_discount_code, validate_new_item, validate_payment_amount};
use marquee_core::{
    Clock, CoreError, Money, NewSaleItem, Payment, PaymentMethod, Sale, SaleDetails, SaleDiscount, SaleItem, Ticket,
    ValidationError,
};
use marquee_db::Database;

use crate::error::CheckoutResult;

/// A line was added.
#[derive(Debug, Clone, Serialize)]
pub struct LineAdded {
    pub sale: Sale,
    pub item: SaleItem,
}

/// A discount was applied.
#[derive(Debug, Clone, Serialize)]
pub struct DiscountApplied {
    pub sale: Sale,
    pub discount: SaleDiscount,
}

/// A payment was recorded, with the balance after it.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentAdded {
    pub sale: Sale,
    pub payment: Payment,
    pub paid: Money,
    pub remaining: Money,
    pub change: Money,
}

#[derive(Clone)]
pub struct SaleService {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl SaleService {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        SaleService { db, clock }
    }

    /// Opens a sale with a fresh holder token.
    ///
    /// Seats reserved under a different token are not visible to this sale;
    /// use [`SaleService::open_with_token`] to continue a reservation.
    pub async fn open(&self, tenant_id: &str, cashier_id: &str, buyer_id: Option<&str>) -> CheckoutResult<Sale> {
        let token = Uuid::new_v4().to_string();
        self.open_with_token(tenant_id, cashier_id, buyer_id, &token).await
    }

    /// Opens a sale that inherits the seats `holder_token` already leases.
    pub async fn open_with_token(
        &self,
        tenant_id: &str,
        cashier_id: &str,
        buyer_id: Option<&str>,
        holder_token: &str,
    ) -> CheckoutResult<Sale> {
        if cashier_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "cashier_id".to_string(),
            }
            .into());
        }
        marquee_core::validation::validate_holder_token(holder_token)?;

        Ok(self
            .db
            .sales()
            .open(tenant_id, cashier_id, buyer_id, holder_token, self.clock.now())
            .await?)
    }

    pub async fn add_item(&self, tenant_id: &str, sale_id: &str, item: &NewSaleItem) -> CheckoutResult<LineAdded> {
        validate_new_item(item)?;
        debug!(tenant = %tenant_id, sale_id = %sale_id, kind = ?item.kind(), "add_item");

        let (sale, item) = self.db.sales().add_item(tenant_id, sale_id, item, self.clock.now()).await?;
        Ok(LineAdded { sale, item })
    }

    pub async fn remove_item(&self, tenant_id: &str, sale_id: &str, item_id: &str) -> CheckoutResult<Sale> {
        if item_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "item_id".to_string(),
            }
            .into());
        }
        Ok(self.db.sales().remove_item(tenant_id, sale_id, item_id, self.clock.now()).await?)
    }

    pub async fn apply_discount(&self, tenant_id: &str, sale_id: &str, code: &str) -> CheckoutResult<DiscountApplied> {
        validate_discount_code(code)?;
        let (sale, discount) = self.db.sales().apply_discount(tenant_id, sale_id, code, self.clock.now()).await?;
        Ok(DiscountApplied { sale, discount })
    }

    pub async fn add_payment(
        &self,
        tenant_id: &str,
        sale_id: &str,
        method: PaymentMethod,
        amount: Money,
        reference: Option<&str>,
    ) -> CheckoutResult<PaymentAdded> {
        validate_payment_amount(amount.cents())?;

        let (sale, payment) = self
            .db
            .sales()
            .add_payment(tenant_id, sale_id, method, amount, reference, self.clock.now())
            .await?;
        let details = self.db.sales().details(tenant_id, sale_id).await?;

        Ok(PaymentAdded {
            sale,
            payment,
            paid: details.paid,
            remaining: details.remaining,
            change: details.change,
        })
    }

    /// Sale with lines, discounts, payments and balance.
    pub async fn get(&self, tenant_id: &str, sale_id: &str) -> CheckoutResult<SaleDetails> {
        Ok(self.db.sales().details(tenant_id, sale_id).await?)
    }

    pub async fn tickets_for_sale(&self, tenant_id: &str, sale_id: &str) -> CheckoutResult<Vec<Ticket>> {
        if self.db.sales().get(tenant_id, sale_id).await?.is_none() {
            return Err(CoreError::not_found("Sale", sale_id).into());
        }
        Ok(self.db.tickets().for_sale(tenant_id, sale_id).await?)
    }
}
