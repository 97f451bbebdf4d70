//! # Sale Totals
//!
//! Totals are a pure function of the current items and discounts. The store
//! persists them as a cache, rewritten from scratch in every transaction
//! that touches items or discounts, so concurrent double-clicks converge on
//! the same numbers instead of adding deltas twice.
//!
//! ```text
//!   items ──► subtotal = Σ unit_price × qty
//!         ──► tax      = Σ tax(line_total, line.rate)
//!   discounts (rules) ──► discount = Σ amount(rule, subtotal), ≤ subtotal
//!
//!   total = max(0, subtotal − discount + tax)
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{DiscountKind, SaleDiscount, SaleItem};

/// Full percentage in basis points.
const FULL_BPS: i64 = 10_000;

/// The four stored totals of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

/// Totals plus the per-discount amounts that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recomputed {
    pub totals: SaleTotals,
    /// `(sale_discount.id, amount)` in the order the discounts were given.
    pub discount_amounts: Vec<(String, Money)>,
}

/// Amount one discount rule takes off `subtotal`.
///
/// Percent rules are clamped to 0..=100%, fixed rules to the subtotal.
pub fn discount_amount(kind: DiscountKind, value: i64, subtotal: Money) -> Money {
    let subtotal = subtotal.clamp_non_negative();
    match kind {
        DiscountKind::Percent => subtotal.portion_bps(value.clamp(0, FULL_BPS) as u32),
        DiscountKind::Fixed => Money::from_cents(value).clamp_non_negative().min(subtotal),
    }
}

impl SaleTotals {
    /// Recomputes totals from scratch.
    ///
    /// Discounts are applied in order; once their running sum reaches the
    /// subtotal, later ones contribute zero.
    pub fn compute(items: &[SaleItem], discounts: &[SaleDiscount]) -> Recomputed {
        let subtotal: Money = items
            .iter()
            .map(|item| item.line_total())
            .sum::<Money>()
            .clamp_non_negative();

        let tax: Money = items
            .iter()
            .map(|item| item.line_total().calculate_tax(item.tax_rate()))
            .sum();

        let mut discount = Money::zero();
        let mut discount_amounts = Vec::with_capacity(discounts.len());
        for d in discounts {
            let headroom = (subtotal - discount).clamp_non_negative();
            let amount = discount_amount(d.kind, d.value, subtotal).min(headroom);
            discount += amount;
            discount_amounts.push((d.id.clone(), amount));
        }

        let total = (subtotal - discount + tax).clamp_non_negative();

        Recomputed {
            totals: SaleTotals {
                subtotal,
                discount,
                tax,
                total,
            },
            discount_amounts,
        }
    }
}

/// Payments held against a grand total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tender {
    pub paid: Money,
    pub total: Money,
}

impl Tender {
    pub fn new(paid: Money, total: Money) -> Self {
        Self { paid, total }
    }

    /// Still owed, never negative.
    pub fn remaining(&self) -> Money {
        (self.total - self.paid).clamp_non_negative()
    }

    /// Due back, never negative.
    pub fn change(&self) -> Money {
        (self.paid - self.total).clamp_non_negative()
    }

    /// Returns the change, or `InsufficientPayment` with the shortfall.
    pub fn settle(&self) -> CoreResult<Money> {
        if self.paid < self.total {
            return Err(CoreError::InsufficientPayment {
                total: self.total,
                paid: self.paid,
                shortfall: self.remaining(),
            });
        }
        Ok(self.change())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SaleItemKind;
    use chrono::Utc;

    fn item(price: i64, qty: i64, tax_bps: u32) -> SaleItem {
        SaleItem {
            id: format!("item-{price}-{qty}"),
            sale_id: "sale-1".into(),
            tenant_id: "t1".into(),
            kind: SaleItemKind::Service,
            description: "line".into(),
            sku: None,
            session_id: None,
            seat_id: None,
            quantity: qty,
            unit_price_cents: price,
            tax_rate_bps: tax_bps,
            line_total_cents: price * qty,
            created_at: Utc::now(),
        }
    }

    fn discount(id: &str, kind: DiscountKind, value: i64) -> SaleDiscount {
        SaleDiscount {
            id: id.into(),
            sale_id: "sale-1".into(),
            tenant_id: "t1".into(),
            code: id.to_uppercase(),
            kind,
            value,
            amount_cents: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_sale_is_zero() {
        let r = SaleTotals::compute(&[], &[]);
        assert_eq!(r.totals, SaleTotals::default());
    }

    #[test]
    fn test_subtotal_tax_and_total() {
        let items = [item(1250, 2, 0), item(625, 1, 1000)];
        let r = SaleTotals::compute(&items, &[]);
        assert_eq!(r.totals.subtotal.cents(), 3125);
        // 10% of 6.25 = 0.625 -> 0.63
        assert_eq!(r.totals.tax.cents(), 63);
        assert_eq!(r.totals.total.cents(), 3188);
    }

    #[test]
    fn test_percent_discount_uses_current_subtotal() {
        let items = [item(5000, 1, 0)];
        let r = SaleTotals::compute(&items, &[discount("d1", DiscountKind::Percent, 2000)]);
        assert_eq!(r.totals.discount.cents(), 1000);
        assert_eq!(r.totals.total.cents(), 4000);
        assert_eq!(r.discount_amounts, vec![("d1".to_string(), Money::from_cents(1000))]);

        // Same rule after the subtotal drops
        let r = SaleTotals::compute(&[item(2500, 1, 0)], &[discount("d1", DiscountKind::Percent, 2000)]);
        assert_eq!(r.totals.discount.cents(), 500);
    }

    #[test]
    fn test_fixed_discount_capped_at_subtotal() {
        let items = [item(800, 1, 0)];
        let r = SaleTotals::compute(&items, &[discount("d1", DiscountKind::Fixed, 1000)]);
        assert_eq!(r.totals.discount.cents(), 800);
        assert_eq!(r.totals.total, Money::zero());
    }

    #[test]
    fn test_stacked_discounts_never_exceed_subtotal() {
        let items = [item(1000, 1, 1000)];
        let r = SaleTotals::compute(
            &items,
            &[
                discount("d1", DiscountKind::Fixed, 700),
                discount("d2", DiscountKind::Percent, 5000),
            ],
        );
        assert_eq!(r.totals.discount.cents(), 1000);
        assert_eq!(r.discount_amounts[1].1.cents(), 300);
        // Tax is charged on the undiscounted lines
        assert_eq!(r.totals.total.cents(), 100);
    }

    #[test]
    fn test_grand_total_identity_holds() {
        let items = [item(999, 3, 825), item(150, 7, 0)];
        let discounts = [discount("d1", DiscountKind::Percent, 1500)];
        let t = SaleTotals::compute(&items, &discounts).totals;
        assert_eq!(t.total, (t.subtotal - t.discount + t.tax).clamp_non_negative());
    }

    #[test]
    fn test_tender_shortfall() {
        let err = Tender::new(Money::from_cents(3000), Money::from_cents(5000))
            .settle()
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::InsufficientPayment {
                total: Money::from_cents(5000),
                paid: Money::from_cents(3000),
                shortfall: Money::from_cents(2000),
            }
        );
    }

    #[test]
    fn test_tender_change() {
        let tender = Tender::new(Money::from_cents(6000), Money::from_cents(5000));
        assert_eq!(tender.settle().unwrap().cents(), 1000);
        assert_eq!(tender.remaining(), Money::zero());
        assert_eq!(Tender::new(Money::zero(), Money::zero()).settle().unwrap(), Money::zero());
    }
}
