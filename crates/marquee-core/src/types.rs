//! # Domain Types
//!
//! Core domain types for the checkout engine.
//!
//! ## Entity Relationships
//! ```text
//! ┌──────────────┐        ┌──────────────┐        ┌──────────────┐
//! │   Session    │ 1    * │  SeatLease   │        │ InventoryItem│
//! │──────────────│◄───────│──────────────│        │──────────────│
//! │ room_id      │        │ seat_id      │        │ sku          │
//! │ status       │        │ holder_token │        │ on_hand      │
//! └──────┬───────┘        │ expires_at   │        │ reorder_level│
//!        │ 1              └──────────────┘        └──────┬───────┘
//!        │                                               │ 1
//!        │ *                                             │ *
//! ┌──────┴───────┐  *   1 ┌──────────────┐        ┌──────┴───────┐
//! │    Ticket    │───────►│     Sale     │◄───────│  Adjustment  │
//! │──────────────│        │──────────────│  0..1  │──────────────│
//! │ seat_id      │        │ status       │        │ delta        │
//! │ status       │        │ holder_token │        │ reason       │
//! └──────────────┘        │ totals       │        └──────────────┘
//!                         └──────┬───────┘
//!                  ┌─────────────┼─────────────┐
//!                  │ *           │ *           │ *
//!           ┌──────┴─────┐ ┌─────┴──────┐ ┌────┴───────┐
//!           │  SaleItem  │ │SaleDiscount│ │  Payment   │
//!           └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! Every entity carries `tenant_id`; nothing is ever looked up without it.
//! Monetary fields are stored as `_cents` integers and exposed as [`Money`]
//! through accessor methods.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::totals::SaleTotals;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%. Concessions at 8.25% are `TaxRate::from_bps(825)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

// =============================================================================
// Sessions, Seats, Customers (read-only to the engine)
// =============================================================================

/// Screening status. Only `Scheduled` sessions accept reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Canceled,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Canceled => "canceled",
            SessionStatus::Completed => "completed",
        }
    }
}

/// A scheduled screening in a room.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Session {
    pub id: String,
    pub tenant_id: String,
    pub room_id: String,
    pub title: String,
    #[ts(as = "String")]
    pub starts_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub ends_at: DateTime<Utc>,
    pub status: SessionStatus,
}

impl Session {
    #[inline]
    pub fn is_bookable(&self) -> bool {
        self.status == SessionStatus::Scheduled
    }

    /// Fails `SessionNotBookable` unless the session is scheduled.
    pub fn ensure_bookable(&self) -> CoreResult<()> {
        if self.is_bookable() {
            Ok(())
        } else {
            Err(CoreError::SessionNotBookable {
                session_id: self.id.clone(),
                status: self.status.as_str().to_string(),
            })
        }
    }
}

/// A buyer reference. Birth date drives age-restricted discount codes.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    #[ts(as = "Option<String>")]
    pub birth_date: Option<NaiveDate>,
}

impl Customer {
    /// Age in whole years on `on`, if the birth date is known.
    pub fn age_on(&self, on: NaiveDate) -> Option<i64> {
        let born = self.birth_date?;
        let mut age = i64::from(on.year() - born.year());
        if (on.month(), on.day()) < (born.month(), born.day()) {
            age -= 1;
        }
        Some(age)
    }
}

// =============================================================================
// Seat Leases & Tickets
// =============================================================================

/// A time-boxed exclusive hold on a (session, seat) pair.
///
/// Not an ownership record: once `expires_at` passes the hold blocks nobody,
/// whether or not the reaper has deleted it yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SeatLease {
    pub tenant_id: String,
    pub session_id: String,
    pub seat_id: String,
    pub holder_token: String,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
}

impl SeatLease {
    /// A lease is live while `expires_at` is strictly in the future.
    #[inline]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Result of a successful `Reserve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LeaseGrant {
    pub session_id: String,
    pub holder_token: String,
    pub granted: Vec<String>,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Issued,
    /// Seat is sellable again; the row is kept for history.
    Refunded,
}

/// A permanent admission record, created only by Finalize.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Ticket {
    pub id: String,
    pub tenant_id: String,
    pub session_id: String,
    pub seat_id: String,
    pub sale_id: String,
    pub price_cents: i64,
    pub status: TicketStatus,
    #[ts(as = "String")]
    pub issued_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Ticket {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

/// Occupancy of one seat as seen by a seat map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SeatState {
    Available,
    Held,
    Sold,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SeatAvailability {
    pub seat_id: String,
    pub state: SeatState,
    /// Expiry of the live hold when `state` is `Held`.
    #[ts(as = "Option<String>")]
    pub held_until: Option<DateTime<Utc>>,
}

// =============================================================================
// Inventory
// =============================================================================

/// Stock for one SKU. On-hand only ever changes through adjustments.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryItem {
    pub tenant_id: String,
    pub sku: String,
    pub name: String,
    pub on_hand: i64,
    pub reorder_level: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Derived, never stored.
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.on_hand <= self.reorder_level
    }

    #[inline]
    pub fn can_supply(&self, quantity: i64) -> bool {
        self.on_hand >= quantity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    Sale,
    Refund,
    Restock,
    Correction,
}

impl AdjustmentReason {
    /// Reasons a person may record directly. `Sale` and `Refund` rows are
    /// written only by finalize and refund, with the sale id attached.
    pub const fn is_manual(&self) -> bool {
        matches!(self, AdjustmentReason::Restock | AdjustmentReason::Correction)
    }
}

impl fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdjustmentReason::Sale => "sale",
            AdjustmentReason::Refund => "refund",
            AdjustmentReason::Restock => "restock",
            AdjustmentReason::Correction => "correction",
        };
        f.write_str(s)
    }
}

/// Append-only ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryAdjustment {
    pub id: String,
    pub tenant_id: String,
    pub sku: String,
    pub delta: i64,
    pub reason: AdjustmentReason,
    pub actor: String,
    pub sale_id: Option<String>,
    /// On-hand immediately after this adjustment.
    pub resulting_qty: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sale Status
// =============================================================================

/// Sale lifecycle.
///
/// ```text
///            ┌───────────┐   Refund   ┌──────────┐
///      ┌────►│ FINALIZED │───────────►│ REFUNDED │ (terminal)
///      │     └───────────┘            └──────────┘
/// ┌────┴─┐
/// │ OPEN │
/// └────┬─┘
///      │     ┌───────────┐
///      └────►│ CANCELED  │ (terminal)
///            └───────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Items, discounts and payments may change.
    #[default]
    Open,
    /// Paid, stock decremented, tickets issued.
    Finalized,
    Canceled,
    Refunded,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Open => "open",
            SaleStatus::Finalized => "finalized",
            SaleStatus::Canceled => "canceled",
            SaleStatus::Refunded => "refunded",
        }
    }

    /// No transition leaves a terminal state.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SaleStatus::Canceled | SaleStatus::Refunded)
    }

    pub fn can_transition_to(&self, next: SaleStatus) -> bool {
        matches!(
            (self, next),
            (SaleStatus::Open, SaleStatus::Finalized)
                | (SaleStatus::Open, SaleStatus::Canceled)
                | (SaleStatus::Finalized, SaleStatus::Refunded)
        )
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Sale
// =============================================================================

/// The sale aggregate root.
///
/// Totals are a cache of [`SaleTotals::compute`] over the current items and
/// discounts, rewritten inside every mutating transaction.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub tenant_id: String,
    pub cashier_id: String,
    pub buyer_id: Option<String>,
    /// Links the sale to the seat leases taken on its behalf.
    pub holder_token: String,
    pub status: SaleStatus,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub cancel_reason: Option<String>,
    pub refund_reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub finalized_at: Option<DateTime<Utc>>,
    /// Bumped by every write to the sale row.
    pub version: i64,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    pub fn totals(&self) -> SaleTotals {
        SaleTotals {
            subtotal: Money::from_cents(self.subtotal_cents),
            discount: Money::from_cents(self.discount_cents),
            tax: Money::from_cents(self.tax_cents),
            total: Money::from_cents(self.total_cents),
        }
    }

    /// Fails `SaleNotOpen` unless the sale can still be mutated.
    pub fn ensure_open(&self) -> CoreResult<()> {
        if self.status == SaleStatus::Open {
            Ok(())
        } else {
            Err(CoreError::SaleNotOpen {
                sale_id: self.id.clone(),
                status: self.status.to_string(),
            })
        }
    }

    /// Fails `SaleNotFinalized` unless the sale can be refunded.
    pub fn ensure_finalized(&self) -> CoreResult<()> {
        if self.status == SaleStatus::Finalized {
            Ok(())
        } else {
            Err(CoreError::SaleNotFinalized {
                sale_id: self.id.clone(),
                status: self.status.to_string(),
            })
        }
    }
}

// =============================================================================
// Sale Items
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleItemKind {
    /// Backed by an inventory SKU.
    Inventory,
    /// Backed by a (session, seat) pair.
    Ticket,
    /// Neither, e.g. a booking fee.
    Service,
}

/// A priced line within a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub tenant_id: String,
    pub kind: SaleItemKind,
    pub description: String,
    pub sku: Option<String>,
    pub session_id: Option<String>,
    pub seat_id: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub tax_rate_bps: u32,
    /// `unit_price × quantity`, before tax and discounts.
    pub line_total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }

    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }

    /// The (session, seat) pair of a ticket line.
    pub fn seat(&self) -> Option<(&str, &str)> {
        match (self.kind, self.session_id.as_deref(), self.seat_id.as_deref()) {
            (SaleItemKind::Ticket, Some(session), Some(seat)) => Some((session, seat)),
            _ => None,
        }
    }

    /// The SKU of an inventory-backed line.
    pub fn inventory_sku(&self) -> Option<&str> {
        match self.kind {
            SaleItemKind::Inventory => self.sku.as_deref(),
            _ => None,
        }
    }
}

/// What a new line item points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineTarget {
    Inventory { sku: String },
    Ticket { session_id: String, seat_id: String },
    Service,
}

/// Input to `AddItem`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSaleItem {
    pub target: LineTarget,
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub tax_rate_bps: u32,
}

impl NewSaleItem {
    /// A concession line.
    pub fn inventory(sku: impl Into<String>, description: impl Into<String>, quantity: i64, unit_price: Money) -> Self {
        Self {
            target: LineTarget::Inventory { sku: sku.into() },
            description: description.into(),
            quantity,
            unit_price_cents: unit_price.cents(),
            tax_rate_bps: 0,
        }
    }

    /// A single admission; ticket lines always have quantity 1.
    pub fn ticket(session_id: impl Into<String>, seat_id: impl Into<String>, description: impl Into<String>, price: Money) -> Self {
        Self {
            target: LineTarget::Ticket {
                session_id: session_id.into(),
                seat_id: seat_id.into(),
            },
            description: description.into(),
            quantity: 1,
            unit_price_cents: price.cents(),
            tax_rate_bps: 0,
        }
    }

    pub fn service(description: impl Into<String>, price: Money) -> Self {
        Self {
            target: LineTarget::Service,
            description: description.into(),
            quantity: 1,
            unit_price_cents: price.cents(),
            tax_rate_bps: 0,
        }
    }

    pub fn with_tax(mut self, rate: TaxRate) -> Self {
        self.tax_rate_bps = rate.bps();
        self
    }

    pub fn kind(&self) -> SaleItemKind {
        match self.target {
            LineTarget::Inventory { .. } => SaleItemKind::Inventory,
            LineTarget::Ticket { .. } => SaleItemKind::Ticket,
            LineTarget::Service => SaleItemKind::Service,
        }
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Discounts & Payments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// `value` is basis points of the subtotal.
    Percent,
    /// `value` is cents, capped at the subtotal.
    Fixed,
}

/// A discount code applied to a sale.
///
/// The rule (`kind`, `value`) is copied from the code so later recomputes
/// do not depend on the code still existing.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleDiscount {
    pub id: String,
    pub sale_id: String,
    pub tenant_id: String,
    pub code: String,
    pub kind: DiscountKind,
    pub value: i64,
    /// Amount against the subtotal as of the last recompute.
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleDiscount {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    /// Card payment on an external terminal.
    Card,
    Voucher,
}

/// Money tendered against a sale. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub sale_id: String,
    pub tenant_id: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    /// Terminal authorisation or voucher number.
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Read Models
// =============================================================================

/// A sale with its lines and the live payment balance.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleDetails {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
    pub discounts: Vec<SaleDiscount>,
    pub payments: Vec<Payment>,
    pub paid: Money,
    /// Still owed; zero once payments cover the total.
    pub remaining: Money,
    /// Due back to the customer; zero until payments exceed the total.
    pub change: Money,
}

/// Outcome of a successful Finalize.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FinalizeReceipt {
    pub sale: Sale,
    pub tickets: Vec<Ticket>,
    pub change: Money,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sale(status: SaleStatus) -> Sale {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 19, 0, 0).unwrap();
        Sale {
            id: "sale-1".into(),
            tenant_id: "t1".into(),
            cashier_id: "cashier".into(),
            buyer_id: None,
            holder_token: "tok".into(),
            status,
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
        }
    }

    #[test]
    fn test_status_transitions() {
        assert!(SaleStatus::Open.can_transition_to(SaleStatus::Finalized));
        assert!(SaleStatus::Open.can_transition_to(SaleStatus::Canceled));
        assert!(SaleStatus::Finalized.can_transition_to(SaleStatus::Refunded));
        assert!(!SaleStatus::Finalized.can_transition_to(SaleStatus::Canceled));
        assert!(!SaleStatus::Open.can_transition_to(SaleStatus::Refunded));
    }

    #[test]
    fn test_terminal_states_go_nowhere() {
        let all = [
            SaleStatus::Open,
            SaleStatus::Finalized,
            SaleStatus::Canceled,
            SaleStatus::Refunded,
        ];
        for terminal in [SaleStatus::Canceled, SaleStatus::Refunded] {
            assert!(terminal.is_terminal());
            for next in all {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_ensure_open_and_finalized() {
        assert!(sale(SaleStatus::Open).ensure_open().is_ok());
        assert!(matches!(
            sale(SaleStatus::Canceled).ensure_open(),
            Err(CoreError::SaleNotOpen { .. })
        ));
        assert!(sale(SaleStatus::Finalized).ensure_finalized().is_ok());
        assert!(matches!(
            sale(SaleStatus::Open).ensure_finalized(),
            Err(CoreError::SaleNotFinalized { .. })
        ));
    }

    #[test]
    fn test_lease_liveness_is_strict() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 19, 15, 0).unwrap();
        let lease = SeatLease {
            tenant_id: "t1".into(),
            session_id: "s1".into(),
            seat_id: "A1".into(),
            holder_token: "T1".into(),
            expires_at: at,
        };
        assert!(lease.is_live(at - chrono::Duration::seconds(1)));
        assert!(!lease.is_live(at));
    }

    #[test]
    fn test_customer_age() {
        let customer = Customer {
            id: "c1".into(),
            tenant_id: "t1".into(),
            name: "Ana".into(),
            birth_date: NaiveDate::from_ymd_opt(2010, 6, 2),
        };
        let day_before_birthday = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(customer.age_on(day_before_birthday), Some(13));
        assert_eq!(customer.age_on(day_before_birthday.succ_opt().unwrap()), Some(14));
    }

    #[test]
    fn test_low_stock_is_inclusive() {
        let item = InventoryItem {
            tenant_id: "t1".into(),
            sku: "POPCORN-L".into(),
            name: "Popcorn Large".into(),
            on_hand: 5,
            reorder_level: 5,
            updated_at: Utc::now(),
        };
        assert!(item.is_low_stock());
        assert!(item.can_supply(5));
        assert!(!item.can_supply(6));
    }

    #[test]
    fn test_new_item_serializes_tagged() {
        let item = NewSaleItem::ticket("s1", "A1", "Adult", Money::from_cents(1250));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["target"]["kind"], "ticket");
        assert_eq!(json["target"]["seat_id"], "A1");
        assert_eq!(item.kind(), SaleItemKind::Ticket);
    }
}
