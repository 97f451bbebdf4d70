//! # Money Module
//!
//! Provides the `Money` type for every monetary value in the checkout engine:
//! ticket prices, concession line totals, discounts, payments and change.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004                                      │
//! │                                                                         │
//! │  A sale that is "paid" to within a rounding error is not paid.          │
//! │  Finalize compares paid >= total; both sides must be exact.             │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Ticket 12.50 + Popcorn 6.25 = 1250 + 625 = 1875 cents, exactly      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use marquee_core::money::Money;
//!
//! let ticket = Money::from_cents(1250);
//! let pair = ticket * 2;
//! assert_eq!(pair.cents(), 2500);
//!
//! // Grand totals never go below zero
//! let over_discounted = Money::from_cents(500) - Money::from_cents(900);
//! assert_eq!(over_discounted.clamp_non_negative(), Money::zero());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

/// Basis points in 100%.
const BPS_SCALE: i128 = 10_000;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: intermediate results such as `subtotal - discount` may
///   dip below zero before being clamped
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Serializes as a bare integer**: `{"total": 1875}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use marquee_core::money::Money;
    ///
    /// let price = Money::from_cents(1250); // 12.50
    /// assert_eq!(price.cents(), 1250);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Zero.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns `self`, or zero if `self` is negative.
    ///
    /// Used for every stored total: subtotal, grand total and change.
    #[inline]
    pub const fn clamp_non_negative(self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            self
        }
    }

    /// Returns the smaller of two amounts.
    ///
    /// Fixed-amount discounts are capped with `value.min(subtotal)`.
    #[inline]
    pub fn min(self, other: Self) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Calculates tax at `rate`, rounding half up on the cent.
    ///
    /// ```rust
    /// use marquee_core::money::Money;
    /// use marquee_core::types::TaxRate;
    ///
    /// // 10.00 at 8.25% = 0.825 -> 0.83
    /// let tax = Money::from_cents(1000).calculate_tax(TaxRate::from_bps(825));
    /// assert_eq!(tax.cents(), 83);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        self.portion_bps(rate.bps())
    }

    /// Returns `bps` basis points of this amount, rounding half up.
    ///
    /// ```rust
    /// use marquee_core::money::Money;
    ///
    /// // 20% of 37.50 = 7.50
    /// assert_eq!(Money::from_cents(3750).portion_bps(2000).cents(), 750);
    /// ```
    pub fn portion_bps(&self, bps: u32) -> Money {
        // i128 so that large subtotals times 10_000 cannot overflow
        let scaled = (self.0 as i128 * bps as i128 + BPS_SCALE / 2) / BPS_SCALE;
        Money::from_cents(scaled as i64)
    }

    /// Multiplies a unit price by a quantity, saturating at the `i64` bounds.
    ///
    /// Validated lines never get near the bounds; use
    /// [`Money::checked_multiply_quantity`] where input is untrusted.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }

    /// `None` on overflow.
    #[inline]
    pub const fn checked_multiply_quantity(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// `None` on overflow.
    ///
    /// ```rust
    /// use marquee_core::money::Money;
    ///
    /// assert!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)).is_none());
    /// ```
    #[inline]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-oriented display (`$12.50`); frontends localise for real receipts.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        self.multiply_quantity(qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.dollars(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(12, 50).cents(), 1250);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(5000)), "$50.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::zero()), "$0.00");
    }

    #[test]
    fn test_clamp_non_negative() {
        assert_eq!(Money::from_cents(-1).clamp_non_negative(), Money::zero());
        assert_eq!(Money::from_cents(1).clamp_non_negative().cents(), 1);
    }

    #[test]
    fn test_min_caps_fixed_discount() {
        let subtotal = Money::from_cents(800);
        let fixed = Money::from_cents(1000);
        assert_eq!(fixed.min(subtotal), subtotal);
    }

    #[test]
    fn test_portion_bps_rounds_half_up() {
        // 15% of 0.10 = 0.015 -> 0.02
        assert_eq!(Money::from_cents(10).portion_bps(1500).cents(), 2);
        assert_eq!(Money::from_cents(10000).portion_bps(10000).cents(), 10000);
    }

    #[test]
    fn test_tax_calculation() {
        let tax = Money::from_cents(1000).calculate_tax(TaxRate::from_bps(1000));
        assert_eq!(tax.cents(), 100);
    }

    #[test]
    fn test_sum() {
        let lines = [Money::from_cents(1250), Money::from_cents(625)];
        let total: Money = lines.iter().sum();
        assert_eq!(total.cents(), 1875);
    }

    #[test]
    fn test_arithmetic_never_wraps() {
        let huge = Money::from_cents(i64::MAX / 500);
        assert!(huge.checked_multiply_quantity(999).is_none());
        assert_eq!(huge.multiply_quantity(999).cents(), i64::MAX);
        assert_eq!(Money::from_cents(600).checked_multiply_quantity(3), Some(Money::from_cents(1800)));

        let paid: Money = [Money::from_cents(i64::MAX - 10), Money::from_cents(100)].iter().sum();
        assert_eq!(paid.cents(), i64::MAX);
        assert!(paid.is_positive());
        assert_eq!((Money::from_cents(i64::MIN) - Money::from_cents(1)).cents(), i64::MIN);
    }
}
