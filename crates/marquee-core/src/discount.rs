//! # Discount Codes
//!
//! Rules for applying a discount code to a sale. Codes are owned by an
//! external catalog; the engine only reads them and bumps `used_count`.
//!
//! ## Check Order
//! ```text
//! found? ──► in window? ──► uses left? ──► buyer eligible? ──► not yet applied?
//!   │            │              │                │                   │
//!   ▼            ▼              ▼                ▼                   ▼
//! NotFound    Expired       Exhausted       NotEligible       AlreadyApplied
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::totals::discount_amount;
use crate::types::{Customer, DiscountKind};

/// A discount code definition.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DiscountCode {
    pub tenant_id: String,
    pub code: String,
    pub kind: DiscountKind,
    /// Basis points for `Percent`, cents for `Fixed`.
    pub value: i64,
    #[ts(as = "Option<String>")]
    pub valid_from: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub valid_until: Option<DateTime<Utc>>,
    /// `None` means unlimited.
    pub max_uses: Option<i64>,
    pub used_count: i64,
    /// Inclusive eligible buyer age range.
    pub min_age: Option<i64>,
    pub max_age: Option<i64>,
}

impl DiscountCode {
    /// Window bounds are inclusive at the start, exclusive at the end.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        let started = self.valid_from.map_or(true, |from| now >= from);
        let not_ended = self.valid_until.map_or(true, |until| now < until);
        started && not_ended
    }

    pub fn has_uses_left(&self) -> bool {
        self.max_uses.map_or(true, |max| self.used_count < max)
    }

    pub fn is_age_restricted(&self) -> bool {
        self.min_age.is_some() || self.max_age.is_some()
    }

    /// Checks buyer eligibility. Codes without an age range accept anyone,
    /// including anonymous sales.
    pub fn check_eligibility(&self, buyer: Option<&Customer>, now: DateTime<Utc>) -> CoreResult<()> {
        if !self.is_age_restricted() {
            return Ok(());
        }

        let not_eligible = |reason: &str| CoreError::DiscountNotEligible {
            code: self.code.clone(),
            reason: reason.to_string(),
        };

        let buyer = buyer.ok_or_else(|| not_eligible("sale has no buyer"))?;
        let age = buyer
            .age_on(now.date_naive())
            .ok_or_else(|| not_eligible("buyer birth date unknown"))?;

        if self.min_age.is_some_and(|min| age < min) || self.max_age.is_some_and(|max| age > max) {
            return Err(not_eligible(&format!("buyer age {age} outside eligible range")));
        }
        Ok(())
    }

    /// Runs every check in order. `already_applied` is whether the sale
    /// already carries this code.
    pub fn evaluate(&self, buyer: Option<&Customer>, already_applied: bool, now: DateTime<Utc>) -> CoreResult<()> {
        if !self.is_active_at(now) {
            return Err(CoreError::DiscountExpired(self.code.clone()));
        }
        if !self.has_uses_left() {
            return Err(CoreError::DiscountExhausted(self.code.clone()));
        }
        self.check_eligibility(buyer, now)?;
        if already_applied {
            return Err(CoreError::DiscountAlreadyApplied(self.code.clone()));
        }
        Ok(())
    }

    /// What this code takes off `subtotal` on its own.
    pub fn amount_for(&self, subtotal: Money) -> Money {
        discount_amount(self.kind, self.value, subtotal)
    }
}
