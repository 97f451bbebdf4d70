//! # Validation Module
//!
//! Last-line input checks the engine makes on its own inputs.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request boundary (outside this workspace)                    │
//! │  ├── Shape, types, ranges                                              │
//! │  └── Capability checks for the calling actor                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Checkout services (Rust)                                     │
//! │  └── THIS MODULE: engine invariants on inputs                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── Lease primary key (tenant, session, seat)                         │
//! │  ├── Partial unique index on live tickets                              │
//! │  └── CHECK (on_hand >= 0)                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use marquee_core::validation::{validate_quantity, validate_seat_ids};
//!
//! validate_quantity(2).unwrap();
//! validate_seat_ids(&["A1".to_string(), "A2".to_string()]).unwrap();
//! assert!(validate_seat_ids(&[]).is_err());
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{LineTarget, NewSaleItem};
use crate::{
    MAX_ITEM_QUANTITY, MAX_LEASE_TTL_SECS, MAX_PAYMENT_CENTS, MAX_SEATS_PER_RESERVATION, MAX_UNIT_PRICE_CENTS,
};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_SKU_LEN: usize = 50;
const MAX_SEAT_LABEL_LEN: usize = 16;
const MAX_TOKEN_LEN: usize = 128;
const MAX_REASON_LEN: usize = 500;

fn required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn max_len(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.len() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates a SKU.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, digits, hyphens and underscores only
///
/// ```rust
/// use marquee_core::validation::validate_sku;
///
/// assert!(validate_sku("POPCORN-L").is_ok());
/// assert!(validate_sku("POP CORN").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    required("sku", sku)?;
    max_len("sku", sku, MAX_SKU_LEN)?;

    if !sku.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a seat label such as `A1` or `BALC-12`.
pub fn validate_seat_id(seat_id: &str) -> ValidationResult<()> {
    required("seat_id", seat_id)?;
    max_len("seat_id", seat_id, MAX_SEAT_LABEL_LEN)?;

    if !seat_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::InvalidFormat {
            field: "seat_id".to_string(),
            reason: "must contain only letters, numbers, and hyphens".to_string(),
        });
    }

    Ok(())
}

/// Validates the seat list of a single reservation.
///
/// ## Rules
/// - At least one seat, at most `MAX_SEATS_PER_RESERVATION`
/// - Every label valid
/// - No seat listed twice
pub fn validate_seat_ids(seat_ids: &[String]) -> ValidationResult<()> {
    if seat_ids.is_empty() {
        return Err(ValidationError::Required {
            field: "seat_ids".to_string(),
        });
    }

    if seat_ids.len() > MAX_SEATS_PER_RESERVATION {
        return Err(ValidationError::OutOfRange {
            field: "seat_ids".to_string(),
            min: 1,
            max: MAX_SEATS_PER_RESERVATION as i64,
        });
    }

    let mut seen = HashSet::with_capacity(seat_ids.len());
    for seat_id in seat_ids {
        validate_seat_id(seat_id)?;
        if !seen.insert(seat_id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "seat_ids".to_string(),
                value: seat_id.clone(),
            });
        }
    }

    Ok(())
}

/// Holder tokens are opaque, client-supplied strings.
pub fn validate_holder_token(token: &str) -> ValidationResult<()> {
    required("holder_token", token)?;
    max_len("holder_token", token, MAX_TOKEN_LEN)
}

/// Cancel and refund reasons are free text, but not empty.
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    required("reason", reason)?;
    max_len("reason", reason, MAX_REASON_LEN)
}

pub fn validate_discount_code(code: &str) -> ValidationResult<()> {
    required("code", code)?;
    max_len("code", code, MAX_SKU_LEN)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity value.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Lease lifetime in seconds: positive and at most `MAX_LEASE_TTL_SECS`.
pub fn validate_ttl_secs(ttl_secs: i64) -> ValidationResult<()> {
    if ttl_secs <= 0 || ttl_secs > MAX_LEASE_TTL_SECS {
        return Err(ValidationError::OutOfRange {
            field: "ttl_secs".to_string(),
            min: 1,
            max: MAX_LEASE_TTL_SECS,
        });
    }
    Ok(())
}

/// Payment amounts must be strictly positive and at most `MAX_PAYMENT_CENTS`.
pub fn validate_payment_amount(amount_cents: i64) -> ValidationResult<()> {
    if amount_cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    if amount_cents > MAX_PAYMENT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "amount".to_string(),
            min: 1,
            max: MAX_PAYMENT_CENTS,
        });
    }

    Ok(())
}

/// The running paid amount of a sale after one more payment.
pub fn checked_paid_total(paid: Money, amount: Money) -> ValidationResult<Money> {
    paid.checked_add(amount).ok_or_else(|| ValidationError::OutOfRange {
        field: "paid".to_string(),
        min: 0,
        max: i64::MAX,
    })
}

/// Ledger adjustments must move stock.
pub fn validate_adjustment_delta(delta: i64) -> ValidationResult<()> {
    if delta == 0 {
        return Err(ValidationError::InvalidFormat {
            field: "delta".to_string(),
            reason: "must not be zero".to_string(),
        });
    }
    Ok(())
}

/// Validates a new line item before it reaches the store.
///
/// Ticket lines must have quantity 1: one line per seat.
pub fn validate_new_item(item: &NewSaleItem) -> ValidationResult<()> {
    required("description", &item.description)?;
    validate_quantity(item.quantity)?;

    if item.unit_price_cents < 0 {
        return Err(ValidationError::MustBePositive {
            field: "unit_price".to_string(),
        });
    }

    if item.unit_price_cents > MAX_UNIT_PRICE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "unit_price".to_string(),
            min: 0,
            max: MAX_UNIT_PRICE_CENTS,
        });
    }

    if Money::from_cents(item.unit_price_cents)
        .checked_multiply_quantity(item.quantity)
        .is_none()
    {
        return Err(ValidationError::OutOfRange {
            field: "line_total".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    if item.tax_rate_bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate_bps".to_string(),
            min: 0,
            max: 10_000,
        });
    }

    match &item.target {
        LineTarget::Inventory { sku } => validate_sku(sku),
        LineTarget::Ticket { session_id, seat_id } => {
            required("session_id", session_id)?;
            validate_seat_id(seat_id)?;
            if item.quantity != 1 {
                return Err(ValidationError::OutOfRange {
                    field: "quantity".to_string(),
                    min: 1,
                    max: 1,
                });
            }
            Ok(())
        }
        LineTarget::Service => Ok(()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn seats(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("POPCORN-L").is_ok());
        assert!(validate_sku("SODA_500").is_ok());
        assert!(validate_sku("").is_err());
        assert!(validate_sku(&"A".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_seat_ids() {
        assert!(validate_seat_ids(&seats(&["A1", "A2"])).is_ok());
        assert!(matches!(
            validate_seat_ids(&seats(&["A1", "A1"])),
            Err(ValidationError::Duplicate { .. })
        ));
        assert!(validate_seat_ids(&seats(&["A 1"])).is_err());

        let too_many: Vec<String> = (0..=MAX_SEATS_PER_RESERVATION).map(|i| format!("A{i}")).collect();
        assert!(matches!(
            validate_seat_ids(&too_many),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_ttl() {
        assert!(validate_ttl_secs(900).is_ok());
        assert!(validate_ttl_secs(0).is_err());
        assert!(validate_ttl_secs(MAX_LEASE_TTL_SECS + 1).is_err());
    }

    #[test]
    fn test_validate_payment_and_delta() {
        assert!(validate_payment_amount(1).is_ok());
        assert!(validate_payment_amount(MAX_PAYMENT_CENTS).is_ok());
        assert!(validate_payment_amount(0).is_err());
        assert!(validate_payment_amount(-100).is_err());
        assert!(matches!(
            validate_payment_amount(i64::MAX - 10),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(validate_adjustment_delta(-3).is_ok());
        assert!(validate_adjustment_delta(0).is_err());
    }

    #[test]
    fn test_ticket_lines_are_single_seat() {
        let mut item = NewSaleItem::ticket("s1", "A1", "Adult", Money::from_cents(1250));
        assert!(validate_new_item(&item).is_ok());
        item.quantity = 2;
        assert!(validate_new_item(&item).is_err());
    }

    #[test]
    fn test_unit_price_is_bounded() {
        let mut item = NewSaleItem::service("Private screening", Money::from_cents(MAX_UNIT_PRICE_CENTS));
        item.quantity = 999;
        assert!(validate_new_item(&item).is_ok());

        item.unit_price_cents = i64::MAX / 500;
        assert!(matches!(
            validate_new_item(&item),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_paid_total_overflow_is_rejected() {
        let paid = Money::from_cents(i64::MAX - 10);
        assert!(checked_paid_total(paid, Money::from_cents(100)).is_err());
        assert_eq!(
            checked_paid_total(Money::from_cents(3000), Money::from_cents(2500)).unwrap(),
            Money::from_cents(5500)
        );
    }

    #[test]
    fn test_inventory_line_needs_valid_sku() {
        let item = NewSaleItem::inventory("", "Popcorn", 1, Money::from_cents(600));
        assert!(matches!(
            validate_new_item(&item),
            Err(ValidationError::Required { .. })
        ));
    }
}
