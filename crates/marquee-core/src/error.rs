//! # Error Types
//!
//! Domain-specific error types for marquee-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  marquee-core errors (this file)                                       │
//! │  ├── CoreError        - Business rule rejections                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  marquee-db errors (separate crate)                                    │
//! │  └── DbError          - Store failures, wraps CoreError                │
//! │                                                                         │
//! │  marquee-checkout errors                                               │
//! │  ├── CheckoutError    - Everything a service call can fail with        │
//! │  └── ApiError         - What callers see (serialized, with kind)       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → CheckoutError → ApiError │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant carries the data a caller needs to correct the request
//! without re-querying: conflicting seat ids, the payment shortfall, the
//! stock that is actually available.

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
///
/// None of these are retried automatically. They describe either client
/// misuse or legitimate contention the client must resolve itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// One or more seats are sold or held by another token.
    ///
    /// ## When This Occurs
    /// ```text
    /// T1: Reserve(S, [A1, A2])  ──►  granted
    /// T2: Reserve(S, [A1, B4])  ──►  SeatUnavailable { seat_ids: ["A1"] }
    /// ```
    /// `seat_ids` lists every conflicting seat of the request, not just the
    /// first one found.
    #[error("Seats unavailable: {}", .seat_ids.join(", "))]
    SeatUnavailable { seat_ids: Vec<String> },

    /// A mutation was attempted on a sale that is not OPEN.
    #[error("Sale {sale_id} is {status}, expected open")]
    SaleNotOpen { sale_id: String, status: String },

    /// Refund attempted on a sale that is not FINALIZED.
    #[error("Sale {sale_id} is {status}, expected finalized")]
    SaleNotFinalized { sale_id: String, status: String },

    /// Finalize called on a sale without line items.
    #[error("Sale {sale_id} has no items")]
    EmptySale { sale_id: String },

    /// Payments do not cover the grand total.
    #[error("Insufficient payment: total {total}, paid {paid}, short {shortfall}")]
    InsufficientPayment {
        total: Money,
        paid: Money,
        shortfall: Money,
    },

    /// Not enough stock to satisfy a line item.
    ///
    /// ## When This Occurs
    /// - `AddItem` advisory check fails
    /// - `Finalize` decrement fails (authoritative, may reject even after a
    ///   successful `AddItem`)
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// A ledger adjustment would take on-hand below zero.
    #[error("Adjustment of {delta} on {sku} would leave negative stock (on hand {on_hand})")]
    NegativeStock { sku: String, on_hand: i64, delta: i64 },

    #[error("Discount code not found: {0}")]
    DiscountNotFound(String),

    /// Outside the code's validity window.
    #[error("Discount code {0} is not valid at this time")]
    DiscountExpired(String),

    /// Usage cap reached.
    #[error("Discount code {0} has no uses left")]
    DiscountExhausted(String),

    /// Buyer outside the code's eligible range, or no buyer on the sale.
    #[error("Discount code {code} is not applicable: {reason}")]
    DiscountNotEligible { code: String, reason: String },

    #[error("Discount code {0} is already applied to this sale")]
    DiscountAlreadyApplied(String),

    /// Reserve on a session that is canceled or completed.
    #[error("Session {session_id} is {status}, not bookable")]
    SessionNotBookable { session_id: String, status: String },

    /// Sale, session, seat, item or SKU absent for this tenant.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Sale has reached the maximum number of line items.
    #[error("Sale cannot have more than {max} items")]
    SaleTooLarge { max: usize },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a seat conflict error for the given seats.
    pub fn seats_unavailable<I, S>(seats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seat_ids: Vec<String> = seats.into_iter().map(Into::into).collect();
        seat_ids.sort();
        seat_ids.dedup();
        CoreError::SeatUnavailable { seat_ids }
    }

    /// Converts a ledger-level `NegativeStock` into the sale-level
    /// `InsufficientStock`. Other errors pass through.
    pub fn into_insufficient_stock(self, requested: i64) -> Self {
        match self {
            CoreError::NegativeStock { sku, on_hand, .. } => CoreError::InsufficientStock {
                sku,
                available: on_hand,
                requested,
            },
            other => other,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// The request boundary validates payloads before the engine runs; these
/// are the last line checks the engine still makes on its own inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid seat label).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Same value supplied twice where a set is expected.
    #[error("{field} '{value}' is duplicated")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            sku: "POPCORN-L".to_string(),
            available: 0,
            requested: 1,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for POPCORN-L: available 0, requested 1"
        );
    }

    #[test]
    fn test_seat_unavailable_lists_seats_once_sorted() {
        let err = CoreError::seats_unavailable(["B4", "A1", "B4"]);
        assert_eq!(err.to_string(), "Seats unavailable: A1, B4");
    }

    #[test]
    fn test_insufficient_payment_message() {
        let err = CoreError::InsufficientPayment {
            total: Money::from_cents(5000),
            paid: Money::from_cents(3000),
            shortfall: Money::from_cents(2000),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient payment: total $50.00, paid $30.00, short $20.00"
        );
    }

    #[test]
    fn test_negative_stock_becomes_insufficient_stock() {
        let err = CoreError::NegativeStock {
            sku: "POPCORN-L".to_string(),
            on_hand: 0,
            delta: -1,
        }
        .into_insufficient_stock(1);

        assert_eq!(
            err,
            CoreError::InsufficientStock {
                sku: "POPCORN-L".to_string(),
                available: 0,
                requested: 1,
            }
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "holder_token".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
