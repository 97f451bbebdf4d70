//! # Checkout Error Types
//!
//! The service-layer error and the envelope every operation returns.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Marquee Checkout                       │
//! │                                                                         │
//! │  ValidationError ──► CoreError ──┐                                     │
//! │                                  ├──► DbError ──► CheckoutError        │
//! │  sqlx::Error ───────────────────-┘                     │               │
//! │                                                        ▼               │
//! │                                        ApiError { kind, message,       │
//! │                                                   details }            │
//! │                                                        │               │
//! │                                                        ▼               │
//! │                              OpResult<T> { success, data, error }      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Envelope
//! ```json
//! {
//!   "success": false,
//!   "data": null,
//!   "error": {
//!     "kind": "SEAT_UNAVAILABLE",
//!     "message": "Seats unavailable: A1",
//!     "details": { "seat_ids": ["A1"] }
//!   }
//! }
//! ```

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use ts_rs::TS;

use marquee_core::{CoreError, ValidationError};
use marquee_db::DbError;

/// Result type alias for checkout operations.
pub type CheckoutResult<T> = Result<T, CheckoutError>;

/// Checkout error covering business rejections and store failures.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A business rule rejected the request. Never retried.
    #[error(transparent)]
    Rejected(#[from] CoreError),

    /// The store failed. Retried when transient.
    #[error(transparent)]
    Store(DbError),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid checkout configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

/// Business rejections raised inside a transaction surface as `Rejected`,
/// not as store failures.
impl From<DbError> for CheckoutError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Core(core) => CheckoutError::Rejected(core),
            other => CheckoutError::Store(other),
        }
    }
}

impl From<ValidationError> for CheckoutError {
    fn from(err: ValidationError) -> Self {
        CheckoutError::Rejected(CoreError::Validation(err))
    }
}

impl From<std::io::Error> for CheckoutError {
    fn from(err: std::io::Error) -> Self {
        CheckoutError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for CheckoutError {
    fn from(err: toml::de::Error) -> Self {
        CheckoutError::ConfigLoadFailed(err.to_string())
    }
}

impl CheckoutError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CheckoutError::Store(db) if db.is_transient())
    }

    /// The business rejection, if this is one.
    pub fn rejection(&self) -> Option<&CoreError> {
        match self {
            CheckoutError::Rejected(core) => Some(core),
            _ => None,
        }
    }
}

// =============================================================================
// API Error
// =============================================================================

/// Machine-readable error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ErrorKind {
    SeatUnavailable,
    SaleNotOpen,
    SaleNotFinalized,
    EmptySale,
    InsufficientPayment,
    InsufficientStock,
    NegativeStock,
    DiscountNotFound,
    DiscountExpired,
    DiscountExhausted,
    DiscountNotEligible,
    DiscountAlreadyApplied,
    SessionNotBookable,
    NotFound,
    ValidationError,
    /// Transient store failure that outlasted the retry budget.
    StoreUnavailable,
    Internal,
}

/// Error payload of an [`OpResult`].
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    #[ts(type = "Record<string, unknown>")]
    pub details: serde_json::Value,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ApiError {
            kind,
            message: message.into(),
            details: json!({}),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        let (kind, details) = match err {
            CoreError::SeatUnavailable { seat_ids } => (ErrorKind::SeatUnavailable, json!({ "seat_ids": seat_ids })),
            CoreError::SaleNotOpen { sale_id, status } => {
                (ErrorKind::SaleNotOpen, json!({ "sale_id": sale_id, "status": status }))
            }
            CoreError::SaleNotFinalized { sale_id, status } => {
                (ErrorKind::SaleNotFinalized, json!({ "sale_id": sale_id, "status": status }))
            }
            CoreError::EmptySale { sale_id } => (ErrorKind::EmptySale, json!({ "sale_id": sale_id })),
            CoreError::InsufficientPayment { total, paid, shortfall } => (
                ErrorKind::InsufficientPayment,
                json!({
                    "total_cents": total.cents(),
                    "paid_cents": paid.cents(),
                    "shortfall_cents": shortfall.cents(),
                }),
            ),
            CoreError::InsufficientStock { sku, available, requested } => (
                ErrorKind::InsufficientStock,
                json!({ "sku": sku, "available": available, "requested": requested }),
            ),
            CoreError::NegativeStock { sku, on_hand, delta } => (
                ErrorKind::NegativeStock,
                json!({ "sku": sku, "on_hand": on_hand, "delta": delta }),
            ),
            CoreError::DiscountNotFound(code) => (ErrorKind::DiscountNotFound, json!({ "code": code })),
            CoreError::DiscountExpired(code) => (ErrorKind::DiscountExpired, json!({ "code": code })),
            CoreError::DiscountExhausted(code) => (ErrorKind::DiscountExhausted, json!({ "code": code })),
            CoreError::DiscountNotEligible { code, reason } => {
                (ErrorKind::DiscountNotEligible, json!({ "code": code, "reason": reason }))
            }
            CoreError::DiscountAlreadyApplied(code) => (ErrorKind::DiscountAlreadyApplied, json!({ "code": code })),
            CoreError::SessionNotBookable { session_id, status } => (
                ErrorKind::SessionNotBookable,
                json!({ "session_id": session_id, "status": status }),
            ),
            CoreError::NotFound { entity, id } => (ErrorKind::NotFound, json!({ "entity": entity, "id": id })),
            CoreError::SaleTooLarge { max } => (ErrorKind::ValidationError, json!({ "max_items": max })),
            CoreError::Validation(err) => (ErrorKind::ValidationError, json!({ "reason": err.to_string() })),
        };

        ApiError::new(kind, message).with_details(details)
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Rejected(core) => core.into(),
            CheckoutError::Store(db) if db.is_transient() => {
                ApiError::new(ErrorKind::StoreUnavailable, "Store is busy, try again")
                    .with_details(json!({ "reason": db.to_string() }))
            }
            CheckoutError::Store(DbError::NotFound { entity, id }) => ApiError::new(
                ErrorKind::NotFound,
                format!("{} not found: {}", entity, id),
            )
            .with_details(json!({ "entity": entity, "id": id })),
            CheckoutError::Store(db) => {
                // Log the actual error but return a generic message
                tracing::error!(error = %db, "Store operation failed");
                ApiError::new(ErrorKind::Internal, "Store operation failed")
            }
            other => {
                tracing::error!(error = %other, "Checkout operation failed");
                ApiError::new(ErrorKind::Internal, other.to_string())
            }
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

// =============================================================================
// Result Envelope
// =============================================================================

/// What every checkout operation returns.
#[derive(Debug, Clone, Serialize)]
pub struct OpResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T> OpResult<T> {
    pub fn ok(data: T) -> Self {
        OpResult {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<ApiError>) -> Self {
        OpResult {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Error kind of a failed result.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        match (self.data, self.error) {
            (Some(data), None) => Ok(data),
            (_, Some(error)) => Err(error),
            (None, None) => Err(ApiError::new(ErrorKind::Internal, "Empty result")),
        }
    }
}

impl<T> From<CheckoutResult<T>> for OpResult<T> {
    fn from(result: CheckoutResult<T>) -> Self {
        match result {
            Ok(data) => OpResult::ok(data),
            Err(err) => OpResult::err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_core::Money;

    #[test]
    fn test_business_rejection_inside_transaction_is_not_a_store_error() {
        let err: CheckoutError = DbError::Core(CoreError::EmptySale { sale_id: "s1".into() }).into();
        assert!(matches!(err, CheckoutError::Rejected(CoreError::EmptySale { .. })));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_busy_is_transient() {
        let err: CheckoutError = DbError::Busy("database is locked".into()).into();
        assert!(err.is_transient());
        assert_eq!(ApiError::from(err).kind, ErrorKind::StoreUnavailable);
    }

    #[test]
    fn test_shortfall_details() {
        let api: ApiError = CoreError::InsufficientPayment {
            total: Money::from_cents(5000),
            paid: Money::from_cents(3000),
            shortfall: Money::from_cents(2000),
        }
        .into();
        assert_eq!(api.kind, ErrorKind::InsufficientPayment);
        assert_eq!(api.details["shortfall_cents"], 2000);
    }

    #[test]
    fn test_envelope_serialization() {
        let result: OpResult<u64> = OpResult::err(CoreError::seats_unavailable(["A1"]));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["kind"], "SEAT_UNAVAILABLE");
        assert_eq!(value["error"]["details"]["seat_ids"][0], "A1");

        let ok: OpResult<u64> = OpResult::ok(2);
        assert_eq!(serde_json::to_value(&ok).unwrap()["data"], 2);
    }
}
