//! # marquee-core: Pure Business Logic for the Checkout Engine
//!
//! This crate holds every rule of the seat-hold and sale-finalization engine
//! that can be expressed without touching a store.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Marquee Checkout Architecture                      │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                marquee-checkout (Service Layer)                 │   │
//! │  │   SeatLeaseManager, InventoryLedger, SaleService, Finalizer     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ marquee-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  totals   │  │ discount  │  │   │
//! │  │   │   Sale    │  │   Money   │  │ SaleTotals│  │ Discount  │  │   │
//! │  │   │ SeatLease │  │  TaxRate  │  │  Tender   │  │   Code    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • NO WALL CLOCK            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  marquee-db (Database Layer)                    │   │
//! │  │        SQLite transactions, migrations, repositories            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Sale, SeatLease, Ticket, InventoryItem, ...)
//! - [`money`] - Money type with integer arithmetic
//! - [`totals`] - Pure sale-total recomputation and tender checks
//! - [`discount`] - Discount code evaluation
//! - [`clock`] - Injectable time source
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Example Usage
//!
//! ```rust
//! use marquee_core::money::Money;
//! use marquee_core::totals::Tender;
//!
//! let total = Money::from_cents(5000);
//! let paid = Money::from_cents(3000);
//!
//! let err = Tender::new(paid, total).settle().unwrap_err();
//! assert_eq!(err.to_string(), "Insufficient payment: total $50.00, paid $30.00, short $20.00");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod discount;
pub mod error;
pub mod money;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use totals::{SaleTotals, Tender};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default lease lifetime when a caller does not supply one (15 minutes).
pub const DEFAULT_LEASE_TTL_SECS: i64 = 15 * 60;

/// Upper bound on a single lease lifetime.
///
/// Keeps a misbehaving client from parking seats for a whole screening.
pub const MAX_LEASE_TTL_SECS: i64 = 2 * 60 * 60;

/// Maximum seats a single `Reserve` call may hold.
pub const MAX_SEATS_PER_RESERVATION: usize = 20;

/// Maximum line items allowed in a single sale.
pub const MAX_SALE_ITEMS: usize = 100;

/// Maximum quantity of a single line item.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum unit price of a line item, in cents (1,000,000.00).
///
/// With `MAX_ITEM_QUANTITY` and `MAX_SALE_ITEMS` this keeps every subtotal
/// far inside `i64`.
pub const MAX_UNIT_PRICE_CENTS: i64 = 100_000_000;

/// Maximum amount of a single payment, in cents (10,000,000.00).
pub const MAX_PAYMENT_CENTS: i64 = 1_000_000_000;
