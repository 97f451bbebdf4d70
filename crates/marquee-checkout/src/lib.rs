//! # marquee-checkout: Checkout Services for Marquee
//!
//! Seat-hold leasing, the sale aggregate and its settlement, and the
//! concession stock ledger, for many tenants sharing one store.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Checkout Service Architecture                      │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 Checkout (facade, OpResult<T>)                   │  │
//! │  │     every call carries a RequestContext { tenant_id, actor }     │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │      ┌──────────────┬─────────┴────────┬───────────────────┐           │
//! │      ▼              ▼                  ▼                   ▼            │
//! │  ┌──────────┐  ┌──────────┐  ┌───────────────┐  ┌─────────────────┐    │
//! │  │ SeatLease│  │  Sale    │  │ SaleFinalizer │  │ InventoryLedger │    │
//! │  │ Manager  │  │ Service  │  │ finalize      │  │ adjust, restock │    │
//! │  │ reserve  │  │ items    │  │ cancel        │  │ correct, history│    │
//! │  │ release  │  │ discounts│  │ refund        │  │ low stock       │    │
//! │  │ reap     │  │ payments │  │ (audited)     │  │                 │    │
//! │  └──────────┘  └──────────┘  └───────────────┘  └─────────────────┘    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ LeaseReaper    │  │ RetryPolicy    │  │ CheckoutConfig         │    │
//! │  │ interval task  │  │ transient-only │  │ TOML + MARQUEE_* env   │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! Several processes may share one SQLite file. Correctness comes from the
//! store: every unit of work is one transaction whose first statement is a
//! write, seat holds are claimed with conditional upserts, and stock is
//! decremented with a conditional update. No in-process lock is relied on.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use marquee_checkout::{Checkout, CheckoutConfig, RequestContext, TracingAuditSink};
//! use marquee_core::SystemClock;
//! use marquee_db::Database;
//!
//! let config = CheckoutConfig::load(None)?;
//! let db = Database::new(config.db_config()?).await?;
//! let checkout = Checkout::new(db, &config, Arc::new(SystemClock), Arc::new(TracingAuditSink));
//!
//! let ctx = RequestContext::new("tenant-1", "cashier-7");
//! let grant = checkout.reserve(&ctx, "S-1900", &seats, "T1", None).await;
//! ```

pub mod audit;
pub mod checkout;
pub mod config;
pub mod error;
pub mod finalizer;
pub mod inventory;
pub mod leases;
pub mod reaper;
pub mod retry;
pub mod sales;
pub mod telemetry;

pub use audit::{AuditAction, AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use checkout::{Availability, Checkout, RequestContext};
pub use config::CheckoutConfig;
pub use error::{ApiError, CheckoutError, CheckoutResult, ErrorKind, OpResult};
pub use finalizer::SaleFinalizer;
pub use inventory::InventoryLedger;
pub use leases::SeatLeaseManager;
pub use reaper::{LeaseReaper, LeaseReaperHandle};
pub use retry::RetryPolicy;
pub use sales::{DiscountApplied, LineAdded, PaymentAdded, SaleService};
