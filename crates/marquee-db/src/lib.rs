//! # marquee-db: Database Layer for the Checkout Engine
//!
//! This crate provides database access for seat leasing and sale settlement.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Marquee Data Flow                                │
//! │                                                                         │
//! │  marquee-checkout (Checkout::finalize)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     marquee-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ LeaseRepo     │    │ 001_init.sql │  │   │
//! │  │   │ SqlitePool    │◄───│ SaleRepo      │    │              │  │   │
//! │  │   │ WAL + busy    │    │ InventoryRepo │    │              │  │   │
//! │  │   │ timeout       │    │ TicketRepo    │    │              │  │   │
//! │  │   └───────────────┘    │ CatalogRepo   │    └──────────────┘  │   │
//! │  │                        └───────────────┘                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   shared by every checkout process on the host                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repositories and their transactional units of work
//!
//! ## Usage
//!
//! ```rust,ignore
//! use marquee_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/marquee.db")).await?;
//!
//! let now = chrono::Utc::now();
//! let grant = db
//!     .leases()
//!     .reserve("tenant-1", "S1", &seats, "T1", now, now + chrono::Duration::minutes(15))
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::inventory::StockMovement;
pub use repository::sale::{CancelOutcome, RefundOutcome};
pub use repository::{CatalogRepository, InventoryRepository, LeaseRepository, SaleRepository, TicketRepository};

// =============================================================================
// Test fixtures
// =============================================================================
