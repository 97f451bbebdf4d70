//! # Repository Module
//!
//! Database repositories for the checkout engine.
//!
//! ## Two Kinds of Functions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Repository methods (pub, take &self)                                  │
//! │  ├── Reads:          run on the pool                                   │
//! │  └── Units of work:  pool.begin() → write first → ... → commit         │
//! │                                                                         │
//! │  Connection helpers (pub(crate), take &mut SqliteConnection)           │
//! │  └── Compose into a caller's transaction, e.g. finalize runs           │
//! │      inventory::adjust_in + lease::acquire_in + ticket::issue_in       │
//! │      inside one BEGIN/COMMIT                                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A unit of work that returns `Err` drops its transaction, which rolls back
//! every statement it ran. No partial effects survive a rejection.
//!
//! ## Available Repositories
//!
//! - [`LeaseRepository`] - Seat holds
//! - [`InventoryRepository`] - Stock and adjustment ledger
//! - [`SaleRepository`] - Sale aggregate, finalize, cancel, refund
//! - [`TicketRepository`] - Issued tickets
//! - [`CatalogRepository`] - Sessions, seats, customers, discount codes

pub mod catalog;
pub mod inventory;
pub mod lease;
pub mod sale;
pub mod ticket;

pub use catalog::CatalogRepository;
pub use inventory::InventoryRepository;
pub use lease::LeaseRepository;
pub use sale::SaleRepository;
pub use ticket::TicketRepository;
