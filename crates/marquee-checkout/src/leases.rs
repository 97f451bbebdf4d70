//! # Seat Lease Manager
//!
//! Short-lived seat holds keyed by an opaque holder token.
//!
//! ## Lease Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   reserve(T1, [A1, A2], ttl)                                           │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   ┌──────────┐   reserve(T1, ...) again    ┌──────────┐                │
//! │   │   LIVE   │ ──────────────────────────► │   LIVE   │ (extended)     │
//! │   └────┬─────┘                              └──────────┘                │
//! │        │                                                                │
//! │        ├── release(T1) ─────────────► gone                             │
//! │        ├── finalize (ticket issued) ► gone                             │
//! │        └── now ≥ expires_at ────────► EXPIRED ── reap / next reserve ─► gone
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An expired lease never blocks anyone, reaped or not.

use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use marquee_core::validation::{validate_holder_token, validate_seat_ids, validate_ttl_secs};
use marquee_core::{Clock, LeaseGrant, SeatAvailability, SeatLease, ValidationError};
use marquee_db::Database;

use crate::config::LeaseSettings;
use crate::error::CheckoutResult;
use crate::retry::RetryPolicy;

/// Reserve, release and inspect seat leases.
#[derive(Clone)]
pub struct SeatLeaseManager {
    db: Database,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    settings: LeaseSettings,
}

impl SeatLeaseManager {
    pub fn new(db: Database, clock: Arc<dyn Clock>, retry: RetryPolicy, settings: LeaseSettings) -> Self {
        SeatLeaseManager {
            db,
            clock,
            retry,
            settings,
        }
    }

    /// Holds every seat in `seat_ids` for `holder_token`, or none of them.
    ///
    /// `ttl_secs` defaults to the configured lease TTL. Seats the token
    /// already holds are extended to the new expiry.
    ///
    /// ## Errors
    /// - `SeatUnavailable` listing every seat that is sold or held by
    ///   another token
    /// - `NotFound` for an unknown session or seat
    /// - `SessionNotBookable`
    pub async fn reserve(
        &self,
        tenant_id: &str,
        session_id: &str,
        seat_ids: &[String],
        holder_token: &str,
        ttl_secs: Option<i64>,
    ) -> CheckoutResult<LeaseGrant> {
        validate_seat_ids(seat_ids)?;
        validate_holder_token(holder_token)?;

        let ttl_secs = ttl_secs.unwrap_or(self.settings.default_ttl_secs);
        validate_ttl_secs(ttl_secs)?;
        if ttl_secs > self.settings.max_ttl_secs {
            return Err(ValidationError::OutOfRange {
                field: "ttl_secs".to_string(),
                min: 1,
                max: self.settings.max_ttl_secs,
            }
            .into());
        }

        debug!(tenant = %tenant_id, session_id = %session_id, seats = seat_ids.len(), ttl_secs, "reserve");

        self.retry
            .run("reserve", || async move {
                let now = self.clock.now();
                let expires_at = now + Duration::seconds(ttl_secs);
                Ok(self
                    .db
                    .leases()
                    .reserve(tenant_id, session_id, seat_ids, holder_token, now, expires_at)
                    .await?)
            })
            .await
    }

    /// Drops the token's live leases. Idempotent; returns how many went.
    pub async fn release(&self, tenant_id: &str, holder_token: &str) -> CheckoutResult<u64> {
        validate_holder_token(holder_token)?;

        self.retry
            .run("release", || async move {
                Ok(self.db.leases().release(tenant_id, holder_token, self.clock.now()).await?)
            })
            .await
    }

    /// Deletes the tenant's expired leases.
    pub async fn reap(&self, tenant_id: &str) -> CheckoutResult<u64> {
        self.retry
            .run("reap", || async move { Ok(self.db.leases().reap(tenant_id, self.clock.now()).await?) })
            .await
    }

    /// Live leases of a token, soonest expiry first.
    pub async fn leases_for(&self, tenant_id: &str, holder_token: &str) -> CheckoutResult<Vec<SeatLease>> {
        validate_holder_token(holder_token)?;
        Ok(self.db.leases().leases_for(tenant_id, holder_token, self.clock.now()).await?)
    }

    /// Every seat of the session's room as available, held or sold.
    pub async fn seat_map(&self, tenant_id: &str, session_id: &str) -> CheckoutResult<Vec<SeatAvailability>> {
        Ok(self.db.leases().seat_map(tenant_id, session_id, self.clock.now()).await?)
    }
}
