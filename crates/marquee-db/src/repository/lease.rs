//! # Lease Repository
//!
//! Seat holds: time-boxed exclusive claims on (session, seat) pairs.
//!
//! ## Reserve Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   1. DELETE expired leases for tenant    ← write first: takes the lock │
//! │   2. session exists and is scheduled?                                  │
//! │   3. every seat exists in the session's room?                          │
//! │   4. for each seat:                                                    │
//! │        live ticket?                   → conflict                       │
//! │        live lease, other token?       → conflict                       │
//! │   5. any conflict → SeatUnavailable(all conflicting seats), ROLLBACK   │
//! │   6. UPSERT each lease (same token extends, others never overwrite)    │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The primary key (tenant_id, session_id, seat_id) is the storage backstop:
//! the upsert only updates a row held by the same token or already expired,
//! so a racing writer that slipped past step 4 affects zero rows and the
//! whole reservation is rejected.
//!
//! Expiry is stored as `expires_at_ms` (INTEGER epoch millis) and a lease is
//! live while `expires_at_ms > now`.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::{catalog, ticket};
use marquee_core::{CoreError, LeaseGrant, SeatAvailability, SeatLease, SeatState};

/// Row shape of `seat_leases`.
#[derive(Debug, FromRow)]
struct LeaseRow {
    tenant_id: String,
    session_id: String,
    seat_id: String,
    holder_token: String,
    expires_at_ms: i64,
}

impl From<LeaseRow> for SeatLease {
    fn from(row: LeaseRow) -> Self {
        SeatLease {
            tenant_id: row.tenant_id,
            session_id: row.session_id,
            seat_id: row.seat_id,
            holder_token: row.holder_token,
            expires_at: millis_to_datetime(row.expires_at_ms),
        }
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Repository for seat lease operations.
#[derive(Debug, Clone)]
pub struct LeaseRepository {
    pool: SqlitePool,
}

impl LeaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LeaseRepository { pool }
    }

    /// Grants or extends holds on every seat in `seat_ids`, or none.
    ///
    /// ## Errors
    /// - `NotFound` session or seat absent for this tenant
    /// - `SessionNotBookable` session not scheduled
    /// - `SeatUnavailable` listing every seat that is sold or held by
    ///   another token
    pub async fn reserve(
        &self,
        tenant_id: &str,
        session_id: &str,
        seat_ids: &[String],
        holder_token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> DbResult<LeaseGrant> {
        debug!(
            tenant = %tenant_id,
            session_id = %session_id,
            seats = seat_ids.len(),
            "Reserving seats"
        );

        let mut tx = self.pool.begin().await?;

        let reaped = reap_in(&mut tx, tenant_id, now).await?;
        if reaped > 0 {
            debug!(tenant = %tenant_id, reaped, "Reaped expired leases before reserve");
        }

        let session = catalog::session_in(&mut tx, tenant_id, session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Session", session_id))?;
        session.ensure_bookable()?;

        for seat_id in seat_ids {
            if !catalog::seat_exists_in(&mut tx, tenant_id, &session.room_id, seat_id).await? {
                return Err(CoreError::not_found("Seat", seat_id.as_str()).into());
            }
        }

        let mut conflicts = Vec::new();
        for seat_id in seat_ids {
            if seat_conflicts_in(&mut tx, tenant_id, session_id, seat_id, holder_token, now).await? {
                conflicts.push(seat_id.clone());
            }
        }
        if !conflicts.is_empty() {
            return Err(CoreError::seats_unavailable(conflicts).into());
        }

        for seat_id in seat_ids {
            let acquired = acquire_in(
                &mut tx,
                tenant_id,
                session_id,
                seat_id,
                holder_token,
                now,
                expires_at,
            )
            .await?;
            if !acquired {
                conflicts.push(seat_id.clone());
            }
        }
        if !conflicts.is_empty() {
            return Err(CoreError::seats_unavailable(conflicts).into());
        }

        tx.commit().await?;

        info!(
            tenant = %tenant_id,
            session_id = %session_id,
            seats = ?seat_ids,
            "Seat leases granted"
        );

        Ok(LeaseGrant {
            session_id: session_id.to_string(),
            holder_token: holder_token.to_string(),
            granted: seat_ids.to_vec(),
            expires_at,
        })
    }

    /// Deletes every live lease owned by `holder_token`. Idempotent.
    pub async fn release(&self, tenant_id: &str, holder_token: &str, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM seat_leases
            WHERE tenant_id = ?1 AND holder_token = ?2 AND expires_at_ms > ?3
            "#,
        )
        .bind(tenant_id)
        .bind(holder_token)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        debug!(tenant = %tenant_id, released = result.rows_affected(), "Released leases");
        Ok(result.rows_affected())
    }

    /// Deletes every expired lease of the tenant.
    pub async fn reap(&self, tenant_id: &str, now: DateTime<Utc>) -> DbResult<u64> {
        let mut conn = self.pool.acquire().await?;
        reap_in(&mut conn, tenant_id, now).await
    }

    /// Tenants that currently have expired leases waiting to be reaped.
    pub async fn tenants_with_expired(&self, now: DateTime<Utc>) -> DbResult<Vec<String>> {
        let tenants = sqlx::query_scalar(
            "SELECT DISTINCT tenant_id FROM seat_leases WHERE expires_at_ms <= ?1 ORDER BY tenant_id",
        )
        .bind(now.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;
        Ok(tenants)
    }

    /// Live leases of a holder token, for hold countdowns.
    pub async fn leases_for(&self, tenant_id: &str, holder_token: &str, now: DateTime<Utc>) -> DbResult<Vec<SeatLease>> {
        let rows = sqlx::query_as::<_, LeaseRow>(
            r#"
            SELECT tenant_id, session_id, seat_id, holder_token, expires_at_ms
            FROM seat_leases
            WHERE tenant_id = ?1 AND holder_token = ?2 AND expires_at_ms > ?3
            ORDER BY session_id, seat_id
            "#,
        )
        .bind(tenant_id)
        .bind(holder_token)
        .bind(now.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SeatLease::from).collect())
    }

    /// Every seat of the session's room with its current occupancy.
    ///
    /// Sold wins over held; expired leases count as available.
    pub async fn seat_map(&self, tenant_id: &str, session_id: &str, now: DateTime<Utc>) -> DbResult<Vec<SeatAvailability>> {
        let mut conn = self.pool.acquire().await?;

        let session = catalog::session_in(&mut conn, tenant_id, session_id)
            .await?
            .ok_or_else(|| DbError::from(CoreError::not_found("Session", session_id)))?;

        let rows: Vec<(String, Option<String>, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT s.seat_id, t.id, l.expires_at_ms
            FROM seats s
            LEFT JOIN tickets t
                ON t.tenant_id = s.tenant_id
               AND t.session_id = ?2
               AND t.seat_id = s.seat_id
               AND t.status != 'refunded'
            LEFT JOIN seat_leases l
                ON l.tenant_id = s.tenant_id
               AND l.session_id = ?2
               AND l.seat_id = s.seat_id
               AND l.expires_at_ms > ?4
            WHERE s.tenant_id = ?1 AND s.room_id = ?3
            ORDER BY s.seat_id
            "#,
        )
        .bind(tenant_id)
        .bind(session_id)
        .bind(&session.room_id)
        .bind(now.timestamp_millis())
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(seat_id, ticket_id, lease_expiry)| match (ticket_id, lease_expiry) {
                (Some(_), _) => SeatAvailability {
                    seat_id,
                    state: SeatState::Sold,
                    held_until: None,
                },
                (None, Some(ms)) => SeatAvailability {
                    seat_id,
                    state: SeatState::Held,
                    held_until: Some(millis_to_datetime(ms)),
                },
                (None, None) => SeatAvailability {
                    seat_id,
                    state: SeatState::Available,
                    held_until: None,
                },
            })
            .collect())
    }
}

// =============================================================================
// Connection helpers
// =============================================================================

pub(crate) async fn reap_in(conn: &mut SqliteConnection, tenant_id: &str, now: DateTime<Utc>) -> DbResult<u64> {
    let result = sqlx::query("DELETE FROM seat_leases WHERE tenant_id = ?1 AND expires_at_ms <= ?2")
        .bind(tenant_id)
        .bind(now.timestamp_millis())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Whether a seat is sold, or held live by a token other than `holder_token`.
pub(crate) async fn seat_conflicts_in(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    session_id: &str,
    seat_id: &str,
    holder_token: &str,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    if ticket::live_ticket_exists_in(conn, tenant_id, session_id, seat_id).await? {
        return Ok(true);
    }

    let other_holder: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT 1 FROM seat_leases
        WHERE tenant_id = ?1 AND session_id = ?2 AND seat_id = ?3
          AND holder_token != ?4 AND expires_at_ms > ?5
        "#,
    )
    .bind(tenant_id)
    .bind(session_id)
    .bind(seat_id)
    .bind(holder_token)
    .bind(now.timestamp_millis())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(other_holder.is_some())
}

/// Creates or extends a lease for `holder_token`.
///
/// Takes over an expired lease of another token; never overwrites a live
/// one. Returns `false` when the seat is held live by someone else.
pub(crate) async fn acquire_in(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    session_id: &str,
    seat_id: &str,
    holder_token: &str,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO seat_leases (tenant_id, session_id, seat_id, holder_token, expires_at_ms, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT (tenant_id, session_id, seat_id) DO UPDATE
            SET holder_token = excluded.holder_token,
                expires_at_ms = excluded.expires_at_ms
            WHERE seat_leases.holder_token = excluded.holder_token
               OR seat_leases.expires_at_ms <= ?7
        "#,
    )
    .bind(tenant_id)
    .bind(session_id)
    .bind(seat_id)
    .bind(holder_token)
    .bind(expires_at.timestamp_millis())
    .bind(now)
    .bind(now.timestamp_millis())
    .execute(&mut *conn)
    .await;

    match result {
        Ok(done) => Ok(done.rows_affected() == 1),
        Err(err) => {
            let err = DbError::from(err);
            if err.is_unique_violation() {
                Ok(false)
            } else {
                Err(err)
            }
        }
    }
}

/// Deletes one seat's lease if `holder_token` owns it.
pub(crate) async fn release_seat_in(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    session_id: &str,
    seat_id: &str,
    holder_token: &str,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM seat_leases
        WHERE tenant_id = ?1 AND session_id = ?2 AND seat_id = ?3 AND holder_token = ?4
        "#,
    )
    .bind(tenant_id)
    .bind(session_id)
    .bind(seat_id)
    .bind(holder_token)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Deletes every lease of a token, live or expired.
pub(crate) async fn release_token_in(conn: &mut SqliteConnection, tenant_id: &str, holder_token: &str) -> DbResult<u64> {
    let result = sqlx::query("DELETE FROM seat_leases WHERE tenant_id = ?1 AND holder_token = ?2")
        .bind(tenant_id)
        .bind(holder_token)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

// =============================================================================
// Unit Tests
// =============================================================================
