//! # Ticket Repository
//!
//! Tickets are created only inside the finalize transaction and are never
//! deleted. Refund flips them to `refunded`, which takes them out of the
//! partial unique index and frees the seat for a later sale.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use marquee_core::Ticket;

const TICKET_COLUMNS: &str =
    "id, tenant_id, session_id, seat_id, sale_id, price_cents, status, issued_at, refunded_at";

/// Repository for ticket reads.
#[derive(Debug, Clone)]
pub struct TicketRepository {
    pool: SqlitePool,
}

impl TicketRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TicketRepository { pool }
    }

    /// Tickets issued by a sale, refunded ones included.
    pub async fn for_sale(&self, tenant_id: &str, sale_id: &str) -> DbResult<Vec<Ticket>> {
        let mut conn = self.pool.acquire().await?;
        for_sale_in(&mut conn, tenant_id, sale_id).await
    }

    /// The live ticket for a seat, if it is sold.
    pub async fn live_for_seat(&self, tenant_id: &str, session_id: &str, seat_id: &str) -> DbResult<Option<Ticket>> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets \
             WHERE tenant_id = ?1 AND session_id = ?2 AND seat_id = ?3 AND status != 'refunded'"
        );
        let ticket = sqlx::query_as::<_, Ticket>(&sql)
            .bind(tenant_id)
            .bind(session_id)
            .bind(seat_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    /// Number of live tickets sold for a session.
    pub async fn count_live_for_session(&self, tenant_id: &str, session_id: &str) -> DbResult<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets WHERE tenant_id = ?1 AND session_id = ?2 AND status != 'refunded'",
        )
        .bind(tenant_id)
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

// =============================================================================
// Connection helpers
// =============================================================================

pub(crate) async fn live_ticket_exists_in(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    session_id: &str,
    seat_id: &str,
) -> DbResult<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT 1 FROM tickets
        WHERE tenant_id = ?1 AND session_id = ?2 AND seat_id = ?3 AND status != 'refunded'
        "#,
    )
    .bind(tenant_id)
    .bind(session_id)
    .bind(seat_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.is_some())
}

/// Inserts a ticket. A live ticket for the same seat fails with
/// `UniqueViolation` from the partial index.
pub(crate) async fn issue_in(conn: &mut SqliteConnection, ticket: &Ticket) -> DbResult<()> {
    debug!(
        tenant = %ticket.tenant_id,
        session_id = %ticket.session_id,
        seat_id = %ticket.seat_id,
        sale_id = %ticket.sale_id,
        "Issuing ticket"
    );

    sqlx::query(
        r#"
        INSERT INTO tickets (id, tenant_id, session_id, seat_id, sale_id, price_cents, status, issued_at, refunded_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&ticket.id)
    .bind(&ticket.tenant_id)
    .bind(&ticket.session_id)
    .bind(&ticket.seat_id)
    .bind(&ticket.sale_id)
    .bind(ticket.price_cents)
    .bind(ticket.status)
    .bind(ticket.issued_at)
    .bind(ticket.refunded_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Marks every issued ticket of a sale refunded.
pub(crate) async fn refund_for_sale_in(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    sale_id: &str,
    now: DateTime<Utc>,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE tickets
        SET status = 'refunded', refunded_at = ?3
        WHERE tenant_id = ?1 AND sale_id = ?2 AND status = 'issued'
        "#,
    )
    .bind(tenant_id)
    .bind(sale_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn for_sale_in(conn: &mut SqliteConnection, tenant_id: &str, sale_id: &str) -> DbResult<Vec<Ticket>> {
    let sql = format!(
        "SELECT {TICKET_COLUMNS} FROM tickets WHERE tenant_id = ?1 AND sale_id = ?2 ORDER BY seat_id"
    );
    let tickets = sqlx::query_as::<_, Ticket>(&sql)
        .bind(tenant_id)
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(tickets)
}
