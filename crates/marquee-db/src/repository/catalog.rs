//! # Catalog Repository
//!
//! Reference data the engine reads but does not own: sessions, seats,
//! customers and discount codes. The insert methods exist for the seed
//! binary and tests; production data arrives through the back-office CRUD
//! that sits outside this workspace.
//!
//! The only write the engine itself makes here is consuming one use of a
//! discount code, inside the `ApplyDiscount` transaction.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use marquee_core::discount::DiscountCode;
use marquee_core::{Customer, Session};

/// Repository for reference data.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn session(&self, tenant_id: &str, session_id: &str) -> DbResult<Option<Session>> {
        let mut conn = self.pool.acquire().await?;
        session_in(&mut conn, tenant_id, session_id).await
    }

    /// Seat labels of a room, in label order.
    pub async fn seats_in_room(&self, tenant_id: &str, room_id: &str) -> DbResult<Vec<String>> {
        let seats = sqlx::query_scalar(
            "SELECT seat_id FROM seats WHERE tenant_id = ?1 AND room_id = ?2 ORDER BY seat_id",
        )
        .bind(tenant_id)
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(seats)
    }

    pub async fn customer(&self, tenant_id: &str, customer_id: &str) -> DbResult<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        customer_in(&mut conn, tenant_id, customer_id).await
    }

    pub async fn discount_code(&self, tenant_id: &str, code: &str) -> DbResult<Option<DiscountCode>> {
        let mut conn = self.pool.acquire().await?;
        discount_code_in(&mut conn, tenant_id, code).await
    }

    // -------------------------------------------------------------------------
    // Inserts (seed / tests)
    // -------------------------------------------------------------------------

    pub async fn insert_session(&self, session: &Session) -> DbResult<()> {
        debug!(tenant = %session.tenant_id, session_id = %session.id, "Inserting session");

        sqlx::query(
            r#"
            INSERT INTO sessions (id, tenant_id, room_id, title, starts_at, ends_at, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&session.id)
        .bind(&session.tenant_id)
        .bind(&session.room_id)
        .bind(&session.title)
        .bind(session.starts_at)
        .bind(session.ends_at)
        .bind(session.status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Adds seats to a room. Existing seats are left alone.
    pub async fn insert_seats(&self, tenant_id: &str, room_id: &str, seat_ids: &[&str]) -> DbResult<()> {
        debug!(tenant = %tenant_id, room_id = %room_id, count = seat_ids.len(), "Inserting seats");

        let mut tx = self.pool.begin().await?;
        for seat_id in seat_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO seats (tenant_id, room_id, seat_id) VALUES (?1, ?2, ?3)",
            )
            .bind(tenant_id)
            .bind(room_id)
            .bind(*seat_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    pub async fn insert_customer(&self, customer: &Customer) -> DbResult<()> {
        sqlx::query("INSERT INTO customers (id, tenant_id, name, birth_date) VALUES (?1, ?2, ?3, ?4)")
            .bind(&customer.id)
            .bind(&customer.tenant_id)
            .bind(&customer.name)
            .bind(customer.birth_date)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_discount_code(&self, code: &DiscountCode) -> DbResult<()> {
        debug!(tenant = %code.tenant_id, code = %code.code, "Inserting discount code");

        sqlx::query(
            r#"
            INSERT INTO discount_codes (
                tenant_id, code, kind, value, valid_from, valid_until,
                max_uses, used_count, min_age, max_age
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&code.tenant_id)
        .bind(&code.code)
        .bind(code.kind)
        .bind(code.value)
        .bind(code.valid_from)
        .bind(code.valid_until)
        .bind(code.max_uses)
        .bind(code.used_count)
        .bind(code.min_age)
        .bind(code.max_age)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Connection helpers
// =============================================================================

pub(crate) async fn session_in(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    session_id: &str,
) -> DbResult<Option<Session>> {
    let session = sqlx::query_as::<_, Session>(
        r#"
        SELECT id, tenant_id, room_id, title, starts_at, ends_at, status
        FROM sessions
        WHERE tenant_id = ?1 AND id = ?2
        "#,
    )
    .bind(tenant_id)
    .bind(session_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(session)
}

pub(crate) async fn seat_exists_in(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    room_id: &str,
    seat_id: &str,
) -> DbResult<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM seats WHERE tenant_id = ?1 AND room_id = ?2 AND seat_id = ?3",
    )
    .bind(tenant_id)
    .bind(room_id)
    .bind(seat_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.is_some())
}

pub(crate) async fn customer_in(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    customer_id: &str,
) -> DbResult<Option<Customer>> {
    let customer = sqlx::query_as::<_, Customer>(
        "SELECT id, tenant_id, name, birth_date FROM customers WHERE tenant_id = ?1 AND id = ?2",
    )
    .bind(tenant_id)
    .bind(customer_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(customer)
}

pub(crate) async fn discount_code_in(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    code: &str,
) -> DbResult<Option<DiscountCode>> {
    let code = sqlx::query_as::<_, DiscountCode>(
        r#"
        SELECT tenant_id, code, kind, value, valid_from, valid_until,
               max_uses, used_count, min_age, max_age
        FROM discount_codes
        WHERE tenant_id = ?1 AND code = ?2
        "#,
    )
    .bind(tenant_id)
    .bind(code)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(code)
}

/// Consumes one use of a code. Returns `false` when the cap was reached
/// by a concurrent application since the code was read.
pub(crate) async fn consume_discount_use_in(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    code: &str,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE discount_codes
        SET used_count = used_count + 1
        WHERE tenant_id = ?1 AND code = ?2
          AND (max_uses IS NULL OR used_count < max_uses)
        "#,
    )
    .bind(tenant_id)
    .bind(code)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
