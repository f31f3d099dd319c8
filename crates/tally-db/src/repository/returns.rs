//! # Return Repository
//!
//! Returns recorded against a prior sale, and the history queries the
//! return allowance is derived from.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{AcceptedLine, NewReturn, ReturnLine, ReturnRecord, SaleReturn};

const RETURN_COLUMNS: &str = "id, sale_id, customer_id, total_cents, reason, notes, created_at";

const LINE_COLUMNS: &str = "id, return_id, product_id, quantity, price_cents, total_cents";

// =============================================================================
// Connection-scoped operations
// =============================================================================

/// Inserts a return header with the engine-computed total.
pub async fn insert(conn: &mut SqliteConnection, request: &NewReturn, total_cents: i64) -> DbResult<SaleReturn> {
    let header = sqlx::query_as::<_, SaleReturn>(&format!(
        r#"
        INSERT INTO returns (sale_id, customer_id, total_cents, reason, notes, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        RETURNING {RETURN_COLUMNS}
        "#
    ))
    .bind(request.sale_id)
    .bind(request.customer_id)
    .bind(total_cents)
    .bind(request.reason.as_deref())
    .bind(request.notes.as_deref())
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;

    debug!(return_id = header.id, sale_id = header.sale_id, total_cents, "Return header inserted");
    Ok(header)
}

/// Inserts one accepted return line.
pub async fn insert_line(conn: &mut SqliteConnection, return_id: i64, line: &AcceptedLine) -> DbResult<ReturnLine> {
    let inserted = sqlx::query_as::<_, ReturnLine>(&format!(
        r#"
        INSERT INTO return_lines (return_id, product_id, quantity, price_cents, total_cents)
        VALUES (?1, ?2, ?3, ?4, ?5)
        RETURNING {LINE_COLUMNS}
        "#
    ))
    .bind(return_id)
    .bind(line.product_id)
    .bind(line.quantity)
    .bind(line.price_cents)
    .bind(line.total_cents)
    .fetch_one(&mut *conn)
    .await?;

    Ok(inserted)
}

/// Total quantity already returned per product across every return of a
/// sale, ordered by product id.
pub async fn returned_quantities(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<Vec<(i64, i64)>> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT rl.product_id, SUM(rl.quantity)
        FROM return_lines rl
        INNER JOIN returns r ON r.id = rl.return_id
        WHERE r.sale_id = ?1
        GROUP BY rl.product_id
        ORDER BY rl.product_id
        "#,
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Ids of every return recorded against a sale, oldest first.
pub async fn ids_for_sale(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<Vec<i64>> {
    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM returns WHERE sale_id = ?1 ORDER BY id")
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(ids)
}

/// Reads a return with its lines.
pub async fn fetch_record(conn: &mut SqliteConnection, return_id: i64) -> DbResult<Option<ReturnRecord>> {
    let header = sqlx::query_as::<_, SaleReturn>(&format!(
        "SELECT {RETURN_COLUMNS} FROM returns WHERE id = ?1"
    ))
    .bind(return_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(header) = header else {
        return Ok(None);
    };

    let lines = sqlx::query_as::<_, ReturnLine>(&format!(
        "SELECT {LINE_COLUMNS} FROM return_lines WHERE return_id = ?1 ORDER BY id"
    ))
    .bind(return_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(ReturnRecord { header, lines }))
}

/// Deletes a return header. Lines go with it.
pub async fn delete(conn: &mut SqliteConnection, return_id: i64) -> DbResult<()> {
    let result = sqlx::query("DELETE FROM returns WHERE id = ?1")
        .bind(return_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Return", return_id));
    }

    Ok(())
}

/// Deletes every return of a sale and returns how many went.
pub async fn delete_for_sale(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<u64> {
    let result = sqlx::query("DELETE FROM returns WHERE sale_id = ?1")
        .bind(sale_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for reading returns.
#[derive(Debug, Clone)]
pub struct ReturnRepository {
    pool: SqlitePool,
}

impl ReturnRepository {
    /// Creates a new ReturnRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReturnRepository { pool }
    }

    /// Gets a return with its lines.
    pub async fn get_record(&self, id: i64) -> DbResult<Option<ReturnRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_record(&mut conn, id).await
    }

    /// Return headers recorded against a sale, oldest first.
    pub async fn list_for_sale(&self, sale_id: i64) -> DbResult<Vec<SaleReturn>> {
        let returns = sqlx::query_as::<_, SaleReturn>(&format!(
            "SELECT {RETURN_COLUMNS} FROM returns WHERE sale_id = ?1 ORDER BY id"
        ))
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(returns)
    }
}
