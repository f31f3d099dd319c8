//! # Sale Repository
//!
//! Database operations for sale headers and lines.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. CREATE (engine::sale, one transaction)                             │
//! │     └── insert() header + insert_line() per line                       │
//! │                                                                         │
//! │  2. RETURNS (engine::returns)                                          │
//! │     └── sold_quantities() bounds what may come back                    │
//! │                                                                         │
//! │  3. (OPTIONAL) DELETE (engine::delete)                                 │
//! │     └── delete() removes header, lines cascade                         │
//! │                                                                         │
//! │  Sales are never edited in place.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::ledger::LedgerTotals;
use tally_core::{LineRequest, NewSale, Sale, SaleLine, SaleRecord};

const SALE_COLUMNS: &str =
    "id, customer_id, total_cents, discount_cents, final_cents, payment_method, notes, created_at";

const LINE_COLUMNS: &str = "id, sale_id, product_id, quantity, unit_price_cents, total_cents";

// =============================================================================
// Connection-scoped operations
// =============================================================================

/// Inserts a sale header with precomputed totals.
pub async fn insert(conn: &mut SqliteConnection, request: &NewSale, totals: &LedgerTotals) -> DbResult<Sale> {
    let sale = sqlx::query_as::<_, Sale>(&format!(
        r#"
        INSERT INTO sales (
            customer_id, total_cents, discount_cents, final_cents,
            payment_method, notes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        RETURNING {SALE_COLUMNS}
        "#
    ))
    .bind(request.customer_id)
    .bind(totals.total_cents)
    .bind(totals.discount_cents)
    .bind(totals.final_cents)
    .bind(request.payment_method)
    .bind(request.notes.as_deref())
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;

    debug!(sale_id = sale.id, final_cents = sale.final_cents, "Sale header inserted");
    Ok(sale)
}

/// Inserts one sale line.
pub async fn insert_line(conn: &mut SqliteConnection, sale_id: i64, line: &LineRequest) -> DbResult<SaleLine> {
    let inserted = sqlx::query_as::<_, SaleLine>(&format!(
        r#"
        INSERT INTO sale_lines (sale_id, product_id, quantity, unit_price_cents, total_cents)
        VALUES (?1, ?2, ?3, ?4, ?5)
        RETURNING {LINE_COLUMNS}
        "#
    ))
    .bind(sale_id)
    .bind(line.product_id)
    .bind(line.quantity)
    .bind(line.unit_price_cents)
    .bind(line.quantity * line.unit_price_cents)
    .fetch_one(&mut *conn)
    .await?;

    Ok(inserted)
}

/// Reads a sale header.
pub async fn fetch(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<Option<Sale>> {
    let sale = sqlx::query_as::<_, Sale>(&format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"))
        .bind(sale_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(sale)
}

/// Reads the lines of a sale in insertion order.
pub async fn fetch_lines(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<Vec<SaleLine>> {
    let lines = sqlx::query_as::<_, SaleLine>(&format!(
        "SELECT {LINE_COLUMNS} FROM sale_lines WHERE sale_id = ?1 ORDER BY id"
    ))
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(lines)
}

/// Reads a sale with its lines.
pub async fn fetch_record(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<Option<SaleRecord>> {
    let Some(sale) = fetch(conn, sale_id).await? else {
        return Ok(None);
    };
    let lines = fetch_lines(conn, sale_id).await?;

    Ok(Some(SaleRecord { sale, lines }))
}

/// Total quantity sold per product on one sale, ordered by product id.
pub async fn sold_quantities(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<Vec<(i64, i64)>> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT product_id, SUM(quantity)
        FROM sale_lines
        WHERE sale_id = ?1
        GROUP BY product_id
        ORDER BY product_id
        "#,
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Deletes a sale header. Lines go with it.
pub async fn delete(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<()> {
    let result = sqlx::query("DELETE FROM sales WHERE id = ?1")
        .bind(sale_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Sale", sale_id));
    }

    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for reading sales.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale header by ID.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Gets a sale with its lines.
    pub async fn get_record(&self, id: i64) -> DbResult<Option<SaleRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_record(&mut conn, id).await
    }

    /// Gets all lines of a sale.
    pub async fn get_lines(&self, sale_id: i64) -> DbResult<Vec<SaleLine>> {
        let mut conn = self.pool.acquire().await?;
        fetch_lines(&mut conn, sale_id).await
    }

    /// Most recent sales first.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales ORDER BY id DESC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Counts sales (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use tally_core::{NewProduct, PaymentMethod};

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .insert(&NewProduct::new("Xiaomi 14", 1_800_000, 2_200_000).with_quantity(8))
            .await
            .unwrap();

        let lines = vec![
            LineRequest::new(product.id, 1, 2_200_000),
            LineRequest::new(product.id, 2, 2_100_000),
        ];
        let mut request = NewSale::new(lines.clone());
        request.payment_method = PaymentMethod::Card;
        let totals = LedgerTotals::compute(&lines, 0).unwrap();

        let mut tx = db.begin().await.unwrap();
        let sale = insert(&mut tx, &request, &totals).await.unwrap();
        for line in &lines {
            insert_line(&mut tx, sale.id, line).await.unwrap();
        }
        let sold = sold_quantities(&mut tx, sale.id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(sold, vec![(product.id, 3)]);

        let record = db.sales().get_record(sale.id).await.unwrap().unwrap();
        assert_eq!(record.sale.total_cents, 6_400_000);
        assert_eq!(record.sale.payment_method, PaymentMethod::Card);
        assert_eq!(record.lines.len(), 2);
        assert_eq!(record.lines[1].total_cents, 4_200_000);

        assert_eq!(db.sales().list_recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_sale() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        assert!(matches!(
            delete(&mut conn, 42).await,
            Err(DbError::NotFound { id: 42, .. })
        ));
    }
}
