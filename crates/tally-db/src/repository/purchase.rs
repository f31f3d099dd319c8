//! # Purchase Repository
//!
//! Purchase invoice headers and lines.
//!
//! Invoice numbers are `PUR-%06d`, derived from the highest purchase id and
//! protected by a UNIQUE column. The engine regenerates on collision.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::ledger::LedgerTotals;
use tally_core::{LineRequest, NewPurchase, Purchase, PurchaseLine, PurchaseRecord};

const PURCHASE_COLUMNS: &str = "id, supplier_id, invoice_number, total_cents, discount_cents, \
                                final_cents, payment_method, notes, created_at";

const LINE_COLUMNS: &str = "id, purchase_id, product_id, quantity, unit_price_cents, total_cents";

/// Column name reported by SQLite when an invoice number collides.
pub const INVOICE_NUMBER_COLUMN: &str = "purchases.invoice_number";

// =============================================================================
// Connection-scoped operations
// =============================================================================

/// Highest purchase id so far, 0 for an empty ledger.
pub async fn max_id(conn: &mut SqliteConnection) -> DbResult<i64> {
    let max: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) FROM purchases")
        .fetch_one(&mut *conn)
        .await?;

    Ok(max)
}

/// Inserts a purchase header.
///
/// Fails with `UniqueViolation` on [`INVOICE_NUMBER_COLUMN`] if the number
/// is taken.
pub async fn insert(
    conn: &mut SqliteConnection,
    request: &NewPurchase,
    totals: &LedgerTotals,
    invoice_number: &str,
) -> DbResult<Purchase> {
    let purchase = sqlx::query_as::<_, Purchase>(&format!(
        r#"
        INSERT INTO purchases (
            supplier_id, invoice_number, total_cents, discount_cents, final_cents,
            payment_method, notes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        RETURNING {PURCHASE_COLUMNS}
        "#
    ))
    .bind(request.supplier_id)
    .bind(invoice_number)
    .bind(totals.total_cents)
    .bind(totals.discount_cents)
    .bind(totals.final_cents)
    .bind(request.payment_method)
    .bind(request.notes.as_deref())
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { field, .. } => DbError::duplicate(field, invoice_number),
        other => other,
    })?;

    debug!(purchase_id = purchase.id, invoice_number, "Purchase header inserted");
    Ok(purchase)
}

/// Inserts one purchase line.
pub async fn insert_line(
    conn: &mut SqliteConnection,
    purchase_id: i64,
    line: &LineRequest,
) -> DbResult<PurchaseLine> {
    let inserted = sqlx::query_as::<_, PurchaseLine>(&format!(
        r#"
        INSERT INTO purchase_lines (purchase_id, product_id, quantity, unit_price_cents, total_cents)
        VALUES (?1, ?2, ?3, ?4, ?5)
        RETURNING {LINE_COLUMNS}
        "#
    ))
    .bind(purchase_id)
    .bind(line.product_id)
    .bind(line.quantity)
    .bind(line.unit_price_cents)
    .bind(line.quantity * line.unit_price_cents)
    .fetch_one(&mut *conn)
    .await?;

    Ok(inserted)
}

/// Reads a purchase with its lines.
pub async fn fetch_record(conn: &mut SqliteConnection, purchase_id: i64) -> DbResult<Option<PurchaseRecord>> {
    let purchase = sqlx::query_as::<_, Purchase>(&format!(
        "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = ?1"
    ))
    .bind(purchase_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(purchase) = purchase else {
        return Ok(None);
    };

    let lines = sqlx::query_as::<_, PurchaseLine>(&format!(
        "SELECT {LINE_COLUMNS} FROM purchase_lines WHERE purchase_id = ?1 ORDER BY id"
    ))
    .bind(purchase_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(PurchaseRecord { purchase, lines }))
}

/// Deletes a purchase header. Lines go with it.
pub async fn delete(conn: &mut SqliteConnection, purchase_id: i64) -> DbResult<()> {
    let result = sqlx::query("DELETE FROM purchases WHERE id = ?1")
        .bind(purchase_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Purchase", purchase_id));
    }

    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for reading purchase invoices.
#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    /// Creates a new PurchaseRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    /// Gets a purchase with its lines.
    pub async fn get_record(&self, id: i64) -> DbResult<Option<PurchaseRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_record(&mut conn, id).await
    }

    /// Looks a purchase up by its invoice number.
    pub async fn get_by_invoice_number(&self, invoice_number: &str) -> DbResult<Option<Purchase>> {
        let purchase = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE invoice_number = ?1"
        ))
        .bind(invoice_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(purchase)
    }

    /// Purchases from one supplier, newest first.
    pub async fn list_for_supplier(&self, supplier_id: i64) -> DbResult<Vec<Purchase>> {
        let purchases = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE supplier_id = ?1 ORDER BY id DESC"
        ))
        .bind(supplier_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(purchases)
    }
}
