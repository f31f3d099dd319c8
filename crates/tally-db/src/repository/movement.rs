//! # Stock Movement Journal
//!
//! Every quantity change the engine applies is appended here, stamped with
//! the ledger revision of the transaction that made it.
//!
//! ```text
//!  revision 7  sale      #12   product 1   -4   → 6
//!  revision 8  return    #3    product 1   +4   → 10
//!  revision 9  purchase  #5    product 2  +20   → 35
//! ```
//!
//! For any product, `opening quantity + net_delta = current quantity` as
//! long as all changes went through the engine or a catalog adjustment.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::trace;

use crate::error::DbResult;
use tally_core::{MovementKind, StockMovement};

/// Bumps the single-row ledger revision and returns the new value.
///
/// Run it as the FIRST statement of a ledger transaction. The write takes
/// SQLite's writer lock, so every read that follows sees the latest
/// committed history and no other writer can interleave until commit.
pub async fn next_revision(conn: &mut SqliteConnection) -> DbResult<i64> {
    let revision: i64 = sqlx::query_scalar(
        "UPDATE ledger_state SET revision = revision + 1 WHERE id = 1 RETURNING revision",
    )
    .fetch_one(&mut *conn)
    .await?;

    trace!(revision, "Ledger revision taken");
    Ok(revision)
}

/// Appends one movement.
#[allow(clippy::too_many_arguments)]
pub async fn record(
    conn: &mut SqliteConnection,
    product_id: i64,
    kind: MovementKind,
    entry_id: Option<i64>,
    delta: i64,
    quantity_after: i64,
    revision: i64,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            product_id, kind, entry_id, delta, quantity_after, revision, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(product_id)
    .bind(kind)
    .bind(entry_id)
    .bind(delta)
    .bind(quantity_after)
    .bind(revision)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Repository for reading the journal.
#[derive(Debug, Clone)]
pub struct MovementRepository {
    pool: SqlitePool,
}

impl MovementRepository {
    /// Creates a new MovementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MovementRepository { pool }
    }

    /// All movements of one product, oldest first.
    pub async fn list_for_product(&self, product_id: i64) -> DbResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, product_id, kind, entry_id, delta, quantity_after, revision, created_at
            FROM stock_movements
            WHERE product_id = ?1
            ORDER BY id
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Movements produced by one ledger entry (sale, purchase or return id).
    pub async fn list_for_entry(
        &self,
        kinds: &[MovementKind],
        entry_id: i64,
    ) -> DbResult<Vec<StockMovement>> {
        let mut movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, product_id, kind, entry_id, delta, quantity_after, revision, created_at
            FROM stock_movements
            WHERE entry_id = ?1
            ORDER BY id
            "#,
        )
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await?;

        movements.retain(|m| kinds.contains(&m.kind));
        Ok(movements)
    }

    /// Sum of all deltas journaled for a product.
    pub async fn net_delta(&self, product_id: i64) -> DbResult<i64> {
        let net: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(delta), 0) FROM stock_movements WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(net)
    }

    /// Current ledger revision.
    pub async fn current_revision(&self) -> DbResult<i64> {
        let revision: i64 = sqlx::query_scalar("SELECT revision FROM ledger_state WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(revision)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use tally_core::NewProduct;

    #[tokio::test]
    async fn test_revision_increments() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        assert_eq!(next_revision(&mut tx).await.unwrap(), 1);
        assert_eq!(next_revision(&mut tx).await.unwrap(), 2);
        tx.commit().await.unwrap();

        assert_eq!(db.movements().current_revision().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rolled_back_revision_is_discarded() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        next_revision(&mut tx).await.unwrap();
        drop(tx);

        assert_eq!(db.movements().current_revision().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_record_and_net_delta() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .insert(&NewProduct::new("Huawei P60 Pro", 2_800_000, 3_500_000).with_quantity(5))
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        let revision = next_revision(&mut tx).await.unwrap();
        record(&mut tx, product.id, MovementKind::Sale, Some(1), -2, 3, revision)
            .await
            .unwrap();
        record(&mut tx, product.id, MovementKind::Return, Some(1), 1, 4, revision)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let movements = db.movements().list_for_product(product.id).await.unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[0].kind, MovementKind::Sale);
        assert_eq!(movements[1].quantity_after, 4);
        assert_eq!(db.movements().net_delta(product.id).await.unwrap(), -1);

        let sale_moves = db
            .movements()
            .list_for_entry(&[MovementKind::Sale], 1)
            .await
            .unwrap();
        assert_eq!(sale_moves.len(), 1);
    }
}
