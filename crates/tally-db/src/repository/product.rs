//! # Product Repository
//!
//! The product catalog: on-hand quantities, reorder thresholds and prices.
//!
//! ## Key Operations
//! - `get_quantity` / `is_low_stock` / `list_low_stock` - side-effect free reads
//! - `apply_delta` - the only way a quantity changes
//! - `set_price_buy` - last-purchase-price-wins, used by purchases
//!
//! ## Guarded Delta Update
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Stock Update Strategy                                │
//! │                                                                         │
//! │  ❌ WRONG: read, compute, write back (lost updates under concurrency)   │
//! │     SELECT quantity ...;  UPDATE products SET quantity = 7 ...          │
//! │                                                                         │
//! │  ✅ CORRECT: one guarded statement                                      │
//! │     UPDATE products SET quantity = quantity + ?delta                    │
//! │     WHERE id = ? AND quantity + ?delta >= 0                             │
//! │     RETURNING quantity                                                  │
//! │                                                                         │
//! │  No row back?  product missing     → NotFound                          │
//! │                quantity too low    → InsufficientStock                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult, LedgerError, LedgerResult};
use crate::repository::movement;
use tally_core::validation::validate_new_product;
use tally_core::{CoreError, MovementKind, NewProduct, Product, DEFAULT_MIN_QUANTITY};

const PRODUCT_COLUMNS: &str = "id, name, barcode, price_buy_cents, price_sell_cents, \
                               quantity, min_quantity, created_at, updated_at";

/// Name and on-hand quantity of one product, read inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StockLevel {
    pub name: String,
    pub quantity: i64,
}

// =============================================================================
// Connection-scoped primitives
// =============================================================================

/// Reads a product's name and quantity on the given connection.
pub async fn stock_level(conn: &mut SqliteConnection, product_id: i64) -> DbResult<Option<StockLevel>> {
    let level = sqlx::query_as::<_, StockLevel>("SELECT name, quantity FROM products WHERE id = ?1")
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(level)
}

/// Whether a product id exists.
pub async fn exists(conn: &mut SqliteConnection, product_id: i64) -> DbResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM products WHERE id = ?1")
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(found.is_some())
}

/// Adds `delta` to a product's quantity and returns the new quantity.
///
/// Nothing is applied if the result would be negative.
///
/// ## Errors
/// - `NotFound` - no such product
/// - `InsufficientStock` - `quantity + delta < 0`
pub async fn apply_delta(conn: &mut SqliteConnection, product_id: i64, delta: i64) -> LedgerResult<i64> {
    let updated: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE products
        SET quantity = quantity + ?2, updated_at = ?3
        WHERE id = ?1 AND quantity + ?2 >= 0
        RETURNING quantity
        "#,
    )
    .bind(product_id)
    .bind(delta)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(quantity) = updated {
        debug!(product_id, delta, quantity, "Stock delta applied");
        return Ok(quantity);
    }

    match stock_level(conn, product_id).await? {
        None => Err(LedgerError::not_found("Product", product_id)),
        Some(level) => Err(CoreError::InsufficientStock {
            product_id,
            product: level.name,
            available: level.quantity,
            requested: -delta,
        }
        .into()),
    }
}

/// Overwrites the last purchase cost.
pub async fn set_price_buy(conn: &mut SqliteConnection, product_id: i64, price_buy_cents: i64) -> DbResult<()> {
    let result = sqlx::query("UPDATE products SET price_buy_cents = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(product_id)
        .bind(price_buy_cents)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", product_id));
    }

    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
///
/// let qty = repo.get_quantity(product_id).await?;
/// let low = repo.list_low_stock().await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Inserted product with generated id
    /// * `InvalidInput` - validation failed or the barcode already exists
    pub async fn insert(&self, product: &NewProduct) -> LedgerResult<Product> {
        validate_new_product(product)?;

        debug!(name = %product.name, "Inserting product");

        let now = Utc::now();
        let inserted = sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products (
                name, barcode, price_buy_cents, price_sell_cents,
                quantity, min_quantity, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product.name.trim())
        .bind(product.barcode.as_deref().map(str::trim))
        .bind(product.price_buy_cents)
        .bind(product.price_sell_cents)
        .bind(product.quantity)
        .bind(product.min_quantity.unwrap_or(DEFAULT_MIN_QUANTITY))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => {
                DbError::duplicate(field, product.barcode.clone().unwrap_or_default())
            }
            other => other,
        })?;

        Ok(inserted)
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists all products by name.
    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Current on-hand quantity.
    ///
    /// `NotFound` if the product does not exist.
    pub async fn get_quantity(&self, id: i64) -> LedgerResult<i64> {
        let quantity: Option<i64> = sqlx::query_scalar("SELECT quantity FROM products WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        quantity.ok_or_else(|| LedgerError::not_found("Product", id))
    }

    /// `quantity <= min_quantity`. Side-effect free.
    pub async fn is_low_stock(&self, id: i64) -> LedgerResult<bool> {
        let low: Option<bool> =
            sqlx::query_scalar("SELECT quantity <= min_quantity FROM products WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        low.ok_or_else(|| LedgerError::not_found("Product", id))
    }

    /// Products at or below their reorder threshold, lowest stock first.
    pub async fn list_low_stock(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE quantity <= min_quantity
            ORDER BY quantity, name
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Applies a manual stock adjustment (stock count, breakage).
    ///
    /// Runs in its own transaction and is journaled as
    /// [`MovementKind::Adjustment`] so stock conservation still holds.
    pub async fn apply_delta(&self, id: i64, delta: i64) -> LedgerResult<i64> {
        let mut tx = self.pool.begin().await?;

        let revision = movement::next_revision(&mut tx).await?;
        let quantity = apply_delta(&mut tx, id, delta).await?;
        movement::record(&mut tx, id, MovementKind::Adjustment, None, delta, quantity, revision).await?;

        tx.commit().await?;

        info!(product_id = id, delta, quantity, "Stock adjusted");
        Ok(quantity)
    }

    /// Deletes a product that no ledger entry references.
    ///
    /// The reference check runs after the revision bump, under the same
    /// writer lock the engine holds, so no sale can slip in between.
    ///
    /// ## Errors
    /// - `NotFound` - no such product
    /// - `InUse` - sale, purchase or return lines reference it
    pub async fn delete(&self, id: i64) -> LedgerResult<()> {
        let mut tx = self.pool.begin().await?;
        movement::next_revision(&mut tx).await?;

        let references: i64 = sqlx::query_scalar(
            r#"
            SELECT
                (SELECT COUNT(*) FROM sale_lines WHERE product_id = ?1) +
                (SELECT COUNT(*) FROM purchase_lines WHERE product_id = ?1) +
                (SELECT COUNT(*) FROM return_lines WHERE product_id = ?1)
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if references > 0 {
            return Err(DbError::InUse {
                entity: "Product".to_string(),
                id,
            }
            .into());
        }

        sqlx::query("DELETE FROM stock_movements WHERE product_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("Product", id));
        }
        tx.commit().await?;

        info!(product_id = id, "Product deleted");
        Ok(())
    }

    /// Counts products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
