//! # Reconciliation Engine
//!
//! Every stock mutation in the system goes through here.
//!
//! ## Transaction Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 One operation = one transaction                         │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    │                                                                    │
//! │    ├── UPDATE ledger_state SET revision = revision + 1  ← writer lock   │
//! │    │                                                                    │
//! │    ├── validate against catalog + ledger history                        │
//! │    │     (stock levels, sold / already returned)                        │
//! │    │                                                                    │
//! │    ├── insert header + lines                                            │
//! │    ├── apply guarded deltas, journal each one                           │
//! │    │                                                                    │
//! │  COMMIT  (any error above: the transaction is dropped → ROLLBACK)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Taking the writer lock first means two sales of the last unit cannot both
//! pass the stock check: the second one waits, then sees the first one's
//! decrement.
//!
//! ## Two Ways to Call
//! ```rust,ignore
//! // Convenience: one transaction per call
//! let record = db.ledger().create_sale(&request).await?;
//!
//! // Explicit: caller owns the transaction and decides when to commit
//! let mut tx = db.ledger().begin().await?;
//! let record = engine::sale::create_sale(&mut tx, &request).await?;
//! tx.commit().await?;
//! ```

pub mod delete;
pub mod purchase;
pub mod returns;
pub mod sale;

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::repository::sale as sale_repo;
use tally_core::{
    DeletionReceipt, LedgerKind, NewPurchase, NewReturn, NewSale, PurchaseRecord, ReturnReceipt,
    ReturnableQuantity, SaleRecord,
};

/// Entry point to the reconciliation engine.
///
/// Cheap to clone; holds only the pool.
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    pub fn new(pool: SqlitePool) -> Self {
        Ledger { pool }
    }

    /// Starts a transaction for the connection-scoped engine functions.
    pub async fn begin(&self) -> LedgerResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Records a sale. All lines or nothing.
    pub async fn create_sale(&self, request: &NewSale) -> LedgerResult<SaleRecord> {
        let mut tx = self.begin().await?;
        let record = sale::create_sale(&mut tx, request).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Records a purchase invoice.
    pub async fn create_purchase(&self, request: &NewPurchase) -> LedgerResult<PurchaseRecord> {
        let mut tx = self.begin().await?;
        let record = purchase::create_purchase(&mut tx, request).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Records a return against a prior sale.
    pub async fn create_return(&self, request: &NewReturn) -> LedgerResult<ReturnReceipt> {
        let mut tx = self.begin().await?;
        let receipt = returns::create_return(&mut tx, request).await?;
        tx.commit().await?;
        Ok(receipt)
    }

    /// Deletes a ledger entry after reversing its stock effect.
    pub async fn delete_entry(&self, kind: LedgerKind, id: i64) -> LedgerResult<DeletionReceipt> {
        let mut tx = self.begin().await?;
        let receipt = delete::delete_entry(&mut tx, kind, id).await?;
        tx.commit().await?;
        Ok(receipt)
    }

    /// Sold / returned / remaining per product of a sale.
    ///
    /// Read-only; useful to prefill a return form. The figures may be stale
    /// by the time a return is submitted, `create_return` re-derives them.
    pub async fn returnable(&self, sale_id: i64) -> LedgerResult<Vec<ReturnableQuantity>> {
        let mut conn = self.pool.acquire().await?;

        if sale_repo::fetch(&mut conn, sale_id).await?.is_none() {
            return Err(LedgerError::not_found("Sale", sale_id));
        }

        let summary = returns::load_allowance(&mut conn, sale_id).await?.summary();
        debug!(sale_id, products = summary.len(), "Returnable quantities read");
        Ok(summary)
    }
}

// =============================================================================
// Shared test fixtures
// =============================================================================

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::pool::{Database, DbConfig};
    use tally_core::{NewParty, NewProduct};

    /// A fresh in-memory database with two phones, a supplier and a customer.
    pub struct Shop {
        pub db: Database,
        pub iphone: i64,
        pub galaxy: i64,
        pub supplier: i64,
        pub customer: i64,
    }

    impl Shop {
        pub async fn open() -> Shop {
            Shop::with_db(Database::new(DbConfig::in_memory()).await.unwrap()).await
        }

        pub async fn with_db(db: Database) -> Shop {
            let iphone = db
                .products()
                .insert(
                    &NewProduct::new("iPhone 15 Pro", 4_500_000, 5_200_000)
                        .with_quantity(10)
                        .with_min_quantity(3),
                )
                .await
                .unwrap()
                .id;
            let galaxy = db
                .products()
                .insert(
                    &NewProduct::new("Samsung Galaxy S24", 2_500_000, 3_000_000)
                        .with_quantity(15)
                        .with_min_quantity(5),
                )
                .await
                .unwrap()
                .id;
            let supplier = db
                .parties()
                .insert_supplier(&NewParty::new("أحمد محمد"))
                .await
                .unwrap()
                .id;
            let customer = db
                .parties()
                .insert_customer(&NewParty::new("محمد علي"))
                .await
                .unwrap()
                .id;

            Shop {
                db,
                iphone,
                galaxy,
                supplier,
                customer,
            }
        }

        pub async fn qty(&self, product_id: i64) -> i64 {
            self.db.products().get_quantity(product_id).await.unwrap()
        }

        /// Opening quantity plus every journaled delta must equal the
        /// current quantity.
        pub async fn assert_conserved(&self, product_id: i64, opening: i64) {
            let net = self.db.movements().net_delta(product_id).await.unwrap();
            assert_eq!(opening + net, self.qty(product_id).await);
        }
    }
}

// =============================================================================
// Scenario Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::fixtures::Shop;
    use super::*;
    use crate::pool::{Database, DbConfig};
    use std::collections::HashSet;
    use std::path::PathBuf;
    use tally_core::{
        CoreError, ErrorKind, LineOutcome, LineRequest, NewParty, NewProduct, ReturnLineRequest,
    };

    #[tokio::test]
    async fn test_sell_return_clamp_then_no_valid_lines() {
        let shop = Shop::open().await;
        let ledger = shop.db.ledger();
        let p = shop
            .db
            .products()
            .insert(&NewProduct::new("Xiaomi 14", 1_800_000, 2_200_000).with_quantity(10))
            .await
            .unwrap()
            .id;

        let sale = ledger
            .create_sale(&NewSale::new(vec![LineRequest::new(p, 4, 100)]))
            .await
            .unwrap();
        assert_eq!(shop.qty(p).await, 6);
        assert_eq!(sale.sale.final_cents, 400);

        let receipt = ledger
            .create_return(&NewReturn::new(
                sale.sale.id,
                vec![ReturnLineRequest::new(p, 6, 100)],
            ))
            .await
            .unwrap();
        assert_eq!(shop.qty(p).await, 10);
        assert_eq!(receipt.record.header.total_cents, 400);
        assert_eq!(receipt.record.lines[0].quantity, 4);
        assert!(receipt.outcomes[0].is_clamped());

        let err = ledger
            .create_return(&NewReturn::new(
                sale.sale.id,
                vec![ReturnLineRequest::new(p, 1, 100)],
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoValidLines);
        assert_eq!(shop.qty(p).await, 10);
        assert_eq!(
            shop.db.returns().list_for_sale(sale.sale.id).await.unwrap().len(),
            1
        );

        shop.assert_conserved(p, 10).await;
    }

    #[tokio::test]
    async fn test_purchase_updates_price_and_quantity() {
        let shop = Shop::open().await;
        let p = shop
            .db
            .products()
            .insert(&NewProduct::new("Huawei P60 Pro", 40, 60).with_quantity(5))
            .await
            .unwrap()
            .id;

        let record = shop
            .db
            .ledger()
            .create_purchase(&NewPurchase::new(
                shop.supplier,
                vec![LineRequest::new(p, 20, 50)],
            ))
            .await
            .unwrap();

        let product = shop.db.products().get_by_id(p).await.unwrap().unwrap();
        assert_eq!(product.price_buy_cents, 50);
        assert_eq!(product.quantity, 25);
        assert_eq!(record.purchase.invoice_number, "PUR-000001");
        shop.assert_conserved(p, 5).await;
    }

    #[tokio::test]
    async fn test_returnable_summary() {
        let shop = Shop::open().await;
        let ledger = shop.db.ledger();

        let sale = ledger
            .create_sale(&NewSale::new(vec![
                LineRequest::new(shop.iphone, 2, 5_200_000),
                LineRequest::new(shop.galaxy, 3, 3_000_000),
            ]))
            .await
            .unwrap();
        ledger
            .create_return(&NewReturn::new(
                sale.sale.id,
                vec![ReturnLineRequest::new(shop.galaxy, 1, 3_000_000)],
            ))
            .await
            .unwrap();

        let summary = ledger.returnable(sale.sale.id).await.unwrap();
        let galaxy = summary.iter().find(|r| r.product_id == shop.galaxy).unwrap();
        assert_eq!((galaxy.sold, galaxy.returned, galaxy.remaining), (3, 1, 2));
        let iphone = summary.iter().find(|r| r.product_id == shop.iphone).unwrap();
        assert_eq!(iphone.remaining, 2);

        let err = ledger.returnable(9_999).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_explicit_transaction_rolls_back_on_drop() {
        let shop = Shop::open().await;
        let ledger = shop.db.ledger();

        {
            let mut tx = ledger.begin().await.unwrap();
            sale::create_sale(
                &mut tx,
                &NewSale::new(vec![LineRequest::new(shop.iphone, 3, 5_200_000)]),
            )
            .await
            .unwrap();
            // dropped without commit
        }

        assert_eq!(shop.qty(shop.iphone).await, 10);
        assert_eq!(shop.db.sales().count().await.unwrap(), 0);
        assert_eq!(shop.db.movements().net_delta(shop.iphone).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_conservation_over_mixed_sequence() {
        let shop = Shop::open().await;
        let ledger = shop.db.ledger();

        let purchase = ledger
            .create_purchase(&NewPurchase::new(
                shop.supplier,
                vec![
                    LineRequest::new(shop.iphone, 5, 4_400_000),
                    LineRequest::new(shop.galaxy, 5, 2_400_000),
                ],
            ))
            .await
            .unwrap();
        let sale = ledger
            .create_sale(&NewSale::new(vec![
                LineRequest::new(shop.iphone, 12, 5_200_000),
                LineRequest::new(shop.galaxy, 1, 3_000_000),
            ]))
            .await
            .unwrap();
        let failed = ledger
            .create_sale(&NewSale::new(vec![LineRequest::new(shop.iphone, 4, 5_200_000)]))
            .await;
        assert!(matches!(
            failed,
            Err(LedgerError::Domain(CoreError::InsufficientStock { available: 3, .. }))
        ));
        let ret = ledger
            .create_return(&NewReturn::new(
                sale.sale.id,
                vec![ReturnLineRequest::new(shop.iphone, 2, 5_200_000)],
            ))
            .await
            .unwrap();
        ledger
            .delete_entry(LedgerKind::Return, ret.record.header.id)
            .await
            .unwrap();
        ledger
            .delete_entry(LedgerKind::Sale, sale.sale.id)
            .await
            .unwrap();
        ledger
            .delete_entry(LedgerKind::Purchase, purchase.purchase.id)
            .await
            .unwrap();

        assert_eq!(shop.qty(shop.iphone).await, 10);
        assert_eq!(shop.qty(shop.galaxy).await, 15);
        shop.assert_conserved(shop.iphone, 10).await;
        shop.assert_conserved(shop.galaxy, 15).await;
    }

    /// A file-backed database with room for concurrent writers; the
    /// in-memory one is pinned to a single connection.
    async fn file_db(tag: &str) -> (Database, PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "tally-{tag}-{}-{}.db",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let db = Database::new(DbConfig::new(&path).max_connections(8))
            .await
            .unwrap();
        (db, path)
    }

    async fn drop_file_db(db: Database, path: PathBuf) {
        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sales_never_oversell() {
        let (db, path) = file_db("concurrent-sales").await;
        let p = db
            .products()
            .insert(&NewProduct::new("iPhone 15 Pro", 4_500_000, 5_200_000).with_quantity(5))
            .await
            .unwrap()
            .id;

        let mut handles = Vec::new();
        for _ in 0..12 {
            let ledger = db.ledger();
            handles.push(tokio::spawn(async move {
                ledger
                    .create_sale(&NewSale::new(vec![LineRequest::new(p, 1, 5_200_000)]))
                    .await
            }));
        }

        let mut sold = 0;
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => sold += 1,
                Err(e) => {
                    assert_eq!(e.kind(), ErrorKind::InsufficientStock, "{e}");
                    refused += 1;
                }
            }
        }

        assert_eq!(sold, 5);
        assert_eq!(refused, 7);
        assert_eq!(db.products().get_quantity(p).await.unwrap(), 0);
        assert_eq!(db.movements().net_delta(p).await.unwrap(), -5);

        drop_file_db(db, path).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_returns_never_exceed_sold_quantity() {
        let (db, path) = file_db("concurrent-returns").await;
        let p = db
            .products()
            .insert(&NewProduct::new("iPhone 15 Pro", 4_500_000, 5_200_000).with_quantity(10))
            .await
            .unwrap()
            .id;
        let sale = db
            .ledger()
            .create_sale(&NewSale::new(vec![LineRequest::new(p, 5, 5_200_000)]))
            .await
            .unwrap();
        let sale_id = sale.sale.id;
        assert_eq!(db.products().get_quantity(p).await.unwrap(), 5);

        let mut handles = Vec::new();
        for _ in 0..12 {
            let ledger = db.ledger();
            handles.push(tokio::spawn(async move {
                ledger
                    .create_return(&NewReturn::new(
                        sale_id,
                        vec![ReturnLineRequest::new(p, 1, 5_200_000)],
                    ))
                    .await
            }));
        }

        let mut returned = 0;
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(receipt) => {
                    assert_eq!(receipt.record.lines.len(), 1);
                    assert_eq!(receipt.record.lines[0].quantity, 1);
                    returned += 1;
                }
                Err(e) => {
                    assert_eq!(e.kind(), ErrorKind::NoValidLines, "{e}");
                    refused += 1;
                }
            }
        }

        assert_eq!(returned, 5);
        assert_eq!(refused, 7);
        assert_eq!(db.products().get_quantity(p).await.unwrap(), 10);
        assert_eq!(db.movements().net_delta(p).await.unwrap(), 0);
        assert_eq!(db.returns().list_for_sale(sale_id).await.unwrap().len(), 5);

        let summary = db.ledger().returnable(sale_id).await.unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].returned, 5);
        assert_eq!(summary[0].remaining, 0);

        drop_file_db(db, path).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_purchases_get_unique_invoice_numbers() {
        let (db, path) = file_db("concurrent-purchases").await;
        let supplier = db
            .parties()
            .insert_supplier(&NewParty::new("أحمد محمد"))
            .await
            .unwrap()
            .id;
        let p = db
            .products()
            .insert(&NewProduct::new("Samsung Galaxy S24", 2_500_000, 3_000_000).with_quantity(15))
            .await
            .unwrap()
            .id;

        let mut handles = Vec::new();
        for _ in 0..12 {
            let ledger = db.ledger();
            handles.push(tokio::spawn(async move {
                ledger
                    .create_purchase(&NewPurchase::new(
                        supplier,
                        vec![LineRequest::new(p, 1, 2_500_000)],
                    ))
                    .await
            }));
        }

        let mut invoices = HashSet::new();
        for handle in handles {
            let record = handle.await.unwrap().unwrap();
            invoices.insert(record.purchase.invoice_number);
        }

        assert_eq!(invoices.len(), 12);
        assert_eq!(db.products().get_quantity(p).await.unwrap(), 27);
        assert_eq!(db.movements().net_delta(p).await.unwrap(), 12);

        drop_file_db(db, path).await;
    }

    #[tokio::test]
    async fn test_outcomes_reported_in_request_order() {
        let shop = Shop::open().await;
        let ledger = shop.db.ledger();
        let sale = ledger
            .create_sale(&NewSale::new(vec![LineRequest::new(shop.iphone, 1, 5_200_000)]))
            .await
            .unwrap();

        let receipt = ledger
            .create_return(&NewReturn::new(
                sale.sale.id,
                vec![
                    ReturnLineRequest::new(shop.galaxy, 1, 3_000_000),
                    ReturnLineRequest::new(shop.iphone, 1, 5_200_000),
                ],
            ))
            .await
            .unwrap();

        assert!(matches!(receipt.outcomes[0], LineOutcome::Rejected { .. }));
        assert!(receipt.outcomes[1].is_accepted());
        assert_eq!(receipt.record.lines.len(), 1);
        assert_eq!(shop.qty(shop.galaxy).await, 15);
    }
}
