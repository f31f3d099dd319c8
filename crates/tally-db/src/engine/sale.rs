//! # Sale Recording
//!
//! A sale is all or nothing: if any product is missing or short, no header,
//! no line and no stock change is persisted.

use sqlx::SqliteConnection;
use tracing::{info, instrument, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::repository::{movement, party, product, sale as sale_repo};
use tally_core::ledger::{aggregate_quantities, LedgerTotals};
use tally_core::validation::validate_lines;
use tally_core::{CoreError, LedgerKind, MovementKind, NewSale, SaleRecord};

/// Records a sale inside the caller's transaction.
///
/// Quantities of repeated products are summed before the stock check, so two
/// lines of 3 against a stock of 5 fail as a single demand of 6.
///
/// ## Errors
/// - `Validation` - empty lines, non-positive quantity, negative price,
///   discount above total
/// - `NotFound` - unknown customer or product
/// - `InsufficientStock` - first product whose demand exceeds stock
#[instrument(skip(conn, request), fields(lines = request.lines.len()))]
pub async fn create_sale(conn: &mut SqliteConnection, request: &NewSale) -> LedgerResult<SaleRecord> {
    validate_lines("sale", &request.lines)?;
    let totals = LedgerTotals::compute(&request.lines, request.discount_cents)?;
    let demand = aggregate_quantities(&request.lines)?;

    let revision = movement::next_revision(conn).await?;

    if let Some(customer_id) = request.customer_id {
        if !party::customer_exists(conn, customer_id).await? {
            return Err(LedgerError::not_found("Customer", customer_id));
        }
    }

    for &(product_id, quantity) in &demand {
        let level = product::stock_level(conn, product_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Product", product_id))?;

        if level.quantity < quantity {
            warn!(
                product_id,
                available = level.quantity,
                requested = quantity,
                "Sale refused, insufficient stock"
            );
            return Err(CoreError::InsufficientStock {
                product_id,
                product: level.name,
                available: level.quantity,
                requested: quantity,
            }
            .into());
        }
    }

    let sale = sale_repo::insert(conn, request, &totals).await?;

    let mut lines = Vec::with_capacity(request.lines.len());
    for line in &request.lines {
        lines.push(sale_repo::insert_line(conn, sale.id, line).await?);
    }

    for &(product_id, quantity) in &demand {
        let after = product::apply_delta(conn, product_id, -quantity).await?;
        movement::record(
            conn,
            product_id,
            MovementKind::recorded(LedgerKind::Sale),
            Some(sale.id),
            -quantity,
            after,
            revision,
        )
        .await?;
    }

    info!(
        sale_id = sale.id,
        final_cents = sale.final_cents,
        revision,
        "Sale recorded"
    );

    Ok(SaleRecord { sale, lines })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::Shop;
    use tally_core::{ErrorKind, LineRequest, ValidationError};

    #[tokio::test]
    async fn test_sale_decrements_and_journals() {
        let shop = Shop::open().await;

        let mut request = NewSale::new(vec![
            LineRequest::new(shop.iphone, 2, 5_200_000),
            LineRequest::new(shop.galaxy, 1, 3_000_000),
        ]);
        request.customer_id = Some(shop.customer);
        request.discount_cents = 400_000;

        let record = shop.db.ledger().create_sale(&request).await.unwrap();

        assert_eq!(record.sale.total_cents, 13_400_000);
        assert_eq!(record.sale.final_cents, 13_000_000);
        assert_eq!(record.lines.len(), 2);
        assert_eq!(shop.qty(shop.iphone).await, 8);
        assert_eq!(shop.qty(shop.galaxy).await, 14);

        let journal = shop
            .db
            .movements()
            .list_for_entry(&[MovementKind::Sale], record.sale.id)
            .await
            .unwrap();
        assert_eq!(journal.len(), 2);
        assert!(journal.iter().all(|m| m.delta < 0));
    }

    #[tokio::test]
    async fn test_short_second_line_persists_nothing() {
        let shop = Shop::open().await;

        let err = shop
            .db
            .ledger()
            .create_sale(&NewSale::new(vec![
                LineRequest::new(shop.iphone, 1, 5_200_000),
                LineRequest::new(shop.galaxy, 16, 3_000_000),
            ]))
            .await
            .unwrap_err();

        match err {
            LedgerError::Domain(CoreError::InsufficientStock {
                product_id,
                available,
                requested,
                ..
            }) => {
                assert_eq!(product_id, shop.galaxy);
                assert_eq!(available, 15);
                assert_eq!(requested, 16);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        assert_eq!(shop.qty(shop.iphone).await, 10);
        assert_eq!(shop.qty(shop.galaxy).await, 15);
        assert_eq!(shop.db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_repeated_product_demand_is_summed() {
        let shop = Shop::open().await;

        let err = shop
            .db
            .ledger()
            .create_sale(&NewSale::new(vec![
                LineRequest::new(shop.iphone, 6, 5_200_000),
                LineRequest::new(shop.iphone, 6, 5_200_000),
            ]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);

        shop.db
            .ledger()
            .create_sale(&NewSale::new(vec![
                LineRequest::new(shop.iphone, 5, 5_200_000),
                LineRequest::new(shop.iphone, 5, 5_000_000),
            ]))
            .await
            .unwrap();
        assert_eq!(shop.qty(shop.iphone).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_product_and_customer() {
        let shop = Shop::open().await;
        let ledger = shop.db.ledger();

        let err = ledger
            .create_sale(&NewSale::new(vec![LineRequest::new(999, 1, 100)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut request = NewSale::new(vec![LineRequest::new(shop.iphone, 1, 100)]);
        request.customer_id = Some(777);
        let err = ledger.create_sale(&request).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Domain(CoreError::NotFound { ref entity, id: 777 }) if entity == "Customer"
        ));
        assert_eq!(shop.qty(shop.iphone).await, 10);
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected_before_stock() {
        let shop = Shop::open().await;
        let ledger = shop.db.ledger();

        let err = ledger.create_sale(&NewSale::new(vec![])).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Domain(CoreError::Validation(ValidationError::EmptyLines { .. }))
        ));

        let err = ledger
            .create_sale(&NewSale::new(vec![LineRequest::new(shop.iphone, 0, 100)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let mut request = NewSale::new(vec![LineRequest::new(shop.iphone, 1, 100)]);
        request.discount_cents = 101;
        let err = ledger.create_sale(&request).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Domain(CoreError::Validation(ValidationError::DiscountExceedsTotal { .. }))
        ));

        assert_eq!(shop.db.movements().current_revision().await.unwrap(), 0);
    }
}
