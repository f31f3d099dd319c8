//! # Return Recording
//!
//! Returns are lenient per line: a candidate that cannot be honoured is
//! reported and skipped, one asking for too much is clamped. Only when
//! nothing is left does the whole request fail.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Returnable quantity, per product                        │
//! │                                                                         │
//! │   sold on this sale  ─┐                                                 │
//! │                       ├──►  remaining = sold - returned                 │
//! │   returned so far    ─┘     (re-read inside the transaction,            │
//! │   (all earlier returns       never cached on the sale)                  │
//! │    of this sale)                                                        │
//! │                                                                         │
//! │   candidate qty > remaining  →  clamped to remaining                    │
//! │   remaining == 0             →  rejected: FullyReturned                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The header total is always the sum of accepted lines. There is no way
//! to pass a total in.

use std::collections::HashSet;

use sqlx::SqliteConnection;
use tracing::{debug, info, instrument, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::repository::{movement, party, product, returns as return_repo, sale as sale_repo};
use tally_core::{LedgerKind, MovementKind, NewReturn, ReturnAllowance, ReturnReceipt, ReturnRecord};

/// Reads what a sale sold and what its returns already gave back.
pub async fn load_allowance(conn: &mut SqliteConnection, sale_id: i64) -> LedgerResult<ReturnAllowance> {
    let sold = sale_repo::sold_quantities(conn, sale_id).await?;
    let returned = return_repo::returned_quantities(conn, sale_id).await?;

    Ok(ReturnAllowance::new(sale_id, sold, returned))
}

/// Records a return inside the caller's transaction.
///
/// ## Errors
/// - `NotFound` - unknown sale, or unknown customer when one is given
/// - `NoValidLines` - every candidate was rejected; carries the outcomes
#[instrument(skip(conn, request), fields(sale_id = request.sale_id, lines = request.lines.len()))]
pub async fn create_return(conn: &mut SqliteConnection, request: &NewReturn) -> LedgerResult<ReturnReceipt> {
    let revision = movement::next_revision(conn).await?;

    if sale_repo::fetch(conn, request.sale_id).await?.is_none() {
        return Err(LedgerError::not_found("Sale", request.sale_id));
    }

    if let Some(customer_id) = request.customer_id {
        if !party::customer_exists(conn, customer_id).await? {
            return Err(LedgerError::not_found("Customer", customer_id));
        }
    }

    let allowance = load_allowance(conn, request.sale_id).await?;

    // Products absent from the sale only matter for the rejection reason.
    let mut known = HashSet::new();
    for candidate in &request.lines {
        let id = candidate.product_id;
        if allowance.sold(id) == 0 && !known.contains(&id) && product::exists(conn, id).await? {
            known.insert(id);
        }
    }

    let plan = allowance
        .plan(&request.lines, |id| known.contains(&id))
        .inspect_err(|e| warn!(error = %e, "Return refused"))?;

    for outcome in plan.outcomes.iter().filter(|o| !o.is_accepted()) {
        debug!(?outcome, "Return line skipped");
    }

    let header = return_repo::insert(conn, request, plan.total_cents).await?;

    let mut lines = Vec::new();
    for accepted in plan.accepted() {
        lines.push(return_repo::insert_line(conn, header.id, &accepted).await?);

        let after = product::apply_delta(conn, accepted.product_id, accepted.quantity).await?;
        movement::record(
            conn,
            accepted.product_id,
            MovementKind::recorded(LedgerKind::Return),
            Some(header.id),
            accepted.quantity,
            after,
            revision,
        )
        .await?;
    }

    info!(
        return_id = header.id,
        total_cents = header.total_cents,
        accepted = lines.len(),
        skipped = plan.outcomes.len() - lines.len(),
        revision,
        "Return recorded"
    );

    Ok(ReturnReceipt {
        record: ReturnRecord { header, lines },
        outcomes: plan.outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::Shop;
    use tally_core::{
        CoreError, ErrorKind, LineOutcome, LineRequest, NewProduct, NewSale, RejectReason,
        ReturnLineRequest, SaleRecord,
    };

    async fn sell(shop: &Shop, lines: Vec<LineRequest>) -> SaleRecord {
        shop.db.ledger().create_sale(&NewSale::new(lines)).await.unwrap()
    }

    #[tokio::test]
    async fn test_partial_returns_accumulate() {
        let shop = Shop::open().await;
        let sale = sell(&shop, vec![LineRequest::new(shop.galaxy, 5, 3_000_000)]).await;
        let ledger = shop.db.ledger();

        for _ in 0..2 {
            ledger
                .create_return(&NewReturn::new(
                    sale.sale.id,
                    vec![ReturnLineRequest::new(shop.galaxy, 2, 3_000_000)],
                ))
                .await
                .unwrap();
        }

        let third = ledger
            .create_return(&NewReturn::new(
                sale.sale.id,
                vec![ReturnLineRequest::new(shop.galaxy, 2, 3_000_000)],
            ))
            .await
            .unwrap();
        assert_eq!(third.record.lines[0].quantity, 1);
        assert_eq!(third.record.header.total_cents, 3_000_000);
        assert_eq!(shop.qty(shop.galaxy).await, 15);
        shop.assert_conserved(shop.galaxy, 15).await;
    }

    #[tokio::test]
    async fn test_total_is_sum_of_accepted_lines() {
        let shop = Shop::open().await;
        let sale = sell(
            &shop,
            vec![
                LineRequest::new(shop.iphone, 2, 5_200_000),
                LineRequest::new(shop.galaxy, 1, 3_000_000),
            ],
        )
        .await;

        let mut request = NewReturn::new(
            sale.sale.id,
            vec![
                ReturnLineRequest::new(shop.iphone, 1, 5_000_000),
                ReturnLineRequest::new(shop.galaxy, 0, 3_000_000),
                ReturnLineRequest::new(shop.galaxy, 3, 2_900_000),
            ],
        );
        request.reason = Some("عيب مصنعي".to_string());

        let receipt = shop.db.ledger().create_return(&request).await.unwrap();

        assert_eq!(receipt.record.header.total_cents, 5_000_000 + 2_900_000);
        assert_eq!(receipt.record.lines.len(), 2);
        assert!(matches!(
            receipt.outcomes[1],
            LineOutcome::Rejected {
                reason: RejectReason::NonPositiveQuantity,
                ..
            }
        ));
        assert!(receipt.outcomes[2].is_clamped());
        assert_eq!(shop.qty(shop.iphone).await, 9);
        assert_eq!(shop.qty(shop.galaxy).await, 15);
    }

    #[tokio::test]
    async fn test_rejection_reasons() {
        let shop = Shop::open().await;
        let sale = sell(&shop, vec![LineRequest::new(shop.iphone, 1, 5_200_000)]).await;

        let err = shop
            .db
            .ledger()
            .create_return(&NewReturn::new(
                sale.sale.id,
                vec![
                    ReturnLineRequest::new(shop.galaxy, 1, 3_000_000),
                    ReturnLineRequest::new(999, 1, 100),
                    ReturnLineRequest::new(shop.iphone, 1, 0),
                ],
            ))
            .await
            .unwrap_err();

        let LedgerError::Domain(CoreError::NoValidLines { sale_id, outcomes }) = err else {
            panic!("expected NoValidLines");
        };
        assert_eq!(sale_id, sale.sale.id);
        let reasons: Vec<_> = outcomes
            .iter()
            .map(|o| match o {
                LineOutcome::Rejected { reason, .. } => *reason,
                LineOutcome::Accepted { .. } => panic!("nothing should be accepted"),
            })
            .collect();
        assert_eq!(
            reasons,
            vec![
                RejectReason::NotSoldOnSale,
                RejectReason::UnknownProduct,
                RejectReason::NonPositivePrice,
            ]
        );
        assert_eq!(shop.qty(shop.iphone).await, 9);
    }

    #[tokio::test]
    async fn test_unknown_sale_and_customer() {
        let shop = Shop::open().await;
        let ledger = shop.db.ledger();

        let err = ledger
            .create_return(&NewReturn::new(
                4242,
                vec![ReturnLineRequest::new(shop.iphone, 1, 100)],
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let sale = sell(&shop, vec![LineRequest::new(shop.iphone, 1, 5_200_000)]).await;
        let mut request =
            NewReturn::new(sale.sale.id, vec![ReturnLineRequest::new(shop.iphone, 1, 100)]);
        request.customer_id = Some(shop.customer + 50);
        let err = ledger.create_return(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        request.customer_id = Some(shop.customer);
        let receipt = ledger.create_return(&request).await.unwrap();
        assert_eq!(receipt.record.header.customer_id, Some(shop.customer));
    }

    #[tokio::test]
    async fn test_empty_request_has_no_valid_lines() {
        let shop = Shop::open().await;
        let sale = sell(&shop, vec![LineRequest::new(shop.iphone, 1, 5_200_000)]).await;

        let err = shop
            .db
            .ledger()
            .create_return(&NewReturn::new(sale.sale.id, vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoValidLines);
    }

    #[tokio::test]
    async fn test_duplicate_candidates_share_allowance() {
        let shop = Shop::open().await;
        let p = shop
            .db
            .products()
            .insert(&NewProduct::new("Huawei P60 Pro", 2_800_000, 3_500_000).with_quantity(5))
            .await
            .unwrap()
            .id;
        let sale = sell(&shop, vec![LineRequest::new(p, 3, 3_500_000)]).await;

        let receipt = shop
            .db
            .ledger()
            .create_return(&NewReturn::new(
                sale.sale.id,
                vec![
                    ReturnLineRequest::new(p, 2, 3_500_000),
                    ReturnLineRequest::new(p, 2, 3_500_000),
                    ReturnLineRequest::new(p, 2, 3_500_000),
                ],
            ))
            .await
            .unwrap();

        let quantities: Vec<i64> = receipt.record.lines.iter().map(|l| l.quantity).collect();
        assert_eq!(quantities, vec![2, 1]);
        assert!(!receipt.outcomes[2].is_accepted());
        assert_eq!(shop.qty(p).await, 5);
    }
}
