//! # Ledger Entry Deletion
//!
//! Deleting an entry reverses its stock effect in the same transaction.
//!
//! ```text
//! ┌───────────┬────────────────────────────────────────────────────────────┐
//! │ Sale      │ + (sold - returned) per product                            │
//! │           │ its returns are deleted with it                            │
//! ├───────────┼────────────────────────────────────────────────────────────┤
//! │ Purchase  │ - purchased quantity per product                           │
//! │           │ refused with InsufficientStock if the goods are gone       │
//! │           │ price_buy is left as it is                                 │
//! ├───────────┼────────────────────────────────────────────────────────────┤
//! │ Return    │ - returned quantity per product, floored at zero stock     │
//! └───────────┴────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each reversal is journaled with the `*Reversal` movement kind, so the
//! journal still sums to the current quantities afterwards.

use std::collections::BTreeMap;

use sqlx::SqliteConnection;
use tracing::{debug, info, instrument, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::repository::{
    movement, product, purchase as purchase_repo, returns as return_repo, sale as sale_repo,
};
use tally_core::{CoreError, DeletionReceipt, LedgerKind, MovementKind, StockChange};

/// Deletes a sale, purchase or return inside the caller's transaction.
///
/// ## Errors
/// - `NotFound` - no entry of that kind with that id
/// - `InsufficientStock` - deleting a purchase whose goods were already sold
#[instrument(skip(conn))]
pub async fn delete_entry(conn: &mut SqliteConnection, kind: LedgerKind, id: i64) -> LedgerResult<DeletionReceipt> {
    let revision = movement::next_revision(conn).await?;

    let receipt = match kind {
        LedgerKind::Sale => delete_sale(conn, id, revision).await?,
        LedgerKind::Purchase => delete_purchase(conn, id, revision).await?,
        LedgerKind::Return => delete_return(conn, id, revision).await?,
    };

    info!(
        %kind,
        entry_id = id,
        products = receipt.stock_changes.len(),
        cascaded_returns = receipt.cascaded_returns.len(),
        revision,
        "Ledger entry deleted"
    );

    Ok(receipt)
}

async fn delete_sale(conn: &mut SqliteConnection, sale_id: i64, revision: i64) -> LedgerResult<DeletionReceipt> {
    if sale_repo::fetch(conn, sale_id).await?.is_none() {
        return Err(LedgerError::not_found(LedgerKind::Sale.entity(), sale_id));
    }

    let sold = sale_repo::sold_quantities(conn, sale_id).await?;
    let returned: BTreeMap<i64, i64> = return_repo::returned_quantities(conn, sale_id)
        .await?
        .into_iter()
        .collect();
    let cascaded_returns = return_repo::ids_for_sale(conn, sale_id).await?;

    let mut stock_changes = Vec::with_capacity(sold.len());
    for (product_id, sold_quantity) in sold {
        let delta = (sold_quantity - returned.get(&product_id).copied().unwrap_or(0)).max(0);
        if delta == 0 {
            continue;
        }
        let change = reverse(conn, LedgerKind::Sale, sale_id, product_id, delta, revision).await?;
        stock_changes.push(change);
    }

    if !cascaded_returns.is_empty() {
        let removed = return_repo::delete_for_sale(conn, sale_id).await?;
        debug!(sale_id, removed, "Returns of deleted sale removed");
    }
    sale_repo::delete(conn, sale_id).await?;

    Ok(DeletionReceipt {
        kind: LedgerKind::Sale,
        entry_id: sale_id,
        cascaded_returns,
        stock_changes,
    })
}

async fn delete_purchase(
    conn: &mut SqliteConnection,
    purchase_id: i64,
    revision: i64,
) -> LedgerResult<DeletionReceipt> {
    let record = purchase_repo::fetch_record(conn, purchase_id)
        .await?
        .ok_or_else(|| LedgerError::not_found(LedgerKind::Purchase.entity(), purchase_id))?;

    let received = sum_by_product(record.lines.iter().map(|l| (l.product_id, l.quantity)));

    let mut stock_changes = Vec::with_capacity(received.len());
    for (product_id, quantity) in received {
        let change = reverse(conn, LedgerKind::Purchase, purchase_id, product_id, -quantity, revision)
            .await
            .inspect_err(|e| {
                if let LedgerError::Domain(CoreError::InsufficientStock { available, .. }) = e {
                    warn!(purchase_id, product_id, available, quantity, "Purchased stock already gone");
                }
            })?;
        stock_changes.push(change);
    }

    purchase_repo::delete(conn, purchase_id).await?;

    Ok(DeletionReceipt {
        kind: LedgerKind::Purchase,
        entry_id: purchase_id,
        cascaded_returns: Vec::new(),
        stock_changes,
    })
}

async fn delete_return(conn: &mut SqliteConnection, return_id: i64, revision: i64) -> LedgerResult<DeletionReceipt> {
    let record = return_repo::fetch_record(conn, return_id)
        .await?
        .ok_or_else(|| LedgerError::not_found(LedgerKind::Return.entity(), return_id))?;

    let restocked = sum_by_product(record.lines.iter().map(|l| (l.product_id, l.quantity)));

    let mut stock_changes = Vec::with_capacity(restocked.len());
    for (product_id, quantity) in restocked {
        let on_hand = product::stock_level(conn, product_id)
            .await?
            .map(|level| level.quantity)
            .unwrap_or(0);

        let taken = quantity.min(on_hand);
        if taken < quantity {
            warn!(return_id, product_id, quantity, on_hand, "Return reversal floored at zero stock");
        }
        if taken == 0 {
            continue;
        }

        let change = reverse(conn, LedgerKind::Return, return_id, product_id, -taken, revision).await?;
        stock_changes.push(change);
    }

    return_repo::delete(conn, return_id).await?;

    Ok(DeletionReceipt {
        kind: LedgerKind::Return,
        entry_id: return_id,
        cascaded_returns: Vec::new(),
        stock_changes,
    })
}

/// Applies one reversal delta and journals it.
async fn reverse(
    conn: &mut SqliteConnection,
    kind: LedgerKind,
    entry_id: i64,
    product_id: i64,
    delta: i64,
    revision: i64,
) -> LedgerResult<StockChange> {
    let quantity_after = product::apply_delta(conn, product_id, delta).await?;
    movement::record(
        conn,
        product_id,
        MovementKind::reversal(kind),
        Some(entry_id),
        delta,
        quantity_after,
        revision,
    )
    .await?;

    Ok(StockChange {
        product_id,
        delta,
        quantity_after,
    })
}

fn sum_by_product(pairs: impl Iterator<Item = (i64, i64)>) -> BTreeMap<i64, i64> {
    let mut sums = BTreeMap::new();
    for (product_id, quantity) in pairs {
        *sums.entry(product_id).or_insert(0) += quantity;
    }
    sums
}
