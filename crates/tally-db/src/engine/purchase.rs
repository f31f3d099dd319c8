//! # Purchase Recording
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  supplier ──► invoice PUR-000042 ──► lines                              │
//! │                                        │                                │
//! │                                        ├── quantity += line.quantity    │
//! │                                        └── price_buy = line.unit_price  │
//! │                                            (later line for the same     │
//! │                                             product wins)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqliteConnection;
use tracing::{info, instrument, warn};

use crate::error::{DbError, LedgerError, LedgerResult};
use crate::repository::purchase::{self as purchase_repo, INVOICE_NUMBER_COLUMN};
use crate::repository::{movement, party, product};
use tally_core::ledger::{format_invoice_number, LedgerTotals};
use tally_core::validation::validate_lines;
use tally_core::{LedgerKind, MovementKind, NewPurchase, Purchase, PurchaseRecord, INVOICE_RETRY_LIMIT};

/// Records a purchase invoice inside the caller's transaction.
///
/// ## Errors
/// - `Validation` - empty lines, non-positive quantity, negative price,
///   discount above total
/// - `NotFound` - unknown supplier or product
/// - `Storage` - no free invoice number within [`INVOICE_RETRY_LIMIT`]
///   attempts
#[instrument(skip(conn, request), fields(supplier_id = request.supplier_id, lines = request.lines.len()))]
pub async fn create_purchase(conn: &mut SqliteConnection, request: &NewPurchase) -> LedgerResult<PurchaseRecord> {
    validate_lines("purchase", &request.lines)?;
    let totals = LedgerTotals::compute(&request.lines, request.discount_cents)?;

    let revision = movement::next_revision(conn).await?;

    if !party::supplier_exists(conn, request.supplier_id).await? {
        return Err(LedgerError::not_found("Supplier", request.supplier_id));
    }

    for line in &request.lines {
        if !product::exists(conn, line.product_id).await? {
            return Err(LedgerError::not_found("Product", line.product_id));
        }
    }

    let purchase = insert_with_invoice_number(conn, request, &totals).await?;

    let mut lines = Vec::with_capacity(request.lines.len());
    for line in &request.lines {
        lines.push(purchase_repo::insert_line(conn, purchase.id, line).await?);

        let after = product::apply_delta(conn, line.product_id, line.quantity).await?;
        product::set_price_buy(conn, line.product_id, line.unit_price_cents).await?;
        movement::record(
            conn,
            line.product_id,
            MovementKind::recorded(LedgerKind::Purchase),
            Some(purchase.id),
            line.quantity,
            after,
            revision,
        )
        .await?;
    }

    info!(
        purchase_id = purchase.id,
        invoice_number = %purchase.invoice_number,
        final_cents = purchase.final_cents,
        revision,
        "Purchase recorded"
    );

    Ok(PurchaseRecord { purchase, lines })
}

/// Inserts the header under the next free `PUR-%06d` number.
///
/// The candidate is derived from the highest purchase id. A collision with a
/// number that was typed in or left behind by a deleted purchase moves on to
/// the next candidate.
async fn insert_with_invoice_number(
    conn: &mut SqliteConnection,
    request: &NewPurchase,
    totals: &LedgerTotals,
) -> LedgerResult<Purchase> {
    let base = purchase_repo::max_id(conn).await?;
    let mut attempt: u32 = 1;

    loop {
        let invoice_number = format_invoice_number(base + i64::from(attempt));

        match purchase_repo::insert(conn, request, totals, &invoice_number).await {
            Ok(purchase) => return Ok(purchase),
            Err(e) if e.is_unique_violation_on(INVOICE_NUMBER_COLUMN) => {
                if attempt >= INVOICE_RETRY_LIMIT {
                    return Err(DbError::Internal(format!(
                        "no free invoice number after {attempt} attempts (last tried {invoice_number})"
                    ))
                    .into());
                }
                warn!(%invoice_number, attempt, "Invoice number taken, trying next");
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
