//! # Ledger Arithmetic
//!
//! Header totals, per-product aggregation and invoice numbering shared by the
//! sale and purchase paths.
//!
//! ```text
//! lines ──► Σ quantity × unit_price ──► total
//!                                         │  0 ≤ discount ≤ total
//!                                         ▼
//!                                  final = total - discount
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::LineRequest;
use crate::validation::{validate_discount_cents, ValidationResult};
use crate::PURCHASE_INVOICE_PREFIX;

/// Totals of a sale or purchase header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub total_cents: i64,
    pub discount_cents: i64,
    pub final_cents: i64,
}

impl LedgerTotals {
    /// Computes header totals from request lines.
    ///
    /// Fails with `DiscountExceedsTotal` or a negative-discount error, and
    /// with `Overflow` if the amounts do not fit in an i64.
    pub fn compute(lines: &[LineRequest], discount_cents: i64) -> ValidationResult<Self> {
        let mut total = Money::zero();
        for line in lines {
            let line_total = line_total(line)?;
            total = total.checked_add(line_total).ok_or_else(|| overflow("total"))?;
        }

        validate_discount_cents(discount_cents, total.cents())?;

        Ok(LedgerTotals {
            total_cents: total.cents(),
            discount_cents,
            final_cents: total.cents() - discount_cents,
        })
    }

    #[inline]
    pub fn final_amount(&self) -> Money {
        Money::from_cents(self.final_cents)
    }
}

/// quantity × unit price of one line.
pub fn line_total(line: &LineRequest) -> ValidationResult<Money> {
    Money::from_cents(line.unit_price_cents)
        .checked_multiply_quantity(line.quantity)
        .ok_or_else(|| overflow("line total"))
}

/// Sums quantities per product, keeping the order in which each product
/// first appears.
///
/// A sale listing the same product twice must be checked against stock for
/// the combined quantity.
pub fn aggregate_quantities(lines: &[LineRequest]) -> ValidationResult<Vec<(i64, i64)>> {
    let mut totals: Vec<(i64, i64)> = Vec::with_capacity(lines.len());

    for line in lines {
        match totals.iter_mut().find(|(product_id, _)| *product_id == line.product_id) {
            Some((_, quantity)) => {
                *quantity = quantity
                    .checked_add(line.quantity)
                    .ok_or_else(|| overflow("quantity"))?;
            }
            None => totals.push((line.product_id, line.quantity)),
        }
    }

    Ok(totals)
}

/// Formats a purchase invoice number: `PUR-000042`.
///
/// Sequences past 999999 widen instead of truncating.
pub fn format_invoice_number(sequence: i64) -> String {
    format!("{}-{:06}", PURCHASE_INVOICE_PREFIX, sequence)
}

fn overflow(field: &str) -> ValidationError {
    ValidationError::Overflow {
        field: field.to_string(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
