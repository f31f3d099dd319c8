//! # Return Allowance
//!
//! Decides how much of a sale may still be returned.
//!
//! ## The Bound
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  For one sale S and one product P:                                      │
//! │                                                                         │
//! │    Σ returned(P) over every return of S  ≤  Σ sold(P) on S              │
//! │                                                                         │
//! │  remaining = sold - returned                                            │
//! │                                                                         │
//! │  candidate (P, qty, price)                                              │
//! │      │                                                                  │
//! │      ├── qty ≤ 0 / price ≤ 0 / unknown P ──► Rejected                   │
//! │      ├── remaining ≤ 0                    ──► Rejected                   │
//! │      ├── amount overflows the total       ──► Rejected                   │
//! │      ├── qty > remaining                  ──► Accepted(remaining)        │
//! │      └── otherwise                        ──► Accepted(qty)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both sides of the bound come from ledger history read inside the same
//! transaction that writes the return; nothing here is cached.
//!
//! Candidates for the same product are processed in order and draw down one
//! shared allowance, so `[(P, 3), (P, 3)]` against 4 sold accepts 3 then 1.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::ReturnLineRequest;

// =============================================================================
// Outcomes
// =============================================================================

/// Why a return candidate was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NonPositiveQuantity,
    NonPositivePrice,
    /// The product does not exist in the catalog.
    UnknownProduct,
    /// The product exists but was not on this sale.
    NotSoldOnSale,
    /// Everything sold has already been returned.
    FullyReturned,
    /// The line's amount does not fit in the return total.
    AmountOverflow,
}

/// The decision for one candidate line, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LineOutcome {
    Accepted {
        product_id: i64,
        /// Quantity the caller asked for.
        requested: i64,
        /// Quantity that will be restocked, `<= requested`.
        quantity: i64,
        price_cents: i64,
    },
    Rejected {
        product_id: i64,
        reason: RejectReason,
    },
}

impl LineOutcome {
    pub fn product_id(&self) -> i64 {
        match self {
            LineOutcome::Accepted { product_id, .. } | LineOutcome::Rejected { product_id, .. } => {
                *product_id
            }
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, LineOutcome::Accepted { .. })
    }

    /// Accepted with less than was requested.
    pub fn is_clamped(&self) -> bool {
        matches!(self, LineOutcome::Accepted { requested, quantity, .. } if quantity < requested)
    }
}

/// One accepted line, ready to be restocked and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedLine {
    pub product_id: i64,
    pub quantity: i64,
    pub price_cents: i64,
    pub total_cents: i64,
}

/// Result of planning a return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnPlan {
    pub outcomes: Vec<LineOutcome>,
    /// Σ accepted quantity × price. This is the header total.
    pub total_cents: i64,
}

impl ReturnPlan {
    /// Accepted lines in request order.
    pub fn accepted(&self) -> impl Iterator<Item = AcceptedLine> + '_ {
        self.outcomes.iter().filter_map(|outcome| match *outcome {
            LineOutcome::Accepted {
                product_id,
                quantity,
                price_cents,
                ..
            } => Some(AcceptedLine {
                product_id,
                quantity,
                price_cents,
                total_cents: quantity * price_cents,
            }),
            LineOutcome::Rejected { .. } => None,
        })
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Allowance
// =============================================================================

/// Per-product quantities sold on a sale and returned against it so far.
#[derive(Debug, Clone, Default)]
pub struct ReturnAllowance {
    sale_id: i64,
    sold: BTreeMap<i64, i64>,
    returned: BTreeMap<i64, i64>,
}

/// Sold / returned / remaining for one product of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnableQuantity {
    pub product_id: i64,
    pub sold: i64,
    pub returned: i64,
    pub remaining: i64,
}

impl ReturnAllowance {
    /// Builds the allowance from `(product_id, quantity)` pairs. Pairs for the
    /// same product are summed.
    pub fn new(
        sale_id: i64,
        sold: impl IntoIterator<Item = (i64, i64)>,
        returned: impl IntoIterator<Item = (i64, i64)>,
    ) -> Self {
        ReturnAllowance {
            sale_id,
            sold: sum_by_product(sold),
            returned: sum_by_product(returned),
        }
    }

    pub fn sale_id(&self) -> i64 {
        self.sale_id
    }

    pub fn sold(&self, product_id: i64) -> i64 {
        self.sold.get(&product_id).copied().unwrap_or(0)
    }

    pub fn returned(&self, product_id: i64) -> i64 {
        self.returned.get(&product_id).copied().unwrap_or(0)
    }

    /// `sold - returned`, never below zero.
    pub fn remaining(&self, product_id: i64) -> i64 {
        (self.sold(product_id) - self.returned(product_id)).max(0)
    }

    /// One entry per product on the sale, ordered by product id.
    pub fn summary(&self) -> Vec<ReturnableQuantity> {
        self.sold
            .keys()
            .map(|&product_id| ReturnableQuantity {
                product_id,
                sold: self.sold(product_id),
                returned: self.returned(product_id),
                remaining: self.remaining(product_id),
            })
            .collect()
    }

    /// Filters and clamps candidate lines.
    ///
    /// `is_known` answers whether a product id exists in the catalog.
    ///
    /// ## Errors
    /// - `NoValidLines` when no candidate is accepted (including an empty list)
    pub fn plan<F>(&self, candidates: &[ReturnLineRequest], is_known: F) -> CoreResult<ReturnPlan>
    where
        F: Fn(i64) -> bool,
    {
        let mut consumed: BTreeMap<i64, i64> = BTreeMap::new();
        let mut outcomes = Vec::with_capacity(candidates.len());
        let mut total = Money::zero();

        for candidate in candidates {
            let product_id = candidate.product_id;
            let reject = |reason| LineOutcome::Rejected { product_id, reason };

            let outcome = if candidate.quantity <= 0 {
                reject(RejectReason::NonPositiveQuantity)
            } else if candidate.price_cents <= 0 {
                reject(RejectReason::NonPositivePrice)
            } else if self.sold(product_id) == 0 && !is_known(product_id) {
                reject(RejectReason::UnknownProduct)
            } else if self.sold(product_id) == 0 {
                reject(RejectReason::NotSoldOnSale)
            } else {
                let used = consumed.entry(product_id).or_insert(0);
                let allowed = self.remaining(product_id) - *used;
                if allowed <= 0 {
                    reject(RejectReason::FullyReturned)
                } else {
                    let quantity = candidate.quantity.min(allowed);
                    let next_total = Money::from_cents(candidate.price_cents)
                        .checked_multiply_quantity(quantity)
                        .and_then(|line| total.checked_add(line));

                    match next_total {
                        // Rejected lines do not draw down the allowance.
                        None => reject(RejectReason::AmountOverflow),
                        Some(next_total) => {
                            *used += quantity;
                            total = next_total;
                            LineOutcome::Accepted {
                                product_id,
                                requested: candidate.quantity,
                                quantity,
                                price_cents: candidate.price_cents,
                            }
                        }
                    }
                }
            };

            outcomes.push(outcome);
        }

        if !outcomes.iter().any(LineOutcome::is_accepted) {
            return Err(CoreError::NoValidLines {
                sale_id: self.sale_id,
                outcomes,
            });
        }

        Ok(ReturnPlan {
            outcomes,
            total_cents: total.cents(),
        })
    }
}

fn sum_by_product(pairs: impl IntoIterator<Item = (i64, i64)>) -> BTreeMap<i64, i64> {
    let mut map = BTreeMap::new();
    for (product_id, quantity) in pairs {
        *map.entry(product_id).or_insert(0) += quantity;
    }
    map
}

// =============================================================================
// Unit Tests
// =============================================================================
