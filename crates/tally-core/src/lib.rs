//! # tally-core: Pure Business Logic for the Stock Reconciliation Engine
//!
//! This crate holds the rules that keep on-hand quantities consistent as
//! sales, purchase invoices and returns are recorded. Everything here is a
//! pure function over plain data; the database crate feeds it ledger history
//! and applies what it decides.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Tally Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Callers (web handlers, not in this repo)           │   │
//! │  │    NewSale / NewPurchase / NewReturn / delete(kind, id)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               tally-db: Ledger (reconciliation engine)          │   │
//! │  │     transactions, stock deltas, repositories, migrations        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ pure calls                             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  ledger   │  │  returns  │  │   │
//! │  │   │  Product  │  │   Money   │  │  totals   │  │ allowance │  │   │
//! │  │   │  Sale ... │  │           │  │ invoices  │  │   plan    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Sale, Purchase, SaleReturn, requests)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types and the caller-facing error kinds
//! - [`validation`] - Input validation rules
//! - [`ledger`] - Header totals, per-product aggregation, invoice numbers
//! - [`returns`] - The returnable-quantity algorithm
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::ledger::LedgerTotals;
//! use tally_core::LineRequest;
//!
//! let lines = vec![LineRequest::new(1, 4, 10_000)];
//! let totals = LedgerTotals::compute(&lines, 0).unwrap();
//! assert_eq!(totals.final_cents, 40_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod money;
pub mod returns;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use tally_core::Money` instead of
// `use tally_core::money::Money`

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use ledger::LedgerTotals;
pub use returns::{
    AcceptedLine, LineOutcome, RejectReason, ReturnAllowance, ReturnPlan, ReturnableQuantity,
};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Prefix of generated purchase invoice numbers (`PUR-000042`).
pub const PURCHASE_INVOICE_PREFIX: &str = "PUR";

/// How many invoice numbers are tried before a purchase gives up.
///
/// Numbers are derived from the highest purchase id, so a collision only
/// happens when an imported invoice already uses the next number.
pub const INVOICE_RETRY_LIMIT: u32 = 5;

/// Reorder threshold used when a product is created without one.
pub const DEFAULT_MIN_QUANTITY: i64 = 5;
