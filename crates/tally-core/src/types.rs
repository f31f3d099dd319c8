//! # Domain Types
//!
//! Core domain types used throughout Tally.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │    Purchase     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  id             │   │  id             │       │
//! │  │  quantity ≥ 0   │   │  customer_id?   │   │  supplier_id    │       │
//! │  │  min_quantity   │   │  total/discount │   │  invoice_number │       │
//! │  │  price_buy/sell │   │  final          │   │  total/discount │       │
//! │  └─────────────────┘   └────────┬────────┘   └─────────────────┘       │
//! │                                 │ 1..N returns                          │
//! │                        ┌────────▼────────┐   ┌─────────────────┐       │
//! │                        │   SaleReturn    │   │  StockMovement  │       │
//! │                        │  ─────────────  │   │  ─────────────  │       │
//! │                        │  sale_id        │   │  product, delta │       │
//! │                        │  total (server) │   │  kind, revision │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rows, Requests and Records
//! - Row types (`Product`, `Sale`, `SaleLine`, ...) mirror table rows and
//!   derive `sqlx::FromRow` behind the `sqlx` feature.
//! - Request types (`NewSale`, `NewPurchase`, `NewReturn`) are what callers
//!   hand to the engine. They carry no totals: totals are always computed.
//! - Record types (`SaleRecord`, ...) are a header plus its lines, as
//!   persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;
use crate::returns::LineOutcome;

// =============================================================================
// Product
// =============================================================================

/// A product in the catalog.
///
/// `quantity` is only ever changed by the reconciliation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: i64,

    /// Display name shown to the cashier.
    pub name: String,

    /// Barcode, unique when present.
    pub barcode: Option<String>,

    /// Last purchase cost in cents. Overwritten by every purchase line.
    pub price_buy_cents: i64,

    /// Shelf price in cents.
    pub price_sell_cents: i64,

    /// On-hand quantity, never negative.
    pub quantity: i64,

    /// Reorder threshold.
    pub min_quantity: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the last purchase cost as Money.
    #[inline]
    pub fn price_buy(&self) -> Money {
        Money::from_cents(self.price_buy_cents)
    }

    /// Returns the shelf price as Money.
    #[inline]
    pub fn price_sell(&self) -> Money {
        Money::from_cents(self.price_sell_cents)
    }

    /// At or below the reorder threshold.
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_quantity
    }

    /// Checks if `quantity` units can be taken from stock.
    #[inline]
    pub fn can_sell(&self, quantity: i64) -> bool {
        self.quantity >= quantity
    }
}

/// Input for adding a product to the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub barcode: Option<String>,
    pub price_buy_cents: i64,
    pub price_sell_cents: i64,
    #[serde(default)]
    pub quantity: i64,
    /// Falls back to [`crate::DEFAULT_MIN_QUANTITY`].
    #[serde(default)]
    pub min_quantity: Option<i64>,
}

impl NewProduct {
    /// Creates a product request with no opening stock.
    pub fn new(name: impl Into<String>, price_buy_cents: i64, price_sell_cents: i64) -> Self {
        NewProduct {
            name: name.into(),
            barcode: None,
            price_buy_cents,
            price_sell_cents,
            quantity: 0,
            min_quantity: None,
        }
    }

    /// Sets the opening stock.
    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self
    }

    /// Sets the reorder threshold.
    pub fn with_min_quantity(mut self, min_quantity: i64) -> Self {
        self.min_quantity = Some(min_quantity);
        self
    }

    /// Sets the barcode.
    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = Some(barcode.into());
        self
    }
}

// =============================================================================
// Parties
// =============================================================================

/// A customer a sale or return may be attributed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A supplier purchase invoices are booked against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for a new customer or supplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewParty {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl NewParty {
    pub fn new(name: impl Into<String>) -> Self {
        NewParty {
            name: name.into(),
            phone: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    #[default]
    Cash,
    /// Card payment on an external terminal.
    Card,
    /// Bank transfer.
    Transfer,
}

// =============================================================================
// Sale
// =============================================================================

/// A recorded sale header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: i64,
    pub customer_id: Option<i64>,
    pub total_cents: i64,
    pub discount_cents: i64,
    pub final_cents: i64,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Sale {
    /// Returns the amount due as Money.
    #[inline]
    pub fn final_amount(&self) -> Money {
        Money::from_cents(self.final_cents)
    }
}

/// A line item in a sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleLine {
    pub id: i64,
    pub sale_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    /// Unit price at time of sale (frozen).
    pub unit_price_cents: i64,
    /// quantity × unit price.
    pub total_cents: i64,
}

impl SaleLine {
    /// Returns the line total as Money.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Purchase
// =============================================================================

/// A recorded purchase invoice header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Purchase {
    pub id: i64,
    pub supplier_id: i64,
    /// `PUR-000001`, unique.
    pub invoice_number: String,
    pub total_cents: i64,
    pub discount_cents: i64,
    pub final_cents: i64,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A line item on a purchase invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchaseLine {
    pub id: i64,
    pub purchase_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

// =============================================================================
// Return
// =============================================================================

/// A recorded return header. `total_cents` is always computed by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleReturn {
    pub id: i64,
    pub sale_id: i64,
    pub customer_id: Option<i64>,
    pub total_cents: i64,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SaleReturn {
    /// Returns the refunded amount as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// An accepted line of a return, with the quantity after clamping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReturnLine {
    pub id: i64,
    pub return_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub price_cents: i64,
    pub total_cents: i64,
}

// =============================================================================
// Ledger Kinds and Stock Movements
// =============================================================================

/// The three ledgers an entry can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Sale,
    Purchase,
    Return,
}

impl LedgerKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Sale => "sale",
            LedgerKind::Purchase => "purchase",
            LedgerKind::Return => "return",
        }
    }

    /// Entity name used in `NotFound` errors.
    pub const fn entity(&self) -> &'static str {
        match self {
            LedgerKind::Sale => "Sale",
            LedgerKind::Purchase => "Purchase",
            LedgerKind::Return => "Return",
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a product's quantity changed.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Sale,
    SaleReversal,
    Purchase,
    PurchaseReversal,
    Return,
    ReturnReversal,
    /// Manual correction through the catalog, not tied to a ledger entry.
    Adjustment,
}

impl MovementKind {
    /// The movement a ledger entry produces when it is created.
    pub const fn recorded(kind: LedgerKind) -> Self {
        match kind {
            LedgerKind::Sale => MovementKind::Sale,
            LedgerKind::Purchase => MovementKind::Purchase,
            LedgerKind::Return => MovementKind::Return,
        }
    }

    /// The movement a ledger entry produces when it is deleted.
    pub const fn reversal(kind: LedgerKind) -> Self {
        match kind {
            LedgerKind::Sale => MovementKind::SaleReversal,
            LedgerKind::Purchase => MovementKind::PurchaseReversal,
            LedgerKind::Return => MovementKind::ReturnReversal,
        }
    }
}

/// One journaled stock change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMovement {
    pub id: i64,
    pub product_id: i64,
    pub kind: MovementKind,
    /// Id of the sale, purchase or return that caused the change.
    /// `None` for adjustments.
    pub entry_id: Option<i64>,
    pub delta: i64,
    pub quantity_after: i64,
    /// Ledger revision of the transaction that applied the change.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
}

/// A delta applied to one product, with the resulting quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub product_id: i64,
    pub delta: i64,
    pub quantity_after: i64,
}

// =============================================================================
// Requests
// =============================================================================

/// One requested line of a sale or purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl LineRequest {
    pub const fn new(product_id: i64, quantity: i64, unit_price_cents: i64) -> Self {
        LineRequest {
            product_id,
            quantity,
            unit_price_cents,
        }
    }
}

/// Input for `CreateSale`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSale {
    #[serde(default)]
    pub customer_id: Option<i64>,
    #[serde(default)]
    pub discount_cents: i64,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
    pub lines: Vec<LineRequest>,
}

impl NewSale {
    /// A cash sale with no customer and no discount.
    pub fn new(lines: Vec<LineRequest>) -> Self {
        NewSale {
            lines,
            ..Default::default()
        }
    }
}

/// Input for `CreatePurchase`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPurchase {
    pub supplier_id: i64,
    #[serde(default)]
    pub discount_cents: i64,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
    pub lines: Vec<LineRequest>,
}

impl NewPurchase {
    pub fn new(supplier_id: i64, lines: Vec<LineRequest>) -> Self {
        NewPurchase {
            supplier_id,
            discount_cents: 0,
            payment_method: PaymentMethod::Cash,
            notes: None,
            lines,
        }
    }
}

/// One candidate line of a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLineRequest {
    pub product_id: i64,
    pub quantity: i64,
    pub price_cents: i64,
}

impl ReturnLineRequest {
    pub const fn new(product_id: i64, quantity: i64, price_cents: i64) -> Self {
        ReturnLineRequest {
            product_id,
            quantity,
            price_cents,
        }
    }
}

/// Input for `CreateReturn`.
///
/// There is no total field: a `total_amount` sent by a client is dropped
/// during deserialization and the engine computes the total itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReturn {
    pub sale_id: i64,
    #[serde(default)]
    pub customer_id: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub lines: Vec<ReturnLineRequest>,
}

impl NewReturn {
    pub fn new(sale_id: i64, lines: Vec<ReturnLineRequest>) -> Self {
        NewReturn {
            sale_id,
            customer_id: None,
            reason: None,
            notes: None,
            lines,
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// A persisted sale with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRecord {
    pub sale: Sale,
    pub lines: Vec<SaleLine>,
}

/// A persisted purchase invoice with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub purchase: Purchase,
    pub lines: Vec<PurchaseLine>,
}

/// A persisted return with its accepted lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRecord {
    #[serde(rename = "return")]
    pub header: SaleReturn,
    pub lines: Vec<ReturnLine>,
}

/// What `CreateReturn` hands back: the persisted return plus one outcome per
/// candidate line, in request order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnReceipt {
    pub record: ReturnRecord,
    pub outcomes: Vec<LineOutcome>,
}

/// What `DeleteLedgerEntry` hands back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionReceipt {
    pub kind: LedgerKind,
    pub entry_id: i64,
    /// Returns removed along with a deleted sale.
    pub cascaded_returns: Vec<i64>,
    pub stock_changes: Vec<StockChange>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn phone(quantity: i64, min_quantity: i64) -> Product {
        let now = Utc::now();
        Product {
            id: 1,
            name: "iPhone 15 Pro".to_string(),
            barcode: None,
            price_buy_cents: 4_500_000,
            price_sell_cents: 5_200_000,
            quantity,
            min_quantity,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_low_stock_is_inclusive() {
        assert!(phone(3, 3).is_low_stock());
        assert!(phone(0, 3).is_low_stock());
        assert!(!phone(4, 3).is_low_stock());
    }

    #[test]
    fn test_can_sell() {
        let p = phone(6, 3);
        assert!(p.can_sell(6));
        assert!(!p.can_sell(7));
    }

    #[test]
    fn test_payment_method_default() {
        assert_eq!(PaymentMethod::default(), PaymentMethod::Cash);
        let json = serde_json::to_string(&PaymentMethod::Transfer).unwrap();
        assert_eq!(json, "\"transfer\"");
    }

    #[test]
    fn test_new_return_ignores_client_total() {
        let json = r#"{
            "sale_id": 9,
            "total_amount": 999999,
            "lines": [{ "product_id": 1, "quantity": 2, "price_cents": 100 }]
        }"#;
        let request: NewReturn = serde_json::from_str(json).unwrap();
        assert_eq!(request.sale_id, 9);
        assert_eq!(request.lines, vec![ReturnLineRequest::new(1, 2, 100)]);
    }

    #[test]
    fn test_new_sale_defaults() {
        let json = r#"{ "lines": [{ "product_id": 1, "quantity": 4, "unit_price_cents": 100 }] }"#;
        let request: NewSale = serde_json::from_str(json).unwrap();
        assert_eq!(request.discount_cents, 0);
        assert_eq!(request.payment_method, PaymentMethod::Cash);
        assert!(request.customer_id.is_none());
    }

    #[test]
    fn test_movement_kinds() {
        assert_eq!(MovementKind::recorded(LedgerKind::Sale), MovementKind::Sale);
        assert_eq!(
            MovementKind::reversal(LedgerKind::Purchase),
            MovementKind::PurchaseReversal
        );
        assert_eq!(LedgerKind::Return.to_string(), "return");
    }
}
