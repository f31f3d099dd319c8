//! # Validation Module
//!
//! Input validation for ledger requests and catalog entries.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (web form)                                            │
//! │  └── Basic format checks, immediate user feedback                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── quantity > 0, price ≥ 0, 0 ≤ discount ≤ total                     │
//! │  └── runs before any stock is touched                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity >= 0)                                             │
//! │  ├── UNIQUE (invoice_number, barcode)                                  │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Return lines are not validated here: a bad return line is dropped with a
//! reason instead of failing the request (see [`crate::returns`]).
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_lines, validate_quantity};
//! use tally_core::LineRequest;
//!
//! validate_quantity(5).unwrap();
//! validate_lines("sale", &[LineRequest::new(1, 2, 100)]).unwrap();
//! assert!(validate_lines("sale", &[]).is_err());
//! ```

use crate::error::ValidationError;
use crate::types::{LineRequest, NewProduct};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_NAME_LEN: usize = 200;
const MAX_BARCODE_LEN: usize = 64;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a customer or supplier name.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 200 characters
pub fn validate_party_name(name: &str) -> ValidationResult<()> {
    validate_name("name", name)
}

/// Validates a product before it is inserted.
///
/// ## Rules
/// - Name non-empty, at most 200 characters
/// - Barcode, when present, non-empty and at most 64 characters
/// - Prices, opening quantity and reorder threshold not negative
pub fn validate_new_product(product: &NewProduct) -> ValidationResult<()> {
    validate_name("name", &product.name)?;

    if let Some(barcode) = &product.barcode {
        let barcode = barcode.trim();
        if barcode.is_empty() {
            return Err(ValidationError::Required {
                field: "barcode".to_string(),
            });
        }
        if barcode.chars().count() > MAX_BARCODE_LEN {
            return Err(ValidationError::TooLong {
                field: "barcode".to_string(),
                max: MAX_BARCODE_LEN,
            });
        }
    }

    validate_price_cents("price_buy", product.price_buy_cents)?;
    validate_price_cents("price_sell", product.price_sell_cents)?;
    validate_not_negative("quantity", product.quantity)?;
    if let Some(min_quantity) = product.min_quantity {
        validate_not_negative("min_quantity", min_quantity)?;
    }

    Ok(())
}

fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_quantity;
///
/// assert!(validate_quantity(1).is_ok());
/// assert!(validate_quantity(0).is_err());
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    Ok(())
}

/// Validates a price in cents.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (free items)
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents("unit_price", 1099).is_ok());
/// assert!(validate_price_cents("unit_price", 0).is_ok());
/// assert!(validate_price_cents("unit_price", -100).is_err());
/// ```
pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult<()> {
    validate_not_negative(field, cents)
}

/// Validates a header discount against the computed total.
///
/// ## Rules
/// - 0 ≤ discount ≤ total
pub fn validate_discount_cents(discount: i64, total: i64) -> ValidationResult<()> {
    validate_not_negative("discount", discount)?;

    if discount > total {
        return Err(ValidationError::DiscountExceedsTotal { discount, total });
    }

    Ok(())
}

fn validate_not_negative(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the lines of a sale or purchase.
///
/// ## Rules
/// - At least one line
/// - Every line: quantity > 0, unit price ≥ 0
///
/// The first offending line decides the error.
pub fn validate_lines(entry: &str, lines: &[LineRequest]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::EmptyLines {
            entry: entry.to_string(),
        });
    }

    for line in lines {
        validate_quantity(line.quantity)?;
        validate_price_cents("unit_price", line.unit_price_cents)?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
