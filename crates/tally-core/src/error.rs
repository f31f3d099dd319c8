//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── ErrorKind        - Caller-facing category + HTTP status           │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── LedgerError      - CoreError | DbError, returned by the engine    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → LedgerError → ErrorKind → caller  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product, sale, requested amount)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to exactly one [`ErrorKind`]

use serde::Serialize;
use thiserror::Error;

use crate::returns::LineOutcome;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations. The engine returns them
/// unchanged so callers can translate them into user-facing messages.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A referenced entity does not exist.
    ///
    /// ## When This Occurs
    /// - Product id on a sale or purchase line is unknown
    /// - Return references a sale that was never recorded
    /// - Supplier or customer id is unknown
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: i64 },

    /// Insufficient stock to complete the operation.
    ///
    /// ## When This Occurs
    /// - A sale asks for more than is on hand
    /// - Deleting a purchase whose stock was already sold
    ///
    /// ## User Workflow
    /// ```text
    /// NewSale { (P, qty: 5) }
    ///      │
    ///      ▼
    /// Check stock: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { product: "iPhone 15 Pro", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Caller shows: "Only 3 iPhone 15 Pro in stock"
    /// ```
    #[error("Insufficient stock for {product} (#{product_id}): available {available}, requested {requested}")]
    InsufficientStock {
        product_id: i64,
        product: String,
        available: i64,
        requested: i64,
    },

    /// A return request had no acceptable lines after filtering.
    ///
    /// `outcomes` holds one rejected outcome per candidate line so callers
    /// can explain what was dropped.
    #[error("Return against sale {sale_id} has no valid lines")]
    NoValidLines {
        sale_id: i64,
        outcomes: Vec<LineOutcome>,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: i64) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id,
        }
    }

    /// Returns the caller-facing category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            CoreError::NoValidLines { .. } => ErrorKind::NoValidLines,
            CoreError::Validation(_) => ErrorKind::InvalidInput,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when a request doesn't meet requirements.
/// Raised before any stock is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Discount is larger than the amount it applies to.
    #[error("discount {discount} exceeds total {total}")]
    DiscountExceedsTotal { discount: i64, total: i64 },

    /// A ledger entry needs at least one line.
    #[error("{entry} must have at least one line")]
    EmptyLines { entry: String },

    /// An amount overflowed while being totalled.
    #[error("{field} is too large")]
    Overflow { field: String },
}

// =============================================================================
// Error Kind
// =============================================================================

/// The error taxonomy exposed to callers of the engine.
///
/// ## Usage in a web handler
/// ```rust,ignore
/// match ledger.create_sale(request).await {
///     Ok(record) => Json(record).into_response(),
///     Err(e) => (StatusCode::from_u16(e.kind().http_status())?, e.to_string()).into_response(),
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Referenced product/sale/supplier/customer does not exist (404)
    NotFound,

    /// Non-positive quantity, negative price, empty lines, bad discount (400)
    InvalidInput,

    /// A sale would oversell a product (400)
    InsufficientStock,

    /// A return had nothing acceptable left after filtering (422)
    NoValidLines,

    /// Transaction or commit failure, safe to retry (500)
    Storage,
}

impl ErrorKind {
    /// HTTP status code the web layer should answer with.
    pub const fn http_status(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidInput => 400,
            ErrorKind::InsufficientStock => 400,
            ErrorKind::NoValidLines => 422,
            ErrorKind::Storage => 500,
        }
    }

    /// Machine-readable code, stable across releases.
    pub const fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::InsufficientStock => "INSUFFICIENT_STOCK",
            ErrorKind::NoValidLines => "NO_VALID_LINES",
            ErrorKind::Storage => "STORAGE_ERROR",
        }
    }

    /// Whether retrying the same request may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Storage)
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
