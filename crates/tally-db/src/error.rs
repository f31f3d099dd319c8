//! # Database Error Types
//!
//! Error types for storage and ledger operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          Rule violation (CoreError)        │
//! │       │                                     │                           │
//! │       ▼                                     │                           │
//! │  DbError ← constraint parsing               │                           │
//! │       │                                     │                           │
//! │       └──────────────┬──────────────────────┘                           │
//! │                      ▼                                                  │
//! │  LedgerError (this module) ← returned by every engine operation        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ErrorKind ← NotFound / InvalidInput / InsufficientStock /             │
//! │              NoValidLines / Storage                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tally_core::{CoreError, ErrorKind, ValidationError};
use thiserror::Error;

// =============================================================================
// DbError
// =============================================================================

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and user feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: i64 },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate purchase invoice number
    /// - Duplicate product barcode
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Deleting a product that ledger lines still reference
    /// - Referencing a customer or supplier that does not exist
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Entity cannot be removed while ledger entries reference it.
    #[error("{entity} {id} is referenced by ledger entries")]
    InUse { entity: String, id: i64 },

    /// CHECK constraint violation (negative quantity, negative price).
    #[error("Check constraint failed: {message}")]
    CheckViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Another writer held the database past the busy timeout.
    #[error("Database is busy: {0}")]
    Busy(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: i64) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id,
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// True for a UNIQUE violation on the given `table.column`.
    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        matches!(self, DbError::UniqueViolation { field, .. } if field == column)
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: 0,
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite messages:
                // "UNIQUE constraint failed: <table>.<column>"
                // "FOREIGN KEY constraint failed"
                // "CHECK constraint failed: <expr>"
                // "database is locked"
                if let Some(field) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::UniqueViolation {
                        field: field.to_string(),
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("database is locked") || msg.contains("database is busy") {
                    DbError::Busy(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// LedgerError
// =============================================================================

/// Error returned by the reconciliation engine and the catalog operations.
///
/// Either a business rule said no, or storage failed. In both cases the
/// enclosing transaction has not been committed.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] DbError),
}

impl LedgerError {
    /// Maps the error onto the caller-facing taxonomy.
    ///
    /// ```text
    /// CoreError                    → its own kind
    /// DbError::NotFound / FK       → NotFound
    /// DbError::Unique / Check / InUse → InvalidInput
    /// anything else                → Storage (retryable)
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Domain(err) => err.kind(),
            LedgerError::Storage(err) => match err {
                DbError::NotFound { .. } | DbError::ForeignKeyViolation { .. } => {
                    ErrorKind::NotFound
                }
                DbError::UniqueViolation { .. }
                | DbError::CheckViolation { .. }
                | DbError::InUse { .. } => ErrorKind::InvalidInput,
                _ => ErrorKind::Storage,
            },
        }
    }

    /// Shorthand for a domain `NotFound`.
    pub fn not_found(entity: impl Into<String>, id: i64) -> Self {
        LedgerError::Domain(CoreError::not_found(entity, id))
    }

    /// Returns the domain error, if this is one.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            LedgerError::Domain(err) => Some(err),
            LedgerError::Storage(_) => None,
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Storage(DbError::from(err))
    }
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        LedgerError::Domain(CoreError::Validation(err))
    }
}

/// Result type for engine and catalog operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// ConfigError
// =============================================================================

/// Configuration errors raised while reading the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err: LedgerError = DbError::duplicate("purchases.invoice_number", "PUR-000001").into();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err: LedgerError = DbError::Busy("database is locked".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.kind().is_transient());

        let err: LedgerError = DbError::not_found("Product", 3).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = LedgerError::not_found("Sale", 3);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Sale not found: 3");
    }

    #[test]
    fn test_validation_is_invalid_input() {
        let err: LedgerError = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.as_domain().is_some());
    }

    #[test]
    fn test_unique_violation_on() {
        let err = DbError::duplicate("purchases.invoice_number", "unknown");
        assert!(err.is_unique_violation_on("purchases.invoice_number"));
        assert!(!err.is_unique_violation_on("products.barcode"));
    }
}
