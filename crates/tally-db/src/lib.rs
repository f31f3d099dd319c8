//! # tally-db: Storage and Reconciliation Engine
//!
//! This crate owns the SQLite database and every stock mutation made
//! through it. Pure rules (totals, validation, return planning) live in
//! `tally-core`; this crate runs them inside transactions.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Data Flow                                  │
//! │                                                                         │
//! │  Web handler / CLI (create sale, record return, ...)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │    engine     │    │  repository   │    │  migrations  │  │   │
//! │  │   │               │    │               │    │  (embedded)  │  │   │
//! │  │   │ Ledger        │───►│ product       │    │              │  │   │
//! │  │   │  create_sale  │    │ sale          │    │ 001_initial  │  │   │
//! │  │   │  create_...   │    │ purchase      │    │  _schema.sql │  │   │
//! │  │   │  delete_entry │    │ returns       │    │              │  │   │
//! │  │   │               │    │ movement      │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │            │                    │                              │   │
//! │  │            └──────► pool (Database, DbConfig) ◄─┘              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Storage and engine error types
//! - [`repository`] - Per-table queries, pool-backed and connection-scoped
//! - [`engine`] - Sale, purchase, return and deletion transactions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, DbConfig};
//! use tally_core::{LineRequest, NewSale};
//!
//! let db = Database::new(DbConfig::from_env()?).await?;
//!
//! let sale = db
//!     .ledger()
//!     .create_sale(&NewSale::new(vec![LineRequest::new(product_id, 2, 5_200_000)]))
//!     .await?;
//!
//! let left = db.products().get_quantity(product_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod engine;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use engine::Ledger;
pub use error::{ConfigError, DbError, DbResult, LedgerError, LedgerResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::movement::MovementRepository;
pub use repository::party::PartyRepository;
pub use repository::product::ProductRepository;
pub use repository::purchase::PurchaseRepository;
pub use repository::returns::ReturnRepository;
pub use repository::sale::SaleRepository;
